//! Summary report printed after a batch run.

use crate::batch::BatchResult;
use crate::progress::{format_bytes, format_duration};
use std::time::Duration;

pub fn render_summary_report(result: &BatchResult, duration: Duration, operation_name: &str) -> String {
    let mut out = String::new();
    let line = |out: &mut String, label: &str, value: String| {
        out.push_str(&format!("║  {:<22}{:>12}{:>42}║\n", label, value, ""));
    };

    out.push('\n');
    out.push_str("╔══════════════════════════════════════════════════════════════════════════════╗\n");
    out.push_str(&format!("║  📊 {:<73}║\n", format!("{} Summary Report", operation_name)));
    out.push_str("╠══════════════════════════════════════════════════════════════════════════════╣\n");
    line(&mut out, "📁 Files Processed:", result.total.to_string());
    line(&mut out, "✅ Succeeded:", result.succeeded.to_string());
    line(&mut out, "❌ Failed:", result.failed.to_string());
    line(&mut out, "⏭️  Skipped:", result.skipped.to_string());
    line(&mut out, "📈 Success Rate:", format!("{:.1}%", result.success_rate()));
    out.push_str("╠══════════════════════════════════════════════════════════════════════════════╣\n");
    line(&mut out, "💾 Input Size:", format_bytes(result.input_bytes));
    line(&mut out, "💾 Output Size:", format_bytes(result.output_bytes));
    line(&mut out, "⏱️  Total Time:", format_duration(duration));
    if result.total > 0 {
        let avg_time = duration.as_secs_f64() / result.total as f64;
        line(&mut out, "⏱️  Avg Time/File:", format!("{:.2}s", avg_time));
    }
    out.push_str("╚══════════════════════════════════════════════════════════════════════════════╝\n");

    if !result.errors.is_empty() {
        out.push('\n');
        out.push_str("❌ Errors encountered:\n");
        out.push_str(&"━".repeat(80));
        out.push('\n');
        for (path, error) in &result.errors {
            out.push_str(&format!("   {} → {}\n", path.display(), error));
        }
    }
    out
}

pub fn print_summary_report(result: &BatchResult, duration: Duration, operation_name: &str) {
    print!("{}", render_summary_report(result, duration, operation_name));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_report_lists_errors() {
        let mut result = BatchResult::new();
        result.success(1024, 2048);
        result.fail(PathBuf::from("broken.wav"), "Conversion failed".to_string());
        let text = render_summary_report(&result, Duration::from_secs(3), "432Hz");

        assert!(text.contains("432Hz Summary Report"));
        assert!(text.contains("50.0%"));
        assert!(text.contains("1.00 KB"));
        assert!(text.contains("broken.wav → Conversion failed"));
    }

    #[test]
    fn test_report_without_errors_has_no_error_section() {
        let mut result = BatchResult::new();
        result.skip();
        let text = render_summary_report(&result, Duration::from_secs(1), "432Hz");
        assert!(!text.contains("Errors encountered"));
    }
}
