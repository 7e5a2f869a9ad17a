//! Logging setup
//!
//! Two sinks on one `tracing` registry:
//! - a daily-rotated log file (no ANSI, with targets/threads/line numbers)
//! - stderr, filtered to `console_level` so it stays quiet under a progress bar
//!
//! `RUST_LOG` overrides the file filter.
//!
//! ```no_run
//! use shared_utils::logging::{init_logging, LogConfig};
//!
//! init_logging("retune432", LogConfig::default()).expect("Failed to init logging");
//! tracing::info!("started");
//! ```

use crate::ffmpeg_process::clean_ffmpeg_diagnostic;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::Level;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    filter::LevelFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Defaults to the system temp dir.
    pub log_dir: PathBuf,
    /// Rotated files kept per program.
    pub max_files: usize,
    /// Level written to the log file.
    pub level: Level,
    /// Level echoed to stderr.
    pub console_level: Level,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_dir: std::env::temp_dir(),
            max_files: 5,
            level: Level::INFO,
            console_level: Level::WARN,
        }
    }
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_log_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.log_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn with_max_files(mut self, count: usize) -> Self {
        self.max_files = count;
        self
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_console_level(mut self, level: Level) -> Self {
        self.console_level = level;
        self
    }
}

/// Installs the global subscriber. Log file: `<log_dir>/<program_name>.log.<date>`.
pub fn init_logging(program_name: &str, config: LogConfig) -> Result<PathBuf> {
    std::fs::create_dir_all(&config.log_dir)
        .with_context(|| format!("Failed to create log directory: {:?}", config.log_dir))?;

    let log_file_name = format!("{}.log", program_name);
    let file_appender = RollingFileAppender::new(Rotation::DAILY, &config.log_dir, &log_file_name);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "{}={},shared_utils={}",
            program_name, config.level, config.level
        ))
    });

    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true);

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(false)
        .with_line_number(false)
        .with_filter(LevelFilter::from_level(config.console_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .context("A global tracing subscriber is already installed")?;

    tracing::info!(
        program = program_name,
        log_dir = ?config.log_dir,
        level = ?config.level,
        "Logging system initialized"
    );

    cleanup_old_logs(&config.log_dir, program_name, config.max_files)?;

    Ok(config.log_dir.join(log_file_name))
}

/// Keeps only the `max_files` most recently modified `<program_name>*.log*` files.
fn cleanup_old_logs(log_dir: &Path, program_name: &str, max_files: usize) -> Result<()> {
    use std::fs;

    let entries = fs::read_dir(log_dir)
        .with_context(|| format!("Failed to read log directory: {:?}", log_dir))?;

    let prefix = format!("{}.log", program_name);
    let mut log_files: Vec<(PathBuf, std::time::SystemTime)> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| {
            p.file_name()
                .map(|n| n.to_string_lossy().starts_with(&prefix))
                .unwrap_or(false)
        })
        .filter_map(|p| {
            let modified = fs::metadata(&p).and_then(|m| m.modified()).ok()?;
            Some((p, modified))
        })
        .collect();

    if log_files.len() <= max_files {
        return Ok(());
    }

    log_files.sort_by(|a, b| b.1.cmp(&a.1));
    for (path, _) in log_files.iter().skip(max_files) {
        if let Err(e) = fs::remove_file(path) {
            tracing::warn!(path = ?path, error = %e, "Failed to remove old log file");
        } else {
            tracing::debug!(path = ?path, "Removed old log file");
        }
    }

    Ok(())
}

/// Records one external tool invocation.
///
/// The raw tool output only ever goes out at DEBUG (file sink). Failures are
/// recorded at INFO with the cleaned diagnostic, below the console level, so
/// callers decide what reaches the user.
pub fn log_external_tool(
    tool_name: &str,
    args: &[&str],
    output: &str,
    exit_code: Option<i32>,
    duration: Duration,
) {
    let command = format!("{} {}", tool_name, args.join(" "));

    match exit_code {
        Some(0) => {
            tracing::info!(
                tool = tool_name,
                command = %command,
                duration_secs = duration.as_secs_f64(),
                exit_code = 0,
                "External tool completed successfully"
            );
        }
        Some(code) => {
            tracing::info!(
                tool = tool_name,
                command = %command,
                duration_secs = duration.as_secs_f64(),
                exit_code = code,
                diagnostic = %clean_ffmpeg_diagnostic(output),
                "External tool exited non-zero"
            );
        }
        None => {
            tracing::info!(
                tool = tool_name,
                command = %command,
                duration_secs = duration.as_secs_f64(),
                diagnostic = %clean_ffmpeg_diagnostic(output),
                "External tool terminated without exit code"
            );
        }
    }
    tracing::debug!(tool = tool_name, output = %output, "External tool output");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    #[test]
    fn test_log_config_default() {
        let config = LogConfig::default();
        assert_eq!(config.max_files, 5);
        assert_eq!(config.level, Level::INFO);
        assert_eq!(config.console_level, Level::WARN);
    }

    #[test]
    fn test_log_config_builder() {
        let temp_dir = TempDir::new().unwrap();
        let config = LogConfig::new()
            .with_log_dir(temp_dir.path())
            .with_max_files(3)
            .with_level(Level::DEBUG)
            .with_console_level(Level::ERROR);

        assert_eq!(config.log_dir, temp_dir.path());
        assert_eq!(config.max_files, 3);
        assert_eq!(config.level, Level::DEBUG);
        assert_eq!(config.console_level, Level::ERROR);
    }

    #[test]
    fn test_cleanup_old_logs_keeps_newest() {
        let temp_dir = TempDir::new().unwrap();
        let program_name = "test_program";

        for i in 0..10 {
            let file_path = temp_dir
                .path()
                .join(format!("{}.log.2024-01-{:02}", program_name, i + 1));
            fs::write(&file_path, format!("log content {}", i)).unwrap();
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        fs::write(temp_dir.path().join("other.log"), "unrelated").unwrap();

        cleanup_old_logs(temp_dir.path(), program_name, 3).unwrap();

        let remaining: Vec<_> = fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(program_name))
            .collect();
        assert_eq!(remaining.len(), 3);
        assert!(temp_dir.path().join("other.log").exists());
    }

    #[test]
    fn test_log_external_tool_all_exit_paths() {
        for code in [Some(0), Some(1), None] {
            log_external_tool(
                "ffmpeg",
                &["-i", "in.mp3", "out.mp3"],
                "output",
                code,
                Duration::from_millis(5),
            );
        }
    }

    #[derive(Clone, Default)]
    struct CapturedWriter(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl CapturedWriter {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    const FAILED_BANNER: &str = "ffmpeg version 6.1 Copyright (c) 2000-2023\n  \
        configuration: --enable-gpl --enable-libmp3lame\n  \
        libavcodec     60. 31.102 / 60. 31.102\n\
        in.mp3: Invalid data found when processing input\n";

    fn capture_failed_run(level: Level) -> String {
        let writer = CapturedWriter::default();
        let sink = writer.clone();
        let subscriber = tracing_subscriber::registry().with(
            fmt::layer()
                .with_writer(move || sink.clone())
                .with_ansi(false)
                .with_filter(LevelFilter::from_level(level)),
        );
        tracing::subscriber::with_default(subscriber, || {
            log_external_tool(
                "ffmpeg",
                &["-i", "in.mp3", "out.mp3"],
                FAILED_BANNER,
                Some(1),
                Duration::from_millis(5),
            );
        });
        writer.contents()
    }

    #[test]
    fn test_failed_tool_keeps_banner_off_console() {
        let console = capture_failed_run(LogConfig::default().console_level);
        assert!(!console.contains("configuration: --enable-gpl"), "{}", console);
        assert!(!console.contains("ffmpeg version"), "{}", console);
    }

    #[test]
    fn test_failed_tool_records_cleaned_then_raw() {
        let info = capture_failed_run(Level::INFO);
        assert!(info.contains("Invalid data found when processing input"));
        assert!(!info.contains("configuration: --enable-gpl"), "{}", info);

        let debug = capture_failed_run(Level::DEBUG);
        assert!(debug.contains("configuration: --enable-gpl"));
    }
}
