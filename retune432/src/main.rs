use anyhow::{anyhow, Context};
use clap::Parser;
use indicatif::ProgressBar;
use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, info, warn, Level};

use retune432::{
    BatchDriver, BatchEvent, BatchStatus, CancelToken, ConversionEngine, MediaProber, OutputMode,
    Settings,
};
use shared_utils::common_utils::ensure_dir_exists;
use shared_utils::ffmpeg_process::SystemRunner;
use shared_utils::logging::{init_logging, LogConfig};
use shared_utils::progress::{create_progress_bar, set_quiet_mode};
use shared_utils::report::print_summary_report;
use shared_utils::tools::{default_search_roots, resolve_tools};

/// How often the controller checks on the worker.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Parser, Debug)]
#[command(name = "retune432")]
#[command(version, about = "Batch-retune media audio from 440 Hz to 432 Hz", long_about = None)]
struct Cli {
    /// Folder to scan, or a single media file
    #[arg(value_name = "SOURCE")]
    source: PathBuf,

    /// Descend into subfolders
    #[arg(short, long)]
    recursive: bool,

    /// Skip files whose output already exists and is non-empty
    #[arg(short = 'k', long = "keep")]
    keep: bool,

    /// Write `<name>_432.<ext>` next to each source
    #[arg(long)]
    same_folder: bool,

    /// Replace originals in place, keeping `<name>.bak` backups
    #[arg(long)]
    replace: bool,

    /// Output folder (default: `<source>_432Hz` beside the source)
    #[arg(short = 'o', long = "out", value_name = "DIR")]
    out: Option<PathBuf>,

    /// ffmpeg executable, or a folder containing ffmpeg and ffprobe
    #[arg(long, value_name = "PATH")]
    ffmpeg: Option<PathBuf>,

    #[arg(short, long)]
    verbose: bool,

    /// No progress bar or summary
    #[arg(long)]
    quiet: bool,
}

fn install_cancel_handler(token: CancelToken) {
    let handler = move || {
        if token.is_cancelled() {
            // Second Ctrl-C: stop now.
            std::process::exit(130);
        }
        eprintln!("\n⏹️  Received Ctrl-C, finishing current file...");
        token.cancel();
    };
    if let Err(e) = ctrlc::set_handler(handler) {
        warn!(error = %e, "Failed to install Ctrl-C handler, cancellation disabled");
    }
}

fn handle_event(event: BatchEvent, bar: &mut Option<ProgressBar>) {
    match event {
        BatchEvent::Enumerated { total } => {
            if total == 0 {
                println!("No media files with audio were found.");
            }
            *bar = Some(create_progress_bar(total as u64, "432Hz"));
        }
        BatchEvent::FileStarted { path, .. } => {
            if let Some(pb) = bar {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                pb.set_message(name);
            }
        }
        BatchEvent::FileConverted { .. } | BatchEvent::FileSkipped { .. } => {
            if let Some(pb) = bar {
                pb.inc(1);
            }
        }
        BatchEvent::FileFailed { path, error } => {
            let report = || eprintln!("❌ Failed: {}\n{}", path.display(), error);
            match bar {
                Some(pb) => {
                    pb.suspend(report);
                    pb.inc(1);
                }
                None => report(),
            }
        }
        BatchEvent::Finished { status, .. } => {
            if let Some(pb) = bar {
                let msg = match status {
                    BatchStatus::Done => "done",
                    BatchStatus::DoneWithErrors => "done with errors",
                    BatchStatus::Cancelled => "cancelled",
                    _ => "",
                };
                pb.finish_with_message(msg);
            }
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::default()
            .with_level(Level::DEBUG)
            .with_console_level(Level::INFO)
    } else {
        LogConfig::default()
    };
    if let Err(e) = init_logging("retune432", log_config) {
        eprintln!("⚠️  File logging disabled: {:#}", e);
    }
    set_quiet_mode(cli.quiet);

    let source = cli
        .source
        .canonicalize()
        .with_context(|| format!("Source not found: {}", cli.source.display()))?;

    let settings = Settings {
        recursive: cli.recursive,
        skip_existing: cli.keep,
        same_folder: cli.same_folder,
        replace_original: cli.replace,
        source_path: source,
        output_base_path: cli.out,
        ffmpeg_override_path: cli.ffmpeg,
    };
    info!(?settings, "Starting run");

    let tools = match resolve_tools(settings.ffmpeg_override_path.as_deref(), &default_search_roots()) {
        Ok(tools) => tools,
        Err(e) => {
            error!(error = %e, "Cannot start without ffmpeg/ffprobe");
            eprintln!("❌ {}", e);
            std::process::exit(1);
        }
    };

    let output_location = match settings.output_mode() {
        OutputMode::SeparateTree { base } => {
            ensure_dir_exists(&base)?;
            base
        }
        OutputMode::SameFolder | OutputMode::ReplaceInPlace => settings.source_root(),
    };

    let runner = Arc::new(SystemRunner);
    let prober = Arc::new(MediaProber::new(runner.clone(), tools.clone()));
    let engine = Arc::new(ConversionEngine::new(runner, tools.ffmpeg.clone()));

    let cancel = CancelToken::new();
    install_cancel_handler(cancel.clone());

    let (tx, rx) = mpsc::channel();
    let start = Instant::now();
    let worker = thread::spawn(move || {
        let mut driver = BatchDriver::new(settings, prober, engine).with_cancel_token(cancel);
        driver.run(|event| {
            let _ = tx.send(event);
        })
    });

    let mut bar: Option<ProgressBar> = None;
    loop {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(event) => handle_event(event, &mut bar),
            Err(RecvTimeoutError::Timeout) => {
                if worker.is_finished() {
                    for event in rx.try_iter() {
                        handle_event(event, &mut bar);
                    }
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    let result = worker
        .join()
        .map_err(|_| anyhow!("Batch worker thread panicked"))?;

    if !shared_utils::progress::is_quiet_mode() {
        print_summary_report(&result, start.elapsed(), "432Hz Retune");
        if result.succeeded > 0 {
            println!("📁 Output: {}", output_location.display());
        }
    }

    if result.has_errors() {
        std::process::exit(1);
    }
    Ok(())
}
