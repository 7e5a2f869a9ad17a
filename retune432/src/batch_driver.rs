//! Batch Driver
//!
//! `Idle -> Enumerating -> Converting(i/N) -> Done | DoneWithErrors | Cancelled`
//!
//! Files are processed one at a time. Per-file failures are recorded and the
//! run moves on; only cancellation stops it early, and only between files.

use crate::codec_policy::choose_output_extension;
use crate::conversion_api::{ConversionJob, Converter};
use crate::discovery::{find_audio_files, OUTPUT_STEM_SUFFIX, TEMP_MARKER};
use crate::file_swap::replace_with_backup;
use crate::probe::{MediaProbeResult, MediaProber};
use crate::settings::{OutputMode, Settings};
use anyhow::Result;
use shared_utils::batch::BatchResult;
use shared_utils::common_utils::{
    compute_relative_path, ensure_parent_dir_exists, get_extension_lowercase,
};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    Idle,
    Enumerating,
    Converting { index: usize, total: usize },
    Done,
    DoneWithErrors,
    Cancelled,
}

impl BatchStatus {
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            BatchStatus::Done | BatchStatus::DoneWithErrors | BatchStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoAudio,
    DestinationExists,
    Cancelled,
}

#[derive(Debug, Clone)]
pub enum BatchEvent {
    Enumerated { total: usize },
    FileStarted { index: usize, total: usize, path: PathBuf },
    FileConverted { path: PathBuf, destination: PathBuf, attempts: usize },
    FileSkipped { path: PathBuf, reason: SkipReason },
    FileFailed { path: PathBuf, error: String },
    Finished { status: BatchStatus, result: BatchResult },
}

/// Shared stop flag, checked between files. A running transcode is never interrupted.
/// An extension beyond the base retune flow, which always ran a batch to completion.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

enum FileOutcome {
    Converted {
        destination: PathBuf,
        attempts: usize,
        input_bytes: u64,
        output_bytes: u64,
    },
    Skipped(SkipReason),
}

fn file_size(path: &Path) -> u64 {
    fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

fn stem_of(path: &Path) -> OsString {
    path.file_stem().map(OsString::from).unwrap_or_default()
}

/// `<stem>.__tmp432__.<ext>` beside the source, keeping the source extension.
pub fn in_flight_temp_path(source: &Path) -> PathBuf {
    let mut name = stem_of(source);
    name.push(TEMP_MARKER);
    if let Some(ext) = source.extension() {
        name.push(".");
        name.push(ext);
    }
    source.with_file_name(name)
}

fn suffixed_name(source: &Path, ext_out: &str) -> OsString {
    let mut name = stem_of(source);
    name.push(OUTPUT_STEM_SUFFIX);
    name.push(".");
    name.push(ext_out);
    name
}

pub struct BatchDriver {
    settings: Settings,
    prober: Arc<MediaProber>,
    converter: Arc<dyn Converter>,
    cancel: CancelToken,
    status: BatchStatus,
}

impl BatchDriver {
    pub fn new(settings: Settings, prober: Arc<MediaProber>, converter: Arc<dyn Converter>) -> Self {
        Self {
            settings,
            prober,
            converter,
            cancel: CancelToken::new(),
            status: BatchStatus::Idle,
        }
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn status(&self) -> BatchStatus {
        self.status
    }

    /// A single file is a one-item batch (probed later, not filtered);
    /// a directory goes through discovery.
    pub fn enumerate(&mut self) -> Vec<PathBuf> {
        self.status = BatchStatus::Enumerating;
        let source = &self.settings.source_path;
        if source.is_file() {
            vec![source.clone()]
        } else {
            find_audio_files(source, self.settings.recursive, &self.prober)
        }
    }

    pub fn destination_for(&self, source: &Path, probe: &MediaProbeResult) -> PathBuf {
        let ext_out = choose_output_extension(&get_extension_lowercase(source), probe.has_real_video);
        match self.settings.output_mode() {
            OutputMode::ReplaceInPlace => in_flight_temp_path(source),
            OutputMode::SameFolder => source.with_file_name(suffixed_name(source, &ext_out)),
            OutputMode::SeparateTree { base } => {
                let relative = compute_relative_path(source, &self.settings.source_root());
                base.join(relative)
                    .with_file_name(suffixed_name(source, &ext_out))
            }
        }
    }

    pub fn run<F: FnMut(BatchEvent)>(&mut self, mut on_event: F) -> BatchResult {
        let files = self.enumerate();
        let total = files.len();
        info!(source = %self.settings.source_path.display(), total, "Batch enumerated");
        on_event(BatchEvent::Enumerated { total });

        let mut result = BatchResult::new();
        let mut cancelled = false;

        for (i, path) in files.iter().enumerate() {
            if !cancelled && self.cancel.is_cancelled() {
                warn!(remaining = total - i, "Cancelled, skipping remaining files");
                cancelled = true;
            }
            if cancelled {
                result.skip();
                on_event(BatchEvent::FileSkipped {
                    path: path.clone(),
                    reason: SkipReason::Cancelled,
                });
                continue;
            }

            self.status = BatchStatus::Converting {
                index: i + 1,
                total,
            };
            on_event(BatchEvent::FileStarted {
                index: i + 1,
                total,
                path: path.clone(),
            });

            match self.process_file(path) {
                Ok(FileOutcome::Converted {
                    destination,
                    attempts,
                    input_bytes,
                    output_bytes,
                }) => {
                    result.success(input_bytes, output_bytes);
                    on_event(BatchEvent::FileConverted {
                        path: path.clone(),
                        destination,
                        attempts,
                    });
                }
                Ok(FileOutcome::Skipped(reason)) => {
                    info!(path = %path.display(), ?reason, "Skipped");
                    result.skip();
                    on_event(BatchEvent::FileSkipped {
                        path: path.clone(),
                        reason,
                    });
                }
                Err(e) => {
                    let message = format!("{:#}", e);
                    error!(path = %path.display(), error = %message, "File failed");
                    result.fail(path.clone(), message.clone());
                    on_event(BatchEvent::FileFailed {
                        path: path.clone(),
                        error: message,
                    });
                }
            }
        }

        self.status = if cancelled {
            BatchStatus::Cancelled
        } else if result.has_errors() {
            BatchStatus::DoneWithErrors
        } else {
            BatchStatus::Done
        };
        info!(
            status = ?self.status,
            succeeded = result.succeeded,
            failed = result.failed,
            skipped = result.skipped,
            "Batch finished"
        );
        on_event(BatchEvent::Finished {
            status: self.status,
            result: result.clone(),
        });
        result
    }

    fn process_file(&self, path: &Path) -> Result<FileOutcome> {
        let probe = self.prober.probe(path);
        if !probe.has_audio {
            return Ok(FileOutcome::Skipped(SkipReason::NoAudio));
        }

        let destination = self.destination_for(path, &probe);
        ensure_parent_dir_exists(&destination)?;

        if self.settings.skip_existing && file_size(&destination) > 0 {
            return Ok(FileOutcome::Skipped(SkipReason::DestinationExists));
        }

        let replacing = self.settings.output_mode() == OutputMode::ReplaceInPlace;
        let input_bytes = file_size(path);
        let job = ConversionJob::from_probe(path, &destination, &probe);

        let report = match self.converter.convert(&job) {
            Ok(report) => report,
            Err(e) => {
                if replacing {
                    remove_temp(&destination);
                }
                return Err(e.into());
            }
        };

        if replacing {
            let swapped = replace_with_backup(path, &destination);
            // Only left behind when the swap failed.
            remove_temp(&destination);
            swapped?;
            return Ok(FileOutcome::Converted {
                destination: path.to_path_buf(),
                attempts: report.attempt_count(),
                input_bytes,
                output_bytes: file_size(path),
            });
        }

        Ok(FileOutcome::Converted {
            output_bytes: file_size(&destination),
            destination,
            attempts: report.attempt_count(),
            input_bytes,
        })
    }
}

fn remove_temp(temp: &Path) {
    let is_ours = temp
        .file_name()
        .map(|n| n.to_string_lossy().contains(TEMP_MARKER))
        .unwrap_or(false);
    if is_ours && temp.exists() {
        if let Err(e) = fs::remove_file(temp) {
            warn!(path = %temp.display(), error = %e, "Failed to remove temp file");
        }
    }
}
