//! retune432 - 440 Hz to 432 Hz batch retuner
//!
//! Shifts the pitch of every audio stream by 432/440 while keeping duration,
//! so video, subtitles and chapters stay in sync. Decoding and encoding are
//! delegated to FFmpeg.
//!
//! Pipeline per file:
//! - [`probe`] classifies the file (audio? real video? cover art? rates)
//! - [`codec_policy`] picks output container and codec tiers
//! - [`conversion_api`] runs ffmpeg through the HQ -> subtitle fallback -> safe ladder
//! - [`file_swap`] swaps the result in when replacing originals
//! - [`batch_driver`] walks the source and ties it together
//!
//! ```rust,ignore
//! use retune432::{BatchDriver, ConversionEngine, MediaProber, Settings};
//! use shared_utils::{resolve_tools, default_search_roots, SystemRunner};
//! use std::sync::Arc;
//!
//! let tools = resolve_tools(None, &default_search_roots())?;
//! let runner = Arc::new(SystemRunner);
//! let prober = Arc::new(MediaProber::new(runner.clone(), tools.clone()));
//! let engine = Arc::new(ConversionEngine::new(runner, tools.ffmpeg));
//! let mut driver = BatchDriver::new(Settings::new("Music"), prober, engine);
//! let result = driver.run(|event| println!("{:?}", event));
//! ```

pub mod batch_driver;
pub mod codec_policy;
pub mod conversion_api;
pub mod discovery;
pub mod file_swap;
pub mod pitch;
pub mod probe;
pub mod settings;

pub use batch_driver::{BatchDriver, BatchEvent, BatchStatus, CancelToken, SkipReason};
pub use codec_policy::{choose_output_extension, codec_options, Tier};
pub use conversion_api::{Attempt, ConversionEngine, ConversionJob, ConversionReport, Converter};
pub use discovery::find_audio_files;
pub use file_swap::replace_with_backup;
pub use probe::{MediaProbeResult, MediaProber, ProbeStrategy};
pub use settings::{OutputMode, Settings};

pub use shared_utils::errors::{Result, RetuneError};
