//! Media Prober
//!
//! Classifies a file by its streams. Strategies are tried in priority order
//! and the first one that yields a usable answer wins:
//! 1. [`FfprobeJsonStrategy`] - `ffprobe -show_streams` JSON (sees cover-art dispositions)
//! 2. [`FfmpegBannerStrategy`] - `ffmpeg -i` stream listing on stderr
//!
//! If every strategy fails the file is treated as non-media.

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared_utils::common_utils::safe_path_arg;
use shared_utils::errors::{Result, RetuneError};
use shared_utils::ffmpeg_process::CommandRunner;
use shared_utils::tools::ToolPaths;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex};
use tracing::{debug, warn};

static SAMPLE_RATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s*Hz").expect("valid sample rate pattern"));
static BIT_RATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s*kb/s").expect("valid bit rate pattern"));

/// Used when a file has audio but its sample rate is not reported.
pub const DEFAULT_SAMPLE_RATE_HZ: u32 = 44_100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MediaProbeResult {
    pub has_audio: bool,
    pub has_real_video: bool,
    pub has_attached_picture: bool,
    /// Always `Some` when `has_audio` is true.
    pub sample_rate_hz: Option<u32>,
    pub bit_rate_bps: Option<u64>,
}

impl MediaProbeResult {
    pub fn not_media() -> Self {
        Self::default()
    }

    /// A reported rate of 0 counts as unreported.
    fn with_default_rate(mut self) -> Self {
        if self.sample_rate_hz == Some(0) {
            self.sample_rate_hz = None;
        }
        if self.has_audio && self.sample_rate_hz.is_none() {
            self.sample_rate_hz = Some(DEFAULT_SAMPLE_RATE_HZ);
        }
        self
    }
}

pub trait ProbeStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Err` means this strategy could not produce an answer and the next
    /// one should be tried.
    fn probe(
        &self,
        runner: &dyn CommandRunner,
        tools: &ToolPaths,
        path: &Path,
    ) -> Result<MediaProbeResult>;
}

#[derive(Debug, Deserialize, Default)]
struct FfprobeDisposition {
    #[serde(default)]
    attached_pic: Option<Value>,
}

#[derive(Debug, Deserialize, Default)]
struct FfprobeStream {
    #[serde(default)]
    codec_type: Option<String>,
    #[serde(default)]
    sample_rate: Option<Value>,
    #[serde(default)]
    bit_rate: Option<Value>,
    #[serde(default)]
    disposition: Option<FfprobeDisposition>,
}

#[derive(Debug, Deserialize, Default)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Option<Vec<FfprobeStream>>,
}

/// Accepts `"44100"` or `44100`; anything else (including `"N/A"`) is `None`.
fn digits_value(value: &Option<Value>) -> Option<u64> {
    match value {
        Some(Value::String(s)) if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) => {
            s.parse().ok()
        }
        Some(Value::Number(n)) => n.as_u64(),
        _ => None,
    }
}

fn is_attached_picture(disposition: &Option<FfprobeDisposition>) -> bool {
    disposition
        .as_ref()
        .and_then(|d| d.attached_pic.as_ref())
        .map(|v| match v {
            Value::Number(n) => n.as_i64() == Some(1),
            Value::String(s) => s.trim() == "1",
            Value::Bool(b) => *b,
            _ => false,
        })
        .unwrap_or(false)
}

/// Classifies an `ffprobe -print_format json -show_streams` document.
/// Rates come from the first audio stream only.
pub fn parse_ffprobe_json(json: &str) -> serde_json::Result<MediaProbeResult> {
    let parsed: FfprobeOutput = serde_json::from_str(json)?;
    let mut result = MediaProbeResult::default();

    for stream in parsed.streams.unwrap_or_default() {
        match stream.codec_type.as_deref() {
            Some("audio") if !result.has_audio => {
                result.has_audio = true;
                result.sample_rate_hz =
                    digits_value(&stream.sample_rate).and_then(|v| u32::try_from(v).ok());
                result.bit_rate_bps = digits_value(&stream.bit_rate);
            }
            Some("video") => {
                if is_attached_picture(&stream.disposition) {
                    result.has_attached_picture = true;
                } else {
                    result.has_real_video = true;
                }
            }
            _ => {}
        }
    }

    Ok(result.with_default_rate())
}

/// Classifies the stream listing `ffmpeg -i` prints to stderr. Cover art
/// cannot be told apart here, so any video stream counts as real video.
pub fn parse_ffmpeg_banner(stderr: &str) -> MediaProbeResult {
    let mut result = MediaProbeResult {
        has_audio: stderr.contains("Audio:"),
        has_real_video: stderr.contains("Video:"),
        ..Default::default()
    };

    if result.has_audio {
        result.sample_rate_hz = SAMPLE_RATE_RE
            .captures(stderr)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok());
        result.bit_rate_bps = BIT_RATE_RE
            .captures(stderr)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<u64>().ok())
            .map(|kbps| kbps * 1000);
    }

    result.with_default_rate()
}

fn probe_failure(path: &Path, reason: impl Into<String>) -> RetuneError {
    RetuneError::ProbeFailure {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FfprobeJsonStrategy;

impl ProbeStrategy for FfprobeJsonStrategy {
    fn name(&self) -> &'static str {
        "ffprobe-json"
    }

    fn probe(
        &self,
        runner: &dyn CommandRunner,
        tools: &ToolPaths,
        path: &Path,
    ) -> Result<MediaProbeResult> {
        let args: Vec<String> = vec![
            "-v".into(),
            "quiet".into(),
            "-print_format".into(),
            "json".into(),
            "-show_streams".into(),
            safe_path_arg(path).into_owned(),
        ];
        let output = runner
            .run(&tools.ffprobe, &args)
            .map_err(|e| probe_failure(path, format!("{:#}", e)))?;

        if !output.success() {
            return Err(probe_failure(
                path,
                format!("ffprobe exited with {:?}", output.exit_code),
            ));
        }
        if output.stdout.trim().is_empty() {
            return Err(probe_failure(path, "ffprobe produced no output"));
        }

        parse_ffprobe_json(&output.stdout)
            .map_err(|e| probe_failure(path, format!("malformed ffprobe JSON: {}", e)))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegBannerStrategy;

impl ProbeStrategy for FfmpegBannerStrategy {
    fn name(&self) -> &'static str {
        "ffmpeg-banner"
    }

    fn probe(
        &self,
        runner: &dyn CommandRunner,
        tools: &ToolPaths,
        path: &Path,
    ) -> Result<MediaProbeResult> {
        // Without an output file ffmpeg always exits non-zero; only stderr matters.
        let args: Vec<String> = vec!["-i".into(), safe_path_arg(path).into_owned()];
        let output = runner
            .run(&tools.ffmpeg, &args)
            .map_err(|e| probe_failure(path, format!("{:#}", e)))?;
        Ok(parse_ffmpeg_banner(&output.stderr))
    }
}

/// Owns the runner, the resolved tools and the per-run probe cache.
pub struct MediaProber {
    runner: Arc<dyn CommandRunner>,
    tools: ToolPaths,
    strategies: Vec<Box<dyn ProbeStrategy>>,
    cache: Mutex<HashMap<PathBuf, MediaProbeResult>>,
}

impl MediaProber {
    pub fn new(runner: Arc<dyn CommandRunner>, tools: ToolPaths) -> Self {
        Self::with_strategies(
            runner,
            tools,
            vec![Box::new(FfprobeJsonStrategy), Box::new(FfmpegBannerStrategy)],
        )
    }

    pub fn with_strategies(
        runner: Arc<dyn CommandRunner>,
        tools: ToolPaths,
        strategies: Vec<Box<dyn ProbeStrategy>>,
    ) -> Self {
        Self {
            runner,
            tools,
            strategies,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn runner(&self) -> &Arc<dyn CommandRunner> {
        &self.runner
    }

    pub fn tools(&self) -> &ToolPaths {
        &self.tools
    }

    /// Memoized by resolved path; the first answer for a path is kept for the
    /// rest of the run, including a "not media" answer.
    pub fn probe(&self, path: &Path) -> MediaProbeResult {
        let key = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());

        if let Some(hit) = self.lock_cache().get(&key) {
            return *hit;
        }

        let result = self.probe_uncached(&key);
        *self.lock_cache().entry(key).or_insert(result)
    }

    fn probe_uncached(&self, path: &Path) -> MediaProbeResult {
        for strategy in &self.strategies {
            match strategy.probe(self.runner.as_ref(), &self.tools, path) {
                Ok(result) => {
                    debug!(path = %path.display(), strategy = strategy.name(), ?result, "Probed");
                    return result;
                }
                Err(e) => {
                    warn!(strategy = strategy.name(), error = %e, "Probe strategy failed");
                }
            }
        }
        warn!(path = %path.display(), "All probe strategies failed, treating as non-media");
        MediaProbeResult::not_media()
    }

    pub fn cached_entries(&self) -> usize {
        self.lock_cache().len()
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, HashMap<PathBuf, MediaProbeResult>> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
