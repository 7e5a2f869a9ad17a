//! Conversion Engine
//!
//! Builds the ffmpeg argument lists for one job and walks the retry ladder:
//!
//! | attempt                        | codec tier | when                                          |
//! |--------------------------------|------------|-----------------------------------------------|
//! | `HighQuality`                  | HQ         | always                                        |
//! | `HighQualitySubtitleFallback`  | HQ         | MP4-family video and HQ stderr blames subtitles |
//! | `Safe`                         | Safe       | everything above failed                       |
//!
//! The safe tier always uses the plain stream mapping, even after a subtitle
//! fallback was tried. A partially written destination is left for the next
//! attempt to overwrite; cleanup after total failure is the caller's job.

use crate::codec_policy::{
    adjust_bitrate, codec_options, is_video_container, Tier, COVER_ART_EXTENSIONS,
    MATROSKA_EXTENSION, MP4_FAMILY_EXTENSIONS,
};
use crate::pitch::{retune_chain, TARGET_SAMPLE_RATE_HZ};
use crate::probe::{MediaProbeResult, DEFAULT_SAMPLE_RATE_HZ};
use shared_utils::common_utils::{get_extension_lowercase, safe_path_arg};
use shared_utils::errors::{Result, RetuneError};
use shared_utils::ffmpeg_process::{clean_ffmpeg_diagnostic, CommandRunner, NO_DIAGNOSTIC};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionJob {
    pub source_path: PathBuf,
    pub destination_path: PathBuf,
    pub original_sample_rate_hz: u32,
    pub target_sample_rate_hz: u32,
    pub original_bit_rate_bps: Option<u64>,
    pub has_real_video: bool,
    pub has_attached_picture: bool,
}

impl ConversionJob {
    pub fn from_probe(source: &Path, destination: &Path, probe: &MediaProbeResult) -> Self {
        Self {
            source_path: source.to_path_buf(),
            destination_path: destination.to_path_buf(),
            original_sample_rate_hz: probe
                .sample_rate_hz
                .filter(|&rate| rate > 0)
                .unwrap_or(DEFAULT_SAMPLE_RATE_HZ),
            target_sample_rate_hz: TARGET_SAMPLE_RATE_HZ,
            original_bit_rate_bps: probe.bit_rate_bps,
            has_real_video: probe.has_real_video,
            has_attached_picture: probe.has_attached_picture,
        }
    }

    fn destination_extension(&self) -> String {
        get_extension_lowercase(&self.destination_path)
    }

    /// Real video going into a container that can carry it.
    fn is_video_job(&self) -> bool {
        self.has_real_video && is_video_container(&self.destination_extension())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    HighQuality,
    HighQualitySubtitleFallback,
    Safe,
}

impl Attempt {
    pub const LADDER: [Attempt; 3] = [
        Attempt::HighQuality,
        Attempt::HighQualitySubtitleFallback,
        Attempt::Safe,
    ];

    pub fn tier(self) -> Tier {
        match self {
            Attempt::HighQuality | Attempt::HighQualitySubtitleFallback => Tier::HighQuality,
            Attempt::Safe => Tier::Safe,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionReport {
    /// Every attempt actually run, in order; the last one succeeded.
    pub attempts: Vec<Attempt>,
    pub duration: Duration,
}

impl ConversionReport {
    pub fn attempt_count(&self) -> usize {
        self.attempts.len()
    }

    pub fn succeeded_with(&self) -> Option<Attempt> {
        self.attempts.last().copied()
    }
}

/// Seam between the batch driver and the engine.
pub trait Converter: Send + Sync {
    fn convert(&self, job: &ConversionJob) -> Result<ConversionReport>;
}

/// Stream mapping and filter arguments shared by every attempt.
pub fn stream_mapping_args(job: &ConversionJob) -> Vec<String> {
    let ext = job.destination_extension();
    let chain = retune_chain(job.original_sample_rate_hz, job.target_sample_rate_hz).to_ffmpeg_filter();

    let tokens: Vec<&str> = if job.is_video_job() {
        if ext == MATROSKA_EXTENSION {
            vec![
                "-map", "0", "-map_metadata", "0", "-map_chapters", "0", "-copy_unknown",
                "-c", "copy", "-filter:a",
            ]
        } else {
            vec![
                "-map", "0:v?", "-map", "0:a?", "-map", "0:s?", "-map", "0:d?",
                "-map_metadata", "0", "-map_chapters", "0",
                "-c:v", "copy", "-c:s", "copy", "-c:d", "copy", "-filter:a",
            ]
        }
    } else {
        let mut t = vec!["-map", "0:a?"];
        if !job.has_real_video
            && job.has_attached_picture
            && COVER_ART_EXTENSIONS.contains(&ext.as_str())
        {
            t.extend(["-map", "0:v?", "-c:v", "copy"]);
        }
        t.push("-af");
        t
    };

    let mut args: Vec<String> = tokens.into_iter().map(String::from).collect();
    args.push(chain);
    args
}

/// ffmpeg's wording varies by muxer; any mention of subtitles alongside a
/// codec/support/header complaint counts.
pub fn blames_subtitles(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    lower.contains("subtitle")
        && (lower.contains("codec")
            || lower.contains("not supported")
            || lower.contains("could not write header"))
}

/// Full argument list (after the program name) for one attempt.
pub fn build_ffmpeg_args(job: &ConversionJob, attempt: Attempt) -> Vec<String> {
    let mut args = vec![
        "-y".to_string(),
        "-i".to_string(),
        safe_path_arg(&job.source_path).into_owned(),
    ];
    args.extend(stream_mapping_args(job));
    if attempt == Attempt::HighQualitySubtitleFallback {
        args.extend(["-c:s".to_string(), "mov_text".to_string()]);
    }
    let codec = codec_options(&job.destination_extension(), attempt.tier());
    args.extend(adjust_bitrate(&codec, job.original_bit_rate_bps));
    args.push(safe_path_arg(&job.destination_path).into_owned());
    args
}

enum AttemptOutcome {
    Succeeded,
    /// Raw stderr, or the spawn error when ffmpeg never started.
    Failed(String),
}

pub struct ConversionEngine {
    runner: Arc<dyn CommandRunner>,
    ffmpeg: PathBuf,
}

impl ConversionEngine {
    pub fn new(runner: Arc<dyn CommandRunner>, ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            ffmpeg: ffmpeg.into(),
        }
    }

    fn run_attempt(&self, job: &ConversionJob, attempt: Attempt) -> AttemptOutcome {
        let args = build_ffmpeg_args(job, attempt);
        match self.runner.run(&self.ffmpeg, &args) {
            Ok(output) if output.success() => AttemptOutcome::Succeeded,
            Ok(output) => AttemptOutcome::Failed(output.stderr),
            Err(e) => AttemptOutcome::Failed(format!("{:#}", e)),
        }
    }

    fn subtitle_fallback_applies(job: &ConversionJob, hq_stderr: &str) -> bool {
        job.is_video_job()
            && MP4_FAMILY_EXTENSIONS.contains(&job.destination_extension().as_str())
            && blames_subtitles(hq_stderr)
    }
}

impl Converter for ConversionEngine {
    fn convert(&self, job: &ConversionJob) -> Result<ConversionReport> {
        let start = Instant::now();
        info!(
            src = %job.source_path.display(),
            dst = %job.destination_path.display(),
            original_sr = job.original_sample_rate_hz,
            target_sr = job.target_sample_rate_hz,
            "Converting"
        );

        if let Some(parent) = job.destination_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| RetuneError::file_system(parent, e))?;
            }
        }

        let mut attempts = Vec::with_capacity(Attempt::LADDER.len());
        let mut hq_stderr: Option<String> = None;

        for attempt in Attempt::LADDER {
            if attempt == Attempt::HighQualitySubtitleFallback {
                let applies = hq_stderr
                    .as_deref()
                    .map(|e| Self::subtitle_fallback_applies(job, e))
                    .unwrap_or(false);
                if !applies {
                    continue;
                }
                warn!(dst = %job.destination_path.display(), "Subtitle copy unsupported, retrying with mov_text subtitles");
            }

            attempts.push(attempt);
            match self.run_attempt(job, attempt) {
                AttemptOutcome::Succeeded => {
                    info!(src = %job.source_path.display(), ?attempt, "Converted");
                    return Ok(ConversionReport {
                        attempts,
                        duration: start.elapsed(),
                    });
                }
                AttemptOutcome::Failed(stderr) => match attempt {
                    Attempt::HighQuality => {
                        warn!(
                            src = %job.source_path.display(),
                            error = %clean_ffmpeg_diagnostic(&stderr),
                            "HQ conversion failed, will retry"
                        );
                        hq_stderr = Some(stderr);
                    }
                    Attempt::HighQualitySubtitleFallback => {}
                    Attempt::Safe => {
                        let hq = hq_stderr
                            .as_deref()
                            .map(clean_ffmpeg_diagnostic)
                            .unwrap_or_else(|| NO_DIAGNOSTIC.to_string());
                        let safe = clean_ffmpeg_diagnostic(&stderr);
                        return Err(RetuneError::ConversionFailed {
                            path: job.source_path.clone(),
                            diagnostic: format!("HQ error:\n{}\nSafe error:\n{}", hq, safe),
                        });
                    }
                },
            }
        }

        // The ladder always ends with Safe, which returns above.
        Err(RetuneError::ConversionFailed {
            path: job.source_path.clone(),
            diagnostic: NO_DIAGNOSTIC.to_string(),
        })
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{fail, ok, ScriptedRunner};
    use super::*;
    use tempfile::TempDir;

    fn job(temp: &TempDir, src: &str, dst: &str, video: bool, cover: bool) -> ConversionJob {
        ConversionJob {
            source_path: temp.path().join(src),
            destination_path: temp.path().join(dst),
            original_sample_rate_hz: 44_100,
            target_sample_rate_hz: TARGET_SAMPLE_RATE_HZ,
            original_bit_rate_bps: None,
            has_real_video: video,
            has_attached_picture: cover,
        }
    }

    fn has_pair(args: &[String], a: &str, b: &str) -> bool {
        args.windows(2).any(|w| w[0] == a && w[1] == b)
    }

    #[test]
    fn test_hq_success_is_single_attempt() {
        let temp = TempDir::new().unwrap();
        let runner = Arc::new(ScriptedRunner::new(|_| ok()));
        let engine = ConversionEngine::new(runner.clone(), "ffmpeg");
        let j = job(&temp, "a.flac", "out/deep/a_432.flac", false, false);

        let report = engine.convert(&j).unwrap();
        assert_eq!(report.attempts, vec![Attempt::HighQuality]);
        assert!(temp.path().join("out/deep").is_dir());

        let args = &runner.calls()[0];
        assert_eq!(&args[..2], &["-y".to_string(), "-i".to_string()]);
        assert!(has_pair(args, "-compression_level", "8"));
        assert!(args.last().unwrap().ends_with("a_432.flac"));
    }

    #[test]
    fn test_hq_fails_safe_succeeds_two_attempts() {
        let temp = TempDir::new().unwrap();
        let runner = Arc::new(ScriptedRunner::new(|args| {
            if args.iter().any(|a| a == "-compression_level") {
                fail("Unknown encoder option compression_level")
            } else {
                ok()
            }
        }));
        let engine = ConversionEngine::new(runner.clone(), "ffmpeg");
        let report = engine
            .convert(&job(&temp, "a.mp3", "a_432.mp3", false, false))
            .unwrap();

        assert_eq!(report.attempt_count(), 2);
        assert_eq!(report.succeeded_with(), Some(Attempt::Safe));
        let calls = runner.calls();
        assert!(has_pair(&calls[1], "-c:a", "libmp3lame"));
        assert!(!calls[1].contains(&"-compression_level".to_string()));
    }

    #[test]
    fn test_mp4_subtitle_fallback_then_safe() {
        let temp = TempDir::new().unwrap();
        let runner = Arc::new(ScriptedRunner::new(|args| {
            if args.iter().any(|a| a == "256k") {
                ok()
            } else {
                fail("[mp4 @ 0x55] Could not find tag for codec subrip in stream #2, codec not currently supported in container\nCould not write header for output file")
            }
        }));
        let engine = ConversionEngine::new(runner.clone(), "ffmpeg");
        let report = engine
            .convert(&job(&temp, "movie.mp4", "movie_432.mp4", true, false))
            .unwrap();

        assert_eq!(
            report.attempts,
            vec![
                Attempt::HighQuality,
                Attempt::HighQualitySubtitleFallback,
                Attempt::Safe
            ]
        );
        let calls = runner.calls();
        assert!(has_pair(&calls[1], "-c:s", "mov_text"));
        assert!(!calls[2].contains(&"mov_text".to_string()));
    }

    #[test]
    fn test_subtitle_fallback_can_succeed() {
        let temp = TempDir::new().unwrap();
        let runner = Arc::new(ScriptedRunner::new(|args| {
            if args.iter().any(|a| a == "mov_text") {
                ok()
            } else {
                fail("Subtitle codec 94213 is not supported.")
            }
        }));
        let engine = ConversionEngine::new(runner, "ffmpeg");
        let report = engine
            .convert(&job(&temp, "clip.mov", "clip_432.mov", true, false))
            .unwrap();
        assert_eq!(report.succeeded_with(), Some(Attempt::HighQualitySubtitleFallback));
        assert_eq!(report.attempt_count(), 2);
    }

    #[test]
    fn test_no_subtitle_fallback_outside_mp4_family() {
        let temp = TempDir::new().unwrap();
        let runner = Arc::new(ScriptedRunner::new(|args| {
            if args.iter().any(|a| a == "-compression_level") {
                fail("Subtitle codec not supported")
            } else {
                ok()
            }
        }));
        let engine = ConversionEngine::new(runner, "ffmpeg");
        let report = engine
            .convert(&job(&temp, "movie.mkv", "movie_432.mkv", true, false))
            .unwrap();
        assert_eq!(report.attempts, vec![Attempt::HighQuality, Attempt::Safe]);
    }

    #[test]
    fn test_total_failure_carries_both_cleaned_diagnostics() {
        let temp = TempDir::new().unwrap();
        let runner = Arc::new(ScriptedRunner::new(|args| {
            let tier = if args.iter().any(|a| a == "-compression_level") { "hq" } else { "safe" };
            fail(&format!(
                "ffmpeg version 6.1 Copyright (c) 2000-2023\n  configuration: --enable-gpl\n{} broke\n",
                tier
            ))
        }));
        let engine = ConversionEngine::new(runner, "ffmpeg");
        let err = engine
            .convert(&job(&temp, "a.mp3", "a_432.mp3", false, false))
            .unwrap_err();

        match err {
            RetuneError::ConversionFailed { diagnostic, .. } => {
                assert_eq!(diagnostic, "HQ error:\nhq broke\nSafe error:\nsafe broke");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_mapping_video_containers() {
        let temp = TempDir::new().unwrap();
        let mkv = stream_mapping_args(&job(&temp, "a.mkv", "a_432.mkv", true, false));
        assert!(has_pair(&mkv, "-map", "0"));
        assert!(mkv.contains(&"-copy_unknown".to_string()));
        assert!(has_pair(&mkv, "-c", "copy"));
        assert_eq!(mkv[mkv.len() - 2], "-filter:a");

        let mp4 = stream_mapping_args(&job(&temp, "a.mp4", "a_432.mp4", true, false));
        for selector in ["0:v?", "0:a?", "0:s?", "0:d?"] {
            assert!(has_pair(&mp4, "-map", selector));
        }
        assert!(has_pair(&mp4, "-c:s", "copy"));
        assert!(!mp4.contains(&"-copy_unknown".to_string()));
    }

    #[test]
    fn test_mapping_audio_with_cover_art() {
        let temp = TempDir::new().unwrap();
        let mp3 = stream_mapping_args(&job(&temp, "a.mp3", "a_432.mp3", false, true));
        assert!(has_pair(&mp3, "-map", "0:a?"));
        assert!(has_pair(&mp3, "-map", "0:v?"));
        assert!(has_pair(&mp3, "-c:v", "copy"));
        assert_eq!(mp3[mp3.len() - 2], "-af");
        assert!(mp3.last().unwrap().starts_with("asetrate=44100*"));

        let wav = stream_mapping_args(&job(&temp, "a.wav", "a_432.wav", false, true));
        assert!(!has_pair(&wav, "-map", "0:v?"));
    }

    #[test]
    fn test_bitrate_adjusted_in_command() {
        let temp = TempDir::new().unwrap();
        let mut j = job(&temp, "a.mp3", "a_432.mp3", false, false);
        j.original_bit_rate_bps = Some(128_000);
        let args = build_ffmpeg_args(&j, Attempt::HighQuality);
        assert!(has_pair(&args, "-b:a", "128k"));
    }

    #[test]
    fn test_from_probe_defaults_sample_rate() {
        let probe = MediaProbeResult {
            has_audio: true,
            bit_rate_bps: Some(96_000),
            ..Default::default()
        };
        let j = ConversionJob::from_probe(Path::new("a.ogg"), Path::new("a_432.ogg"), &probe);
        assert_eq!(j.original_sample_rate_hz, DEFAULT_SAMPLE_RATE_HZ);
        assert_eq!(j.target_sample_rate_hz, 48_000);
        assert_eq!(j.original_bit_rate_bps, Some(96_000));

        let zero = MediaProbeResult {
            has_audio: true,
            sample_rate_hz: Some(0),
            ..Default::default()
        };
        let j = ConversionJob::from_probe(Path::new("a.ogg"), Path::new("a_432.ogg"), &zero);
        assert_eq!(j.original_sample_rate_hz, DEFAULT_SAMPLE_RATE_HZ);
    }

    #[test]
    fn test_blames_subtitles() {
        assert!(blames_subtitles("Subtitle codec 94213 is not supported."));
        assert!(blames_subtitles("subtitle stream: Could not write header"));
        assert!(!blames_subtitles("Unknown encoder 'libfdk_aac'"));
        assert!(!blames_subtitles("subtitle track present"));
    }
}
