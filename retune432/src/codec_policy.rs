//! Codec policy: which audio encoder/bitrate to use for an output container,
//! in two tiers, plus the output-extension decision.
//!
//! Extensions are lower-case and dot-less throughout ("mp3", not ".MP3").
//! For video containers only the audio codec is listed; video, subtitle and
//! data streams are always stream-copied.

use std::fmt;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    HighQuality,
    Safe,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::HighQuality => write!(f, "HQ"),
            Tier::Safe => write!(f, "Safe"),
        }
    }
}

type CodecTable = &'static [(&'static str, &'static [&'static str])];

const HIGH_QUALITY: CodecTable = &[
    ("mp3", &["-c:a", "libmp3lame", "-b:a", "320k", "-compression_level", "0"]),
    ("m4a", &["-c:a", "aac", "-b:a", "512k", "-movflags", "+faststart"]),
    ("aac", &["-c:a", "aac", "-b:a", "512k"]),
    ("flac", &["-c:a", "flac", "-compression_level", "8"]),
    ("wav", &["-c:a", "pcm_s24le"]),
    ("wma", &["-c:a", "wmapro", "-b:a", "320k"]),
    ("ogg", &["-c:a", "libvorbis", "-q:a", "6"]),
    ("opus", &["-c:a", "libopus", "-b:a", "192k"]),
    // video containers
    ("mkv", &["-c:a", "flac", "-compression_level", "8"]),
    ("mp4", &["-c:a", "aac", "-b:a", "320k", "-movflags", "+faststart"]),
    ("m4v", &["-c:a", "aac", "-b:a", "320k", "-movflags", "+faststart"]),
    ("mov", &["-c:a", "aac", "-b:a", "320k", "-movflags", "+faststart"]),
    ("webm", &["-c:a", "libopus", "-b:a", "192k"]),
    ("avi", &["-c:a", "aac", "-b:a", "320k"]),
    ("ts", &["-c:a", "aac", "-b:a", "320k"]),
    ("m2ts", &["-c:a", "aac", "-b:a", "320k"]),
    ("mts", &["-c:a", "aac", "-b:a", "320k"]),
    ("mpg", &["-c:a", "aac", "-b:a", "320k"]),
    ("mpeg", &["-c:a", "aac", "-b:a", "320k"]),
    ("wmv", &["-c:a", "aac", "-b:a", "320k"]),
];

const SAFE: CodecTable = &[
    ("mp3", &["-c:a", "libmp3lame", "-b:a", "320k"]),
    ("m4a", &["-c:a", "aac", "-b:a", "256k", "-movflags", "+faststart"]),
    ("aac", &["-c:a", "aac", "-b:a", "256k"]),
    ("flac", &["-c:a", "flac"]),
    ("wav", &["-c:a", "pcm_s16le"]),
    ("wma", &["-c:a", "wmav2", "-b:a", "192k"]),
    ("ogg", &["-c:a", "libvorbis", "-q:a", "4"]),
    ("opus", &["-c:a", "libopus", "-b:a", "128k"]),
    // video containers
    ("mkv", &["-c:a", "flac"]),
    ("mp4", &["-c:a", "aac", "-b:a", "256k", "-movflags", "+faststart"]),
    ("m4v", &["-c:a", "aac", "-b:a", "256k", "-movflags", "+faststart"]),
    ("mov", &["-c:a", "aac", "-b:a", "256k", "-movflags", "+faststart"]),
    ("webm", &["-c:a", "libopus", "-b:a", "128k"]),
    ("avi", &["-c:a", "aac", "-b:a", "256k"]),
    ("ts", &["-c:a", "aac", "-b:a", "256k"]),
    ("m2ts", &["-c:a", "aac", "-b:a", "256k"]),
    ("mts", &["-c:a", "aac", "-b:a", "256k"]),
    ("mpg", &["-c:a", "aac", "-b:a", "256k"]),
    ("mpeg", &["-c:a", "aac", "-b:a", "256k"]),
    ("wmv", &["-c:a", "aac", "-b:a", "256k"]),
];

const DEFAULT_OPTIONS: &[&str] = &["-c:a", "aac", "-b:a", "320k"];

/// Audio containers an input may keep as its output type.
pub const OUTPUT_EXTENSIONS: &[&str] = &["mp3", "m4a", "aac", "flac", "wav", "wma", "ogg", "opus"];

/// Containers where video streams are valid and can be stream-copied.
pub const VIDEO_CONTAINER_EXTENSIONS: &[&str] = &[
    "mkv", "mp4", "m4v", "mov", "webm", "avi", "ts", "m2ts", "mts", "mpg", "mpeg", "mpe", "m2v",
    "vob", "wmv", "asf", "flv", "f4v", "3gp", "3g2", "ogv",
];

/// Audio outputs that can carry embedded cover art.
pub const COVER_ART_EXTENSIONS: &[&str] = &["mp3", "m4a", "flac"];

/// MP4-family outputs that cannot stream-copy most subtitle codecs.
pub const MP4_FAMILY_EXTENSIONS: &[&str] = &["mp4", "m4v", "mov"];

pub const MATROSKA_EXTENSION: &str = "mkv";

pub fn normalize_extension(ext: &str) -> String {
    ext.trim_start_matches('.').to_lowercase()
}

pub fn is_video_container(ext: &str) -> bool {
    VIDEO_CONTAINER_EXTENSIONS.contains(&normalize_extension(ext).as_str())
}

fn table(tier: Tier) -> CodecTable {
    match tier {
        Tier::HighQuality => HIGH_QUALITY,
        Tier::Safe => SAFE,
    }
}

fn lookup(table: CodecTable, ext: &str) -> Option<&'static [&'static str]> {
    table.iter().find(|(e, _)| *e == ext).map(|(_, opts)| *opts)
}

fn to_owned_tokens(tokens: &[&str]) -> Vec<String> {
    tokens.iter().map(|t| t.to_string()).collect()
}

/// Codec tokens for an output extension and tier.
///
/// Unmapped extensions fall back to AAC 320k; `flac`/`wav` fall back to
/// their safe-tier lossless settings.
pub fn codec_options(ext: &str, tier: Tier) -> Vec<String> {
    let ext = normalize_extension(ext);
    if let Some(opts) = lookup(table(tier), &ext) {
        return to_owned_tokens(opts);
    }
    if ext == "flac" || ext == "wav" {
        if let Some(opts) = lookup(SAFE, &ext) {
            return to_owned_tokens(opts);
        }
    }
    to_owned_tokens(DEFAULT_OPTIONS)
}

/// "320k" -> 320000, "128000" -> 128000.
pub fn parse_bitrate_token(token: &str) -> Option<u64> {
    let lower = token.to_lowercase();
    if let Some(kilo) = lower.strip_suffix('k') {
        return kilo.parse::<u64>().ok().map(|k| k * 1000);
    }
    lower.parse::<u64>().ok()
}

/// Lowers the `-b:a` target to the source's own audio bit rate when the
/// source is below it. Never raises a target.
pub fn adjust_bitrate(options: &[String], original_bps: Option<u64>) -> Vec<String> {
    let mut adjusted = options.to_vec();
    let Some(orig_bps) = original_bps else {
        return adjusted;
    };
    // Sub-1kbps reports would round to "0k", which ffmpeg rejects.
    if orig_bps < 1000 {
        return adjusted;
    }

    let Some(idx) = adjusted.iter().position(|t| t == "-b:a") else {
        return adjusted;
    };
    let Some(target_token) = adjusted.get(idx + 1).cloned() else {
        return adjusted;
    };

    if let Some(target_bps) = parse_bitrate_token(&target_token) {
        if orig_bps < target_bps {
            let lowered = format!("{}k", orig_bps / 1000);
            info!(from = %target_token, to = %lowered, "Lowering target bitrate to source bitrate");
            adjusted[idx + 1] = lowered;
        }
    }
    adjusted
}

/// Output container for a source.
///
/// Real video keeps its container so the video stream can be copied; `wma`
/// becomes `mp3`; supported audio types are kept; anything else is `mp3`.
pub fn choose_output_extension(input_ext: &str, has_real_video: bool) -> String {
    let ext = normalize_extension(input_ext);
    if has_real_video {
        return if ext.is_empty() { "mp4".to_string() } else { ext };
    }
    if ext == "wma" {
        return "mp3".to_string();
    }
    if OUTPUT_EXTENSIONS.contains(&ext.as_str()) {
        return ext;
    }
    "mp3".to_string()
}
