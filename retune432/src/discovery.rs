//! Candidate discovery: walk a folder and keep only files with audio.

use crate::probe::MediaProber;
use shared_utils::batch::walk_files;
use shared_utils::common_utils::{compute_relative_path, get_extension_lowercase};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

/// Suffix of generated output directories.
pub const OUTPUT_DIR_SUFFIX: &str = "_432Hz";

/// Suffix appended to output file stems.
pub const OUTPUT_STEM_SUFFIX: &str = "_432";

/// Marker in the name of an in-flight replace-in-place temp file.
pub const TEMP_MARKER: &str = ".__tmp432__";

const PARTIAL_DOWNLOAD_PREFIX: &str = "~BitTorrentPartFile_";

const CONVERTED_STEM_SUFFIXES: &[&str] = &["_432", "_432hz", "_432_hz"];

/// Skipped without probing.
pub const IGNORE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "webp", "tif", "tiff", "txt", "md", "pdf", "doc", "docx",
    "ppt", "pptx", "xls", "xlsx", "csv", "json", "xml", "html", "htm", "css", "js", "py", "ini",
    "log", "zip", "rar", "7z", "tar", "gz", "bz2", "xz", "iso", "exe", "dll", "bak",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExclusionReason {
    InsideOutputDir,
    PartialDownload,
    InFlightTemp,
    AlreadyConverted,
    IgnoredExtension,
}

/// Name-based exclusions, checked before any probing. `relative` is the
/// file's path relative to the folder being scanned.
pub fn exclusion_reason(relative: &Path) -> Option<ExclusionReason> {
    let inside_output = relative.components().any(|c| match c {
        Component::Normal(part) => part.to_string_lossy().ends_with(OUTPUT_DIR_SUFFIX),
        _ => false,
    });
    if inside_output {
        return Some(ExclusionReason::InsideOutputDir);
    }

    let name = relative
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if name.starts_with(PARTIAL_DOWNLOAD_PREFIX) {
        return Some(ExclusionReason::PartialDownload);
    }
    if name.contains(TEMP_MARKER) {
        return Some(ExclusionReason::InFlightTemp);
    }

    let stem = relative
        .file_stem()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    if CONVERTED_STEM_SUFFIXES.iter().any(|s| stem.ends_with(s)) {
        return Some(ExclusionReason::AlreadyConverted);
    }

    if IGNORE_EXTENSIONS.contains(&get_extension_lowercase(relative).as_str()) {
        return Some(ExclusionReason::IgnoredExtension);
    }
    None
}

/// Files under `folder` that contain at least one audio stream, in sorted order.
pub fn find_audio_files(folder: &Path, recursive: bool, prober: &MediaProber) -> Vec<PathBuf> {
    let mut found = Vec::new();
    for path in walk_files(folder, recursive) {
        let relative = compute_relative_path(&path, folder);
        if let Some(reason) = exclusion_reason(&relative) {
            debug!(path = %path.display(), ?reason, "Excluded from discovery");
            continue;
        }
        if prober.probe(&path).has_audio {
            found.push(path);
        } else {
            debug!(path = %path.display(), "No audio stream, skipping");
        }
    }
    info!(folder = %folder.display(), count = found.len(), recursive, "Discovery finished");
    found
}
