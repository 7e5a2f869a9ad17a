//! Run configuration, as produced by the CLI.

use crate::discovery::OUTPUT_DIR_SUFFIX;
use serde::Serialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Settings {
    pub recursive: bool,
    /// Leave a file alone when its destination already exists and is non-empty.
    pub skip_existing: bool,
    pub same_folder: bool,
    pub replace_original: bool,
    pub source_path: PathBuf,
    /// Root of the separate output tree; derived from the source when `None`.
    pub output_base_path: Option<PathBuf>,
    pub ffmpeg_override_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputMode {
    /// Temp file beside the source, then swapped in with a backup.
    ReplaceInPlace,
    /// `<stem>_432.<ext>` beside the source.
    SameFolder,
    /// Source's relative layout mirrored under `base`.
    SeparateTree { base: PathBuf },
}

impl Settings {
    pub fn new(source_path: impl Into<PathBuf>) -> Self {
        Self {
            recursive: false,
            skip_existing: false,
            same_folder: false,
            replace_original: false,
            source_path: source_path.into(),
            output_base_path: None,
            ffmpeg_override_path: None,
        }
    }

    /// Replace-in-place wins over same-folder, which wins over the separate tree.
    pub fn output_mode(&self) -> OutputMode {
        if self.replace_original {
            OutputMode::ReplaceInPlace
        } else if self.same_folder {
            OutputMode::SameFolder
        } else {
            OutputMode::SeparateTree {
                base: self
                    .output_base_path
                    .clone()
                    .unwrap_or_else(|| default_output_base(&self.source_path)),
            }
        }
    }

    /// Directory that relative output paths are computed against.
    pub fn source_root(&self) -> PathBuf {
        if self.source_path.is_dir() {
            self.source_path.clone()
        } else {
            self.source_path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default()
        }
    }
}

/// `<dir>_432Hz` beside a source directory; for a single file, `<parent>_432Hz`
/// beside the file's parent directory.
pub fn default_output_base(source: &Path) -> PathBuf {
    let dir = if source.is_dir() {
        source
    } else {
        source.parent().unwrap_or(source)
    };

    let mut name: OsString = dir
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("output"));
    name.push(OUTPUT_DIR_SUFFIX);

    match dir.parent() {
        Some(parent) => parent.join(name),
        None => dir.join(name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_output_mode_precedence() {
        let mut s = Settings::new("/music");
        s.output_base_path = Some(PathBuf::from("/out"));
        assert_eq!(
            s.output_mode(),
            OutputMode::SeparateTree {
                base: PathBuf::from("/out")
            }
        );

        s.same_folder = true;
        assert_eq!(s.output_mode(), OutputMode::SameFolder);

        s.replace_original = true;
        assert_eq!(s.output_mode(), OutputMode::ReplaceInPlace);
    }

    #[test]
    fn test_default_output_base_for_directory_and_file() {
        let temp = TempDir::new().unwrap();
        let album = temp.path().join("Album");
        fs::create_dir(&album).unwrap();
        let track = album.join("01.flac");
        fs::write(&track, b"x").unwrap();

        assert_eq!(default_output_base(&album), temp.path().join("Album_432Hz"));
        assert_eq!(default_output_base(&track), temp.path().join("Album_432Hz"));
    }

    #[test]
    fn test_source_root() {
        let temp = TempDir::new().unwrap();
        let track = temp.path().join("01.flac");
        fs::write(&track, b"x").unwrap();

        assert_eq!(Settings::new(temp.path()).source_root(), temp.path());
        assert_eq!(Settings::new(&track).source_root(), temp.path());
    }
}
