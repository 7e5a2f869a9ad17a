//! Small path helpers shared by the tools.

use anyhow::{Context, Result};
use std::borrow::Cow;
use std::path::{Path, PathBuf};

/// Lower-cased extension without the dot; empty when there is none.
///
/// ```
/// use std::path::Path;
/// use shared_utils::common_utils::get_extension_lowercase;
///
/// assert_eq!(get_extension_lowercase(Path::new("Track.FLAC")), "flac");
/// assert_eq!(get_extension_lowercase(Path::new("noext")), "");
/// ```
pub fn get_extension_lowercase(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default()
}

pub fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    let ext = get_extension_lowercase(path);
    extensions.contains(&ext.as_str())
}

pub fn ensure_dir_exists(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))
}

pub fn ensure_parent_dir_exists(file_path: &Path) -> Result<()> {
    if let Some(parent) = file_path.parent() {
        if !parent.as_os_str().is_empty() {
            ensure_dir_exists(parent)?;
        }
    }
    Ok(())
}

/// `path` relative to `base`, or `path` unchanged when it is not under `base`.
pub fn compute_relative_path(path: &Path, base: &Path) -> PathBuf {
    path.strip_prefix(base)
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|_| path.to_path_buf())
}

/// FFmpeg has no `--` terminator, so a relative path starting with `-`
/// would be parsed as an option. Prefix it with `./`.
pub fn safe_path_arg(path: &Path) -> Cow<'_, str> {
    let s = path.to_string_lossy();
    if s.starts_with('-') {
        Cow::Owned(format!("./{}", s))
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_has_extension_case_insensitive() {
        assert!(has_extension(Path::new("a.MP3"), &["mp3", "flac"]));
        assert!(!has_extension(Path::new("a.txt"), &["mp3", "flac"]));
        assert!(!has_extension(Path::new("README"), &["mp3"]));
    }

    #[test]
    fn test_compute_relative_path() {
        let base = Path::new("/music");
        assert_eq!(
            compute_relative_path(Path::new("/music/album/01.flac"), base),
            PathBuf::from("album/01.flac")
        );
        assert_eq!(
            compute_relative_path(Path::new("/other/01.flac"), base),
            PathBuf::from("/other/01.flac")
        );
    }

    #[test]
    fn test_ensure_parent_dir_exists_creates_tree() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("a/b/c/out.mp3");
        ensure_parent_dir_exists(&file).unwrap();
        assert!(temp.path().join("a/b/c").is_dir());
        ensure_parent_dir_exists(Path::new("bare.mp3")).unwrap();
    }

    #[test]
    fn test_safe_path_arg() {
        assert_eq!(safe_path_arg(Path::new("song.mp3")), "song.mp3");
        assert_eq!(safe_path_arg(Path::new("/abs/song.mp3")), "/abs/song.mp3");
        assert_eq!(safe_path_arg(Path::new("-live.mp3")), "./-live.mp3");
    }
}
