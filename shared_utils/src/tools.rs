//! FFmpeg / FFprobe discovery
//!
//! Lookup order, first hit wins (both binaries must come from the same step):
//! 1. explicit override (the ffmpeg binary itself, or a directory holding both)
//! 2. `PATH`
//! 3. `<root>/vendors/ffmpeg/bin/` for each search root
//! 4. directly inside a search root
//! 5. `<root>/ffmpeg*/bin/` then `<root>/ffmpeg*/`

use crate::errors::{Result, RetuneError};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

fn exe_name(base: &str) -> String {
    format!("{}{}", base, std::env::consts::EXE_SUFFIX)
}

fn pair_in(dir: &Path) -> Option<ToolPaths> {
    let ffmpeg = dir.join(exe_name("ffmpeg"));
    let ffprobe = dir.join(exe_name("ffprobe"));
    if ffmpeg.is_file() && ffprobe.is_file() {
        Some(ToolPaths {
            ffmpeg: ffmpeg.canonicalize().unwrap_or(ffmpeg),
            ffprobe: ffprobe.canonicalize().unwrap_or(ffprobe),
        })
    } else {
        None
    }
}

fn from_override(path: &Path) -> Option<ToolPaths> {
    if path.is_dir() {
        return pair_in(path);
    }
    if !path.is_file() {
        return None;
    }
    // ffprobe is expected next to the given ffmpeg, with the same extension.
    let mut ffprobe = path.with_file_name("ffprobe");
    if let Some(ext) = path.extension() {
        ffprobe.set_extension(ext);
    }
    if ffprobe.is_file() {
        Some(ToolPaths {
            ffmpeg: path.to_path_buf(),
            ffprobe,
        })
    } else {
        None
    }
}

fn from_system_path() -> Option<ToolPaths> {
    let ffmpeg = which::which("ffmpeg").ok()?;
    let ffprobe = which::which("ffprobe").ok()?;
    Some(ToolPaths { ffmpeg, ffprobe })
}

fn from_subdirectories(root: &Path) -> Option<ToolPaths> {
    let entries = match std::fs::read_dir(root) {
        Ok(e) => e,
        Err(e) => {
            debug!(root = %root.display(), error = %e, "Skipping subdirectory scan");
            return None;
        }
    };

    let mut candidates: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .filter(|p| {
            p.file_name()
                .map(|n| n.to_string_lossy().to_lowercase().starts_with("ffmpeg"))
                .unwrap_or(false)
        })
        .collect();
    candidates.sort();

    candidates
        .iter()
        .find_map(|dir| pair_in(&dir.join("bin")).or_else(|| pair_in(dir)))
}

/// Default search roots: the running executable's directory, then the cwd.
pub fn default_search_roots() -> Vec<PathBuf> {
    let mut roots = Vec::new();
    if let Some(dir) = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
    {
        roots.push(dir);
    }
    if let Ok(cwd) = std::env::current_dir() {
        if !roots.contains(&cwd) {
            roots.push(cwd);
        }
    }
    roots
}

pub fn resolve_tools(override_path: Option<&Path>, search_roots: &[PathBuf]) -> Result<ToolPaths> {
    if let Some(p) = override_path {
        match from_override(p) {
            Some(found) => {
                info!(ffmpeg = %found.ffmpeg.display(), ffprobe = %found.ffprobe.display(), "Resolved tools from override");
                return Ok(found);
            }
            None => warn!(path = %p.display(), "Could not resolve ffmpeg/ffprobe from override path"),
        }
    }

    if let Some(found) = from_system_path() {
        info!(ffmpeg = %found.ffmpeg.display(), ffprobe = %found.ffprobe.display(), "Resolved tools from PATH");
        return Ok(found);
    }

    resolve_bundled(search_roots).ok_or_else(|| RetuneError::ToolNotFound {
        tool: "ffmpeg/ffprobe".to_string(),
        searched: searched_locations(override_path, search_roots),
    })
}

/// Steps 3-5 only; separated so bundled layouts can be tested without PATH interference.
pub fn resolve_bundled(search_roots: &[PathBuf]) -> Option<ToolPaths> {
    let found = search_roots
        .iter()
        .find_map(|root| pair_in(&root.join("vendors").join("ffmpeg").join("bin")))
        .or_else(|| search_roots.iter().find_map(|root| pair_in(root)))
        .or_else(|| search_roots.iter().find_map(|root| from_subdirectories(root)));

    if let Some(ref f) = found {
        info!(ffmpeg = %f.ffmpeg.display(), ffprobe = %f.ffprobe.display(), "Resolved bundled tools");
    }
    found
}

fn searched_locations(override_path: Option<&Path>, search_roots: &[PathBuf]) -> String {
    let mut lines = vec![format!(
        "  - --ffmpeg argument: {}",
        override_path
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "not provided".to_string())
    )];
    lines.push(format!("  - system PATH for '{}'", exe_name("ffmpeg")));
    for root in search_roots {
        lines.push(format!("  - {}", root.join("vendors/ffmpeg/bin").display()));
        lines.push(format!("  - {}", root.display()));
        lines.push(format!("  - {}/ffmpeg*/[bin/]", root.display()));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch_pair(dir: &Path) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join(exe_name("ffmpeg")), b"").unwrap();
        fs::write(dir.join(exe_name("ffprobe")), b"").unwrap();
    }

    #[test]
    fn test_override_directory() {
        let temp = TempDir::new().unwrap();
        touch_pair(temp.path());
        let found = from_override(temp.path()).unwrap();
        assert!(found.ffmpeg.ends_with(exe_name("ffmpeg")));
        assert!(found.ffprobe.ends_with(exe_name("ffprobe")));
    }

    #[test]
    fn test_override_file_finds_sibling_ffprobe() {
        let temp = TempDir::new().unwrap();
        touch_pair(temp.path());
        let ffmpeg = temp.path().join(exe_name("ffmpeg"));
        let found = from_override(&ffmpeg).unwrap();
        assert_eq!(found.ffmpeg, ffmpeg);
        assert_eq!(found.ffprobe, temp.path().join(exe_name("ffprobe")));
    }

    #[test]
    fn test_override_missing_ffprobe() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(exe_name("ffmpeg")), b"").unwrap();
        assert!(from_override(temp.path()).is_none());
    }

    #[test]
    fn test_bundled_prefers_vendors_dir() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().to_path_buf();
        touch_pair(&root.join("vendors/ffmpeg/bin"));
        touch_pair(&root);
        let found = resolve_bundled(&[root]).unwrap();
        assert!(found.ffmpeg.to_string_lossy().contains("vendors"));
    }

    #[test]
    fn test_bundled_subdirectory_bin_then_root() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().to_path_buf();
        touch_pair(&root.join("ffmpeg-7.0-essentials/bin"));
        let found = resolve_bundled(&[root.clone()]).unwrap();
        assert!(found.ffmpeg.to_string_lossy().contains("ffmpeg-7.0-essentials"));

        let temp2 = TempDir::new().unwrap();
        let root2 = temp2.path().to_path_buf();
        touch_pair(&root2.join("FFmpeg-portable"));
        assert!(resolve_bundled(&[root2]).is_some());
    }

    #[test]
    fn test_bundled_nothing_found() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("not-ffmpeg/bin")).unwrap();
        assert!(resolve_bundled(&[temp.path().to_path_buf()]).is_none());
    }

    #[test]
    fn test_searched_locations_lists_override() {
        let text = searched_locations(Some(Path::new("/opt/ff")), &[PathBuf::from("/app")]);
        assert!(text.contains("/opt/ff"));
        assert!(text.contains("vendors"));
    }
}
