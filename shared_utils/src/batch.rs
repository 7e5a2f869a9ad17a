//! Batch Processing Module
//!
//! Directory walking and per-run bookkeeping shared by batch drivers.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// All regular files under `dir` (only the top level unless `recursive`),
/// in sorted order so runs are reproducible.
pub fn walk_files(dir: &Path, recursive: bool) -> Vec<PathBuf> {
    let walker = if recursive {
        WalkDir::new(dir).follow_links(true)
    } else {
        WalkDir::new(dir).max_depth(1)
    };

    let mut files: Vec<PathBuf> = walker
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path().to_path_buf())
        .collect();
    files.sort();
    files
}

#[derive(Debug, Clone)]
pub struct BatchResult {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub errors: Vec<(PathBuf, String)>,
    pub input_bytes: u64,
    pub output_bytes: u64,
}

impl BatchResult {
    pub fn new() -> Self {
        Self {
            total: 0,
            succeeded: 0,
            failed: 0,
            skipped: 0,
            errors: Vec::new(),
            input_bytes: 0,
            output_bytes: 0,
        }
    }

    pub fn success(&mut self, input_bytes: u64, output_bytes: u64) {
        self.total += 1;
        self.succeeded += 1;
        self.input_bytes += input_bytes;
        self.output_bytes += output_bytes;
    }

    pub fn fail(&mut self, path: PathBuf, error: String) {
        self.total += 1;
        self.failed += 1;
        self.errors.push((path, error));
    }

    pub fn skip(&mut self) {
        self.total += 1;
        self.skipped += 1;
    }

    pub fn has_errors(&self) -> bool {
        self.failed > 0
    }

    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            (self.succeeded as f64 / self.total as f64) * 100.0
        }
    }
}

impl Default for BatchResult {
    fn default() -> Self {
        Self::new()
    }
}
