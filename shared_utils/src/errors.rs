use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RetuneError {
    /// Neither probe strategy produced a usable classification.
    #[error("Probe failed for {path}: {reason}")]
    ProbeFailure { path: PathBuf, reason: String },

    /// Both quality tiers were exhausted. `diagnostic` is already cleaned.
    #[error("Conversion failed for {path}:\n{diagnostic}")]
    ConversionFailed { path: PathBuf, diagnostic: String },

    #[error("Filesystem error at {path}: {source}")]
    FileSystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Too many backups already exist for {path} (limit {limit})")]
    BackupExhausted { path: PathBuf, limit: usize },

    #[error("{tool} not found. Searched:\n{searched}")]
    ToolNotFound { tool: String, searched: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RetuneError {
    pub fn file_system(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RetuneError::FileSystem {
            path: path.into(),
            source,
        }
    }

    /// Only a missing transcoder/prober stops the whole run; everything else
    /// is scoped to a single file.
    pub fn is_fatal_to_run(&self) -> bool {
        matches!(self, RetuneError::ToolNotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, RetuneError>;
