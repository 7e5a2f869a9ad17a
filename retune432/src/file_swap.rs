//! Replace-in-place swap with a durable backup.
//!
//! `original -> original.bak[N]`, then `candidate -> original`, each a single
//! rename. If the second rename fails the backup is renamed back so the
//! original path is never left empty. Backups are never deleted here.

use shared_utils::errors::{Result, RetuneError};
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Backup names tried per file: `.bak`, then `.bak1` through `.bak999`.
pub const BACKUP_LIMIT: usize = 1000;

fn with_appended_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

/// First `<name>.bak`, `<name>.bak1`, ... that does not exist yet.
pub fn unique_backup_path(original: &Path) -> Result<PathBuf> {
    let first = with_appended_suffix(original, ".bak");
    if !first.exists() {
        return Ok(first);
    }
    (1..BACKUP_LIMIT)
        .map(|i| with_appended_suffix(original, &format!(".bak{}", i)))
        .find(|candidate| !candidate.exists())
        .ok_or_else(|| RetuneError::BackupExhausted {
            path: original.to_path_buf(),
            limit: BACKUP_LIMIT,
        })
}

/// Swaps `candidate` into `original`'s place and returns the backup path.
pub fn replace_with_backup(original: &Path, candidate: &Path) -> Result<PathBuf> {
    replace_with_backup_using(original, candidate, |from, to| std::fs::rename(from, to))
}

/// [`replace_with_backup`] with the rename operation supplied by the caller.
pub fn replace_with_backup_using<F>(original: &Path, candidate: &Path, rename: F) -> Result<PathBuf>
where
    F: Fn(&Path, &Path) -> io::Result<()>,
{
    let backup = unique_backup_path(original)?;

    rename(original, &backup).map_err(|e| RetuneError::file_system(original, e))?;

    if let Err(e) = rename(candidate, original) {
        error!(
            original = %original.display(),
            candidate = %candidate.display(),
            error = %e,
            "Swap failed, restoring original from backup"
        );
        if !original.exists() && backup.exists() {
            if let Err(rollback_err) = rename(&backup, original) {
                warn!(
                    backup = %backup.display(),
                    error = %rollback_err,
                    "Rollback failed, original content remains in backup"
                );
            }
        }
        return Err(RetuneError::file_system(original, e));
    }

    info!(original = %original.display(), backup = %backup.display(), "Replaced original, backup kept");
    Ok(backup)
}
