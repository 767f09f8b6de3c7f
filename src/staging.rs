//! # Staging Module
//!
//! Punto unico per il pattern "scrivi altrove, confronta, poi sostituisci".
//!
//! ## Responsabilità:
//! - Nomi dei sidecar derivati dal path del file (`<file>.bak`, `<file>.ungz`, ...)
//! - Rifiuto di procedere se un sidecar o un output derivato esiste già
//! - Confronto candidato/originale e rename atomico oppure scarto
//! - Rimozione garantita dei sidecar intermedi (`SidecarGuard`)
//!
//! ## Esempio:
//! ```rust,ignore
//! let candidate = staging::sidecar(&path, ".ungz.gz");
//! staging::ensure_absent(&candidate)?;
//! // ... scrive il candidato ...
//! staging::replace_if_smaller(&candidate, &path)?;
//! ```

use crate::error::OptimizeError;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Suffix of the backup left by the PNG optimizer
pub const BACKUP_SUFFIX: &str = ".bak";
/// Suffix of the decompressed gzip payload
pub const UNGZ_SUFFIX: &str = ".ungz";
/// Suffix of the recompressed gzip candidate
pub const UNGZ_GZ_SUFFIX: &str = ".ungz.gz";

/// Result of settling a staged candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settled {
    /// The candidate was renamed over the target
    Replaced,
    /// The candidate was deleted, the target is untouched
    Discarded,
}

/// Append a suffix to the full file name of `path`
pub fn sidecar(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Fail with `ConflictingOutput` when something already lives at `path`
pub fn ensure_absent(path: &Path) -> Result<(), OptimizeError> {
    if fs::symlink_metadata(path).is_ok() {
        return Err(OptimizeError::conflict(path));
    }
    Ok(())
}

/// Rename `candidate` over `target` when `replace(candidate_len, target_len)`
/// holds, otherwise delete the candidate.
pub fn settle<F>(candidate: &Path, target: &Path, replace: F) -> io::Result<Settled>
where
    F: FnOnce(u64, u64) -> bool,
{
    let candidate_len = fs::metadata(candidate)?.len();
    let target_len = fs::metadata(target)?.len();

    if replace(candidate_len, target_len) {
        debug!(
            "Replacing {} ({} -> {} bytes)",
            target.display(),
            target_len,
            candidate_len
        );
        copy_permissions(target, candidate)?;
        fs::rename(candidate, target)?;
        Ok(Settled::Replaced)
    } else {
        debug!(
            "Keeping {} ({} bytes, candidate {} bytes)",
            target.display(),
            target_len,
            candidate_len
        );
        fs::remove_file(candidate)?;
        Ok(Settled::Discarded)
    }
}

/// Give `staged` the permissions of the file it is about to replace
pub fn copy_permissions(from: &Path, staged: &Path) -> io::Result<()> {
    fs::set_permissions(staged, fs::metadata(from)?.permissions())
}

/// Replace `target` with `candidate` only when the candidate is strictly smaller
pub fn replace_if_smaller(candidate: &Path, target: &Path) -> io::Result<Settled> {
    settle(candidate, target, |candidate_len, target_len| candidate_len < target_len)
}

/// Removes a sidecar file when dropped, whatever path the operation took
pub struct SidecarGuard {
    path: PathBuf,
}

impl SidecarGuard {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SidecarGuard {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove {}: {}", self.path.display(), e),
        }
    }
}
