//! # Gzip Container Rewriter
//!
//! Macchina a stati per i file in modalità gzip/zip.
//!
//! ## Stati:
//! - `RawOrDeflatable`: non è uno stream gzip (o è richiesto zip): si comprime
//!   in un nuovo file `<file>.gz` / `<file>.zip` accanto all'originale
//! - `SimpleGzip`: gzip senza campi opzionali, ricostruibile senza perdite
//! - `ComplexGzip`: gzip con extra field, nome o commento; rifiutato in strict mode
//!
//! ## Riscrittura di uno stream gzip:
//! 1. `<file>.ungz` e `<file>.ungz.gz` non devono esistere
//! 2. Decompressione in `<file>.ungz`
//! 3. Ricompressione in `<file>.ungz.gz`
//! 4. Rename sull'originale solo se strettamente più piccolo
//! 5. `<file>.ungz` viene sempre rimosso, anche in caso di errore

use crate::config::{ArchiveMode, Config};
use crate::deflate::{self, GzipKind};
use crate::error::OptimizeError;
use crate::staging::{self, Settled, SidecarGuard};
use std::path::{Path, PathBuf};
use tracing::debug;

/// What the rewriter will do with a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GzipState {
    RawOrDeflatable,
    SimpleGzip,
    ComplexGzip,
}

impl GzipState {
    pub fn detect(path: &Path, mode: ArchiveMode) -> Result<Self, OptimizeError> {
        if mode == ArchiveMode::Zip {
            return Ok(Self::RawOrDeflatable);
        }
        Ok(match deflate::classify_gzip(path)? {
            GzipKind::NotGzip => Self::RawOrDeflatable,
            GzipKind::Simple => Self::SimpleGzip,
            GzipKind::Complex => Self::ComplexGzip,
        })
    }
}

/// Terminal result of a rewrite
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewriteOutcome {
    /// A new compressed sibling was written, the input is untouched
    Created(PathBuf),
    /// The recompressed stream replaced the original
    Replaced,
    /// The original stream was already as small
    Kept,
}

pub struct GzipRewriter<'a> {
    config: &'a Config,
}

impl<'a> GzipRewriter<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    pub fn rewrite(&self, path: &Path) -> Result<RewriteOutcome, OptimizeError> {
        let state = GzipState::detect(path, self.config.archive_mode)?;
        debug!("{}: gzip state {:?}", path.display(), state);

        match state {
            GzipState::RawOrDeflatable => self.compress_sibling(path),
            GzipState::ComplexGzip if self.config.strict => Err(OptimizeError::UnsafeLossy {
                path: path.to_path_buf(),
            }),
            GzipState::SimpleGzip | GzipState::ComplexGzip => self.recompress(path),
        }
    }

    fn compress_sibling(&self, path: &Path) -> Result<RewriteOutcome, OptimizeError> {
        let as_zip = self.config.archive_mode == ArchiveMode::Zip;
        let suffix = self.config.archive_mode.suffix().unwrap_or(".gz");
        let target = staging::sidecar(path, suffix);
        staging::ensure_absent(&target)?;

        let created = deflate::compress_to_gzip_or_zip(path, Some(&target), self.config.level, as_zip)?;
        Ok(RewriteOutcome::Created(created))
    }

    fn recompress(&self, path: &Path) -> Result<RewriteOutcome, OptimizeError> {
        let ungz = staging::sidecar(path, staging::UNGZ_SUFFIX);
        let candidate = staging::sidecar(path, staging::UNGZ_GZ_SUFFIX);
        staging::ensure_absent(&ungz)?;
        staging::ensure_absent(&candidate)?;

        let candidate = self.stage_candidate(path, ungz, candidate)?;
        let settled = staging::replace_if_smaller(candidate.path(), path)?;
        drop(candidate);

        Ok(match settled {
            Settled::Replaced => RewriteOutcome::Replaced,
            Settled::Discarded => RewriteOutcome::Kept,
        })
    }

    /// Decompress into `ungz`, recompress into `candidate`.
    ///
    /// A sidecar is guarded only once this call has created it, so a file
    /// that appeared in the meantime is never removed.
    fn stage_candidate(
        &self,
        path: &Path,
        ungz: PathBuf,
        candidate: PathBuf,
    ) -> Result<SidecarGuard, OptimizeError> {
        deflate::decompress_gzip(path, &ungz)?;
        let ungz = SidecarGuard::new(ungz);

        deflate::compress_to_gzip_or_zip(ungz.path(), Some(&candidate), self.config.level, false)?;
        Ok(SidecarGuard::new(candidate))
    }
}
