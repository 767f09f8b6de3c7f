//! # Format Dispatcher
//!
//! Instrada un singolo `FileTask` verso il codec giusto e aggiorna i contatori.
//!
//! ## Responsabilità:
//! - PNG: ottimizzazione in place, poi consumo del sidecar `.bak`
//!   (ripristino se il risultato è cresciuto, altrimenti rimozione)
//! - JPEG: transcodifica lossless con eventuale secondo tentativo non progressivo
//! - Gzip/Zip: delega al `GzipRewriter` (mai in modalità interna)
//! - Preservazione della modification time con `keep_timestamp`
//!
//! ## Modalità interna:
//! Usata dalla ricompressione degli archivi ZIP: niente gzip/zip e nessun
//! aggiornamento dei contatori globali.

use crate::config::Config;
use crate::error::OptimizeError;
use crate::file_manager::{FileKind, FileManager, FileTask};
use crate::image_processor::{ImageCodec, JpegStatus};
use crate::optimizer::gzip_rewriter::{GzipRewriter, RewriteOutcome};
use crate::progress::SavingsStats;
use crate::staging::{self, Settled};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Files at or above this size are skipped
pub const SIZE_CEILING: u64 = 1_200_000_000;

/// Below this size, effort 1 does not try progressive encoding
const PROGRESSIVE_MIN_SIZE: u64 = 5000;

/// Result of dispatching one task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Optimized { original: u64, optimized: u64 },
    /// Not a file this configuration handles, or too big
    Skipped,
}

/// Size under which a progressive JPEG is retried as baseline, per effort level
pub fn progressive_threshold(level: u8) -> u64 {
    match level {
        0..=2 => 6500,
        3 => 10000,
        4 => 15000,
        _ => 20000,
    }
}

/// Routes tasks to codecs; shared by reference across workers
pub struct Dispatcher<'a> {
    config: &'a Config,
    codec: &'a dyn ImageCodec,
    stats: &'a SavingsStats,
}

impl<'a> Dispatcher<'a> {
    pub fn new(config: &'a Config, codec: &'a dyn ImageCodec, stats: &'a SavingsStats) -> Self {
        Self {
            config,
            codec,
            stats,
        }
    }

    pub fn config(&self) -> &'a Config {
        self.config
    }

    pub fn stats(&self) -> &'a SavingsStats {
        self.stats
    }

    /// Optimize one file. `internal` is set for archive members.
    pub fn dispatch(&self, task: &FileTask, internal: bool) -> Result<Outcome, OptimizeError> {
        match task.kind {
            FileKind::Unrecognized => return Ok(Outcome::Skipped),
            FileKind::Archive if internal => return Ok(Outcome::Skipped),
            _ => {}
        }

        let path = task.path.as_path();
        let size = FileManager::file_size(path).map_err(|e| OptimizeError::unreadable(path, e))?;
        if size >= SIZE_CEILING {
            warn!("{}: file too big, skipped", path.display());
            return Ok(Outcome::Skipped);
        }
        if task.kind == FileKind::Archive && size == 0 {
            return Err(OptimizeError::unsupported(path, "empty file"));
        }

        let mtime = if self.config.keep_timestamp {
            Some(FileManager::modified_time(path).map_err(|e| OptimizeError::unreadable(path, e))?)
        } else {
            None
        };

        // `Some` when the result lives in a new sibling file
        let sibling: Option<PathBuf> = match task.kind {
            FileKind::Png => {
                self.optimize_png(path)?;
                None
            }
            FileKind::Jpeg => {
                self.optimize_jpeg(path, size)?;
                None
            }
            FileKind::Archive => match GzipRewriter::new(self.config).rewrite(path)? {
                RewriteOutcome::Created(sibling) => Some(sibling),
                RewriteOutcome::Replaced | RewriteOutcome::Kept => None,
            },
            FileKind::Unrecognized => return Ok(Outcome::Skipped),
        };

        let measured = sibling.as_deref().unwrap_or(path);
        let optimized = FileManager::file_size(measured).map_err(|e| OptimizeError::unreadable(measured, e))?;

        if let (Some(mtime), None) = (mtime, &sibling) {
            if let Err(e) = FileManager::set_modified_time(path, mtime) {
                warn!("{}: can't restore modification time: {}", path.display(), e);
            }
        }

        if !internal {
            self.stats.record(size, optimized);
        }
        debug!("{}: {} -> {} bytes", path.display(), size, optimized);

        Ok(Outcome::Optimized {
            original: size,
            optimized,
        })
    }

    fn optimize_png(&self, path: &Path) -> Result<(), OptimizeError> {
        self.codec.optimize_png(path, self.config)?;

        let backup = staging::sidecar(path, staging::BACKUP_SUFFIX);
        if !backup.exists() {
            return Ok(());
        }
        match staging::settle(&backup, path, |backup_len, result_len| result_len > backup_len)? {
            Settled::Replaced => debug!("{}: result was bigger, original restored", path.display()),
            Settled::Discarded => {}
        }
        Ok(())
    }

    fn optimize_jpeg(&self, path: &Path, size: u64) -> Result<(), OptimizeError> {
        let config = self.config;
        let progressive = config.progressive && (config.level > 1 || size > PROGRESSIVE_MIN_SIZE);
        let status = self.codec.optimize_jpeg(path, config, progressive)?;

        if config.progressive && config.level > 1 {
            let retry = matches!(status, JpegStatus::Unchanged(_))
                || status.size() < progressive_threshold(config.level);
            if retry {
                debug!("{}: retrying without progressive encoding", path.display());
                self.codec.optimize_jpeg(path, config, false)?;
            }
        }
        Ok(())
    }
}
