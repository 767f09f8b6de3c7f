//! # Error Types Module
//!
//! Questo modulo definisce la tassonomia degli errori per-file dell'applicazione.
//!
//! ## Responsabilità:
//! - Definisce `OptimizeError` enum per categorizzare tutti gli errori possibili
//! - Associa ad ogni categoria un bit dell'exit status (`code()`)
//! - Integra con `thiserror` per automatic error conversion
//!
//! ## Categorie di errori:
//! - `PathUnreadable`: path non leggibile (enumerazione o apertura)
//! - `UnsupportedInput`: file vuoto in modalità gzip, file oltre il limite
//! - `ConflictingOutput`: sidecar o archivio derivato già esistente
//! - `UnsafeLossy`: strict mode vieta una riscrittura che perde metadata
//! - `CodecFailure`: il codec esterno ha riportato un errore fatale
//!
//! ## Propagazione:
//! Gli errori per-file non interrompono mai il lavoro sugli altri file:
//! vengono loggati e piegati (bitwise OR) nell'exit status finale.
//!
//! ## Esempio:
//! ```rust,ignore
//! let code = files.iter()
//!     .filter_map(|f| dispatcher.dispatch(f, false).err())
//!     .fold(0, |acc, e| acc | e.code());
//! ```

use std::path::PathBuf;

/// Custom error types for per-file optimization
#[derive(thiserror::Error, Debug)]
pub enum OptimizeError {
    #[error("{}: can't read file ({reason})", .path.display())]
    PathUnreadable { path: PathBuf, reason: String },

    #[error("{}: {reason}", .path.display())]
    UnsupportedInput { path: PathBuf, reason: String },

    #[error("{}: output already exists", .path.display())]
    ConflictingOutput { path: PathBuf },

    #[error("{}: file includes extra field, file name or comment, can't be optimized in strict mode", .path.display())]
    UnsafeLossy { path: PathBuf },

    #[error("{}: {reason}", .path.display())]
    CodecFailure { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Archive(#[from] zip::result::ZipError),
}

impl OptimizeError {
    pub const PATH_UNREADABLE: u32 = 1 << 0;
    pub const UNSUPPORTED_INPUT: u32 = 1 << 1;
    pub const CONFLICTING_OUTPUT: u32 = 1 << 2;
    pub const UNSAFE_LOSSY: u32 = 1 << 3;
    pub const CODEC_FAILURE: u32 = 1 << 4;

    pub fn unreadable(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::PathUnreadable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn unsupported(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::UnsupportedInput {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn conflict(path: impl Into<PathBuf>) -> Self {
        Self::ConflictingOutput { path: path.into() }
    }

    pub fn codec(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::CodecFailure {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Bit of the process exit status this error contributes
    pub fn code(&self) -> u32 {
        match self {
            Self::PathUnreadable { .. } | Self::Io(_) => Self::PATH_UNREADABLE,
            Self::UnsupportedInput { .. } => Self::UNSUPPORTED_INPUT,
            Self::ConflictingOutput { .. } => Self::CONFLICTING_OUTPUT,
            Self::UnsafeLossy { .. } => Self::UNSAFE_LOSSY,
            Self::CodecFailure { .. } | Self::Archive(_) => Self::CODEC_FAILURE,
        }
    }
}
