//! # Configuration Management Module
//!
//! Questo modulo gestisce tutta la configurazione dell'applicazione.
//!
//! ## Responsabilità:
//! - Definisce la struct `Config` con tutti i parametri di ottimizzazione
//! - Fornisce validazione dei parametri di input
//! - Supporta caricamento/salvataggio configurazione da/verso file JSON
//! - Fornisce valori di default sensati per tutti i parametri
//!
//! ## Parametri di configurazione:
//! - `level`: Livello di effort (1-9, default: 3)
//! - `strip`: Rimuove i metadata (default: false)
//! - `progressive`: Encoding JPEG progressivo (default: false)
//! - `autorotate`: Rotazione JPEG automatica (richiede `strip`)
//! - `png_enabled` / `jpeg_enabled`: Abilitazione per formato (default: true)
//! - `strict`: Vieta riscritture che perdono metadata recuperabili
//! - `archive_mode`: Nessuno, gzip o zip
//! - `palette_sort`: Tentativi di riordino palette PNG (max 120)
//! - `reuse` / `all_filters`: Strategie filtri PNG
//! - `deflate_threads` / `file_threads`: Thread per-blocco e per-file (0 = off)
//! - `keep_timestamp`: Preserva la modification time
//! - `quiet`: Nessun report finale
//!
//! ## Validazione:
//! - Controlla che `level` sia 1-9
//! - Controlla che `autorotate` sia usato solo con `strip`
//! - Controlla che `palette_sort` non superi 120
//!
//! ## Esempio:
//! ```rust,ignore
//! let config = Config {
//!     level: 5,
//!     archive_mode: ArchiveMode::Gzip,
//!     ..Default::default()
//! };
//! config.validate()?;
//! ```

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Maximum number of palette reordering trials
pub const MAX_PALETTE_SORT: u8 = 120;

/// JPEG autorotation behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutorotateMode {
    #[default]
    Off,
    /// Rotate even when edge blocks have to be dropped
    Force,
    /// Rotate only when the transform is perfect
    PerfectOnly,
}

/// Which container the gzip/zip pipelines produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveMode {
    #[default]
    None,
    Gzip,
    Zip,
}

impl ArchiveMode {
    /// Suffix appended to an input name when a new container is created
    pub fn suffix(self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Gzip => Some(".gz"),
            Self::Zip => Some(".zip"),
        }
    }
}

/// PNG filter search strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllFilters {
    #[default]
    Off,
    Standard,
    Brute,
    Cheap,
}

/// Configuration for lossless optimization
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Effort level (1-9)
    pub level: u8,
    /// Strip metadata
    pub strip: bool,
    /// Progressive JPEG encoding
    pub progressive: bool,
    /// JPEG autorotation (requires strip)
    pub autorotate: AutorotateMode,
    pub png_enabled: bool,
    pub jpeg_enabled: bool,
    /// Refuse transformations that drop recoverable metadata
    pub strict: bool,
    pub archive_mode: ArchiveMode,
    /// Palette reordering trials (max 120)
    pub palette_sort: u8,
    /// Keep existing PNG filter and color type
    pub reuse: bool,
    pub all_filters: AllFilters,
    /// Threads available to the deflate encoders (0 = single threaded)
    pub deflate_threads: usize,
    /// Per-file worker threads (0 = sequential)
    pub file_threads: usize,
    /// Preserve file modification time
    pub keep_timestamp: bool,
    /// Suppress the savings report
    pub quiet: bool,
    /// Recurse into directories
    pub recurse: bool,
    /// Emit the final report as JSON
    pub json_output: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            level: 3,
            strip: false,
            progressive: false,
            autorotate: AutorotateMode::Off,
            png_enabled: true,
            jpeg_enabled: true,
            strict: false,
            archive_mode: ArchiveMode::None,
            palette_sort: 0,
            reuse: false,
            all_filters: AllFilters::Off,
            deflate_threads: 0,
            file_threads: 0,
            keep_timestamp: false,
            quiet: false,
            recurse: false,
            json_output: false,
        }
    }
}

impl Config {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.level == 0 || self.level > 9 {
            return Err(anyhow::anyhow!("Compression level must be between 1 and 9"));
        }

        if self.autorotate != AutorotateMode::Off && !self.strip {
            return Err(anyhow::anyhow!("Flag -autorotate requires -strip"));
        }

        if self.palette_sort > MAX_PALETTE_SORT {
            return Err(anyhow::anyhow!("Palette sort trials must be at most {}", MAX_PALETTE_SORT));
        }

        Ok(())
    }

    /// Apply the rules that tie options together
    pub fn normalized(mut self) -> Self {
        self.level = self.level.clamp(1, 9);
        self.palette_sort = self.palette_sort.min(MAX_PALETTE_SORT);
        if self.reuse {
            self.all_filters = AllFilters::Off;
        }
        self
    }

    /// Load configuration from file
    pub async fn from_file(path: &PathBuf) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_to_file(&self, path: &PathBuf) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}
