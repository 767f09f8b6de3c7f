//! # Lossless Optimizer Library
//!
//! Questo è il modulo principale della libreria che espone tutte le API pubbliche.
//!
//! ## Responsabilità:
//! - Definisce la struttura modulare dell'applicazione
//! - Espone i tipi e le funzioni principali tramite re-exports
//! - Fornisce un'interfaccia pulita per il main.rs e per altri consumatori
//!
//! ## Architettura dei moduli:
//! - `config`: Gestione configurazione e validazione parametri
//! - `cli`: Parsing degli argomenti e opzioni storiche a un trattino
//! - `error`: Tassonomia degli errori per-file e bit dell'exit status
//! - `file_manager`: Enumerazione input, classificazione, dimensioni e timestamp
//! - `staging`: Sidecar, controllo no-clobber e sostituzione speculativa
//! - `deflate`: Adattatore gzip/deflate (`flate2`)
//! - `archive`: Adattatore ZIP (`zip`)
//! - `image_processor`: Ottimizzatori PNG/JPEG esterni
//! - `tool_resolver`: Ricerca dei tool esterni
//! - `optimizer`: Dispatcher, worker, gzip rewriter, zip builder
//! - `progress`: Progress bar e statistiche di risparmio
//! - `json_output`: Report finale in JSON
//!
//! ## Utilizzo:
//! ```rust,ignore
//! use lossless_optimizer::{BatchOptimizer, Config};
//!
//! let config = Config { level: 5, ..Default::default() };
//! let summary = BatchOptimizer::new(config).run(&[PathBuf::from("photos")])?;
//! print!("{}", summary.stats.format_report());
//! ```

pub mod archive;
pub mod cli;
pub mod config;
pub mod deflate;
pub mod error;
pub mod file_manager;
pub mod image_processor;
pub mod json_output;
pub mod optimizer;
pub mod progress;
pub mod staging;
pub mod tool_resolver;

pub use config::Config;
pub use error::OptimizeError;
pub use optimizer::{BatchOptimizer, RunSummary};
