//! # Optimizer Module
//!
//! Nucleo di dispatch batch e costruzione archivi, separato in sottomoduli:
//! - `batch_optimizer`: Orchestratore principale, sceglie la pipeline
//! - `work_distributor`: Coda con cursore atomico e worker OS
//! - `dispatcher`: Instradamento per formato e aggiornamento contatori
//! - `gzip_rewriter`: Macchina a stati per i file gzip
//! - `zip_builder`: Costruzione e ricompressione archivi ZIP

pub mod batch_optimizer;
pub mod dispatcher;
pub mod gzip_rewriter;
pub mod work_distributor;
pub mod zip_builder;

pub use batch_optimizer::{BatchOptimizer, RunSummary};
pub use dispatcher::{Dispatcher, Outcome};
pub use gzip_rewriter::{GzipRewriter, GzipState, RewriteOutcome};
pub use work_distributor::{WorkDistributor, WorkQueue};
pub use zip_builder::ZipBuilder;
