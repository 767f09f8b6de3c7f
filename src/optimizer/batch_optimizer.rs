//! # Batch Optimizer Main Orchestrator
//!
//! Orchestratore principale: sceglie la pipeline e raccoglie il risultato.
//!
//! ## Pipeline:
//! - **Archivio ZIP** (`ArchiveMode::Zip`): tutti gli argomenti vanno al `ZipBuilder`
//! - **Per-file**: enumerazione, coda di lavoro, `WorkDistributor`, `Dispatcher`
//!
//! In entrambi i casi l'exit code è l'OR di tutti i codici di errore.

use crate::config::{ArchiveMode, Config};
use crate::file_manager::{FileManager, FileTask};
use crate::image_processor::{ImageCodec, ToolImageCodec};
use crate::optimizer::{Dispatcher, WorkDistributor, WorkQueue, ZipBuilder};
use crate::progress::{ProgressManager, SavingsStats, StatsSnapshot};
use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::{error, info};

/// What a whole run produced
#[derive(Debug, Clone, Copy)]
pub struct RunSummary {
    pub exit_code: u32,
    pub stats: StatsSnapshot,
}

pub struct BatchOptimizer {
    config: Config,
    codec: Box<dyn ImageCodec>,
}

impl BatchOptimizer {
    /// Optimizer using the external tools found on this system
    pub fn new(config: Config) -> Self {
        Self::with_codec(config, Box::new(ToolImageCodec::new()))
    }

    pub fn with_codec(config: Config, codec: Box<dyn ImageCodec>) -> Self {
        Self { config, codec }
    }

    pub fn run(&self, inputs: &[PathBuf]) -> Result<RunSummary> {
        let stats = SavingsStats::new();
        let dispatcher = Dispatcher::new(&self.config, self.codec.as_ref(), &stats);
        let mut exit_code = 0;

        if self.config.archive_mode == ArchiveMode::Zip && !inputs.is_empty() {
            info!("Building ZIP archive from {} argument(s)", inputs.len());
            exit_code |= ZipBuilder::new(&dispatcher).build(inputs);
        } else {
            let (tasks, errors) = self.collect_tasks(inputs);
            exit_code |= errors;
            info!("Found {} file(s) to process", tasks.len());

            let hidden = self.config.quiet || self.config.json_output;
            let progress = ProgressManager::new(tasks.len() as u64, hidden);
            let queue = WorkQueue::new(tasks);
            exit_code |= WorkDistributor::new(&dispatcher, &progress)
                .run(&queue, self.config.file_threads)
                .context("Failed to start worker threads")?;
            progress.finish();
        }

        Ok(RunSummary {
            exit_code,
            stats: stats.snapshot(),
        })
    }

    /// Expand every argument into tasks; unreadable paths are reported and skipped
    fn collect_tasks(&self, inputs: &[PathBuf]) -> (Vec<FileTask>, u32) {
        let mut tasks = Vec::new();
        let mut errors = 0;

        for input in inputs {
            let files = match FileManager::enumerate(input, self.config.recurse) {
                Ok(files) => files,
                Err(e) => {
                    error!("{}", e);
                    errors |= e.code();
                    continue;
                }
            };
            for file in files {
                match file {
                    Ok(path) => tasks.push(FileTask::new(path, &self.config)),
                    Err(e) => {
                        error!("{}", e);
                        errors |= e.code();
                    }
                }
            }
        }
        (tasks, errors)
    }
}
