//! # Work Distributor
//!
//! Distribuisce i `FileTask` tra N worker OS tramite un unico cursore atomico.
//!
//! ## Garanzie:
//! - Ogni indice della coda viene reclamato da un solo worker, una sola volta
//! - Nessuna cancellazione: un errore su un file non ferma gli altri worker
//! - Gli errori vengono piegati con `fetch_or` nell'exit status
//! - `workers == 0` elabora tutto in sequenza sul thread chiamante
//!
//! ## Esempio:
//! ```rust,ignore
//! let queue = WorkQueue::new(tasks);
//! let errors = WorkDistributor::new(&dispatcher, &progress).run(&queue, 4)?;
//! ```

use crate::file_manager::FileTask;
use crate::optimizer::Dispatcher;
use crate::progress::ProgressManager;
use std::io;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::thread;
use tracing::{debug, error};

/// Immutable task list plus the shared claim cursor
#[derive(Debug)]
pub struct WorkQueue {
    tasks: Vec<FileTask>,
    cursor: AtomicUsize,
}

impl WorkQueue {
    pub fn new(tasks: Vec<FileTask>) -> Self {
        Self {
            tasks,
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Claim the next unprocessed task
    pub fn claim(&self) -> Option<&FileTask> {
        let index = self.cursor.fetch_add(1, Ordering::Relaxed);
        self.tasks.get(index)
    }
}

pub struct WorkDistributor<'a> {
    dispatcher: &'a Dispatcher<'a>,
    progress: &'a ProgressManager,
}

impl<'a> WorkDistributor<'a> {
    pub fn new(dispatcher: &'a Dispatcher<'a>, progress: &'a ProgressManager) -> Self {
        Self {
            dispatcher,
            progress,
        }
    }

    /// Dispatch every task in `queue` and return the OR of all error codes.
    ///
    /// A worker that can't be spawned is an error, returned once the workers
    /// already running have drained the queue.
    pub fn run(&self, queue: &WorkQueue, workers: usize) -> io::Result<u32> {
        if queue.is_empty() {
            debug!("Nothing to dispatch");
            return Ok(0);
        }

        let errors = AtomicU32::new(0);
        if workers == 0 {
            self.drain(queue, &errors);
            return Ok(errors.into_inner());
        }

        debug!("Processing {} files with {} workers", queue.len(), workers);
        thread::scope(|scope| -> io::Result<()> {
            for i in 0..workers {
                thread::Builder::new()
                    .name(format!("worker-{}", i))
                    .spawn_scoped(scope, || self.drain(queue, &errors))?;
            }
            Ok(())
        })?;

        Ok(errors.into_inner())
    }

    fn drain(&self, queue: &WorkQueue, errors: &AtomicU32) {
        while let Some(task) = queue.claim() {
            if let Err(e) = self.dispatcher.dispatch(task, false) {
                error!("{}", e);
                errors.fetch_or(e.code(), Ordering::Relaxed);
            }

            let name = task
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            self.progress.update(&name);
        }
    }
}
