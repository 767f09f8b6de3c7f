//! # Progress Tracking and Statistics Module
//!
//! Questo modulo gestisce il progress tracking e le statistiche di risparmio.
//!
//! ## Responsabilità:
//! - Progress bar con `indicatif` per la pipeline per-file (nascosta in quiet mode)
//! - Accumulatori atomici condivisi tra i worker (`SavingsStats`)
//! - Report finale: file processati, byte risparmiati, durata
//!
//! ## Statistiche tracciate:
//! - **files**: file contati (aggiornati una sola volta per task riuscito)
//! - **bytes**: somma delle dimensioni originali
//! - **savings**: somma con segno di (originale - finale)
//!
//! ## Report finale:
//! ```text
//! Processed 2 files
//! Saved 1.50kB
//! Old size: 10.00kB
//! New size: 8.50kB (15.0% smaller)
//! Completed in 00:00:01.250
//! ```
//!
//! ## Esempio:
//! ```rust,ignore
//! let stats = SavingsStats::new();
//! stats.record(original_size, new_size);
//! print!("{}", stats.snapshot().format_report());
//! ```

use crate::file_manager::FileManager;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::warn;

/// Manages the progress bar of the per-file pipeline
#[derive(Clone)]
pub struct ProgressManager {
    bar: ProgressBar,
}

impl ProgressManager {
    /// Create a progress manager; `hidden` draws nothing
    pub fn new(total_files: u64, hidden: bool) -> Self {
        if hidden {
            return Self {
                bar: ProgressBar::hidden(),
            };
        }

        let bar = ProgressBar::new(total_files);
        match ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
        {
            Ok(style) => bar.set_style(style.progress_chars("=>-")),
            Err(e) => warn!("Invalid progress template: {}", e),
        }
        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Advance by one file
    pub fn update(&self, message: &str) {
        self.bar.inc(1);
        self.bar.set_message(message.to_string());
    }

    /// Remove the bar before the report is printed
    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

/// Process-wide savings accumulators, shared by reference across workers
#[derive(Debug)]
pub struct SavingsStats {
    files: AtomicUsize,
    bytes: AtomicU64,
    savings: AtomicI64,
    started: Instant,
}

impl Default for SavingsStats {
    fn default() -> Self {
        Self::new()
    }
}

impl SavingsStats {
    pub fn new() -> Self {
        Self {
            files: AtomicUsize::new(0),
            bytes: AtomicU64::new(0),
            savings: AtomicI64::new(0),
            started: Instant::now(),
        }
    }

    /// Count one file that went from `original` to `final_size` bytes
    pub fn record(&self, original: u64, final_size: u64) {
        self.files.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(original, Ordering::Relaxed);
        self.savings
            .fetch_add(original as i64 - final_size as i64, Ordering::Relaxed);
    }

    /// Fold the totals of an archive build
    pub fn record_archive(&self, files: usize, input_bytes: u64, archive_size: u64) {
        self.files.fetch_add(files, Ordering::Relaxed);
        self.bytes.fetch_add(input_bytes, Ordering::Relaxed);
        self.savings
            .fetch_add(input_bytes as i64 - archive_size as i64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            files: self.files.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            savings: self.savings.load(Ordering::Relaxed),
            elapsed: self.started.elapsed(),
        }
    }
}

/// Counter values read once at report time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub files: usize,
    pub bytes: u64,
    pub savings: i64,
    pub elapsed: Duration,
}

impl StatsSnapshot {
    pub fn new_size(&self) -> u64 {
        (self.bytes as i64 - self.savings).max(0) as u64
    }

    pub fn reduction_percent(&self) -> f64 {
        FileManager::calculate_reduction(self.bytes, self.savings)
    }

    /// Human-readable summary of the run
    pub fn format_report(&self) -> String {
        if self.files == 0 {
            return "No compatible files found\n".to_string();
        }

        let mut report = format!(
            "Processed {} file{}\n",
            self.files,
            if self.files > 1 { "s" } else { "" }
        );

        if self.savings < 0 {
            report.push_str("Result is bigger\n");
            return report;
        }

        report.push_str(&format!(
            "Saved {}\n",
            FileManager::format_size(self.savings as f64)
        ));
        report.push_str(&format!(
            "Old size: {}\n",
            FileManager::format_size(self.bytes as f64)
        ));
        report.push_str(&format!(
            "New size: {} ({:.1}% smaller)\n",
            FileManager::format_size(self.new_size() as f64),
            self.reduction_percent()
        ));
        report.push_str(&format!("Completed in {}\n", format_duration(self.elapsed)));
        report
    }
}

/// Format a duration as `HH:MM:SS.mmm`
pub fn format_duration(elapsed: Duration) -> String {
    let total_ms = elapsed.as_millis();
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms / 60_000) % 60;
    let seconds = (total_ms / 1000) % 60;
    let millis = total_ms % 1000;
    format!("{:02}:{:02}:{:02}.{:03}", hours, minutes, seconds, millis)
}
