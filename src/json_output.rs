//! # JSON Output Module
//!
//! Output strutturato in JSON per chi invoca il processo da script (`--json`).
//!
//! ## Tipi di messaggi:
//! - `complete`: fine del processo con le statistiche finali e l'exit code
//! - `error`: errore di setup che impedisce di avviare la pipeline

use crate::progress::StatsSnapshot;
use serde::{Deserialize, Serialize};

/// Tipo di messaggio JSON
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum JsonMessage {
    /// Processo completato
    #[serde(rename = "complete")]
    Complete {
        files_processed: usize,
        original_bytes: u64,
        saved_bytes: i64,
        new_bytes: u64,
        reduction_percent: f64,
        duration_seconds: f64,
        exit_code: u32,
    },

    /// Errore generale
    #[serde(rename = "error")]
    Error {
        message: String,
        details: Option<String>,
    },
}

impl JsonMessage {
    /// Emette il messaggio JSON su stdout
    pub fn emit(&self) {
        if let Ok(json) = serde_json::to_string(self) {
            println!("{}", json);
        }
    }

    /// Crea un messaggio di completamento dalle statistiche finali
    pub fn complete(stats: &StatsSnapshot, exit_code: u32) -> Self {
        Self::Complete {
            files_processed: stats.files,
            original_bytes: stats.bytes,
            saved_bytes: stats.savings,
            new_bytes: stats.new_size(),
            reduction_percent: stats.reduction_percent(),
            duration_seconds: stats.elapsed.as_secs_f64(),
            exit_code,
        }
    }

    /// Crea un messaggio di errore
    pub fn error(message: String, details: Option<String>) -> Self {
        Self::Error { message, details }
    }
}
