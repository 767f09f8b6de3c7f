//! # Lossless Optimizer - Main Entry Point
//!
//! Questo è il punto di ingresso principale dell'applicazione.
//!
//! ## Responsabilità:
//! - Parsing degli argomenti della command line con `clap`
//! - Inizializzazione del sistema di logging con `tracing`
//! - Caricamento della configurazione di base e validazione
//! - Avvio della pipeline e stampa del report finale
//!
//! ## Flusso di esecuzione:
//! 1. Normalizza le opzioni storiche e parsa gli argomenti
//! 2. Configura il logging (`RUST_LOG`, oppure INFO / DEBUG con `-v` / WARN con `-quiet`)
//! 3. Carica `--config` se presente e applica i flag sopra
//! 4. Esegue `BatchOptimizer` su un thread bloccante
//! 5. Stampa il report (testo o JSON) ed esce con l'OR dei codici di errore
//!
//! ## Esempio di utilizzo:
//! ```bash
//! lossless-optimizer -9 -strip --mt-file photos/
//! lossless-optimizer -gzip --strict logs/*.gz
//! ```

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use lossless_optimizer::cli::Args;
use lossless_optimizer::json_output::JsonMessage;
use lossless_optimizer::tool_resolver::{ToolPathResolver, JPEGTRAN, OXIPNG};
use lossless_optimizer::{BatchOptimizer, Config};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::from_env();

    // Initialize logging
    let default_level = if args.verbose {
        "debug"
    } else if args.quiet || args.json {
        "warn"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if args.tools_report {
        print!("{}", ToolPathResolver::new().get_tools_report());
        return Ok(());
    }

    let json = args.json;
    match run(args).await {
        Ok(code) => std::process::exit(code as i32),
        Err(e) if json => {
            JsonMessage::error(e.to_string(), e.chain().nth(1).map(|s| s.to_string())).emit();
            std::process::exit(1);
        }
        Err(e) => Err(e),
    }
}

async fn run(args: Args) -> Result<u32> {
    let base = match &args.config {
        Some(path) => Config::from_file(path)
            .await
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => Config::default(),
    };
    let config = args.into_config(base);
    config.validate()?;

    let resolver = ToolPathResolver::new();
    for (enabled, tool) in [(config.png_enabled, OXIPNG), (config.jpeg_enabled, JPEGTRAN)] {
        if enabled && !resolver.is_tool_available(tool) {
            warn!("{} not found, matching files will fail (see --tools-report)", tool);
        }
    }

    info!(
        "Level {}, {} input(s), {} file worker(s)",
        config.level,
        args.inputs.len(),
        config.file_threads
    );

    let quiet = config.quiet;
    let json = config.json_output;
    let inputs = args.inputs;
    let summary = tokio::task::spawn_blocking(move || BatchOptimizer::new(config).run(&inputs))
        .await
        .context("Optimizer task panicked")??;

    if json {
        JsonMessage::complete(&summary.stats, summary.exit_code).emit();
    } else if !quiet {
        print!("{}", summary.stats.format_report());
    }

    Ok(summary.exit_code)
}
