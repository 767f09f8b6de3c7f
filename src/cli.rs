//! # Command Line Module
//!
//! Parsing degli argomenti con `clap` e traduzione in `Config`.
//!
//! ## Responsabilità:
//! - Normalizza le opzioni storiche a un solo trattino (`-strip`, `-9`, `-zip`, ...)
//!   nella forma lunga capita da `clap`
//! - Definisce `Args` con tutte le opzioni supportate
//! - Applica le opzioni sopra una configurazione di base (file `--config` o default)
//! - Risolve i conteggi dei thread (`--mt-file`, `--mt-deflate`)
//!
//! ## Esempio:
//! ```bash
//! lossless-optimizer -9 -strip -recurse --mt-file photos/
//! lossless-optimizer -zip backup.zip notes/ todo.txt
//! ```

use crate::config::{AllFilters, ArchiveMode, AutorotateMode, Config, MAX_PALETTE_SORT};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::thread;

/// Single-dash spellings accepted for compatibility
const LEGACY_FLAGS: &[&str] = &[
    "strip",
    "progressive",
    "autorotate",
    "recurse",
    "gzip",
    "zip",
    "quiet",
    "keep",
    "help",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RotateArg {
    /// Rotate only when the transform is perfect
    Perfect,
    /// Rotate even when edge blocks are dropped
    Force,
}

#[derive(Parser, Debug)]
#[command(name = "lossless-optimizer", version)]
#[command(about = "Losslessly optimize PNG, JPEG, GZIP and ZIP files")]
pub struct Args {
    /// Files and directories to optimize
    #[arg(required_unless_present = "tools_report")]
    pub inputs: Vec<PathBuf>,

    /// Effort level 1-9 (also -1 .. -9)
    #[arg(long)]
    pub level: Option<u8>,

    /// Strip metadata
    #[arg(long)]
    pub strip: bool,

    /// Use progressive encoding for JPEGs
    #[arg(long)]
    pub progressive: bool,

    /// Rotate JPEGs per their orientation tag (requires --strip)
    #[arg(long, value_enum, num_args = 0..=1, require_equals = true, default_missing_value = "perfect")]
    pub autorotate: Option<RotateArg>,

    /// Recurse into subdirectories
    #[arg(long)]
    pub recurse: bool,

    /// Compress files with GZIP, or recompress gzip files
    #[arg(long)]
    pub gzip: bool,

    /// Build a ZIP archive from the inputs
    #[arg(long)]
    pub zip: bool,

    /// Print nothing on success
    #[arg(long)]
    pub quiet: bool,

    /// Keep modification time
    #[arg(long)]
    pub keep: bool,

    /// Leave PNG files alone
    #[arg(long)]
    pub disable_png: bool,

    /// Leave JPEG files alone
    #[arg(long, alias = "disable-jpeg")]
    pub disable_jpg: bool,

    /// Refuse rewrites that drop recoverable metadata
    #[arg(long)]
    pub strict: bool,

    /// Keep PNG filter and color type
    #[arg(long)]
    pub reuse: bool,

    /// Try all PNG filter strategies
    #[arg(long)]
    pub allfilters: bool,

    /// Try all PNG filter strategies, including brute force
    #[arg(long = "allfilters-b")]
    pub allfilters_b: bool,

    /// Try the cheap PNG filter strategies
    #[arg(long = "allfilters-c")]
    pub allfilters_c: bool,

    /// Palette reordering trials (capped at 120)
    #[arg(long = "pal_sort", require_equals = true)]
    pub pal_sort: Option<u16>,

    /// Deflate threads; bare flag uses all cores, N <= 0 means cores + N
    #[arg(
        long = "mt-deflate",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "0",
        allow_negative_numbers = true
    )]
    pub mt_deflate: Option<i64>,

    /// Per-file worker threads; bare flag uses all cores, N <= 0 means cores + N
    #[arg(
        long = "mt-file",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "0",
        allow_negative_numbers = true
    )]
    pub mt_file: Option<i64>,

    /// Print the final report as JSON
    #[arg(long)]
    pub json: bool,

    /// Base configuration file (JSON); flags override it
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Show where the external tools were found and exit
    #[arg(long)]
    pub tools_report: bool,
}

impl Args {
    /// Parse the process arguments, accepting the legacy spellings
    pub fn from_env() -> Self {
        let args = std::env::args_os().map(|a| a.to_string_lossy().into_owned());
        Self::parse_from(normalize_legacy_args(args))
    }

    /// Apply the flags on top of `base`
    pub fn into_config(&self, base: Config) -> Config {
        let mut config = base;

        if let Some(level) = self.level {
            config.level = level;
        }
        config.strip |= self.strip;
        config.progressive |= self.progressive;
        match self.autorotate {
            Some(RotateArg::Perfect) => config.autorotate = AutorotateMode::PerfectOnly,
            Some(RotateArg::Force) => config.autorotate = AutorotateMode::Force,
            None => {}
        }
        config.recurse |= self.recurse;
        if self.zip {
            config.archive_mode = ArchiveMode::Zip;
        } else if self.gzip {
            config.archive_mode = ArchiveMode::Gzip;
        }
        config.quiet |= self.quiet;
        config.keep_timestamp |= self.keep;
        config.png_enabled &= !self.disable_png;
        config.jpeg_enabled &= !self.disable_jpg;
        config.strict |= self.strict;
        config.reuse |= self.reuse;

        if self.allfilters_b {
            config.all_filters = AllFilters::Brute;
        } else if self.allfilters_c {
            config.all_filters = AllFilters::Cheap;
        } else if self.allfilters {
            config.all_filters = AllFilters::Standard;
        }
        if let Some(trials) = self.pal_sort {
            config.palette_sort = trials.min(u16::from(MAX_PALETTE_SORT)) as u8;
        }

        let cores = available_threads();
        if let Some(n) = self.mt_deflate {
            config.deflate_threads = resolve_threads(n, cores);
        }
        if let Some(n) = self.mt_file {
            config.file_threads = resolve_threads(n, cores);
        }
        config.json_output |= self.json;

        config.normalized()
    }
}

/// Rewrite single-dash legacy options into the long form.
///
/// `-9` becomes `--level=9`, `-strip` becomes `--strip`. Everything after
/// `--` and the program name are left alone.
pub fn normalize_legacy_args<I, S>(args: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut out = Vec::new();
    let mut passthrough = false;

    for (i, arg) in args.into_iter().map(Into::into).enumerate() {
        if i == 0 || passthrough {
            out.push(arg);
            continue;
        }
        if arg == "--" {
            passthrough = true;
            out.push(arg);
            continue;
        }
        out.push(normalize_one(arg));
    }
    out
}

fn normalize_one(arg: String) -> String {
    let rest = match arg.strip_prefix('-') {
        Some(rest) if !rest.starts_with('-') => rest,
        _ => return arg,
    };

    if !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()) {
        return format!("--level={}", rest);
    }

    let name = rest.split_once('=').map_or(rest, |(name, _)| name);
    if LEGACY_FLAGS.contains(&name) {
        format!("-{}", arg)
    } else {
        arg
    }
}

/// Thread count for `--mt-*=N`: N > 0 is literal, otherwise relative to `cores`
pub fn resolve_threads(requested: i64, cores: usize) -> usize {
    if requested > 0 {
        requested as usize
    } else {
        (cores as i64 + requested).max(0) as usize
    }
}

fn available_threads() -> usize {
    thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}
