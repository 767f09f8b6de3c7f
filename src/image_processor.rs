//! # Image Processing Module
//!
//! Adattatori verso gli ottimizzatori lossless esterni per PNG e JPEG.
//!
//! ## Architettura
//!
//! Nessuna elaborazione delle immagini in memoria: ogni file viene passato a un
//! tool specializzato e il risultato viene confrontato con l'originale.
//!
//! | Formato | Tool       | Output                                   |
//! |---------|------------|------------------------------------------|
//! | PNG     | `oxipng`   | in place, originale salvato in `.bak`    |
//! | JPEG    | `jpegtran` | file temporaneo, sostituito solo se più piccolo |
//!
//! ## Contratto con il dispatcher
//!
//! - `optimize_png()` lascia `<file>.bak` con i byte originali: è il dispatcher
//!   a decidere se ripristinarlo o cancellarlo
//! - `optimize_jpeg()` non lascia mai sidecar e riporta `Optimized` o `Unchanged`
//! - Un `Err` indica un fallimento fatale del tool; il file resta intatto
//!
//! ## Esempio:
//! ```rust,ignore
//! let codec = ToolImageCodec::new();
//! codec.optimize_png(Path::new("a.png"), &config)?;
//! let status = codec.optimize_jpeg(Path::new("b.jpg"), &config, true)?;
//! ```

use crate::config::{AllFilters, AutorotateMode, Config};
use crate::error::OptimizeError;
use crate::staging::{self, Settled};
use crate::tool_resolver::{ToolPathResolver, JPEGTRAN, OXIPNG};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Instant;
use tracing::{debug, warn};

/// Outcome of a lossless JPEG pass, with the file size afterwards
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JpegStatus {
    Optimized(u64),
    Unchanged(u64),
}

impl JpegStatus {
    pub fn size(self) -> u64 {
        match self {
            Self::Optimized(size) | Self::Unchanged(size) => size,
        }
    }
}

/// Lossless re-encoders for the image formats
pub trait ImageCodec: Send + Sync {
    /// Optimize a PNG in place, leaving the original bytes in `<path>.bak`
    fn optimize_png(&self, path: &Path, config: &Config) -> Result<(), OptimizeError>;

    /// Transcode a JPEG losslessly; the file is replaced only by a smaller result
    fn optimize_jpeg(
        &self,
        path: &Path,
        config: &Config,
        progressive: bool,
    ) -> Result<JpegStatus, OptimizeError>;
}

/// `ImageCodec` backed by `oxipng` and `jpegtran`
#[derive(Debug, Clone)]
pub struct ToolImageCodec {
    oxipng: Option<PathBuf>,
    jpegtran: Option<PathBuf>,
}

impl ToolImageCodec {
    pub fn new() -> Self {
        Self::with_resolver(&ToolPathResolver::new())
    }

    pub fn with_resolver(resolver: &ToolPathResolver) -> Self {
        Self {
            oxipng: resolver.resolve_tool(OXIPNG),
            jpegtran: resolver.resolve_tool(JPEGTRAN),
        }
    }

    fn tool<'a>(tool: &'a Option<PathBuf>, name: &str, path: &Path) -> Result<&'a Path, OptimizeError> {
        tool.as_deref()
            .ok_or_else(|| OptimizeError::codec(path, format!("{} not found", name)))
    }
}

impl Default for ToolImageCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageCodec for ToolImageCodec {
    fn optimize_png(&self, path: &Path, config: &Config) -> Result<(), OptimizeError> {
        let tool = Self::tool(&self.oxipng, OXIPNG, path)?;

        let backup = staging::sidecar(path, staging::BACKUP_SUFFIX);
        staging::ensure_absent(&backup)?;
        fs::copy(path, &backup).map_err(|e| OptimizeError::unreadable(path, e))?;

        if config.palette_sort > 0 {
            debug!("{}: palette sorting is not supported by {}", path.display(), OXIPNG);
        }

        if let Err(reason) = run_tool(tool, &png_args(path, config)) {
            if let Err(e) = fs::rename(&backup, path) {
                warn!("{}: failed to restore backup: {}", path.display(), e);
            }
            return Err(OptimizeError::codec(path, reason));
        }
        Ok(())
    }

    fn optimize_jpeg(
        &self,
        path: &Path,
        config: &Config,
        progressive: bool,
    ) -> Result<JpegStatus, OptimizeError> {
        let tool = Self::tool(&self.jpegtran, JPEGTRAN, path)?;

        if config.autorotate != AutorotateMode::Off {
            debug!("{}: autorotation is not supported by {}", path.display(), JPEGTRAN);
        }

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let candidate = tempfile::Builder::new()
            .prefix(".jpegtran")
            .suffix(".jpg")
            .tempfile_in(dir)?
            .into_temp_path();

        run_tool(tool, &jpeg_args(path, &candidate, config, progressive))
            .map_err(|reason| OptimizeError::codec(path, reason))?;

        let settled = staging::replace_if_smaller(&candidate, path)?;
        let size = fs::metadata(path).map_err(|e| OptimizeError::unreadable(path, e))?.len();
        Ok(match settled {
            Settled::Replaced => JpegStatus::Optimized(size),
            Settled::Discarded => JpegStatus::Unchanged(size),
        })
    }
}

/// `oxipng` arguments for an in-place optimization
fn png_args(path: &Path, config: &Config) -> Vec<String> {
    let preset = match config.level {
        9 => "max".to_string(),
        level => (level.saturating_sub(1)).min(6).to_string(),
    };
    let mut args = vec!["-o".to_string(), preset];

    if config.strip {
        args.extend(["--strip".to_string(), "safe".to_string()]);
    }
    if config.reuse {
        args.push("--nx".to_string());
    } else {
        let filters = match config.all_filters {
            AllFilters::Off => None,
            AllFilters::Standard => Some("0-8"),
            AllFilters::Brute => Some("0-9"),
            AllFilters::Cheap => Some("0-4"),
        };
        if let Some(filters) = filters {
            args.extend(["--filters".to_string(), filters.to_string()]);
        }
    }
    if config.deflate_threads > 0 {
        args.extend(["--threads".to_string(), config.deflate_threads.to_string()]);
    }

    args.push("--quiet".to_string());
    args.push(path.to_string_lossy().into_owned());
    args
}

/// `jpegtran` arguments writing the transcoded image to `output`
fn jpeg_args(path: &Path, output: &Path, config: &Config, progressive: bool) -> Vec<String> {
    let copy = if config.strip { "none" } else { "all" };
    let mut args = vec!["-copy".to_string(), copy.to_string(), "-optimize".to_string()];
    if progressive {
        args.push("-progressive".to_string());
    }
    args.push("-outfile".to_string());
    args.push(output.to_string_lossy().into_owned());
    args.push(path.to_string_lossy().into_owned());
    args
}

/// Run a tool to completion, returning its stderr as the failure reason
fn run_tool(tool: &Path, args: &[String]) -> Result<(), String> {
    debug!("Running {} {:?}", tool.display(), args);
    let start_time = Instant::now();

    let output = Command::new(tool)
        .args(args)
        .output()
        .map_err(|e| format!("failed to run {}: {}", tool.display(), e))?;

    if output.status.success() {
        debug!("{} completed in {:?}", tool.display(), start_time.elapsed());
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(format!("{} failed ({}): {}", tool.display(), output.status, stderr.trim()))
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_png_args_follow_config() {
        let config = Config {
            level: 9,
            strip: true,
            all_filters: AllFilters::Brute,
            deflate_threads: 4,
            ..Default::default()
        };
        let args = png_args(Path::new("a.png"), &config);
        assert_eq!(
            args,
            vec!["-o", "max", "--strip", "safe", "--filters", "0-9", "--threads", "4", "--quiet", "a.png"]
        );

        let reuse = Config {
            level: 3,
            reuse: true,
            all_filters: AllFilters::Standard,
            ..Default::default()
        };
        let args = png_args(Path::new("a.png"), &reuse);
        assert_eq!(args, vec!["-o", "2", "--nx", "--quiet", "a.png"]);
    }

    #[test]
    fn test_jpeg_args_follow_config() {
        let config = Config::default();
        let args = jpeg_args(Path::new("a.jpg"), Path::new("out.jpg"), &config, true);
        assert_eq!(
            args,
            vec!["-copy", "all", "-optimize", "-progressive", "-outfile", "out.jpg", "a.jpg"]
        );

        let strip = Config {
            strip: true,
            ..Default::default()
        };
        let args = jpeg_args(Path::new("a.jpg"), Path::new("out.jpg"), &strip, false);
        assert_eq!(args, vec!["-copy", "none", "-optimize", "-outfile", "out.jpg", "a.jpg"]);
    }

    #[test]
    fn test_missing_tool_leaves_file_untouched() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.png");
        fs::write(&path, b"not really a png").unwrap();

        let codec = ToolImageCodec {
            oxipng: None,
            jpegtran: None,
        };
        let err = codec.optimize_png(&path, &Config::default()).unwrap_err();
        assert_eq!(err.code(), OptimizeError::CODEC_FAILURE);
        assert_eq!(fs::read(&path).unwrap(), b"not really a png");
        assert!(!staging::sidecar(&path, staging::BACKUP_SUFFIX).exists());
    }

    #[test]
    fn test_png_refuses_existing_backup() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.png");
        fs::write(&path, b"png").unwrap();
        fs::write(staging::sidecar(&path, staging::BACKUP_SUFFIX), b"stale").unwrap();

        let codec = ToolImageCodec {
            oxipng: Some(PathBuf::from("oxipng")),
            jpegtran: None,
        };
        let err = codec.optimize_png(&path, &Config::default()).unwrap_err();
        assert_eq!(err.code(), OptimizeError::CONFLICTING_OUTPUT);
    }

    #[test]
    fn test_jpeg_status_size() {
        assert_eq!(JpegStatus::Optimized(10).size(), 10);
        assert_eq!(JpegStatus::Unchanged(20).size(), 20);
    }
}
