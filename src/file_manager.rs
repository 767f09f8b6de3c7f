//! # File Management Module
//!
//! Questo modulo gestisce tutte le operazioni sui file e la discovery degli input.
//!
//! ## Responsabilità:
//! - Espansione di file e directory in una lista piatta di file (`enumerate()`)
//! - Classificazione dei file per estensione (`FileKind`)
//! - Dimensioni e modification time dei file
//! - Formattazione human-readable delle dimensioni (prefissi binari)
//!
//! ## Formati riconosciuti:
//! - **PNG**: png
//! - **JPEG**: jpg, jpeg
//! - **Archivio**: qualsiasi file quando è attiva la modalità gzip/zip
//!
//! L'estensione viene normalizzata in minuscolo una sola volta, alla costruzione
//! del `FileTask`; nessun altro controllo sul contenuto delle immagini.
//!
//! ## Esempio:
//! ```rust,ignore
//! for path in FileManager::enumerate(Path::new("photos"), true)? {
//!     let task = FileTask::new(path?, &config);
//! }
//! ```

use crate::config::{ArchiveMode, Config};
use crate::error::OptimizeError;
use filetime::FileTime;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Codec capability a file is routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Png,
    Jpeg,
    /// Gzip/Zip archive candidate
    Archive,
    Unrecognized,
}

impl FileKind {
    /// Classify by normalized extension and the enabled pipelines
    pub fn classify(path: &Path, config: &Config) -> Self {
        let ext = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase());

        match ext.as_deref() {
            Some("png") if config.png_enabled => Self::Png,
            Some("jpg") | Some("jpeg") if config.jpeg_enabled => Self::Jpeg,
            _ if config.archive_mode != ArchiveMode::None => Self::Archive,
            _ => Self::Unrecognized,
        }
    }
}

/// A file path together with its classification
#[derive(Debug, Clone)]
pub struct FileTask {
    pub path: PathBuf,
    pub kind: FileKind,
}

impl FileTask {
    pub fn new(path: PathBuf, config: &Config) -> Self {
        let kind = FileKind::classify(&path, config);
        Self { path, kind }
    }
}

/// Manages file operations and discovery
pub struct FileManager;

impl FileManager {
    /// Expand a path into the regular files it names.
    ///
    /// A regular file yields itself. A directory yields its immediate children,
    /// or every descendant when `recurse` is set. Entries that become unreadable
    /// during the walk are yielded as errors so the caller can report them and
    /// carry on.
    pub fn enumerate(
        path: &Path,
        recurse: bool,
    ) -> Result<impl Iterator<Item = Result<PathBuf, OptimizeError>>, OptimizeError> {
        let metadata = fs::metadata(path).map_err(|e| OptimizeError::unreadable(path, e))?;
        if !metadata.is_file() && !metadata.is_dir() {
            return Err(OptimizeError::unreadable(path, "not a file or directory"));
        }

        let max_depth = if recurse { usize::MAX } else { 1 };
        let root = path.to_path_buf();

        Ok(WalkDir::new(path)
            .follow_links(true)
            .max_depth(max_depth)
            .into_iter()
            .filter_map(move |entry| match entry {
                Ok(entry) if entry.file_type().is_file() => Some(Ok(entry.into_path())),
                Ok(_) => None,
                Err(e) => {
                    let failed = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.clone());
                    Some(Err(OptimizeError::unreadable(failed, e)))
                }
            }))
    }

    /// Size of a file in bytes
    pub fn file_size(path: &Path) -> io::Result<u64> {
        Ok(fs::metadata(path)?.len())
    }

    /// Modification time of a file
    pub fn modified_time(path: &Path) -> io::Result<FileTime> {
        let metadata = fs::metadata(path)?;
        Ok(FileTime::from_last_modification_time(&metadata))
    }

    /// Reapply a previously captured modification time
    pub fn set_modified_time(path: &Path, time: FileTime) -> io::Result<()> {
        filetime::set_file_mtime(path, time)
    }

    /// Whether a path names a ZIP file, by extension or by signature
    pub fn is_zip(path: &Path) -> bool {
        if path.is_dir() {
            return false;
        }

        let by_extension = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("zip"))
            .unwrap_or(false);
        if by_extension {
            return true;
        }

        let mut signature = [0u8; 4];
        match fs::File::open(path).and_then(|mut f| f.read_exact(&mut signature)) {
            Ok(()) => signature == *b"PK\x03\x04" || signature == *b"PK\x05\x06",
            Err(_) => false,
        }
    }

    /// Get human-readable file size with binary magnitude prefixes.
    ///
    /// Unit scale is printed without decimals, larger magnitudes with two.
    pub fn format_size(size: f64) -> String {
        const UNITS: &[&str] = &["", "k", "M", "G", "T", "P", "E"];

        let magnitude = if size <= 0.0 {
            0
        } else {
            ((size.ln() / 1024f64.ln()) as usize).min(UNITS.len() - 1)
        };
        let scaled = size / 1024f64.powi(magnitude as i32);

        if magnitude == 0 {
            format!("{:.0}{}B", scaled, UNITS[magnitude])
        } else {
            format!("{:.2}{}B", scaled, UNITS[magnitude])
        }
    }

    /// Calculate percentage reduction
    pub fn calculate_reduction(original_size: u64, saved: i64) -> f64 {
        if original_size == 0 {
            0.0
        } else {
            (100.0 * saved as f64) / original_size as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"x").unwrap();
    }

    fn collect(path: &Path, recurse: bool) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = FileManager::enumerate(path, recurse)
            .unwrap()
            .map(|p| p.unwrap())
            .collect();
        files.sort();
        files
    }

    #[test]
    fn test_classify_extensions() {
        let config = Config::default();
        assert_eq!(FileKind::classify(Path::new("a.PNG"), &config), FileKind::Png);
        assert_eq!(FileKind::classify(Path::new("a.JpEg"), &config), FileKind::Jpeg);
        assert_eq!(FileKind::classify(Path::new("a.jpg"), &config), FileKind::Jpeg);
        assert_eq!(FileKind::classify(Path::new("a.txt"), &config), FileKind::Unrecognized);
        assert_eq!(FileKind::classify(Path::new("noext"), &config), FileKind::Unrecognized);
    }

    #[test]
    fn test_classify_respects_modes() {
        let config = Config {
            png_enabled: false,
            archive_mode: ArchiveMode::Gzip,
            ..Default::default()
        };
        assert_eq!(FileKind::classify(Path::new("a.png"), &config), FileKind::Archive);
        assert_eq!(FileKind::classify(Path::new("a.jpg"), &config), FileKind::Jpeg);
        assert_eq!(FileKind::classify(Path::new("log.txt"), &config), FileKind::Archive);
    }

    #[test]
    fn test_enumerate_single_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.png");
        touch(&file);
        assert_eq!(collect(&file, false), vec![file]);
    }

    #[test]
    fn test_enumerate_directory_depth() {
        let dir = TempDir::new().unwrap();
        let top = dir.path().join("a.png");
        let nested = dir.path().join("sub").join("b.jpg");
        touch(&top);
        touch(&nested);

        assert_eq!(collect(dir.path(), false), vec![top.clone()]);

        let mut all = vec![top, nested];
        all.sort();
        assert_eq!(collect(dir.path(), true), all);
    }

    #[test]
    fn test_enumerate_missing_path() {
        let dir = TempDir::new().unwrap();
        let err = FileManager::enumerate(&dir.path().join("missing"), false).err().unwrap();
        assert_eq!(err.code(), OptimizeError::PATH_UNREADABLE);
    }

    #[test]
    fn test_is_zip_sniffs_signature() {
        let dir = TempDir::new().unwrap();
        let disguised = dir.path().join("bundle.bin");
        fs::write(&disguised, b"PK\x03\x04rest").unwrap();
        let plain = dir.path().join("plain.bin");
        fs::write(&plain, b"hello").unwrap();

        assert!(FileManager::is_zip(&disguised));
        assert!(!FileManager::is_zip(&plain));
        assert!(FileManager::is_zip(Path::new("missing.ZIP")));
        assert!(!FileManager::is_zip(dir.path()));
    }

    #[test]
    fn test_format_size() {
        assert_eq!(FileManager::format_size(0.0), "0B");
        assert_eq!(FileManager::format_size(512.0), "512B");
        assert_eq!(FileManager::format_size(1536.0), "1.50kB");
        assert_eq!(FileManager::format_size(3.0 * 1024.0 * 1024.0), "3.00MB");
    }

    #[test]
    fn test_calculate_reduction() {
        assert_eq!(FileManager::calculate_reduction(0, 0), 0.0);
        assert_eq!(FileManager::calculate_reduction(200, 50), 25.0);
    }

    #[test]
    fn test_timestamp_roundtrip() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.txt");
        touch(&file);
        let stamp = FileTime::from_unix_time(1_000_000_000, 0);
        FileManager::set_modified_time(&file, stamp).unwrap();
        assert_eq!(FileManager::modified_time(&file).unwrap(), stamp);
    }
}
