//! # Zip Archive Builder
//!
//! Costruisce o estende un archivio ZIP a partire dagli argomenti, poi lo
//! ricomprime per intero.
//!
//! ## Nome dell'archivio:
//! - Se il primo argomento è già uno ZIP (estensione o signature), viene esteso
//! - Altrimenti `<stem>.zip` accanto al primo argomento; se esiste già,
//!   la costruzione si interrompe senza toccare nulla
//!
//! ## Membri:
//! - Directory: ogni file, con nome relativo alla directory padre
//!   (`foto/2024/a.png`); entry di directory solo per le directory vuote
//! - File: un membro col solo nome del file
//! - Un membro che fallisce non interrompe gli altri
//!
//! ## Statistiche:
//! byte in ingresso (più l'eventuale archivio preesistente) contro dimensione
//! finale dell'archivio; i file toccati dalla ricompressione vengono contati.

use crate::archive;
use crate::error::OptimizeError;
use crate::file_manager::FileManager;
use crate::optimizer::Dispatcher;
use crate::staging;
use filetime::FileTime;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

/// Running totals of one build
#[derive(Debug, Default)]
struct Tally {
    input_bytes: u64,
    errors: u32,
}

impl Tally {
    fn fail(&mut self, e: OptimizeError) {
        error!("{}", e);
        self.errors |= e.code();
    }
}

pub struct ZipBuilder<'a> {
    dispatcher: &'a Dispatcher<'a>,
}

impl<'a> ZipBuilder<'a> {
    pub fn new(dispatcher: &'a Dispatcher<'a>) -> Self {
        Self { dispatcher }
    }

    /// Build the archive for `inputs`, returning the OR of all error codes
    pub fn build(&self, inputs: &[PathBuf]) -> u32 {
        let Some(first) = inputs.first() else {
            return 0;
        };
        let keep_timestamp = self.dispatcher.config().keep_timestamp;
        let mut tally = Tally::default();

        let (archive, members, mtime) = if FileManager::is_zip(first) {
            let mut mtime = None;
            if let Ok(size) = FileManager::file_size(first) {
                tally.input_bytes += size;
                if keep_timestamp {
                    mtime = FileManager::modified_time(first).ok();
                }
            }
            (first.clone(), &inputs[1..], mtime)
        } else {
            let archive = derive_archive_name(first);
            if let Err(e) = staging::ensure_absent(&archive) {
                error!(
                    "{}: ZIP file for chosen file/folder already exists, but it was not listed",
                    archive.display()
                );
                return e.code();
            }
            let mtime = if keep_timestamp {
                FileManager::modified_time(first).ok()
            } else {
                None
            };
            (archive, inputs, mtime)
        };
        info!("Building {}", archive.display());

        for input in members {
            if input.is_dir() {
                self.add_directory(&archive, input, &mut tally);
            } else {
                match input.file_name() {
                    Some(name) => {
                        let name = name.to_string_lossy().into_owned();
                        self.add_file(&archive, input, &name, &mut tally);
                    }
                    None => tally.fail(OptimizeError::unreadable(input, "no file name")),
                }
            }
        }

        if !archive.exists() {
            warn!("{}: nothing was added", archive.display());
            return tally.errors;
        }

        let touched = match archive::recompress_archive(&archive, self.dispatcher) {
            Ok(touched) => touched,
            Err(e) => {
                tally.fail(e);
                0
            }
        };

        if let Some(mtime) = mtime {
            restore_mtime(&archive, mtime);
        }

        self.dispatcher
            .stats()
            .record_archive(touched, tally.input_bytes, archive::archive_size(&archive));
        tally.errors
    }

    fn add_directory(&self, archive: &Path, dir: &Path, tally: &mut Tally) {
        let root = match fs::canonicalize(dir) {
            Ok(root) => root,
            Err(e) => return tally.fail(OptimizeError::unreadable(dir, e)),
        };
        let base = root.parent().unwrap_or_else(|| Path::new("")).to_path_buf();
        let mut seen = 0usize;

        for entry in WalkDir::new(&root)
            .follow_links(true)
            .min_depth(1)
            .sort_by_file_name()
        {
            seen += 1;
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let failed = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.clone());
                    tally.fail(OptimizeError::unreadable(failed, e));
                    continue;
                }
            };
            let path = entry.path();
            let name = member_name(path.strip_prefix(&base).unwrap_or(path));

            if entry.file_type().is_dir() {
                if is_empty_dir(path) {
                    self.add_directory_entry(archive, &name, path);
                }
            } else {
                self.add_file(archive, path, &name, tally);
            }
        }

        if seen == 0 {
            let name = member_name(root.strip_prefix(&base).unwrap_or(&root));
            self.add_directory_entry(archive, &name, &root);
        }
    }

    fn add_directory_entry(&self, archive: &Path, name: &str, source: &Path) {
        let name = format!("{}/", name);
        debug!("Adding directory entry {}", name);
        if let Err(e) = archive::add_or_replace_member(archive, &name, None, source) {
            warn!("can't add directory '{}': {}", source.display(), e);
        }
    }

    fn add_file(&self, archive: &Path, path: &Path, name: &str, tally: &mut Tally) {
        let size = match FileManager::file_size(path) {
            Ok(size) => size,
            Err(e) => {
                warn!("{}: can't read file ({})", path.display(), e);
                return;
            }
        };
        if size > u64::from(u32::MAX) {
            warn!("{}: file too big", path.display());
            return;
        }

        let data = match fs::read(path) {
            Ok(data) => data,
            Err(e) => return tally.fail(OptimizeError::unreadable(path, e)),
        };
        debug!("Adding {} as {}", path.display(), name);
        match archive::add_or_replace_member(archive, name, Some(&data), path) {
            Ok(()) => tally.input_bytes += data.len() as u64,
            Err(e) => {
                error!("can't add file '{}'", path.display());
                tally.fail(e);
            }
        }
    }
}

/// Archive path used when the first argument is not itself a ZIP
pub fn derive_archive_name(first: &Path) -> PathBuf {
    let stem: PathBuf = if first.is_file() {
        match first.extension() {
            Some(_) => first.with_extension(""),
            None => first.to_path_buf(),
        }
    } else {
        let trimmed: PathBuf = first.components().collect();
        match trimmed.file_name() {
            Some(_) => trimmed,
            None => fs::canonicalize(first).unwrap_or(trimmed),
        }
    };
    staging::sidecar(&stem, ".zip")
}

/// Member name with `/` separators
fn member_name(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn is_empty_dir(path: &Path) -> bool {
    fs::read_dir(path)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(false)
}

fn restore_mtime(archive: &Path, mtime: FileTime) {
    if let Err(e) = FileManager::set_modified_time(archive, mtime) {
        warn!("{}: can't restore modification time: {}", archive.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ArchiveMode, Config};
    use crate::image_processor::test_support::FakeCodec;
    use crate::progress::SavingsStats;
    use tempfile::TempDir;

    fn zip_config() -> Config {
        Config {
            archive_mode: ArchiveMode::Zip,
            ..Default::default()
        }
    }

    fn sorted_members(archive: &Path) -> Vec<String> {
        let mut names = archive::member_names(archive).unwrap();
        names.sort();
        names
    }

    #[test]
    fn test_single_file_archive() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("data.txt");
        let payload = b"col_a,col_b\n1,2\n".repeat(200);
        fs::write(&input, &payload).unwrap();

        let config = zip_config();
        let codec = FakeCodec::default();
        let stats = SavingsStats::new();
        let dispatcher = Dispatcher::new(&config, &codec, &stats);

        let errors = ZipBuilder::new(&dispatcher).build(&[input.clone()]);
        let archive = dir.path().join("data.zip");

        assert_eq!(errors, 0);
        assert_eq!(archive::member_names(&archive).unwrap(), vec!["data.txt"]);
        assert_eq!(archive::read_member(&archive, "data.txt").unwrap(), payload);
        assert_eq!(fs::read(&input).unwrap(), payload);

        let snap = stats.snapshot();
        assert_eq!(snap.files, 1);
        assert_eq!(snap.bytes, payload.len() as u64);
        assert_eq!(
            snap.savings,
            payload.len() as i64 - archive::archive_size(&archive) as i64
        );
    }

    #[test]
    fn test_existing_unlisted_archive_aborts() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("data.txt");
        fs::write(&input, b"data").unwrap();
        let archive = dir.path().join("data.zip");
        fs::write(&archive, b"unrelated").unwrap();

        let config = zip_config();
        let codec = FakeCodec::default();
        let stats = SavingsStats::new();
        let dispatcher = Dispatcher::new(&config, &codec, &stats);

        let errors = ZipBuilder::new(&dispatcher).build(&[input.clone()]);
        assert_eq!(errors, OptimizeError::CONFLICTING_OUTPUT);
        assert_eq!(fs::read(&archive).unwrap(), b"unrelated");
        assert_eq!(fs::read(&input).unwrap(), b"data");
        assert_eq!(stats.snapshot().files, 0);
    }

    #[test]
    fn test_directory_members() {
        let dir = TempDir::new().unwrap();
        let photos = dir.path().join("photos");
        fs::create_dir_all(photos.join("sub")).unwrap();
        fs::create_dir_all(photos.join("empty")).unwrap();
        fs::write(photos.join("a.txt"), b"alpha").unwrap();
        fs::write(photos.join("sub").join("b.txt"), b"beta").unwrap();

        let config = zip_config();
        let codec = FakeCodec::default();
        let stats = SavingsStats::new();
        let dispatcher = Dispatcher::new(&config, &codec, &stats);

        let errors = ZipBuilder::new(&dispatcher).build(&[photos.clone()]);
        let archive = dir.path().join("photos.zip");

        assert_eq!(errors, 0);
        assert_eq!(
            sorted_members(&archive),
            vec!["photos/a.txt", "photos/empty/", "photos/sub/b.txt"]
        );
        assert_eq!(stats.snapshot().files, 2);
    }

    #[test]
    fn test_empty_directory_argument() {
        let dir = TempDir::new().unwrap();
        let hollow = dir.path().join("hollow");
        fs::create_dir(&hollow).unwrap();

        let config = zip_config();
        let codec = FakeCodec::default();
        let stats = SavingsStats::new();
        let dispatcher = Dispatcher::new(&config, &codec, &stats);

        assert_eq!(ZipBuilder::new(&dispatcher).build(&[hollow]), 0);
        assert_eq!(sorted_members(&dir.path().join("hollow.zip")), vec!["hollow/"]);
        assert_eq!(stats.snapshot().files, 0);
    }

    #[test]
    fn test_extend_existing_archive() {
        let dir = TempDir::new().unwrap();
        let first = dir.path().join("data.txt");
        let second = dir.path().join("more.txt");
        fs::write(&first, b"first file ".repeat(50)).unwrap();
        fs::write(&second, b"second file ".repeat(50)).unwrap();

        let config = zip_config();
        let codec = FakeCodec::default();
        let stats = SavingsStats::new();
        let dispatcher = Dispatcher::new(&config, &codec, &stats);
        let builder = ZipBuilder::new(&dispatcher);

        assert_eq!(builder.build(&[first.clone()]), 0);
        let archive = dir.path().join("data.zip");
        let before = archive::archive_size(&archive);

        let stats = SavingsStats::new();
        let dispatcher = Dispatcher::new(&config, &codec, &stats);
        let errors = ZipBuilder::new(&dispatcher).build(&[archive.clone(), second, first]);

        assert_eq!(errors, 0);
        assert_eq!(sorted_members(&archive), vec!["data.txt", "more.txt"]);
        let snap = stats.snapshot();
        assert_eq!(snap.files, 2);
        assert_eq!(snap.bytes, before + 600 + 550);
    }

    #[test]
    fn test_missing_member_does_not_stop_others() {
        let dir = TempDir::new().unwrap();
        let good = dir.path().join("good.txt");
        fs::write(&good, b"good").unwrap();
        let archive = dir.path().join("bundle.zip");

        let config = zip_config();
        let codec = FakeCodec::default();
        let stats = SavingsStats::new();
        let dispatcher = Dispatcher::new(&config, &codec, &stats);

        let errors = ZipBuilder::new(&dispatcher).build(&[
            archive.clone(),
            dir.path().join("missing.txt"),
            good,
        ]);
        assert_eq!(errors, 0);
        assert_eq!(archive::member_names(&archive).unwrap(), vec!["good.txt"]);
    }

    #[test]
    fn test_image_members_go_through_codec() {
        let dir = TempDir::new().unwrap();
        let png = dir.path().join("logo.png");
        fs::write(&png, vec![9u8; 2000]).unwrap();

        let config = zip_config();
        let codec = FakeCodec::shrinking(500);
        let stats = SavingsStats::new();
        let dispatcher = Dispatcher::new(&config, &codec, &stats);

        assert_eq!(ZipBuilder::new(&dispatcher).build(&[png.clone()]), 0);
        let archive = dir.path().join("logo.zip");
        assert_eq!(archive::read_member(&archive, "logo.png").unwrap().len(), 1500);
        // The source file itself is never modified
        assert_eq!(fs::metadata(&png).unwrap().len(), 2000);
    }

    #[test]
    fn test_new_archive_gets_input_timestamp() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("data.txt");
        fs::write(&input, b"data").unwrap();
        let stamp = FileTime::from_unix_time(1_400_000_000, 0);
        filetime::set_file_mtime(&input, stamp).unwrap();

        let config = Config {
            keep_timestamp: true,
            ..zip_config()
        };
        let codec = FakeCodec::default();
        let stats = SavingsStats::new();
        let dispatcher = Dispatcher::new(&config, &codec, &stats);

        ZipBuilder::new(&dispatcher).build(&[input]);
        let archive = dir.path().join("data.zip");
        assert_eq!(FileManager::modified_time(&archive).unwrap(), stamp);
    }

    #[test]
    fn test_existing_archive_keeps_its_timestamp() {
        let dir = TempDir::new().unwrap();
        let first = dir.path().join("data.txt");
        let more = dir.path().join("more.txt");
        fs::write(&first, b"first file ".repeat(50)).unwrap();
        fs::write(&more, b"more data ".repeat(50)).unwrap();

        let config = Config {
            keep_timestamp: true,
            ..zip_config()
        };
        let codec = FakeCodec::default();
        let stats = SavingsStats::new();
        let dispatcher = Dispatcher::new(&config, &codec, &stats);
        ZipBuilder::new(&dispatcher).build(&[first]);

        let archive = dir.path().join("data.zip");
        let stamp = FileTime::from_unix_time(1_300_000_000, 0);
        filetime::set_file_mtime(&archive, stamp).unwrap();
        filetime::set_file_mtime(&more, FileTime::from_unix_time(1_600_000_000, 0)).unwrap();

        assert_eq!(ZipBuilder::new(&dispatcher).build(&[archive.clone(), more]), 0);
        assert_eq!(sorted_members(&archive), vec!["data.txt", "more.txt"]);
        assert_eq!(FileManager::modified_time(&archive).unwrap(), stamp);
    }

    #[cfg(unix)]
    #[test]
    fn test_extended_archive_keeps_its_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let first = dir.path().join("data.txt");
        let more = dir.path().join("more.txt");
        fs::write(&first, b"first file ".repeat(50)).unwrap();
        fs::write(&more, b"more data ".repeat(50)).unwrap();

        let config = zip_config();
        let codec = FakeCodec::default();
        let stats = SavingsStats::new();
        let dispatcher = Dispatcher::new(&config, &codec, &stats);
        ZipBuilder::new(&dispatcher).build(&[first.clone()]);

        let archive = dir.path().join("data.zip");
        fs::set_permissions(&archive, fs::Permissions::from_mode(0o644)).unwrap();

        // Re-adding `data.txt` goes through the staged member replacement
        assert_eq!(ZipBuilder::new(&dispatcher).build(&[archive.clone(), more, first]), 0);
        let mode = fs::metadata(&archive).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_directory_is_walked() {
        let dir = TempDir::new().unwrap();
        let real = dir.path().join("real");
        let photos = dir.path().join("photos");
        fs::create_dir(&real).unwrap();
        fs::create_dir(&photos).unwrap();
        fs::write(real.join("b.txt"), b"beta").unwrap();
        fs::write(photos.join("a.txt"), b"alpha").unwrap();
        std::os::unix::fs::symlink(&real, photos.join("link")).unwrap();

        let config = zip_config();
        let codec = FakeCodec::default();
        let stats = SavingsStats::new();
        let dispatcher = Dispatcher::new(&config, &codec, &stats);

        let errors = ZipBuilder::new(&dispatcher).build(&[photos]);
        let archive = dir.path().join("photos.zip");

        assert_eq!(errors, 0);
        assert_eq!(sorted_members(&archive), vec!["photos/a.txt", "photos/link/b.txt"]);
        assert_eq!(archive::read_member(&archive, "photos/link/b.txt").unwrap(), b"beta");
    }

    #[test]
    fn test_derive_archive_name() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("report.tar.gz");
        fs::write(&file, b"x").unwrap();
        let folder = dir.path().join("photos");
        fs::create_dir(&folder).unwrap();

        assert_eq!(derive_archive_name(&file), dir.path().join("report.tar.zip"));
        assert_eq!(derive_archive_name(&folder), dir.path().join("photos.zip"));

        let trailing = PathBuf::from(format!("{}/", folder.display()));
        assert_eq!(derive_archive_name(&trailing), dir.path().join("photos.zip"));
    }
}
