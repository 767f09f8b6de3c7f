//! # ZIP Archive Adapter
//!
//! Adattatore verso il mutator ZIP esterno (`zip` crate).
//!
//! ## Responsabilità:
//! - `add_or_replace_member()`: aggiunge un membro (file o directory) a un archivio,
//!   sostituendo un eventuale membro con lo stesso nome
//! - `recompress_archive()`: riscrive ogni membro con Deflate al livello massimo,
//!   passando prima PNG e JPEG dal dispatcher in modalità interna
//! - `write_single_member()`: archivio di un solo membro per la modalità `-zip` sul singolo file
//!
//! ## Sicurezza operazioni:
//! Ogni riscrittura completa avviene su un file temporaneo nella stessa directory
//! dell'archivio, e lo sostituisce solo se il risultato è più piccolo.

use crate::error::OptimizeError;
use crate::file_manager::{FileKind, FileManager, FileTask};
use crate::optimizer::{Dispatcher, Outcome};
use crate::staging::{self, Settled};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, Write};
use std::path::Path;
use std::time::SystemTime;
use tempfile::NamedTempFile;
use tracing::{debug, warn};
use zip::write::FileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

/// Deflate level used when recompressing archive members
const BEST_LEVEL: i32 = 9;

/// ZIP timestamp of a file's modification time
pub fn zip_timestamp(path: &Path) -> DateTime {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .map(to_zip_datetime)
        .unwrap_or_default()
}

fn to_zip_datetime(time: SystemTime) -> DateTime {
    DateTime::try_from(time::OffsetDateTime::from(time)).unwrap_or_default()
}

fn stored_options(source: &Path) -> FileOptions {
    FileOptions::default()
        .compression_method(CompressionMethod::Stored)
        .last_modified_time(zip_timestamp(source))
}

/// Write `data` as the only member of a new archive, named after `source`
pub fn write_single_member(
    out: File,
    source: &Path,
    data: &[u8],
    level: u32,
) -> Result<(), OptimizeError> {
    let name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| OptimizeError::unsupported(source, "no file name"))?;

    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(level as i32))
        .last_modified_time(zip_timestamp(source));

    let mut writer = ZipWriter::new(out);
    writer.start_file(name, options)?;
    writer.write_all(data)?;
    writer.finish()?;
    Ok(())
}

/// Add a member to `archive`, creating the archive if needed.
///
/// `data = None` adds a directory entry. A member with the same name is
/// replaced through a staged rewrite of the whole archive.
pub fn add_or_replace_member(
    archive: &Path,
    name: &str,
    data: Option<&[u8]>,
    source: &Path,
) -> Result<(), OptimizeError> {
    let options = stored_options(source);

    if !archive.exists() {
        let file = OpenOptions::new().write(true).create_new(true).open(archive)?;
        let mut writer = ZipWriter::new(file);
        write_member(&mut writer, name, data, options)?;
        writer.finish()?;
        return Ok(());
    }

    let mut existing = ZipArchive::new(File::open(archive)?)?;
    let duplicate = existing.file_names().any(|n| n == name);

    if !duplicate {
        let file = OpenOptions::new().read(true).write(true).open(archive)?;
        let mut writer = ZipWriter::new_append(file)?;
        write_member(&mut writer, name, data, options)?;
        writer.finish()?;
        return Ok(());
    }

    debug!("Replacing member {} in {}", name, archive.display());
    let mut staged = staging_file(archive)?;
    {
        let mut writer = ZipWriter::new(staged.as_file_mut());
        for i in 0..existing.len() {
            let entry = existing.by_index(i)?;
            if entry.name() != name {
                writer.raw_copy_file(entry)?;
            }
        }
        write_member(&mut writer, name, data, options)?;
        writer.finish()?;
    }
    drop(existing);
    staging::copy_permissions(archive, staged.path())?;
    staged
        .persist(archive)
        .map_err(|e| OptimizeError::Io(e.error))?;
    Ok(())
}

fn write_member<W: Write + Seek>(
    writer: &mut ZipWriter<W>,
    name: &str,
    data: Option<&[u8]>,
    options: FileOptions,
) -> Result<(), OptimizeError> {
    match data {
        Some(data) => {
            writer.start_file(name, options)?;
            writer.write_all(data)?;
        }
        None => writer.add_directory(name, options)?,
    }
    Ok(())
}

fn staging_file(archive: &Path) -> Result<NamedTempFile, OptimizeError> {
    let dir = match archive.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    Ok(NamedTempFile::new_in(dir)?)
}

/// Recompress every member of `archive` at the best Deflate level.
///
/// PNG and JPEG members go through the dispatcher first (internal mode, no
/// counters). The rewritten archive replaces the original only when smaller.
/// Returns the number of file members processed.
pub fn recompress_archive(archive: &Path, dispatcher: &Dispatcher<'_>) -> Result<usize, OptimizeError> {
    let mut source = ZipArchive::new(File::open(archive)?)?;
    let scratch = tempfile::tempdir()?;
    let mut staged = staging_file(archive)?;
    let mut touched = 0;

    {
        let mut writer = ZipWriter::new(staged.as_file_mut());
        for i in 0..source.len() {
            let mut entry = source.by_index(i)?;
            let name = entry.name().to_string();
            let mut options = FileOptions::default().last_modified_time(entry.last_modified());
            if let Some(mode) = entry.unix_mode() {
                options = options.unix_permissions(mode);
            }

            if entry.is_dir() {
                writer.add_directory(name, options)?;
                continue;
            }

            let mut data = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut data)?;
            drop(entry);

            let data = optimize_member(&name, i, data, scratch.path(), dispatcher);
            let options = if data.is_empty() {
                options.compression_method(CompressionMethod::Stored)
            } else {
                options
                    .compression_method(CompressionMethod::Deflated)
                    .compression_level(Some(BEST_LEVEL))
            };

            writer.start_file(name, options)?;
            writer.write_all(&data)?;
            touched += 1;
        }
        writer.finish()?;
    }
    drop(source);

    let staged = staged.into_temp_path();
    match staging::replace_if_smaller(&staged, archive)? {
        Settled::Replaced => debug!("Recompressed {} ({} members)", archive.display(), touched),
        Settled::Discarded => debug!("Recompressed {} was not smaller, kept original", archive.display()),
    }
    Ok(touched)
}

/// Run an image member through the dispatcher; any failure keeps the original bytes
fn optimize_member(
    name: &str,
    index: usize,
    data: Vec<u8>,
    scratch: &Path,
    dispatcher: &Dispatcher<'_>,
) -> Vec<u8> {
    let ext = match Path::new(name).extension() {
        Some(ext) => ext.to_string_lossy().into_owned(),
        None => return data,
    };
    let path = scratch.join(format!("member{}.{}", index, ext));
    let task = FileTask::new(path.clone(), dispatcher.config());
    if !matches!(task.kind, FileKind::Png | FileKind::Jpeg) {
        return data;
    }

    if let Err(e) = fs::write(&path, &data) {
        warn!("{}: can't stage archive member: {}", name, e);
        return data;
    }

    let optimized = match dispatcher.dispatch(&task, true) {
        Ok(Outcome::Optimized { original, optimized }) => {
            debug!("{}: member {} -> {} bytes", name, original, optimized);
            fs::read(&path).ok()
        }
        Ok(Outcome::Skipped) => None,
        Err(e) => {
            warn!("{}: member left as is: {}", name, e);
            None
        }
    };
    let _ = fs::remove_file(&path);

    match optimized {
        Some(bytes) if bytes.len() <= data.len() => bytes,
        _ => data,
    }
}

/// Names of all members, in archive order
pub fn member_names(archive: &Path) -> Result<Vec<String>, OptimizeError> {
    let archive = ZipArchive::new(File::open(archive)?)?;
    Ok(archive.file_names().map(str::to_string).collect())
}

/// Read a member's bytes
pub fn read_member(archive: &Path, name: &str) -> Result<Vec<u8>, OptimizeError> {
    let mut archive = ZipArchive::new(File::open(archive)?)?;
    let mut entry = archive.by_name(name)?;
    let mut data = Vec::new();
    entry.read_to_end(&mut data)?;
    Ok(data)
}

/// Archive size after all operations, for the savings report
pub fn archive_size(archive: &Path) -> u64 {
    FileManager::file_size(archive).unwrap_or(0)
}
