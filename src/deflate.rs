//! # Deflate Codec Adapter
//!
//! Adattatore sottile verso l'encoder Deflate/Gzip esterno (`flate2`).
//!
//! ## Responsabilità:
//! - `classify_gzip()`: distingue file non gzip, gzip semplici e gzip con metadata
//! - `decompress_gzip()`: estrae il payload di uno stream gzip (anche multi-member)
//! - `compress_to_gzip_or_zip()`: comprime un file in un nuovo `.gz` o `.zip`
//!
//! Gli output vengono sempre creati con `create_new`: un file già presente non
//! viene mai sovrascritto, e un output parziale viene rimosso in caso di errore.

use crate::archive;
use crate::error::OptimizeError;
use crate::staging;
use flate2::read::MultiGzDecoder;
use flate2::{Compression, GzBuilder};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const METHOD_DEFLATE: u8 = 8;
const HEADER_LEN: usize = 10;

const FLAG_EXTRA: u8 = 1 << 2;
const FLAG_NAME: u8 = 1 << 3;
const FLAG_COMMENT: u8 = 1 << 4;

/// What a gzip header says about a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GzipKind {
    NotGzip,
    /// No optional header fields, safely reversible
    Simple,
    /// Carries an extra field, original file name or comment
    Complex,
}

/// Inspect the gzip header of `path`
pub fn classify_gzip(path: &Path) -> Result<GzipKind, OptimizeError> {
    let file = File::open(path).map_err(|e| OptimizeError::unreadable(path, e))?;

    let mut header = Vec::with_capacity(HEADER_LEN);
    file.take(HEADER_LEN as u64)
        .read_to_end(&mut header)
        .map_err(|e| OptimizeError::unreadable(path, e))?;

    if header.len() < HEADER_LEN || header[..2] != GZIP_MAGIC || header[2] != METHOD_DEFLATE {
        return Ok(GzipKind::NotGzip);
    }

    if header[3] & (FLAG_EXTRA | FLAG_NAME | FLAG_COMMENT) != 0 {
        Ok(GzipKind::Complex)
    } else {
        Ok(GzipKind::Simple)
    }
}

/// Decompress the gzip stream at `path` into a new file at `output`
pub fn decompress_gzip(path: &Path, output: &Path) -> Result<(), OptimizeError> {
    let input = File::open(path).map_err(|e| OptimizeError::unreadable(path, e))?;
    let out = create_new(output)?;

    let result = (|| {
        let mut decoder = MultiGzDecoder::new(BufReader::new(input));
        let mut writer = BufWriter::new(out);
        io::copy(&mut decoder, &mut writer)?;
        writer.flush()
    })();

    result.map_err(|e| {
        let _ = fs::remove_file(output);
        OptimizeError::codec(path, format!("gzip decompression failed: {}", e))
    })
}

/// Deflate level used for an effort level
pub fn deflate_level(effort: u8) -> u32 {
    (5 + u32::from(effort)).min(9)
}

/// Compress `path` into a gzip stream or a single-member ZIP archive.
///
/// Without an explicit `output` the result goes next to the input, with
/// `.gz` or `.zip` appended to the full file name. Returns the output path.
pub fn compress_to_gzip_or_zip(
    path: &Path,
    output: Option<&Path>,
    effort: u8,
    as_zip: bool,
) -> Result<PathBuf, OptimizeError> {
    let output = match output {
        Some(output) => output.to_path_buf(),
        None => staging::sidecar(path, if as_zip { ".zip" } else { ".gz" }),
    };
    let level = deflate_level(effort);
    debug!(
        "Compressing {} -> {} (deflate level {})",
        path.display(),
        output.display(),
        level
    );

    if as_zip {
        let data = fs::read(path).map_err(|e| OptimizeError::unreadable(path, e))?;
        let out = create_new(&output)?;
        return archive::write_single_member(out, path, &data, level)
            .map(|_| output.clone())
            .map_err(|e| {
                let _ = fs::remove_file(&output);
                e
            });
    }

    let input = File::open(path).map_err(|e| OptimizeError::unreadable(path, e))?;
    let out = create_new(&output)?;

    let result = (|| {
        let mut reader = BufReader::new(input);
        let mut encoder = GzBuilder::new().write(BufWriter::new(out), Compression::new(level));
        io::copy(&mut reader, &mut encoder)?;
        encoder.finish()?.flush()
    })();

    match result {
        Ok(()) => Ok(output),
        Err(e) => {
            let _ = fs::remove_file(&output);
            Err(OptimizeError::codec(path, format!("gzip compression failed: {}", e)))
        }
    }
}

fn create_new(path: &Path) -> Result<File, OptimizeError> {
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| match e.kind() {
            io::ErrorKind::AlreadyExists => OptimizeError::conflict(path),
            _ => OptimizeError::Io(e),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use tempfile::TempDir;

    fn write_gzip(path: &Path, data: &[u8], name: Option<&str>) {
        let builder = match name {
            Some(name) => GzBuilder::new().filename(name),
            None => GzBuilder::new(),
        };
        let mut encoder = builder.write(File::create(path).unwrap(), Compression::fast());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap();
    }

    #[test]
    fn test_classify_gzip() {
        let dir = TempDir::new().unwrap();
        let simple = dir.path().join("simple.gz");
        let named = dir.path().join("named.gz");
        let plain = dir.path().join("plain.txt");
        let tiny = dir.path().join("tiny");
        write_gzip(&simple, b"hello", None);
        write_gzip(&named, b"hello", Some("hello.txt"));
        fs::write(&plain, b"just some text").unwrap();
        fs::write(&tiny, [0x1f, 0x8b]).unwrap();

        assert_eq!(classify_gzip(&simple).unwrap(), GzipKind::Simple);
        assert_eq!(classify_gzip(&named).unwrap(), GzipKind::Complex);
        assert_eq!(classify_gzip(&plain).unwrap(), GzipKind::NotGzip);
        assert_eq!(classify_gzip(&tiny).unwrap(), GzipKind::NotGzip);

        let missing = classify_gzip(&dir.path().join("missing.gz")).unwrap_err();
        assert_eq!(missing.code(), OptimizeError::PATH_UNREADABLE);
    }

    #[test]
    fn test_extra_or_comment_alone_is_complex() {
        let dir = TempDir::new().unwrap();
        let extra = dir.path().join("extra.gz");
        let comment = dir.path().join("comment.gz");

        let mut encoder = GzBuilder::new()
            .extra(vec![b'A', b'B', 2, 0, 1, 2])
            .write(File::create(&extra).unwrap(), Compression::fast());
        encoder.write_all(b"hello").unwrap();
        encoder.finish().unwrap();

        let mut encoder = GzBuilder::new()
            .comment("nightly export")
            .write(File::create(&comment).unwrap(), Compression::fast());
        encoder.write_all(b"hello").unwrap();
        encoder.finish().unwrap();

        assert_eq!(classify_gzip(&extra).unwrap(), GzipKind::Complex);
        assert_eq!(classify_gzip(&comment).unwrap(), GzipKind::Complex);
    }

    #[test]
    fn test_gzip_compress_then_decompress() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("log.txt");
        let payload = b"line of log\n".repeat(500);
        fs::write(&input, &payload).unwrap();

        let gz = compress_to_gzip_or_zip(&input, None, 3, false).unwrap();
        assert_eq!(gz, dir.path().join("log.txt.gz"));
        assert!(fs::metadata(&gz).unwrap().len() < payload.len() as u64);
        assert_eq!(classify_gzip(&gz).unwrap(), GzipKind::Simple);

        let restored = dir.path().join("restored");
        decompress_gzip(&gz, &restored).unwrap();
        assert_eq!(fs::read(&restored).unwrap(), payload);
    }

    #[test]
    fn test_decompress_multi_member() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("multi.gz");
        let mut bytes = Vec::new();
        for part in [&b"first "[..], &b"second"[..]] {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(part).unwrap();
            bytes.extend(encoder.finish().unwrap());
        }
        fs::write(&path, bytes).unwrap();

        let out = dir.path().join("multi");
        decompress_gzip(&path, &out).unwrap();
        assert_eq!(fs::read(&out).unwrap(), b"first second");
    }

    #[test]
    fn test_corrupt_gzip_leaves_no_output() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.gz");
        fs::write(&path, [0x1f, 0x8b, 8, 0, 0, 0, 0, 0, 0, 3, 0xff, 0xff, 0xff]).unwrap();

        let out = dir.path().join("broken.gz.ungz");
        let err = decompress_gzip(&path, &out).unwrap_err();
        assert_eq!(err.code(), OptimizeError::CODEC_FAILURE);
        assert!(!out.exists());
    }

    #[test]
    fn test_compress_refuses_existing_output() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("a.txt");
        fs::write(&input, b"data").unwrap();
        fs::write(dir.path().join("a.txt.gz"), b"someone else's").unwrap();

        let err = compress_to_gzip_or_zip(&input, None, 3, false).unwrap_err();
        assert_eq!(err.code(), OptimizeError::CONFLICTING_OUTPUT);
        assert_eq!(fs::read(dir.path().join("a.txt.gz")).unwrap(), b"someone else's");
    }

    #[test]
    fn test_deflate_level_mapping() {
        assert_eq!(deflate_level(1), 6);
        assert_eq!(deflate_level(3), 8);
        assert_eq!(deflate_level(9), 9);
    }
}
