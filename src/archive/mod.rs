//! Archive codec: materializing uploads and packaging results.
//!
//! Three operations back every conversion pipeline:
//!
//! - [`extract`] - write an uploaded payload into a directory, either by
//!   unpacking it as a zip archive or by writing the bytes verbatim
//! - [`locate_entry_point`] - apply the exactly-one-match naming rule that
//!   picks the file a converter must be pointed at
//! - [`pack`] - zip a directory tree back into a byte stream
//!
//! The entry-point rule is deliberately strict: zero or multiple candidates
//! is an error, never a guess among matches.

use std::fs::{self, File};
use std::io::{self, Cursor, Write};
use std::path::{Path, PathBuf};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{ArchiveError, ArchiveResult};

/// Fallback file name for raw (non-archive) payloads without one.
const DEFAULT_PAYLOAD_NAME: &str = "payload.json";

/// An uploaded request body, immutable once received.
#[derive(Debug, Clone)]
pub struct InputPayload {
    /// Raw request bytes.
    pub bytes: Vec<u8>,
    /// Declared mimetype, parameters stripped.
    pub mimetype: String,
    /// Original filename, if the client sent one.
    pub filename: Option<String>,
}

impl InputPayload {
    pub fn new(bytes: Vec<u8>, mimetype: impl Into<String>) -> Self {
        Self {
            bytes,
            mimetype: mimetype.into(),
            filename: None,
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Filename reduced to its final component, guarding against
    /// path-traversal names from the client.
    fn safe_filename(&self) -> &str {
        self.filename
            .as_deref()
            .and_then(|name| Path::new(name).file_name())
            .and_then(|name| name.to_str())
            .unwrap_or(DEFAULT_PAYLOAD_NAME)
    }
}

// =============================================================================
// Entry-point disambiguation
// =============================================================================

/// Naming convention used to pick a single file out of an extracted set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryPattern {
    /// File name starts with the given prefix.
    Prefix(&'static str),
    /// File name ends with the given suffix.
    Suffix(&'static str),
    /// File name starts with the prefix and ends with the suffix
    /// (e.g. ISA-Tab investigation files `i_*.txt`).
    PrefixSuffix(&'static str, &'static str),
}

impl EntryPattern {
    pub fn matches(&self, file_name: &str) -> bool {
        match self {
            Self::Prefix(prefix) => file_name.starts_with(prefix),
            Self::Suffix(suffix) => file_name.ends_with(suffix),
            Self::PrefixSuffix(prefix, suffix) => {
                file_name.starts_with(prefix) && file_name.ends_with(suffix)
            }
        }
    }
}

impl std::fmt::Display for EntryPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Prefix(prefix) => write!(f, "{prefix}*"),
            Self::Suffix(suffix) => write!(f, "*{suffix}"),
            Self::PrefixSuffix(prefix, suffix) => write!(f, "{prefix}*{suffix}"),
        }
    }
}

/// Pick the single file matching `pattern` from `paths`.
///
/// Fails with [`ArchiveError::AmbiguousEntryPoint`] when zero or more than
/// one candidate matches. Callers must never guess among matches.
pub fn locate_entry_point(paths: &[PathBuf], pattern: &EntryPattern) -> ArchiveResult<PathBuf> {
    let mut candidates = paths.iter().filter(|path| {
        path.file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| pattern.matches(name))
    });

    match (candidates.next(), candidates.next()) {
        (Some(single), None) => Ok(single.clone()),
        (first, _) => {
            let matches = first.map_or(0, |_| 2) + candidates.count();
            Err(ArchiveError::AmbiguousEntryPoint {
                pattern: pattern.to_string(),
                matches,
            })
        }
    }
}

// =============================================================================
// Extraction
// =============================================================================

/// Materialize an uploaded payload into `into_dir`.
///
/// With `as_archive` the payload is unpacked as a zip archive; invalid zip
/// bytes fail with [`ArchiveError::Malformed`]. Otherwise the bytes are
/// written verbatim as a single file. Returns the extracted file paths
/// (directories are created but not reported).
pub fn extract(
    payload: &InputPayload,
    as_archive: bool,
    into_dir: &Path,
) -> ArchiveResult<Vec<PathBuf>> {
    if as_archive {
        extract_zip(&payload.bytes, into_dir)
    } else {
        let dest = into_dir.join(payload.safe_filename());
        fs::write(&dest, &payload.bytes)?;
        Ok(vec![dest])
    }
}

fn extract_zip(bytes: &[u8], into_dir: &Path) -> ArchiveResult<Vec<PathBuf>> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ArchiveError::Malformed(e.to_string()))?;

    let mut extracted = Vec::new();
    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| ArchiveError::Malformed(e.to_string()))?;
        // Zip-slip guard: reject entries that would escape the target dir.
        let relative = entry
            .enclosed_name()
            .ok_or_else(|| ArchiveError::Malformed(format!("unsafe entry name: {}", entry.name())))?;
        let dest = into_dir.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&dest)?;
        } else {
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut out = File::create(&dest)?;
            io::copy(&mut entry, &mut out)?;
            extracted.push(dest);
        }
    }
    Ok(extracted)
}

// =============================================================================
// Packing
// =============================================================================

/// Zip every regular file under `source_dir` into an in-memory archive.
///
/// Relative paths become entry names. Traversal order follows directory
/// listing order and is not guaranteed.
pub fn pack(source_dir: &Path) -> ArchiveResult<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = ZipWriter::new(&mut cursor);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        pack_dir(&mut writer, source_dir, source_dir, options)?;
        writer.finish()?;
    }
    Ok(cursor.into_inner())
}

fn pack_dir(
    writer: &mut ZipWriter<&mut Cursor<Vec<u8>>>,
    root: &Path,
    dir: &Path,
    options: SimpleFileOptions,
) -> ArchiveResult<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            pack_dir(writer, root, &path, options)?;
        } else {
            let name = path
                .strip_prefix(root)
                .unwrap_or(&path)
                .to_string_lossy()
                .replace('\\', "/");
            writer.start_file(name, options)?;
            let mut file = File::open(&path)?;
            io::copy(&mut file, writer)?;
        }
    }
    Ok(())
}

/// Delete files directly under `dir` whose names end with `suffix`.
///
/// Used to drop transient converter artifacts (e.g. `*_expanded.json`)
/// before packing an output directory.
pub fn remove_by_suffix(dir: &Path, suffix: &str) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_match = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.ends_with(suffix));
        if path.is_file() && is_match {
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

/// Collect every regular file under `dir`, recursively.
pub fn list_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    collect_files(dir, &mut files)?;
    Ok(files)
}

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(&path, files)?;
        } else {
            files.push(path);
        }
    }
    Ok(())
}

// =============================================================================
// Test helpers
// =============================================================================

/// Build a zip archive in memory from (name, contents) pairs.
///
/// Shared by tests across the crate; also handy for building fixtures.
#[doc(hidden)]
pub fn zip_from_entries(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = ZipWriter::new(&mut cursor);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        for (name, contents) in entries {
            writer
                .start_file(*name, options)
                .expect("start zip entry");
            writer.write_all(contents).expect("write zip entry");
        }
        writer.finish().expect("finish zip");
    }
    cursor.into_inner()
}
