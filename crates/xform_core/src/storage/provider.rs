use std::fmt::Debug;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Seek, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::{debug, trace};
use xform_error::{DbError, Result};

/// A readable, seekable byte stream.
pub trait ReadStream: Read + Seek + Send + Debug {}

impl<T: Read + Seek + Send + Debug> ReadStream for T {}

/// Supplies byte streams for table files.
///
/// Paths are relative to the provider's root and use `/` as the separator.
pub trait StreamProvider: Debug + Send + Sync {
    fn open_read(&self, path: &str) -> Result<Box<dyn ReadStream>>;

    /// Open a stream for appending, creating the file and any parent folders
    /// if needed.
    fn open_append(&self, path: &str) -> Result<Box<dyn Write + Send>>;

    /// Open a stream that replaces any existing file.
    fn create(&self, path: &str) -> Result<Box<dyn Write + Send>>;

    /// Size of a file in bytes, None if it doesn't exist.
    fn size(&self, path: &str) -> Result<Option<u64>>;

    /// Names of the folders directly under `path`. Empty if `path` doesn't
    /// exist.
    fn list_folders(&self, path: &str) -> Result<Vec<String>>;

    /// Recursively delete a folder if it exists.
    fn delete_folder(&self, path: &str) -> Result<()>;
}

/// Stream provider over a local directory.
#[derive(Debug, Clone)]
pub struct LocalFileStreamProvider {
    root: PathBuf,
}

impl LocalFileStreamProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        LocalFileStreamProvider { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let mut full = self.root.clone();
        full.extend(path.split('/').filter(|part| !part.is_empty()));
        full
    }
}

impl StreamProvider for LocalFileStreamProvider {
    fn open_read(&self, path: &str) -> Result<Box<dyn ReadStream>> {
        let full = self.resolve(path);
        trace!(path = %full.display(), "opening for read");
        let file = File::open(&full).map_err(|e| io_error("Failed to open file", &full, e))?;
        Ok(Box::new(file))
    }

    fn open_append(&self, path: &str) -> Result<Box<dyn Write + Send>> {
        let full = self.resolve(path);
        create_parent(&full)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&full)
            .map_err(|e| io_error("Failed to open file for append", &full, e))?;
        Ok(Box::new(BufWriter::new(file)))
    }

    fn create(&self, path: &str) -> Result<Box<dyn Write + Send>> {
        let full = self.resolve(path);
        create_parent(&full)?;
        let file = File::create(&full).map_err(|e| io_error("Failed to create file", &full, e))?;
        Ok(Box::new(BufWriter::new(file)))
    }

    fn size(&self, path: &str) -> Result<Option<u64>> {
        let full = self.resolve(path);
        match fs::metadata(&full) {
            Ok(metadata) => Ok(Some(metadata.len())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error("Failed to stat file", &full, e)),
        }
    }

    fn list_folders(&self, path: &str) -> Result<Vec<String>> {
        let full = self.resolve(path);
        let entries = match fs::read_dir(&full) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error("Failed to read directory", &full, e)),
        };

        let mut folders = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| io_error("Failed to get entry", &full, e))?;
            if entry.path().is_dir() {
                folders.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        folders.sort();

        Ok(folders)
    }

    fn delete_folder(&self, path: &str) -> Result<()> {
        let full = self.resolve(path);
        match fs::remove_dir_all(&full) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error("Failed to delete folder", &full, e)),
        }
    }
}

fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| io_error("Failed to create folder", parent, e))?;
    }
    Ok(())
}

fn io_error(msg: &'static str, path: &Path, err: io::Error) -> DbError {
    DbError::io(msg)
        .with_field("path", path.display())
        .with_source(Box::new(err))
}

/// Version folder names are UTC timestamps in this format.
pub const VERSION_FORMAT: &str = "%Y.%m.%d %H.%M.%SZ";

/// Crawl type for complete table versions.
pub const FULL_CRAWL: &str = "Full";

pub fn format_version(as_of: i64) -> Result<String> {
    let dt = DateTime::<Utc>::from_timestamp_micros(as_of)
        .ok_or_else(|| DbError::usage("As-of time out of range").with_field("as_of", as_of))?;
    Ok(dt.format(VERSION_FORMAT).to_string())
}

pub fn parse_version(name: &str) -> Option<i64> {
    NaiveDateTime::parse_from_str(name, VERSION_FORMAT)
        .ok()
        .map(|dt| dt.and_utc().timestamp_micros())
}

/// Folder holding all versions of a table for a crawl type.
pub fn table_folder(name: &str, crawl: &str) -> String {
    format!("Table/{name}/{crawl}")
}

/// Find the path of the latest version of a table at or before `as_of`.
///
/// Each version is resolved on its own. Incremental crawls that only make
/// sense on top of the last full version aren't combined; `read` and `write`
/// only use the `Full` crawl.
pub fn resolve_table_version(
    provider: &dyn StreamProvider,
    name: &str,
    crawl: &str,
    as_of: i64,
) -> Result<String> {
    let folder = table_folder(name, crawl);
    let versions = provider.list_folders(&folder)?;

    let latest = versions
        .iter()
        .filter_map(|v| parse_version(v).map(|ts| (ts, v)))
        .filter(|(ts, _)| *ts <= as_of)
        .max_by_key(|(ts, _)| *ts);

    match latest {
        Some((_, version)) => {
            let path = format!("{folder}/{version}");
            debug!(%name, %path, "resolved table version");
            Ok(path)
        }
        None => {
            let err = if versions.is_empty() {
                DbError::io(format!("Table '{name}' not found"))
            } else {
                DbError::io(format!("Table '{name}' has no version at or before the as-of time"))
                    .with_field("versions", versions.join(", "))
            };
            Err(err.with_field("folder", folder))
        }
    }
}
