use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use parking_lot::Mutex;

use super::{list_children, FileTable, MountableStorage, PACKAGE_STORAGE_PRIORITY};
use crate::package::PackageReader;
use crate::stream::{AccessMode, MemoryStream, RangeStream, Stream};
use crate::{FsError, FsResult, PathConfig};

/// Read-only storage backed by a package container.
///
/// Uncompressed entries are served as a window into the package file;
/// compressed entries are inflated into memory when opened. Canonical paths
/// are the package path followed by the entry name.
pub struct PackageStorage {
    base: String,
    separator: char,
    path: PathBuf,
    reader: Mutex<PackageReader<BufReader<File>>>,
    files: Mutex<FileTable>,
}

impl PackageStorage {
    /// Open the package at `path` and parse its file table.
    pub fn open(path: &str, paths: &PathConfig) -> FsResult<Self> {
        paths.validate(path)?;
        let normalized = paths.normalize(path, false);
        let reader = PackageReader::open(BufReader::new(File::open(&normalized)?))?;
        Ok(Self {
            base: paths.normalize(&normalized, true),
            separator: paths.separator,
            path: PathBuf::from(normalized),
            reader: Mutex::new(reader),
            files: Mutex::new(FileTable::new()),
        })
    }

    /// Number of entries in the package.
    pub fn entry_count(&self) -> usize {
        self.reader.lock().len()
    }
}

impl MountableStorage for PackageStorage {
    fn base_path(&self) -> &str {
        &self.base
    }

    fn priority(&self) -> u32 {
        PACKAGE_STORAGE_PRIORITY
    }

    fn file_exists(&self, local: &str) -> bool {
        self.reader.lock().contains(local)
    }

    fn dir_exists(&self, local: &str) -> bool {
        let trimmed = local.trim_end_matches(self.separator);
        if trimmed.is_empty() {
            return true;
        }
        let prefix = format!("{trimmed}{}", self.separator);
        self.reader
            .lock()
            .entries()
            .iter()
            .any(|entry| entry.name.starts_with(&prefix))
    }

    fn list_dir(&self, local: &str) -> FsResult<Vec<String>> {
        let trimmed = local.trim_end_matches(self.separator);
        let prefix = if trimmed.is_empty() {
            String::new()
        } else {
            format!("{trimmed}{}", self.separator)
        };
        let reader = self.reader.lock();
        Ok(list_children(
            reader.entries().iter().map(|entry| entry.name.as_str()),
            &prefix,
            self.separator,
        ))
    }

    fn create_stream(&self, local: &str, mode: AccessMode) -> FsResult<Box<dyn Stream>> {
        if mode == AccessMode::Write {
            return Err(FsError::Unsupported(format!(
                "package {} is read-only",
                self.base
            )));
        }

        let name = self.canonical_path(local);
        let mut reader = self.reader.lock();
        let entry = reader
            .entry(local)
            .cloned()
            .ok_or_else(|| FsError::NotFound(name.clone()))?;

        if entry.is_compressed {
            let data = reader.read_file_bytes(local)?;
            return Ok(Box::new(MemoryStream::reader(name, data)));
        }
        let start = reader.base() + entry.data_offset;
        Ok(Box::new(RangeStream::open(
            name,
            &self.path,
            start,
            entry.data_size,
        )?))
    }

    fn on_mounted(&self, alias: &str) {
        log::info!(
            "Package {} mounted at {} with {} entries",
            self.path.display(),
            alias,
            self.entry_count()
        );
    }

    fn files(&self) -> &Mutex<FileTable> {
        &self.files
    }
}
