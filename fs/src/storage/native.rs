use std::fs;
use std::path::PathBuf;

use parking_lot::Mutex;

use super::{FileTable, MountableStorage, NATIVE_STORAGE_PRIORITY};
use crate::stream::{AccessMode, FileStream, Stream};
use crate::{FsError, FsResult, PathConfig};

/// Storage backed by a directory on disk.
///
/// The local path is appended to the root to form the actual filesystem
/// path. All I/O is blocking `std::fs` on the caller's thread.
///
/// # Example
///
/// ```ignore
/// let vfs = Vfs::default();
/// vfs.mount_physical("./assets", "/assets/", 0)?;
///
/// // Opens ./assets/textures/brick.png
/// let handle = vfs.open(FileTypeId::BINARY_READER, "/assets/textures/brick.png", false)?;
/// ```
pub struct NativeStorage {
    base: String,
    files: Mutex<FileTable>,
}

impl NativeStorage {
    /// Create a storage rooted at `root`.
    ///
    /// The directory does not need to exist yet; it is checked when files
    /// are opened.
    pub fn new(root: &str, paths: &PathConfig) -> FsResult<Self> {
        paths.validate(root)?;
        Ok(Self {
            base: paths.normalize(root, true),
            files: Mutex::new(FileTable::new()),
        })
    }

    fn resolve(&self, local: &str) -> PathBuf {
        PathBuf::from(self.canonical_path(local))
    }
}

impl MountableStorage for NativeStorage {
    fn base_path(&self) -> &str {
        &self.base
    }

    fn priority(&self) -> u32 {
        NATIVE_STORAGE_PRIORITY
    }

    fn is_read_only(&self) -> bool {
        false
    }

    fn file_exists(&self, local: &str) -> bool {
        self.resolve(local).is_file()
    }

    fn dir_exists(&self, local: &str) -> bool {
        self.resolve(local).is_dir()
    }

    fn list_dir(&self, local: &str) -> FsResult<Vec<String>> {
        let full_path = self.resolve(local);
        if !full_path.is_dir() {
            return Ok(Vec::new());
        }
        let mut entries = Vec::new();
        for entry in fs::read_dir(full_path)? {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str() {
                entries.push(name.to_owned());
            }
        }
        entries.sort();
        Ok(entries)
    }

    fn create_stream(&self, local: &str, mode: AccessMode) -> FsResult<Box<dyn Stream>> {
        Ok(Box::new(FileStream::open(self.resolve(local), mode)?))
    }

    fn create_new_file(&self, local: &str) -> FsResult<()> {
        let full_path = self.resolve(local);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(full_path)?;
        Ok(())
    }

    fn remove_file(&self, local: &str) -> FsResult<()> {
        let full_path = self.resolve(local);
        if !full_path.is_file() {
            return Err(FsError::NotFound(self.canonical_path(local)));
        }
        fs::remove_file(full_path)?;
        Ok(())
    }

    fn files(&self) -> &Mutex<FileTable> {
        &self.files
    }
}
