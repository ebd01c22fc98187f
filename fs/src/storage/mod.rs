//! Storage backends that can be mounted into a [`Vfs`](crate::Vfs).
//!
//! A storage owns one physical root (a directory on disk, a package
//! container, or an in-memory map) together with the table of files it
//! currently has open. Backends implement the hooks of
//! [`MountableStorage`]; opening, closing and handle bookkeeping are provided
//! by the trait and shared by every backend.

mod file_table;
mod memory;
mod native;
mod package;

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::Mutex;

pub use file_table::FileTable;
pub use memory::MemoryStorage;
pub use native::NativeStorage;
pub use package::PackageStorage;

use crate::file::{FileEntry, FileFactory, FileHandle, FileTypeId};
use crate::stream::{AccessMode, Stream};
use crate::{FsError, FsResult};

/// Base priority of [`NativeStorage`]. Lower values win.
pub const NATIVE_STORAGE_PRIORITY: u32 = 0;
/// Base priority of [`MemoryStorage`].
pub const MEMORY_STORAGE_PRIORITY: u32 = 50;
/// Base priority of [`PackageStorage`].
pub const PACKAGE_STORAGE_PRIORITY: u32 = 100;

/// A backend that can be mounted under an alias.
///
/// # Path Contract
///
/// `local` paths passed to the hooks are relative to the storage root and
/// already normalized by the router: canonical separators, no leading
/// separator.
///
/// # Read vs Write
///
/// `create_new_file` and `remove_file` default to
/// [`FsError::Unsupported`]. Writable backends override them and return
/// `false` from [`is_read_only`](MountableStorage::is_read_only).
pub trait MountableStorage: Send + Sync {
    // --- Backend hooks ---

    /// Physical root of the storage, ending with a separator.
    fn base_path(&self) -> &str;

    /// Base priority; the router adds the mount's relative priority.
    fn priority(&self) -> u32;

    fn is_read_only(&self) -> bool {
        true
    }

    fn file_exists(&self, local: &str) -> bool;

    fn dir_exists(&self, local: &str) -> bool;

    /// Names of the immediate children of a directory, sorted.
    fn list_dir(&self, local: &str) -> FsResult<Vec<String>>;

    /// Allocate the stream backing a newly opened file.
    fn create_stream(&self, local: &str, mode: AccessMode) -> FsResult<Box<dyn Stream>>;

    /// Create an empty file so that a following `create_stream` succeeds.
    fn create_new_file(&self, local: &str) -> FsResult<()> {
        Err(FsError::Unsupported(format!(
            "cannot create {local:?} in read-only storage {}",
            self.base_path()
        )))
    }

    fn remove_file(&self, local: &str) -> FsResult<()> {
        Err(FsError::Unsupported(format!(
            "cannot remove {local:?} from read-only storage {}",
            self.base_path()
        )))
    }

    /// Process-wide unique name of a local path. Handles are derived from it.
    fn canonical_path(&self, local: &str) -> String {
        format!("{}{}", self.base_path(), local)
    }

    /// Called once the router has registered the storage under `alias`.
    fn on_mounted(&self, _alias: &str) {}

    /// Table of the files this storage keeps open.
    fn files(&self) -> &Mutex<FileTable>;

    // --- Provided operations ---

    /// Open `local`, or add a reference if it is already open.
    ///
    /// Fails with [`FsError::NotFound`] if the file is missing and `create`
    /// is false, and with [`FsError::InvalidArgument`] if the file is open
    /// with a different access mode. A failed open leaves the file table
    /// unchanged.
    fn open_file(
        &self,
        type_id: FileTypeId,
        factory: FileFactory,
        local: &str,
        create: bool,
    ) -> FsResult<Arc<FileEntry>> {
        let canonical = self.canonical_path(local);
        let handle = FileHandle::from_canonical_path(&canonical);
        let mut files = self.files().lock();

        if let Some(entry) = files.get(handle) {
            assert!(
                entry.name() == canonical,
                "file handle collision: {:?} and {:?} both hash to {}",
                entry.name(),
                canonical,
                handle
            );
            if entry.access_mode() != factory.access_mode() {
                return Err(FsError::InvalidArgument(format!(
                    "{canonical} is already open as {:?}",
                    entry.access_mode()
                )));
            }
            entry.add_ref();
            return Ok(entry.clone());
        }

        if factory.is_writer() && self.is_read_only() {
            return Err(FsError::Unsupported(format!(
                "cannot open {canonical} for writing in read-only storage"
            )));
        }
        if !self.file_exists(local) {
            if !create {
                return Err(FsError::NotFound(canonical));
            }
            self.create_new_file(local)?;
        }

        let stream = self.create_stream(local, factory.access_mode())?;
        let entry = Arc::new(FileEntry::new(canonical, handle, type_id, stream));
        files.insert(entry.clone());
        Ok(entry)
    }

    /// Release one reference to an open file.
    ///
    /// Returns `true` when the file was actually closed.
    fn close_file(&self, handle: FileHandle) -> FsResult<bool> {
        let mut files = self.files().lock();
        let entry = files
            .get(handle)
            .cloned()
            .ok_or_else(|| FsError::NotFound(format!("no open file with handle {handle}")))?;
        if entry.release() {
            files.remove(handle);
            return Ok(true);
        }
        Ok(false)
    }

    fn close_path(&self, local: &str) -> FsResult<bool> {
        let handle = FileHandle::from_canonical_path(&self.canonical_path(local));
        self.close_file(handle)
    }

    fn get_file(&self, handle: FileHandle) -> FsResult<Arc<FileEntry>> {
        self.files()
            .lock()
            .get(handle)
            .cloned()
            .ok_or_else(|| FsError::NotFound(format!("no open file with handle {handle}")))
    }

    fn is_open(&self, handle: FileHandle) -> bool {
        self.files().lock().get(handle).is_some()
    }

    fn open_handles(&self) -> Vec<FileHandle> {
        self.files().lock().handles()
    }

    /// Close every open file. Returns the handles that were closed.
    fn close_all(&self) -> Vec<FileHandle> {
        let entries = self.files().lock().drain();
        entries
            .iter()
            .map(|entry| {
                entry.force_close();
                entry.handle()
            })
            .collect()
    }
}

/// Immediate children below `prefix` of a flat set of file names.
///
/// Used by backends whose directories are implicit in their file names.
/// `prefix` is empty for the root or ends with `separator`.
pub(crate) fn list_children<'a>(
    names: impl Iterator<Item = &'a str>,
    prefix: &str,
    separator: char,
) -> Vec<String> {
    let mut children = BTreeSet::new();
    for name in names {
        if let Some(rest) = name.strip_prefix(prefix) {
            let child = match rest.find(separator) {
                Some(pos) => &rest[..pos],
                None => rest,
            };
            if !child.is_empty() {
                children.insert(child.to_owned());
            }
        }
    }
    children.into_iter().collect()
}
