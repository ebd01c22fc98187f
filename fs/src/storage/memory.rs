use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use super::{list_children, FileTable, MountableStorage, MEMORY_STORAGE_PRIORITY};
use crate::stream::{AccessMode, MemoryStream, Stream};
use crate::{FsError, FsResult, PathConfig};

static NEXT_STORAGE_ID: AtomicU64 = AtomicU64::new(1);

/// In-memory storage for tests and embedded assets.
///
/// Thread-safe and mutable even after being mounted in a
/// [`Vfs`](crate::Vfs): clones share the same contents and open files.
/// Files opened for writing commit their bytes back into the map on every
/// flush and when they are closed.
///
/// Directories are implicit: they exist whenever a file path contains
/// that directory prefix.
///
/// # Example
///
/// ```ignore
/// let mem = MemoryStorage::new("builtin", &PathConfig::default());
/// mem.insert("shaders/basic.wgsl", shader_bytes);
///
/// let vfs = Vfs::default();
/// vfs.mount_storage(Arc::new(mem), "/builtin/", 0)?;
/// ```
#[derive(Clone)]
pub struct MemoryStorage {
    base: String,
    separator: char,
    contents: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    files: Arc<Mutex<FileTable>>,
}

impl MemoryStorage {
    /// Create an empty storage. Its canonical paths start with
    /// `mem://{id}/{name}/`, where `id` is unique to this instance and shared
    /// by its clones.
    pub fn new(name: &str, paths: &PathConfig) -> Self {
        let id = NEXT_STORAGE_ID.fetch_add(1, Ordering::Relaxed);
        Self {
            base: format!(
                "mem://{id}{}{}",
                paths.separator,
                paths.normalize(name, true)
            ),
            separator: paths.separator,
            contents: Arc::new(RwLock::new(HashMap::new())),
            files: Arc::new(Mutex::new(FileTable::new())),
        }
    }

    /// Insert a file, replacing any existing content at the same path.
    pub fn insert(&self, local: impl Into<String>, data: Vec<u8>) {
        self.contents.write().insert(local.into(), data);
    }

    /// Remove a file, returning its data if it existed.
    pub fn remove(&self, local: &str) -> Option<Vec<u8>> {
        self.contents.write().remove(local)
    }

    /// Copy of a file's current content.
    pub fn get(&self, local: &str) -> Option<Vec<u8>> {
        self.contents.read().get(local).cloned()
    }

    pub fn len(&self) -> usize {
        self.contents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.contents.read().is_empty()
    }

    fn dir_prefix(&self, local: &str) -> String {
        let trimmed = local.trim_end_matches(self.separator);
        if trimmed.is_empty() {
            String::new()
        } else {
            format!("{trimmed}{}", self.separator)
        }
    }
}

impl MountableStorage for MemoryStorage {
    fn base_path(&self) -> &str {
        &self.base
    }

    fn priority(&self) -> u32 {
        MEMORY_STORAGE_PRIORITY
    }

    fn is_read_only(&self) -> bool {
        false
    }

    fn file_exists(&self, local: &str) -> bool {
        self.contents.read().contains_key(local)
    }

    fn dir_exists(&self, local: &str) -> bool {
        let prefix = self.dir_prefix(local);
        prefix.is_empty() || self.contents.read().keys().any(|key| key.starts_with(&prefix))
    }

    fn list_dir(&self, local: &str) -> FsResult<Vec<String>> {
        let prefix = self.dir_prefix(local);
        let contents = self.contents.read();
        Ok(list_children(
            contents.keys().map(String::as_str),
            &prefix,
            self.separator,
        ))
    }

    fn create_stream(&self, local: &str, mode: AccessMode) -> FsResult<Box<dyn Stream>> {
        let name = self.canonical_path(local);
        match mode {
            AccessMode::Read => {
                let data = self
                    .get(local)
                    .ok_or_else(|| FsError::NotFound(name.clone()))?;
                Ok(Box::new(MemoryStream::reader(name, data)))
            }
            AccessMode::Write => {
                let contents = self.contents.clone();
                let key = local.to_owned();
                let stream = MemoryStream::writer(name).with_commit(move |bytes| {
                    contents.write().insert(key.clone(), bytes.to_vec());
                });
                Ok(Box::new(stream))
            }
        }
    }

    fn create_new_file(&self, local: &str) -> FsResult<()> {
        self.contents
            .write()
            .entry(local.to_owned())
            .or_default();
        Ok(())
    }

    fn remove_file(&self, local: &str) -> FsResult<()> {
        self.remove(local)
            .map(|_| ())
            .ok_or_else(|| FsError::NotFound(self.canonical_path(local)))
    }

    fn files(&self) -> &Mutex<FileTable> {
        &self.files
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::{FileFactory, FileTypeId};

    fn storage() -> MemoryStorage {
        MemoryStorage::new("test", &PathConfig::default())
    }

    #[test]
    fn canonical_paths_are_prefixed() {
        let mem = storage();
        let base = mem.base_path();
        assert!(base.starts_with("mem://"));
        assert!(base.ends_with("/test/"));
        assert_eq!(mem.canonical_path("a/b.txt"), format!("{base}a/b.txt"));
        assert_eq!(mem.clone().base_path(), base);
    }

    #[test]
    fn instances_with_same_name_have_distinct_handles() {
        let first = storage();
        let second = storage();
        assert_ne!(first.base_path(), second.base_path());

        first.insert("x.txt", b"first".to_vec());
        second.insert("x.txt", b"second".to_vec());
        let a = first
            .open_file(FileTypeId::BINARY_READER, FileFactory::reader(), "x.txt", false)
            .unwrap();
        let b = second
            .open_file(FileTypeId::BINARY_READER, FileFactory::reader(), "x.txt", false)
            .unwrap();
        assert_ne!(a.handle(), b.handle());
        assert_eq!(b.read_all().unwrap(), b"second");
    }

    #[test]
    fn exists_and_remove() {
        let mem = storage();
        mem.insert("file.txt", b"data".to_vec());
        assert!(mem.file_exists("file.txt"));
        assert!(!mem.file_exists("nope.txt"));

        mem.remove_file("file.txt").unwrap();
        assert!(!mem.file_exists("file.txt"));
        assert!(mem.remove_file("file.txt").unwrap_err().is_not_found());
    }

    #[test]
    fn list_dir_root() {
        let mem = storage();
        mem.insert("a.txt", vec![]);
        mem.insert("b/c.txt", vec![]);
        mem.insert("b/d.txt", vec![]);
        assert_eq!(mem.list_dir("").unwrap(), vec!["a.txt", "b"]);
    }

    #[test]
    fn list_dir_nested() {
        let mem = storage();
        mem.insert("dir/a.txt", vec![]);
        mem.insert("dir/sub/b.txt", vec![]);
        assert_eq!(mem.list_dir("dir/").unwrap(), vec!["a.txt", "sub"]);
        assert!(mem.dir_exists("dir"));
        assert!(mem.dir_exists("dir/sub"));
        assert!(!mem.dir_exists("di"));
    }

    #[test]
    fn list_dir_empty() {
        let mem = storage();
        assert!(mem.list_dir("nonexistent").unwrap().is_empty());
    }

    #[test]
    fn written_file_is_committed_on_close() {
        let mem = storage();
        let entry = mem
            .open_file(FileTypeId::BINARY_WRITER, FileFactory::writer(), "new.bin", true)
            .unwrap();
        assert_eq!(mem.get("new.bin").unwrap(), b"");

        entry.write_all(b"hello").unwrap();
        mem.close_file(entry.handle()).unwrap();
        assert_eq!(mem.get("new.bin").unwrap(), b"hello");
    }

    #[test]
    fn clones_share_contents() {
        let mem = storage();
        let other = mem.clone();
        mem.insert("shared.txt", b"x".to_vec());
        assert!(other.file_exists("shared.txt"));
        assert_eq!(other.len(), 1);
    }
}
