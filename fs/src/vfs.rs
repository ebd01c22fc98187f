use std::collections::HashMap;
use std::io::{Seek, SeekFrom};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::archive::{BinaryArchiveReader, BinaryArchiveWriter};
use crate::file::{builtin_factories, FileEntry, FileFactory, FileHandle, FileTypeId};
use crate::storage::{MountableStorage, NativeStorage, PackageStorage};
use crate::{FsError, FsResult, PathConfig};

/// Snapshot of one mount, as returned by [`Vfs::mounts`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountInfo {
    pub alias: String,
    pub physical_path: String,
    /// Effective priority: storage base priority plus the mount's relative
    /// priority. Lower wins.
    pub priority: u32,
}

struct Mount {
    alias: String,
    priority: u32,
    storage: Arc<dyn MountableStorage>,
}

/// A storage that may serve a path, with the path local to that storage.
struct Candidate {
    storage: Arc<dyn MountableStorage>,
    local: String,
}

struct VfsState {
    /// Sorted by priority; a new mount goes before mounts of equal priority.
    mounts: Vec<Mount>,
    /// Owner of every open file.
    handles: HashMap<FileHandle, Arc<dyn MountableStorage>>,
    factories: HashMap<FileTypeId, FileFactory>,
}

struct VfsInner {
    paths: PathConfig,
    state: Mutex<VfsState>,
}

/// Virtual file system that routes paths to mounted storages.
///
/// Virtual paths start with the root marker and begin with a mount alias
/// (`/assets/textures/brick.png`). When several mounts can serve a path,
/// the one with the lowest priority value that has the file wins, and
/// among equal priorities the longest alias wins. Physical paths (under a
/// storage's base path) are routed the same way.
///
/// `Clone` is cheap (Arc internals). Thread-safe (`Send + Sync`).
///
/// # Example
///
/// ```ignore
/// let vfs = Vfs::default();
/// vfs.mount_physical("C:/data/", "/assets/", 0)?;
/// vfs.mount_package("C:/data/base.rlpk", "/assets/")?;
///
/// let handle = vfs.open(FileTypeId::BINARY_READER, "/assets/level1.scene", false)?;
/// let bytes = vfs.get_file(handle)?.read_all()?;
/// vfs.close(handle)?;
/// ```
#[derive(Clone)]
pub struct Vfs {
    inner: Arc<VfsInner>,
}

impl Vfs {
    /// Create a router with no mounts and the built-in file factories.
    pub fn new(paths: PathConfig) -> Self {
        Self {
            inner: Arc::new(VfsInner {
                paths,
                state: Mutex::new(VfsState {
                    mounts: Vec::new(),
                    handles: HashMap::new(),
                    factories: builtin_factories().into_iter().collect(),
                }),
            }),
        }
    }

    /// Path conventions of this router.
    pub fn paths(&self) -> &PathConfig {
        &self.inner.paths
    }

    // --- Mounting ---

    fn canonical_alias(&self, alias: &str) -> FsResult<String> {
        let paths = &self.inner.paths;
        paths.validate(alias)?;
        let normalized = paths.normalize(alias, true);
        if paths.is_virtual(&normalized) {
            Ok(normalized)
        } else {
            Ok(format!("{}{normalized}", paths.root))
        }
    }

    /// Mount a directory on disk under `alias`.
    pub fn mount_physical(&self, path: &str, alias: &str, relative_priority: u32) -> FsResult<()> {
        let storage = NativeStorage::new(path, &self.inner.paths)?;
        self.mount_storage(Arc::new(storage), alias, relative_priority)
    }

    /// Open the package at `path` and mount it under `alias`.
    ///
    /// Nothing is registered if the package cannot be opened.
    pub fn mount_package(&self, path: &str, alias: &str) -> FsResult<()> {
        let storage = PackageStorage::open(path, &self.inner.paths)?;
        self.mount_storage(Arc::new(storage), alias, 0)
    }

    /// Mount any storage under `alias`.
    ///
    /// Fails with [`FsError::AlreadyExists`] if the alias is taken.
    pub fn mount_storage(
        &self,
        storage: Arc<dyn MountableStorage>,
        alias: &str,
        relative_priority: u32,
    ) -> FsResult<()> {
        let alias = self.canonical_alias(alias)?;
        let mut state = self.inner.state.lock();
        if state.mounts.iter().any(|mount| mount.alias == alias) {
            return Err(FsError::AlreadyExists(format!("mount alias {alias}")));
        }

        let priority = storage.priority().saturating_add(relative_priority);
        let position = state
            .mounts
            .iter()
            .position(|mount| mount.priority >= priority)
            .unwrap_or(state.mounts.len());
        log::info!(
            "Mounted {} at {} (priority {})",
            storage.base_path(),
            alias,
            priority
        );
        storage.on_mounted(&alias);
        state.mounts.insert(
            position,
            Mount {
                alias,
                priority,
                storage,
            },
        );
        Ok(())
    }

    /// Remove the mount registered under `alias`, closing every file it
    /// still has open.
    pub fn unmount(&self, alias: &str) -> FsResult<()> {
        let alias = self.canonical_alias(alias)?;
        let mut state = self.inner.state.lock();
        let Some(position) = state.mounts.iter().position(|mount| mount.alias == alias) else {
            log::warn!("Cannot unmount {alias}: no such mount");
            return Err(FsError::NotFound(format!("mount alias {alias}")));
        };

        let mount = state.mounts.remove(position);
        let closed = mount.storage.close_all();
        for handle in &closed {
            state.handles.remove(handle);
        }
        log::info!(
            "Unmounted {} from {} ({} open file(s) closed)",
            mount.storage.base_path(),
            alias,
            closed.len()
        );
        Ok(())
    }

    pub fn mounts(&self) -> Vec<MountInfo> {
        self.inner
            .state
            .lock()
            .mounts
            .iter()
            .map(|mount| MountInfo {
                alias: mount.alias.clone(),
                physical_path: mount.storage.base_path().to_owned(),
                priority: mount.priority,
            })
            .collect()
    }

    // --- Resolution ---

    /// Translate a virtual path into a physical one.
    ///
    /// Paths that do not start with the root marker are returned with
    /// unified separators only. Otherwise the longest mounted alias that
    /// prefixes the path is replaced by the mount's physical path. If the
    /// rest has no extension marker it may itself name a mounted directory
    /// (`/assets/sub` with a mount at `/assets/sub/`), which is checked last.
    pub fn resolve_virtual_path(&self, path: &str) -> String {
        let paths = &self.inner.paths;
        let normalized = paths.normalize(path, false);
        if !paths.is_virtual(&normalized) {
            return normalized;
        }

        let state = self.inner.state.lock();

        let mut matched: Option<(&Mount, usize)> = None;
        for (index, ch) in normalized.char_indices() {
            if ch != paths.separator {
                continue;
            }
            let end = index + ch.len_utf8();
            if let Some(mount) = find_mount(&state.mounts, &normalized[..end]) {
                matched = Some((mount, end));
            }
        }

        let (alias, physical, rest) = match matched {
            Some((mount, end)) => (
                &normalized[..end],
                mount.storage.base_path(),
                &normalized[end..],
            ),
            None => ("", "", normalized.as_str()),
        };

        if !rest.is_empty() && !paths.has_extension_marker(rest) {
            let directory = format!("{alias}{rest}{}", paths.separator);
            if let Some(mount) = find_mount(&state.mounts, &directory) {
                return mount.storage.base_path().to_owned();
            }
        }

        format!("{physical}{rest}")
    }

    /// Mounts that may serve `normalized`, best first.
    fn candidates(state: &VfsState, normalized: &str) -> Vec<Candidate> {
        let mut found: Vec<(u32, usize, Candidate)> = Vec::new();
        for mount in &state.mounts {
            let base = mount.storage.base_path();
            let matched = if let Some(local) = normalized.strip_prefix(mount.alias.as_str()) {
                Some((mount.alias.len(), local))
            } else {
                normalized
                    .strip_prefix(base)
                    .map(|local| (base.len(), local))
            };
            if let Some((prefix_len, local)) = matched {
                found.push((
                    mount.priority,
                    prefix_len,
                    Candidate {
                        storage: mount.storage.clone(),
                        local: local.to_owned(),
                    },
                ));
            }
        }
        found.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));
        found.into_iter().map(|(_, _, candidate)| candidate).collect()
    }

    /// Storage that owns the open file `handle`.
    fn owner_of(state: &VfsState, handle: FileHandle) -> Option<Arc<dyn MountableStorage>> {
        state.handles.get(&handle).cloned()
    }

    // --- File lifecycle ---

    /// Open a file and return its handle.
    ///
    /// Among the mounts that can serve `path`, the best one that already has
    /// the file is used. If none has it and `create` is set, the file is
    /// created in the best writable mount. Opening a path that is already
    /// open returns the same handle and adds a reference; every open must be
    /// balanced by a [`close`](Self::close).
    pub fn open(&self, type_id: FileTypeId, path: &str, create: bool) -> FsResult<FileHandle> {
        let result = self.open_entry(type_id, path, create);
        match &result {
            Ok(entry) => log::debug!(
                "Opened {} as {} ({} ref(s))",
                entry.name(),
                entry.handle(),
                entry.ref_count()
            ),
            Err(err) => log::error!("Failed to open {path}: {err}"),
        }
        result.map(|entry| entry.handle())
    }

    fn open_entry(&self, type_id: FileTypeId, path: &str, create: bool) -> FsResult<Arc<FileEntry>> {
        let paths = &self.inner.paths;
        paths.validate(path)?;
        let normalized = paths.normalize(path, false);

        let mut state = self.inner.state.lock();
        let factory = *state
            .factories
            .get(&type_id)
            .ok_or_else(|| FsError::NotFound(format!("file factory {type_id}")))?;

        let candidates: Vec<Candidate> = Self::candidates(&state, &normalized)
            .into_iter()
            .filter(|candidate| !factory.is_writer() || !candidate.storage.is_read_only())
            .collect();

        // A file that is already open is served by its owner, even when it
        // was reached through another mount of the same directory.
        for candidate in &candidates {
            let canonical = candidate.storage.canonical_path(&candidate.local);
            let handle = FileHandle::from_canonical_path(&canonical);
            if let Some(owner) = Self::owner_of(&state, handle) {
                let local = canonical
                    .strip_prefix(owner.base_path())
                    .unwrap_or(&candidate.local)
                    .to_owned();
                return owner.open_file(type_id, factory, &local, false);
            }
        }

        let chosen = candidates
            .iter()
            .find(|candidate| candidate.storage.file_exists(&candidate.local))
            .or_else(|| {
                if create {
                    candidates
                        .iter()
                        .find(|candidate| !candidate.storage.is_read_only())
                } else {
                    None
                }
            })
            .ok_or_else(|| FsError::NotFound(normalized.clone()))?;

        let entry = chosen
            .storage
            .open_file(type_id, factory, &chosen.local, create)?;
        state
            .handles
            .insert(entry.handle(), chosen.storage.clone());
        Ok(entry)
    }

    /// Release one reference to an open file.
    ///
    /// Fails with [`FsError::NotFound`] if the handle is not open.
    pub fn close(&self, handle: FileHandle) -> FsResult<()> {
        let mut state = self.inner.state.lock();
        let storage = Self::owner_of(&state, handle)
            .ok_or_else(|| FsError::NotFound(format!("no open file with handle {handle}")))?;
        if storage.close_file(handle)? {
            state.handles.remove(&handle);
            log::debug!("Closed {handle}");
        }
        Ok(())
    }

    /// Release one reference to the open file at `path`.
    pub fn close_path(&self, path: &str) -> FsResult<()> {
        let handle = self.handle_of(path)?;
        self.close(handle)
    }

    /// Handle of the open file at `path`.
    pub fn handle_of(&self, path: &str) -> FsResult<FileHandle> {
        let paths = &self.inner.paths;
        paths.validate(path)?;
        let normalized = paths.normalize(path, false);
        let state = self.inner.state.lock();
        Self::candidates(&state, &normalized)
            .into_iter()
            .map(|candidate| {
                FileHandle::from_canonical_path(&candidate.storage.canonical_path(&candidate.local))
            })
            .find(|handle| state.handles.contains_key(handle))
            .ok_or_else(|| FsError::NotFound(format!("{normalized} is not open")))
    }

    /// Close every open file in every mount. Returns the number of files
    /// closed.
    pub fn close_all(&self) -> usize {
        let mut state = self.inner.state.lock();
        let closed: usize = state
            .mounts
            .iter()
            .map(|mount| mount.storage.close_all().len())
            .sum();
        state.handles.clear();
        if closed > 0 {
            log::info!("Closed {closed} open file(s)");
        }
        closed
    }

    pub fn get_file(&self, handle: FileHandle) -> FsResult<Arc<FileEntry>> {
        let state = self.inner.state.lock();
        Self::owner_of(&state, handle)
            .ok_or_else(|| FsError::NotFound(format!("no open file with handle {handle}")))?
            .get_file(handle)
    }

    /// Handles of every open file.
    pub fn open_handles(&self) -> Vec<FileHandle> {
        self.inner.state.lock().handles.keys().copied().collect()
    }

    // --- Queries ---

    pub fn file_exists(&self, path: &str) -> bool {
        let paths = &self.inner.paths;
        if !paths.is_valid(path) {
            return false;
        }
        let normalized = paths.normalize(path, false);
        let state = self.inner.state.lock();
        Self::candidates(&state, &normalized)
            .iter()
            .any(|candidate| candidate.storage.file_exists(&candidate.local))
    }

    /// Immediate children of a directory, from the best mount that has it.
    pub fn list_dir(&self, path: &str) -> FsResult<Vec<String>> {
        let paths = &self.inner.paths;
        paths.validate(path)?;
        let normalized = paths.normalize(path, true);
        let state = self.inner.state.lock();
        let candidate = Self::candidates(&state, &normalized)
            .into_iter()
            .find(|candidate| candidate.storage.dir_exists(&candidate.local))
            .ok_or_else(|| FsError::NotFound(format!("directory {normalized}")))?;
        candidate.storage.list_dir(&candidate.local)
    }

    /// Delete a file from the best mount that has it.
    ///
    /// Fails with [`FsError::InvalidArgument`] while the file is open.
    pub fn remove_file(&self, path: &str) -> FsResult<()> {
        let paths = &self.inner.paths;
        paths.validate(path)?;
        let normalized = paths.normalize(path, false);
        let state = self.inner.state.lock();
        let candidate = Self::candidates(&state, &normalized)
            .into_iter()
            .find(|candidate| candidate.storage.file_exists(&candidate.local))
            .ok_or_else(|| FsError::NotFound(normalized.clone()))?;

        let canonical = candidate.storage.canonical_path(&candidate.local);
        if state
            .handles
            .contains_key(&FileHandle::from_canonical_path(&canonical))
        {
            return Err(FsError::InvalidArgument(format!(
                "cannot remove {canonical} while it is open"
            )));
        }
        candidate.storage.remove_file(&candidate.local)?;
        log::debug!("Removed {canonical}");
        Ok(())
    }

    // --- File factories ---

    pub fn register_file_factory(&self, type_id: FileTypeId, factory: FileFactory) -> FsResult<()> {
        let mut state = self.inner.state.lock();
        if state.factories.contains_key(&type_id) {
            return Err(FsError::AlreadyExists(format!("file factory {type_id}")));
        }
        state.factories.insert(type_id, factory);
        log::info!(
            "Registered file factory {type_id} ({:?})",
            factory.access_mode()
        );
        Ok(())
    }

    pub fn unregister_file_factory(&self, type_id: FileTypeId) -> FsResult<()> {
        let mut state = self.inner.state.lock();
        if state.factories.remove(&type_id).is_none() {
            return Err(FsError::NotFound(format!("file factory {type_id}")));
        }
        log::info!("Unregistered file factory {type_id}");
        Ok(())
    }

    // --- Whole-file helpers ---

    /// Read a whole file through the binary reader factory.
    pub fn read_file(&self, path: &str) -> FsResult<Vec<u8>> {
        let handle = self.open(FileTypeId::BINARY_READER, path, false)?;
        let result = self.get_file(handle).and_then(|entry| entry.read_all());
        self.close(handle)?;
        result
    }

    /// Create or replace a file with `bytes`.
    pub fn write_file(&self, path: &str, bytes: &[u8]) -> FsResult<()> {
        self.write_with(FileTypeId::BINARY_WRITER, path, bytes)
    }

    /// Parse the binary archive stored at `path`.
    pub fn load_archive(&self, path: &str) -> FsResult<BinaryArchiveReader> {
        let handle = self.open(FileTypeId::ARCHIVE_READER, path, false)?;
        let result = self.get_file(handle).and_then(|entry| {
            let mut stream = entry.stream()?;
            stream.seek(SeekFrom::Start(0))?;
            BinaryArchiveReader::open(&mut *stream)
        });
        self.close(handle)?;
        result
    }

    /// Store a finished archive at `path`, creating the file if needed.
    pub fn save_archive(&self, path: &str, archive: BinaryArchiveWriter<Vec<u8>>) -> FsResult<()> {
        let bytes = archive.close()?;
        self.write_with(FileTypeId::ARCHIVE_WRITER, path, &bytes)
    }

    fn write_with(&self, type_id: FileTypeId, path: &str, bytes: &[u8]) -> FsResult<()> {
        let handle = self.open(type_id, path, true)?;
        let result = self
            .get_file(handle)
            .and_then(|entry| entry.write_all(bytes));
        self.close(handle)?;
        result
    }

    // --- Path helpers ---

    /// Working directory of the process, normalized as a directory path.
    pub fn current_dir(&self) -> FsResult<String> {
        let dir = std::env::current_dir()?;
        Ok(self.inner.paths.normalize(&dir.to_string_lossy(), true))
    }

    pub fn combine_path(&self, left: &str, right: &str) -> String {
        self.inner.paths.combine(left, right)
    }

    pub fn extension<'a>(&self, path: &'a str) -> &'a str {
        self.inner.paths.extension(path)
    }

    pub fn file_name<'a>(&self, path: &'a str) -> &'a str {
        self.inner.paths.file_name(path)
    }
}

fn find_mount<'a>(mounts: &'a [Mount], alias: &str) -> Option<&'a Mount> {
    mounts.iter().find(|mount| mount.alias == alias)
}

impl Default for Vfs {
    fn default() -> Self {
        Self::new(PathConfig::default())
    }
}
