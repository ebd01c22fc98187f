use std::fmt;
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread::{self, ThreadId};

use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};
use xxhash_rust::xxh3::xxh3_64;

use crate::byte_order::{ReadCanonical, WriteCanonical};
use crate::stream::{AccessMode, Stream};
use crate::{FsError, FsResult};

/// Opaque identifier of an open file.
///
/// Derived from the xxh3 hash of the file's canonical path, so reopening the
/// same path after it was closed yields the same handle. `0` is reserved as
/// [`FileHandle::INVALID`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileHandle(u64);

impl FileHandle {
    pub const INVALID: FileHandle = FileHandle(0);

    /// Handle for a canonical path.
    ///
    /// # Panics
    ///
    /// Panics if the path hashes to the reserved value `0`.
    pub fn from_canonical_path(path: &str) -> Self {
        let hash = xxh3_64(path.as_bytes());
        assert!(hash != 0, "handle space exhausted: {path:?} hashes to 0");
        FileHandle(hash)
    }

    pub fn is_valid(self) -> bool {
        self.0 != 0
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

/// Stable key identifying a kind of file in the factory registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileTypeId(pub &'static str);

impl FileTypeId {
    pub const BINARY_READER: FileTypeId = FileTypeId("binary_reader");
    pub const BINARY_WRITER: FileTypeId = FileTypeId("binary_writer");
    pub const ARCHIVE_READER: FileTypeId = FileTypeId("archive_reader");
    pub const ARCHIVE_WRITER: FileTypeId = FileTypeId("archive_writer");
    pub const PACKAGE_READER: FileTypeId = FileTypeId("package_reader");
    pub const PACKAGE_WRITER: FileTypeId = FileTypeId("package_writer");

    pub fn name(self) -> &'static str {
        self.0
    }
}

impl fmt::Display for FileTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Describes how storages allocate streams for one [`FileTypeId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileFactory {
    mode: AccessMode,
}

impl FileFactory {
    pub const fn reader() -> Self {
        Self {
            mode: AccessMode::Read,
        }
    }

    pub const fn writer() -> Self {
        Self {
            mode: AccessMode::Write,
        }
    }

    pub fn access_mode(&self) -> AccessMode {
        self.mode
    }

    pub fn is_writer(&self) -> bool {
        self.mode == AccessMode::Write
    }
}

/// Factories registered on every new router.
pub(crate) fn builtin_factories() -> [(FileTypeId, FileFactory); 6] {
    [
        (FileTypeId::BINARY_READER, FileFactory::reader()),
        (FileTypeId::BINARY_WRITER, FileFactory::writer()),
        (FileTypeId::ARCHIVE_READER, FileFactory::reader()),
        (FileTypeId::ARCHIVE_WRITER, FileFactory::writer()),
        (FileTypeId::PACKAGE_READER, FileFactory::reader()),
        (FileTypeId::PACKAGE_WRITER, FileFactory::writer()),
    ]
}

/// One open logical file.
///
/// Shared as `Arc<FileEntry>` between the owning storage and callers. The
/// entry counts opens: every successful open of its path adds a reference
/// and every close releases one. The stream is flushed and dropped when the
/// count reaches zero; after that the entry reports [`is_open`](Self::is_open)
/// as `false` and stream access fails with [`FsError::NotFound`].
pub struct FileEntry {
    name: String,
    handle: FileHandle,
    type_id: FileTypeId,
    mode: AccessMode,
    thread: ThreadId,
    ref_count: AtomicU32,
    stream: Mutex<Option<Box<dyn Stream>>>,
}

impl FileEntry {
    pub(crate) fn new(
        name: String,
        handle: FileHandle,
        type_id: FileTypeId,
        stream: Box<dyn Stream>,
    ) -> Self {
        Self {
            name,
            handle,
            type_id,
            mode: stream.access_mode(),
            thread: thread::current().id(),
            ref_count: AtomicU32::new(1),
            stream: Mutex::new(Some(stream)),
        }
    }

    /// Canonical path the entry was opened from.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handle(&self) -> FileHandle {
        self.handle
    }

    pub fn type_id(&self) -> FileTypeId {
        self.type_id
    }

    pub fn access_mode(&self) -> AccessMode {
        self.mode
    }

    pub fn is_open(&self) -> bool {
        self.stream.lock().is_some()
    }

    /// Whether the calling thread is the one that opened the file.
    pub fn is_parent_thread(&self) -> bool {
        thread::current().id() == self.thread
    }

    pub fn ref_count(&self) -> u32 {
        self.ref_count.load(Ordering::Acquire)
    }

    pub(crate) fn add_ref(&self) -> u32 {
        self.ref_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Drop one reference. Returns `true` when this was the last one, in
    /// which case the stream has been closed.
    pub(crate) fn release(&self) -> bool {
        let previous = self.ref_count.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "released {} below zero", self.name);
        if previous != 1 {
            return false;
        }
        self.close_stream();
        true
    }

    /// Close the stream regardless of outstanding references.
    pub(crate) fn force_close(&self) {
        self.ref_count.store(0, Ordering::Release);
        self.close_stream();
    }

    fn close_stream(&self) {
        if let Some(mut stream) = self.stream.lock().take() {
            if let Err(err) = stream.close() {
                log::warn!("Failed to close {}: {}", self.name, err);
            }
        }
    }

    /// Lock the underlying stream.
    pub fn stream(&self) -> FsResult<MappedMutexGuard<'_, dyn Stream + 'static>> {
        MutexGuard::try_map(self.stream.lock(), |stream| stream.as_deref_mut())
            .map_err(|_| FsError::NotFound(format!("file {} is closed", self.name)))
    }

    /// Read the whole file from the beginning.
    pub fn read_all(&self) -> FsResult<Vec<u8>> {
        let mut stream = self.stream()?;
        stream.seek(SeekFrom::Start(0))?;
        let mut bytes = Vec::new();
        stream.read_to_end(&mut bytes)?;
        Ok(bytes)
    }

    /// Lock the stream for writing. Fails with [`FsError::Unsupported`] if
    /// the file was opened for reading.
    fn writable_stream(&self) -> FsResult<MappedMutexGuard<'_, dyn Stream + 'static>> {
        if self.mode != AccessMode::Write {
            return Err(FsError::Unsupported(format!(
                "file {} is open for reading",
                self.name
            )));
        }
        self.stream()
    }

    /// Append bytes at the current position.
    pub fn write_all(&self, bytes: &[u8]) -> FsResult<()> {
        self.writable_stream()?.write_all(bytes)?;
        Ok(())
    }

    pub fn length(&self) -> FsResult<u64> {
        Ok(self.stream()?.length()?)
    }

    // --- Typed access ---

    pub fn position(&self) -> FsResult<u64> {
        Ok(self.stream()?.stream_position()?)
    }

    pub fn set_position(&self, position: u64) -> FsResult<()> {
        self.stream()?.seek(SeekFrom::Start(position))?;
        Ok(())
    }

    /// Whether the position is at or past the end of the file.
    pub fn is_eof(&self) -> FsResult<bool> {
        let mut stream = self.stream()?;
        let position = stream.stream_position()?;
        Ok(position >= stream.length()?)
    }

    /// Read exactly `len` bytes at the current position.
    ///
    /// Fails with [`FsError::InvalidFormat`] if the file ends first.
    pub fn read_bytes(&self, len: u64) -> FsResult<Vec<u8>> {
        Ok(self.stream()?.read_bytes(len)?)
    }

    pub fn read_bool(&self) -> FsResult<bool> {
        Ok(self.stream()?.read_bool()?)
    }

    pub fn write_bool(&self, value: bool) -> FsResult<()> {
        self.writable_stream()?.write_bool(value)?;
        Ok(())
    }
}

macro_rules! typed_access {
    ($($read:ident, $write:ident => $canonical_read:ident, $canonical_write:ident: $ty:ty;)*) => {
        impl FileEntry {
            $(
                /// Read a big-endian value at the current position.
                pub fn $read(&self) -> FsResult<$ty> {
                    Ok(self.stream()?.$canonical_read()?)
                }

                /// Write a big-endian value at the current position.
                pub fn $write(&self, value: $ty) -> FsResult<()> {
                    self.writable_stream()?.$canonical_write(value)?;
                    Ok(())
                }
            )*
        }
    };
}

typed_access! {
    read_u8, write_u8 => read_u8_be, write_u8_be: u8;
    read_u16, write_u16 => read_u16_be, write_u16_be: u16;
    read_u32, write_u32 => read_u32_be, write_u32_be: u32;
    read_u64, write_u64 => read_u64_be, write_u64_be: u64;
    read_i8, write_i8 => read_i8_be, write_i8_be: i8;
    read_i16, write_i16 => read_i16_be, write_i16_be: i16;
    read_i32, write_i32 => read_i32_be, write_i32_be: i32;
    read_i64, write_i64 => read_i64_be, write_i64_be: i64;
    read_f32, write_f32 => read_f32_be, write_f32_be: f32;
    read_f64, write_f64 => read_f64_be, write_f64_be: f64;
}

impl fmt::Debug for FileEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileEntry")
            .field("name", &self.name)
            .field("handle", &self.handle)
            .field("type_id", &self.type_id)
            .field("mode", &self.mode)
            .field("ref_count", &self.ref_count())
            .finish()
    }
}
