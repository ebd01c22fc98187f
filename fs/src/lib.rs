//! Virtual file system, package container and binary archives for the
//! RedLilium engine.
//!
//! Callers address resources by virtual path (`/assets/level1.scene`) no
//! matter whether the bytes live in loose files on disk, in memory, or in a
//! compressed package. Structured data is saved and restored with the
//! binary archive codec.
//!
//! # Architecture
//!
//! All operations are synchronous and run on the caller's thread. The
//! [`Vfs`] router owns a list of mounts, each binding an alias to a
//! [`MountableStorage`]. Opening a path yields a [`FileHandle`] derived from
//! the file's canonical path; the open file itself is a reference-counted
//! [`FileEntry`] wrapping a [`Stream`].
//!
//! ```ignore
//! let vfs = Vfs::default();
//! vfs.mount_physical("./assets", "/assets/", 0)?;
//! vfs.mount_package("./base.rlpk", "/base/")?;
//!
//! let bytes = vfs.read_file("/assets/textures/brick.png")?;
//! let settings = vfs.load_archive("/base/settings.bin")?;
//! ```
//!
//! # Storages
//!
//! - [`NativeStorage`]: a directory on disk (read-write)
//! - [`MemoryStorage`]: in-memory map for tests and embedded assets (read-write)
//! - [`PackageStorage`]: a package container (read-only)
//!
//! Lower priority values win when several mounts can serve a path:
//! native storages outrank memory storages, which outrank packages.
//!
//! # Formats
//!
//! - [`package`]: many named blobs in one file, each optionally deflated
//! - [`archive`]: a tree of named groups and typed scalars
//!
//! Both encode integers big-endian.

pub mod archive;
mod byte_order;
mod config;
mod error;
mod file;
pub mod package;
mod path;
pub mod storage;
mod stream;
mod vfs;

pub use archive::{ArchiveValue, BinaryArchiveReader, BinaryArchiveWriter};
pub use config::{load_config, MountConfig, MountKind, VfsConfig};
pub use error::{FsError, FsResult};
pub use file::{FileEntry, FileFactory, FileHandle, FileTypeId};
pub use package::{PackageReader, PackageWriter};
pub use path::PathConfig;
pub use storage::{
    MemoryStorage, MountableStorage, NativeStorage, PackageStorage, MEMORY_STORAGE_PRIORITY,
    NATIVE_STORAGE_PRIORITY, PACKAGE_STORAGE_PRIORITY,
};
pub use stream::{AccessMode, FileStream, MemoryStream, RangeStream, Stream};
pub use vfs::{MountInfo, Vfs};
