use std::collections::HashSet;
use std::io::{Read, Seek, SeekFrom, Write};

use flate2::write::ZlibEncoder;
use flate2::Compression;

use super::header::{PackageEntry, PackageHeader, DATA_START, PACKAGE_TAG, PACKAGE_VERSION};
use crate::{FsError, FsResult};

/// Sequential writer for a package container.
///
/// A zeroed header is reserved on creation, entries are appended one at a
/// time, and [`finish`](Self::finish) writes the file table and patches the
/// header in place.
///
/// ```ignore
/// let mut writer = PackageWriter::new(File::create("assets.rlpk")?)?;
/// writer.write_file("textures/brick.png", &png_bytes, false)?;
/// writer.write_file("levels/intro.scene", &scene_bytes, true)?;
/// writer.finish()?;
/// ```
pub struct PackageWriter<W: Write + Seek> {
    sink: W,
    base: u64,
    cursor: u64,
    entries: Vec<PackageEntry>,
    names: HashSet<String>,
}

impl<W: Write + Seek> PackageWriter<W> {
    /// Start a package at the current position of `sink`.
    pub fn new(mut sink: W) -> FsResult<Self> {
        let base = sink.stream_position()?;
        sink.write_all(&[0u8; DATA_START as usize])?;
        Ok(Self {
            sink,
            base,
            cursor: DATA_START,
            entries: Vec::new(),
            names: HashSet::new(),
        })
    }

    /// Append an entry, deflating it when `compress` is set.
    ///
    /// Fails with [`FsError::AlreadyExists`] for a duplicate name and with
    /// [`FsError::Unsupported`] when `data` is itself a package.
    pub fn write_file(&mut self, name: &str, data: &[u8], compress: bool) -> FsResult<()> {
        if name.is_empty() {
            return Err(FsError::InvalidArgument("empty package entry name".into()));
        }
        if self.names.contains(name) {
            return Err(FsError::AlreadyExists(format!("package entry {name:?}")));
        }
        if data.starts_with(&PACKAGE_TAG) {
            return Err(FsError::Unsupported(format!(
                "{name:?} is a package; nested packages are not supported"
            )));
        }
        if self.entries.len() >= u32::MAX as usize {
            return Err(FsError::Unsupported("package entry count exceeds u32".into()));
        }

        let compressed;
        let stored = if compress {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(data)?;
            compressed = encoder.finish()?;
            compressed.as_slice()
        } else {
            data
        };
        self.sink.write_all(stored)?;

        let entry = PackageEntry {
            name: name.to_owned(),
            data_offset: self.cursor,
            data_size: data.len() as u64,
            compressed_size: stored.len() as u64,
            is_compressed: compress,
        };
        log::trace!(
            "Packed {:?}: {} -> {} bytes",
            entry.name,
            entry.data_size,
            entry.compressed_size
        );
        self.cursor += entry.stored_size();
        self.names.insert(entry.name.clone());
        self.entries.push(entry);
        Ok(())
    }

    /// Append an entry with the full content of `source`.
    pub fn write_file_from(
        &mut self,
        name: &str,
        mut source: impl Read,
        compress: bool,
    ) -> FsResult<()> {
        let mut data = Vec::new();
        source.read_to_end(&mut data)?;
        self.write_file(name, &data, compress)
    }

    pub fn entries(&self) -> &[PackageEntry] {
        &self.entries
    }

    /// Write the file table, patch the header, and return the sink
    /// positioned at the end of the package.
    pub fn finish(mut self) -> FsResult<W> {
        let mut table = Vec::new();
        for entry in &self.entries {
            entry.write_to(&mut table)?;
        }
        self.sink.write_all(&table)?;

        let header = PackageHeader {
            version: PACKAGE_VERSION,
            entry_count: self.entries.len() as u32,
            file_table_offset: self.cursor,
            file_table_size: table.len() as u64,
        };
        let end = self.base + self.cursor + header.file_table_size;
        self.sink.seek(SeekFrom::Start(self.base))?;
        header.write_to(&mut self.sink)?;
        self.sink.seek(SeekFrom::Start(end))?;
        self.sink.flush()?;

        log::debug!(
            "Wrote package with {} entries ({} bytes)",
            header.entry_count,
            end - self.base
        );
        Ok(self.sink)
    }
}
