use std::collections::HashMap;
use std::io::{BufReader, Read, Seek, SeekFrom};

use flate2::read::ZlibDecoder;

use super::header::{PackageEntry, PackageHeader, HEADER_SIZE};
use crate::{FsError, FsResult};

/// Random-access reader for a package container.
///
/// The header and file table are parsed once in [`open`](Self::open);
/// entries are read on demand.
pub struct PackageReader<R: Read + Seek> {
    source: R,
    base: u64,
    header: PackageHeader,
    entries: Vec<PackageEntry>,
    index: HashMap<String, usize>,
}

impl<R: Read + Seek> PackageReader<R> {
    /// Parse the package starting at the current position of `source`.
    pub fn open(mut source: R) -> FsResult<Self> {
        let base = source.stream_position()?;
        let end = source.seek(SeekFrom::End(0))?;
        source.seek(SeekFrom::Start(base))?;
        let package_len = end - base;

        let header = PackageHeader::read_from(&mut source)?;
        let table_in_bounds = header
            .file_table_offset
            .checked_add(header.file_table_size)
            .is_some_and(|table_end| {
                header.file_table_offset >= HEADER_SIZE && table_end <= package_len
            });
        if !table_in_bounds {
            return Err(FsError::InvalidFormat(format!(
                "file table {}+{} lies outside the package ({package_len} bytes)",
                header.file_table_offset, header.file_table_size
            )));
        }

        let mut entries = Vec::new();
        entries
            .try_reserve_exact(header.entry_count as usize)
            .map_err(|_| {
                FsError::OutOfMemory(format!("cannot allocate {} entries", header.entry_count))
            })?;
        let mut index = HashMap::with_capacity(header.entry_count as usize);

        source.seek(SeekFrom::Start(base + header.file_table_offset))?;
        let mut table = BufReader::new(Read::take(&mut source, header.file_table_size));
        for position in 0..header.entry_count as usize {
            let entry = PackageEntry::read_from(&mut table)?;
            let data_end = entry.data_offset.checked_add(entry.stored_size());
            if entry.data_offset < HEADER_SIZE
                || data_end.is_none_or(|data_end| data_end > header.file_table_offset)
            {
                return Err(FsError::InvalidFormat(format!(
                    "entry {:?} points outside the data region",
                    entry.name
                )));
            }
            if index.insert(entry.name.clone(), position).is_some() {
                return Err(FsError::InvalidFormat(format!(
                    "duplicate package entry {:?}",
                    entry.name
                )));
            }
            entries.push(entry);
        }
        drop(table);

        log::debug!(
            "Opened package v{} with {} entries",
            header.version,
            entries.len()
        );

        Ok(Self {
            source,
            base,
            header,
            entries,
            index,
        })
    }

    pub fn header(&self) -> &PackageHeader {
        &self.header
    }

    /// Absolute position of the package start within the source.
    pub fn base(&self) -> u64 {
        self.base
    }

    /// Entries in the order they were written.
    pub fn entries(&self) -> &[PackageEntry] {
        &self.entries
    }

    pub fn entry(&self, name: &str) -> Option<&PackageEntry> {
        self.index.get(name).map(|&position| &self.entries[position])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Read the content of an entry, inflating it if it was stored
    /// compressed.
    ///
    /// A compressed entry that fails to inflate yields an empty buffer.
    pub fn read_file_bytes(&mut self, name: &str) -> FsResult<Vec<u8>> {
        let entry = self
            .entry(name)
            .cloned()
            .ok_or_else(|| FsError::NotFound(format!("package entry {name:?}")))?;

        self.source
            .seek(SeekFrom::Start(self.base + entry.data_offset))?;
        let mut stored = Vec::new();
        stored
            .try_reserve_exact(entry.stored_size() as usize)
            .map_err(|_| FsError::OutOfMemory(format!("cannot allocate {name:?}")))?;
        Read::take(&mut self.source, entry.stored_size()).read_to_end(&mut stored)?;
        if (stored.len() as u64) < entry.stored_size() {
            return Err(FsError::InvalidFormat(format!(
                "package entry {name:?} is truncated"
            )));
        }

        if !entry.is_compressed {
            return Ok(stored);
        }
        Ok(inflate(&entry, &stored))
    }

    pub fn into_inner(self) -> R {
        self.source
    }
}

fn inflate(entry: &PackageEntry, stored: &[u8]) -> Vec<u8> {
    let mut data = Vec::new();
    if data.try_reserve_exact(entry.data_size as usize).is_err() {
        log::warn!(
            "Cannot allocate {} bytes to inflate {:?}",
            entry.data_size,
            entry.name
        );
        return Vec::new();
    }

    let result = ZlibDecoder::new(stored)
        .take(entry.data_size)
        .read_to_end(&mut data);
    match result {
        Ok(read) if read as u64 == entry.data_size => data,
        Ok(read) => {
            log::warn!(
                "Inflated {:?} to {} bytes, expected {}",
                entry.name,
                read,
                entry.data_size
            );
            Vec::new()
        }
        Err(err) => {
            log::warn!("Failed to inflate {:?}: {}", entry.name, err);
            Vec::new()
        }
    }
}
