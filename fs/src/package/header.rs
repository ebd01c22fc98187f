use std::io::{Read, Write};

use crate::byte_order::{ReadCanonical, WriteCanonical};
use crate::{FsError, FsResult};

/// Magic tag at the start of every package.
pub const PACKAGE_TAG: [u8; 4] = *b"RLPK";
/// Format version written by [`PackageWriter`](super::PackageWriter).
pub const PACKAGE_VERSION: u16 = 1;
/// Size in bytes of the encoded header.
pub const HEADER_SIZE: u64 = 28;
/// Offset at which [`PackageWriter`](super::PackageWriter) places the first
/// entry. The bytes between the header and this offset are zero.
pub const DATA_START: u64 = 32;

const MAX_ENTRY_NAME_LEN: u64 = 64 * 1024;

/// Fixed-size header at the start of a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackageHeader {
    pub version: u16,
    pub entry_count: u32,
    /// Offset of the file table, relative to the start of the package.
    pub file_table_offset: u64,
    pub file_table_size: u64,
}

impl PackageHeader {
    pub(crate) fn write_to(&self, out: &mut impl Write) -> FsResult<()> {
        out.write_all(&PACKAGE_TAG)?;
        out.write_u16_be(self.version)?;
        out.write_u16_be(0)?;
        out.write_u32_be(self.entry_count)?;
        out.write_u64_be(self.file_table_offset)?;
        out.write_u64_be(self.file_table_size)?;
        Ok(())
    }

    /// Parse and validate a header.
    ///
    /// A wrong tag or version, or a truncated header, is
    /// [`FsError::InvalidFormat`].
    pub(crate) fn read_from(input: &mut impl Read) -> FsResult<Self> {
        let mut tag = [0u8; 4];
        input.read_exact(&mut tag)?;
        if tag != PACKAGE_TAG {
            return Err(FsError::InvalidFormat(format!(
                "bad package tag {tag:02x?}, expected {PACKAGE_TAG:02x?}"
            )));
        }
        let version = input.read_u16_be()?;
        if version != PACKAGE_VERSION {
            return Err(FsError::InvalidFormat(format!(
                "unsupported package version {version}, expected {PACKAGE_VERSION}"
            )));
        }
        let _padding = input.read_u16_be()?;
        Ok(Self {
            version,
            entry_count: input.read_u32_be()?,
            file_table_offset: input.read_u64_be()?,
            file_table_size: input.read_u64_be()?,
        })
    }
}

/// One named blob in the file table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageEntry {
    pub name: String,
    /// Offset of the stored bytes, relative to the start of the package.
    pub data_offset: u64,
    /// Size of the uncompressed content.
    pub data_size: u64,
    /// Size of the stored bytes when compressed; equals `data_size` otherwise.
    pub compressed_size: u64,
    pub is_compressed: bool,
}

impl PackageEntry {
    /// Number of bytes the entry occupies in the package.
    pub fn stored_size(&self) -> u64 {
        if self.is_compressed {
            self.compressed_size
        } else {
            self.data_size
        }
    }

    pub(crate) fn write_to(&self, out: &mut impl Write) -> FsResult<()> {
        out.write_sized_bytes(self.name.as_bytes())?;
        out.write_u64_be(self.data_offset)?;
        out.write_u64_be(self.data_size)?;
        out.write_u64_be(self.compressed_size)?;
        out.write_bool(self.is_compressed)?;
        Ok(())
    }

    pub(crate) fn read_from(input: &mut impl Read) -> FsResult<Self> {
        let name = input.read_sized_bytes(MAX_ENTRY_NAME_LEN).map_err(|err| {
            FsError::InvalidFormat(format!("bad package entry name: {err}"))
        })?;
        let name = String::from_utf8(name)
            .map_err(|_| FsError::InvalidFormat("package entry name is not UTF-8".into()))?;
        Ok(Self {
            name,
            data_offset: input.read_u64_be()?,
            data_size: input.read_u64_be()?,
            compressed_size: input.read_u64_be()?,
            is_compressed: input.read_bool()?,
        })
    }
}
