//! Binary archive: a tree of named groups and typed scalar values.
//!
//! Every item is written as
//!
//! ```text
//! name length u64 | name bytes | type tag u32 | payload
//! ```
//!
//! A group has the type tag [`BEGIN_BLOCK`] and no payload; its children
//! follow and the group is closed by a bare [`END_BLOCK`] tag (no name, no
//! payload). The top-level sequence ends at the end of the stream. Integers
//! and floats are big-endian, `bool` is one byte and strings carry a `u64`
//! length prefix.

mod reader;
mod writer;

use std::io::{Read, Write};

pub use reader::BinaryArchiveReader;
pub use writer::BinaryArchiveWriter;

use crate::byte_order::{ReadCanonical, WriteCanonical};
use crate::{FsError, FsResult};

/// Type tag opening a group.
pub const BEGIN_BLOCK: u32 = 0x42;
/// Tag closing the innermost open group.
pub const END_BLOCK: u32 = 0x24_0000;

pub(crate) const MAX_NAME_LEN: u64 = 64 * 1024;
const MAX_STRING_LEN: u64 = u32::MAX as u64;

/// A scalar stored in an archive.
#[derive(Debug, Clone, PartialEq)]
pub enum ArchiveValue {
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Bool(bool),
    String(String),
}

impl ArchiveValue {
    /// Type tag written before the payload.
    pub fn type_tag(&self) -> u32 {
        match self {
            ArchiveValue::I8(_) => 1,
            ArchiveValue::I16(_) => 2,
            ArchiveValue::I32(_) => 3,
            ArchiveValue::I64(_) => 4,
            ArchiveValue::U8(_) => 5,
            ArchiveValue::U16(_) => 6,
            ArchiveValue::U32(_) => 7,
            ArchiveValue::U64(_) => 8,
            ArchiveValue::F32(_) => 9,
            ArchiveValue::F64(_) => 10,
            ArchiveValue::Bool(_) => 11,
            ArchiveValue::String(_) => 12,
        }
    }

    pub(crate) fn write_payload(&self, out: &mut impl Write) -> FsResult<()> {
        match self {
            ArchiveValue::I8(v) => out.write_i8_be(*v)?,
            ArchiveValue::I16(v) => out.write_i16_be(*v)?,
            ArchiveValue::I32(v) => out.write_i32_be(*v)?,
            ArchiveValue::I64(v) => out.write_i64_be(*v)?,
            ArchiveValue::U8(v) => out.write_u8_be(*v)?,
            ArchiveValue::U16(v) => out.write_u16_be(*v)?,
            ArchiveValue::U32(v) => out.write_u32_be(*v)?,
            ArchiveValue::U64(v) => out.write_u64_be(*v)?,
            ArchiveValue::F32(v) => out.write_f32_be(*v)?,
            ArchiveValue::F64(v) => out.write_f64_be(*v)?,
            ArchiveValue::Bool(v) => out.write_bool(*v)?,
            ArchiveValue::String(v) => out.write_sized_bytes(v.as_bytes())?,
        }
        Ok(())
    }

    /// Read the payload for `tag`. Unknown tags are [`FsError::InvalidFormat`].
    pub(crate) fn read_payload(tag: u32, input: &mut impl Read) -> FsResult<Self> {
        let value = match tag {
            1 => ArchiveValue::I8(input.read_i8_be()?),
            2 => ArchiveValue::I16(input.read_i16_be()?),
            3 => ArchiveValue::I32(input.read_i32_be()?),
            4 => ArchiveValue::I64(input.read_i64_be()?),
            5 => ArchiveValue::U8(input.read_u8_be()?),
            6 => ArchiveValue::U16(input.read_u16_be()?),
            7 => ArchiveValue::U32(input.read_u32_be()?),
            8 => ArchiveValue::U64(input.read_u64_be()?),
            9 => ArchiveValue::F32(input.read_f32_be()?),
            10 => ArchiveValue::F64(input.read_f64_be()?),
            11 => ArchiveValue::Bool(input.read_bool()?),
            12 => {
                let bytes = input.read_sized_bytes(MAX_STRING_LEN).map_err(|err| {
                    FsError::InvalidFormat(format!("bad string payload: {err}"))
                })?;
                let text = String::from_utf8(bytes)
                    .map_err(|_| FsError::InvalidFormat("string value is not UTF-8".into()))?;
                ArchiveValue::String(text)
            }
            other => {
                return Err(FsError::InvalidFormat(format!(
                    "unknown archive type tag {other:#x}"
                )))
            }
        };
        Ok(value)
    }
}

macro_rules! value_conversions {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for ArchiveValue {
                fn from(value: $ty) -> Self {
                    ArchiveValue::$variant(value)
                }
            }
        )*
    };
}

value_conversions! {
    i8 => I8, i16 => I16, i32 => I32, i64 => I64,
    u8 => U8, u16 => U16, u32 => U32, u64 => U64,
    f32 => F32, f64 => F64, bool => Bool, String => String,
}

impl From<&str> for ArchiveValue {
    fn from(value: &str) -> Self {
        ArchiveValue::String(value.to_owned())
    }
}
