//! Package container: many named byte blobs in one file.
//!
//! ```text
//! header (28 bytes)  tag "RLPK" | version u16 | padding u16 | entry count u32
//!                    | file table offset u64 | file table size u64
//! padding            zeroes up to byte 32
//! entry data         stored bytes of every entry, back to back
//! file table         per entry: name length u64 | name | data offset u64
//!                    | data size u64 | compressed size u64 | compressed u8
//! ```
//!
//! Integers are big-endian. Offsets are relative to the start of the package.
//! Readers accept entry data anywhere after the header; the writer starts it
//! at [`DATA_START`].
//! Compressed entries are zlib streams.

mod header;
mod reader;
mod writer;

pub use header::{
    PackageEntry, PackageHeader, DATA_START, HEADER_SIZE, PACKAGE_TAG, PACKAGE_VERSION,
};
pub use reader::PackageReader;
pub use writer::PackageWriter;
