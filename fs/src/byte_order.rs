//! Canonical byte order for every multi-byte integer on the wire.
//!
//! Both the package container and the binary archive encode integers and
//! floats big-endian, regardless of the host. All encoding goes through the
//! [`WriteCanonical`] / [`ReadCanonical`] extension traits so no call site
//! can skip the conversion.

use std::io::{self, Read, Write};

macro_rules! canonical_methods {
    ($($read:ident, $write:ident => $ty:ty;)*) => {
        /// Big-endian writers for fixed-width scalars.
        pub(crate) trait WriteCanonical: Write {
            $(
                fn $write(&mut self, value: $ty) -> io::Result<()> {
                    self.write_all(&value.to_be_bytes())
                }
            )*

            fn write_bool(&mut self, value: bool) -> io::Result<()> {
                self.write_all(&[u8::from(value)])
            }

            /// Writes a `u64` length followed by the raw bytes.
            fn write_sized_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
                self.write_u64_be(bytes.len() as u64)?;
                self.write_all(bytes)
            }
        }

        /// Big-endian readers for fixed-width scalars.
        pub(crate) trait ReadCanonical: Read {
            $(
                fn $read(&mut self) -> io::Result<$ty> {
                    let mut bytes = [0u8; std::mem::size_of::<$ty>()];
                    self.read_exact(&mut bytes)?;
                    Ok(<$ty>::from_be_bytes(bytes))
                }
            )*

            fn read_bool(&mut self) -> io::Result<bool> {
                let mut byte = [0u8; 1];
                self.read_exact(&mut byte)?;
                Ok(byte[0] != 0)
            }

            /// Reads a `u64` length followed by that many bytes.
            ///
            /// `limit` bounds the length so a corrupted prefix cannot trigger
            /// a huge allocation.
            fn read_sized_bytes(&mut self, limit: u64) -> io::Result<Vec<u8>> {
                let len = self.read_u64_be()?;
                if len > limit {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("length prefix {len} exceeds limit {limit}"),
                    ));
                }
                self.read_bytes(len)
            }

            /// Reads exactly `len` bytes into a new buffer.
            fn read_bytes(&mut self, len: u64) -> io::Result<Vec<u8>> {
                let mut bytes = Vec::new();
                bytes.try_reserve_exact(len as usize).map_err(|_| {
                    io::Error::new(io::ErrorKind::OutOfMemory, format!("cannot allocate {len} bytes"))
                })?;
                Read::take(&mut *self, len).read_to_end(&mut bytes)?;
                if (bytes.len() as u64) < len {
                    return Err(io::ErrorKind::UnexpectedEof.into());
                }
                Ok(bytes)
            }
        }
    };
}

canonical_methods! {
    read_u8_be, write_u8_be => u8;
    read_u16_be, write_u16_be => u16;
    read_u32_be, write_u32_be => u32;
    read_u64_be, write_u64_be => u64;
    read_i8_be, write_i8_be => i8;
    read_i16_be, write_i16_be => i16;
    read_i32_be, write_i32_be => i32;
    read_i64_be, write_i64_be => i64;
    read_f32_be, write_f32_be => f32;
    read_f64_be, write_f64_be => f64;
}

impl<W: Write + ?Sized> WriteCanonical for W {}
impl<R: Read + ?Sized> ReadCanonical for R {}
