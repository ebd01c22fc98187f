use std::io::Write;

use parking_lot::Mutex;

use super::{ArchiveValue, BEGIN_BLOCK, END_BLOCK, MAX_NAME_LEN};
use crate::byte_order::WriteCanonical;
use crate::{FsError, FsResult};

struct WriterState<W> {
    sink: W,
    depth: usize,
}

/// Streaming writer for a binary archive.
///
/// Every call is written to the sink immediately; nothing is buffered
/// besides what `W` buffers itself. The writer may be shared by reference.
///
/// ```ignore
/// let writer = BinaryArchiveWriter::new(Vec::new());
/// writer.begin_group("camera")?;
/// writer.set_f32("fov", 60.0)?;
/// writer.end_group()?;
/// let bytes = writer.close()?;
/// ```
pub struct BinaryArchiveWriter<W: Write> {
    state: Mutex<WriterState<W>>,
}

impl<W: Write> BinaryArchiveWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            state: Mutex::new(WriterState { sink, depth: 0 }),
        }
    }

    fn write_key(sink: &mut W, key: &str) -> FsResult<()> {
        if key.len() as u64 > MAX_NAME_LEN {
            return Err(FsError::InvalidArgument(format!(
                "archive key of {} bytes exceeds {MAX_NAME_LEN}",
                key.len()
            )));
        }
        sink.write_sized_bytes(key.as_bytes())?;
        Ok(())
    }

    /// Open a group named `key`.
    pub fn begin_group(&self, key: &str) -> FsResult<()> {
        let mut state = self.state.lock();
        Self::write_key(&mut state.sink, key)?;
        state.sink.write_u32_be(BEGIN_BLOCK)?;
        state.depth += 1;
        Ok(())
    }

    /// Close the innermost open group.
    pub fn end_group(&self) -> FsResult<()> {
        let mut state = self.state.lock();
        if state.depth == 0 {
            return Err(FsError::InvalidArgument(
                "end_group without a matching begin_group".into(),
            ));
        }
        state.sink.write_u32_be(END_BLOCK)?;
        state.depth -= 1;
        Ok(())
    }

    /// Write one named value.
    pub fn set_value(&self, key: &str, value: &ArchiveValue) -> FsResult<()> {
        let mut state = self.state.lock();
        Self::write_key(&mut state.sink, key)?;
        state.sink.write_u32_be(value.type_tag())?;
        value.write_payload(&mut state.sink)
    }

    pub fn set_string(&self, key: &str, value: &str) -> FsResult<()> {
        self.set_value(key, &ArchiveValue::from(value))
    }

    /// Number of groups currently open.
    pub fn depth(&self) -> usize {
        self.state.lock().depth
    }

    /// Flush and return the sink.
    ///
    /// # Panics
    ///
    /// Panics if groups are still open.
    pub fn close(self) -> FsResult<W> {
        let mut state = self.state.into_inner();
        assert!(
            state.depth == 0,
            "archive closed with {} group(s) still open",
            state.depth
        );
        state.sink.flush()?;
        Ok(state.sink)
    }
}

macro_rules! typed_setters {
    ($($name:ident: $ty:ty),* $(,)?) => {
        impl<W: Write> BinaryArchiveWriter<W> {
            $(
                pub fn $name(&self, key: &str, value: $ty) -> FsResult<()> {
                    self.set_value(key, &ArchiveValue::from(value))
                }
            )*
        }
    };
}

typed_setters! {
    set_i8: i8,
    set_i16: i16,
    set_i32: i32,
    set_i64: i64,
    set_u8: u8,
    set_u16: u16,
    set_u32: u32,
    set_u64: u64,
    set_f32: f32,
    set_f64: f64,
    set_bool: bool,
}
