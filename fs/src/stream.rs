use std::fs::{File, OpenOptions};
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// How a stream is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessMode {
    /// Existing content is read; writes fail.
    Read,
    /// Content is created or truncated and then written.
    Write,
}

/// Random-access byte stream backing a [`FileEntry`](crate::FileEntry).
///
/// Every stream is `Read + Write + Seek`; read-only streams return an
/// error from `write`. Streams are owned by exactly one file entry and are
/// closed once, when the entry's reference count drops to zero.
pub trait Stream: Read + Write + Seek + Send {
    /// Name of the stream, usually the physical path it was opened from.
    fn name(&self) -> &str;

    fn access_mode(&self) -> AccessMode;

    /// Total length of the stream in bytes. The position is preserved.
    fn length(&mut self) -> io::Result<u64> {
        let pos = self.stream_position()?;
        let end = self.seek(SeekFrom::End(0))?;
        if pos != end {
            self.seek(SeekFrom::Start(pos))?;
        }
        Ok(end)
    }

    /// Flush pending data before the stream is dropped.
    fn close(&mut self) -> io::Result<()> {
        self.flush()
    }
}

fn read_only_error(name: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::PermissionDenied,
        format!("stream {name:?} is read-only"),
    )
}

/// Stream over a file on disk.
pub struct FileStream {
    name: String,
    file: File,
    mode: AccessMode,
}

impl FileStream {
    /// Open a file on disk.
    ///
    /// [`AccessMode::Read`] requires the file to exist; [`AccessMode::Write`]
    /// creates it or truncates existing content.
    pub fn open(path: impl AsRef<Path>, mode: AccessMode) -> io::Result<Self> {
        let path = path.as_ref();
        let file = match mode {
            AccessMode::Read => File::open(path)?,
            AccessMode::Write => OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true)
                .open(path)?,
        };
        Ok(Self {
            name: path.to_string_lossy().into_owned(),
            file,
            mode,
        })
    }
}

impl Read for FileStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Write for FileStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.mode == AccessMode::Read {
            return Err(read_only_error(&self.name));
        }
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl Seek for FileStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }
}

impl Stream for FileStream {
    fn name(&self) -> &str {
        &self.name
    }

    fn access_mode(&self) -> AccessMode {
        self.mode
    }

    fn length(&mut self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn close(&mut self) -> io::Result<()> {
        self.file.flush()?;
        if self.mode == AccessMode::Write {
            self.file.sync_data()?;
        }
        Ok(())
    }
}

type CommitFn = Box<dyn Fn(&[u8]) + Send>;

/// Stream over an in-memory buffer.
///
/// Writable memory streams may carry a commit callback which receives the
/// full buffer on every flush and on close.
pub struct MemoryStream {
    name: String,
    cursor: Cursor<Vec<u8>>,
    mode: AccessMode,
    commit: Option<CommitFn>,
}

impl MemoryStream {
    /// A read-only stream over `data`.
    pub fn reader(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            cursor: Cursor::new(data),
            mode: AccessMode::Read,
            commit: None,
        }
    }

    /// An empty writable stream.
    pub fn writer(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cursor: Cursor::new(Vec::new()),
            mode: AccessMode::Write,
            commit: None,
        }
    }

    /// Attach a callback that receives the buffer on flush and close.
    pub fn with_commit(mut self, commit: impl Fn(&[u8]) + Send + 'static) -> Self {
        self.commit = Some(Box::new(commit));
        self
    }

    /// Borrow the underlying bytes.
    pub fn data(&self) -> &[u8] {
        self.cursor.get_ref()
    }

    /// Consume the stream and return its bytes.
    pub fn into_inner(self) -> Vec<u8> {
        self.cursor.into_inner()
    }
}

impl Read for MemoryStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.cursor.read(buf)
    }
}

impl Write for MemoryStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.mode == AccessMode::Read {
            return Err(read_only_error(&self.name));
        }
        self.cursor.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Some(commit) = &self.commit {
            commit(self.cursor.get_ref());
        }
        Ok(())
    }
}

impl Seek for MemoryStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.cursor.seek(pos)
    }
}

impl Stream for MemoryStream {
    fn name(&self) -> &str {
        &self.name
    }

    fn access_mode(&self) -> AccessMode {
        self.mode
    }

    fn length(&mut self) -> io::Result<u64> {
        Ok(self.cursor.get_ref().len() as u64)
    }
}

/// Read-only window `[start, start + len)` into a file on disk.
///
/// Used to serve uncompressed package entries without copying them.
pub struct RangeStream {
    name: String,
    file: File,
    start: u64,
    len: u64,
    pos: u64,
}

impl RangeStream {
    pub fn open(
        name: impl Into<String>,
        path: impl AsRef<Path>,
        start: u64,
        len: u64,
    ) -> io::Result<Self> {
        let mut file = File::open(path)?;
        let file_len = file.metadata()?.len();
        if start.checked_add(len).is_none_or(|end| end > file_len) {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("range {start}+{len} exceeds file length {file_len}"),
            ));
        }
        file.seek(SeekFrom::Start(start))?;
        Ok(Self {
            name: name.into(),
            file,
            start,
            len,
            pos: 0,
        })
    }
}

impl Read for RangeStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.len.saturating_sub(self.pos);
        if remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let want = buf.len().min(usize::try_from(remaining).unwrap_or(usize::MAX));
        let read = self.file.read(&mut buf[..want])?;
        self.pos += read as u64;
        Ok(read)
    }
}

impl Write for RangeStream {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(read_only_error(&self.name))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for RangeStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.len.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
        };
        let Some(target) = target else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of stream",
            ));
        };
        self.file.seek(SeekFrom::Start(self.start + target))?;
        self.pos = target;
        Ok(target)
    }
}

impl Stream for RangeStream {
    fn name(&self) -> &str {
        &self.name
    }

    fn access_mode(&self) -> AccessMode {
        AccessMode::Read
    }

    fn length(&mut self) -> io::Result<u64> {
        Ok(self.len)
    }
}
