use thiserror::Error;

/// Errors that can occur during file system, package, or archive operations.
#[derive(Error, Debug)]
pub enum FsError {
    /// The path, handle, or argument is malformed (empty path, forbidden
    /// characters, unbalanced group, ...).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The requested path, handle, alias, or factory is unknown.
    #[error("not found: {0}")]
    NotFound(String),
    /// A mount alias, factory, or package entry is already registered.
    #[error("already exists: {0}")]
    AlreadyExists(String),
    /// A package or archive stream has a bad tag, version, or layout.
    #[error("invalid format: {0}")]
    InvalidFormat(String),
    /// An IO error occurred while reading or writing a stream.
    #[error("IO error: {0}")]
    Io(std::io::Error),
    /// An allocation failed while building entries or nodes.
    #[error("out of memory: {0}")]
    OutOfMemory(String),
    /// The operation is not supported by this backend or codec.
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl FsError {
    /// Returns `true` for [`FsError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, FsError::NotFound(_))
    }
}

impl From<std::io::Error> for FsError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => FsError::NotFound(err.to_string()),
            std::io::ErrorKind::UnexpectedEof => FsError::InvalidFormat(err.to_string()),
            std::io::ErrorKind::OutOfMemory => FsError::OutOfMemory(err.to_string()),
            _ => FsError::Io(err),
        }
    }
}

/// Result alias used by every fallible operation in this crate.
pub type FsResult<T> = Result<T, FsError>;
