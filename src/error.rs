use std::io;

use thiserror::Error;

/// Error type for backup and restore operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid segment length: {0}")]
    InvalidSegmentLength(i16),

    #[error("Unexpected end of stream inside a segment")]
    Truncated,

    #[error("String segment too large: {0} bytes (max 32767)")]
    StringTooLarge(usize),

    #[error("Segment size {0} out of range (1..=32767)")]
    SegmentSizeOutOfRange(usize),

    #[error("Buffer size must be at least 1")]
    InvalidBufferSize,

    #[error("Header segment is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("Invalid table header: {0}")]
    Header(#[from] serde_json::Error),

    #[error("Dependency cycle among tables: {0}")]
    DependencyCycle(String),

    #[error("Connection configuration does not name a database")]
    MissingDatabase,

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Database error: {0}")]
    Db(#[from] tokio_postgres::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Recover a codec error smuggled through an `io::Error` by an
    /// `io::Read`/`io::Write` adapter boundary.
    pub(crate) fn from_io(err: io::Error) -> Self {
        match err.downcast::<Error>() {
            Ok(inner) => inner,
            Err(err) => Error::Io(err),
        }
    }

    pub(crate) fn into_io(self) -> io::Error {
        match self {
            Error::Io(err) => err,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}
