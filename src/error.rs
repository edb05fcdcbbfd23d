use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while reading or rewriting a container.
#[derive(Debug, Error)]
pub enum Error {
    /// bad signature, unknown block marker, inconsistent length/type/count
    #[error("malformed container: {0}")]
    MalformedContainer(String),

    /// fewer bytes available than a fixed or length-prefixed read demands
    #[error("truncated input: {0}")]
    TruncatedInput(String),

    #[error("unsupported field type {code} on tag 0x{tag:04x}")]
    UnsupportedFieldType { tag: u16, code: u16 },

    /// a deferred field was never patched while writing. this is a bug.
    #[error("out-of-line data for tag 0x{tag:04x} was never assigned an offset")]
    OffsetResolutionFailure { tag: u16 },

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("{operation} is not supported for {container} containers")]
    UnsupportedOperation {
        operation: &'static str,
        container: &'static str,
    },

    #[error(transparent)]
    Io(io::Error),
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            Error::TruncatedInput(e.to_string())
        } else {
            Error::Io(e)
        }
    }
}

impl Error {
    pub(crate) fn malformed<S: Into<String>>(msg: S) -> Self {
        Error::MalformedContainer(msg.into())
    }
}
