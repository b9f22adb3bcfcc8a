use crate::store::StoreError;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by interning and the record tables
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("path is not valid UTF-8: {path:?}")]
    InvalidPath { path: PathBuf },

    #[error("corrupt entry in {table}: {reason}")]
    CorruptEntry { table: &'static str, reason: String },

    #[error("location id space exhausted")]
    IdSpaceExhausted,

    #[error("cannot encode record: {0}")]
    Encode(String),

    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
}

/// A stored record could not be decoded (truncation, corruption, version skew)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("record is truncated")]
    Truncated,

    #[error("invalid unsaved-file flag byte {0:#04x}")]
    InvalidFlag(u8),

    #[error("string field is not valid UTF-8")]
    InvalidUtf8,

    #[error("malformed field: {0}")]
    Malformed(String),

    #[error("{0} trailing bytes after record")]
    TrailingBytes(usize),
}

impl From<std::io::Error> for DecodeError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof => DecodeError::Truncated,
            std::io::ErrorKind::InvalidData
                if err
                    .get_ref()
                    .is_some_and(|inner| inner.is::<std::string::FromUtf8Error>()) =>
            {
                DecodeError::InvalidUtf8
            }
            _ => DecodeError::Malformed(err.to_string()),
        }
    }
}
