//! Durable key/value tables
//!
//! Every logical table (`fileids`, `sources`) is one [`Store`]. The contract is
//! small: synchronous writes that either succeed durably or
//! return an error, point reads, and a one-shot cursor over every entry used
//! to bulk-load in-memory state at startup.
//!
//! - [`LogStore`] - append-only file table, fsync per write, compacted on open
//! - [`MemoryStore`] - in-process table with failure injection for tests

mod log;
mod memory;

pub use log::LogStore;
pub use memory::MemoryStore;

use std::sync::Arc;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by a [`Store`]
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{} is not a table file (bad magic)", path.display())]
    BadMagic { path: std::path::PathBuf },

    #[error("{} is corrupt at offset {offset}", path.display())]
    Corrupt { path: std::path::PathBuf, offset: u64 },

    #[error("field of {len} bytes exceeds the table's length limit")]
    TooLarge { len: usize },

    #[error("{} could not be restored after a failed write; reopen it", path.display())]
    Poisoned { path: std::path::PathBuf },

    #[error("injected failure: {0}")]
    Injected(&'static str),
}

/// A durable key/value table
pub trait Store: Send + Sync {
    /// Write `value` under `key`. Returns only once the write is durable.
    fn set_value(&self, key: &[u8], value: &[u8]) -> StoreResult<()>;

    /// Read the value stored under `key`
    fn value(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>>;

    /// Every (key, value) pair currently in the table, in no particular order
    fn entries(&self) -> StoreResult<Vec<(Vec<u8>, Vec<u8>)>>;
}

impl<S: Store + ?Sized> Store for Arc<S> {
    fn set_value(&self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        (**self).set_value(key, value)
    }

    fn value(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        (**self).value(key)
    }

    fn entries(&self) -> StoreResult<Vec<(Vec<u8>, Vec<u8>)>> {
        (**self).entries()
    }
}
