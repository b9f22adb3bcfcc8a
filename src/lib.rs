//! # srcid - durable file ids for a C/C++ indexer
//!
//! srcid gives every source and header path a compact [`LocationId`] that
//! stays the same across restarts, and keeps a per translation unit
//! [`SourceRecord`] used to decide whether a file has to be parsed again.
//!
//! ## Architecture
//!
//! - [`store`] - durable key/value tables (append-only log, in-memory)
//! - [`index`] - path interning, source records and the project database
//! - [`error`] - library error types
//! - [`utils`] - binary encoding, mtimes, app data locations
//!
//! ## Quick Start
//!
//! ```ignore
//! use srcid::index::{CompilerArgs, Database};
//! use srcid::utils::AppConfig;
//! use std::path::Path;
//!
//! let config = AppConfig::load().unwrap();
//! let db = Database::open(Path::new("/path/to/project"), &config).unwrap();
//!
//! let id = db.interner().intern("/path/to/project/main.cpp").unwrap();
//! assert_eq!(db.interner().lookup("/path/to/project/main.cpp"), Some(id));
//!
//! let file = Path::new("/path/to/project/main.cpp");
//! if db.needs_reindex(file) {
//!     let args = CompilerArgs::new("c++", file, vec!["-std=c++17".into()]);
//!     db.record(file, args, &[], false).unwrap();
//! }
//! ```
//!
//! [`LocationId`]: index::LocationId
//! [`SourceRecord`]: index::SourceRecord

pub mod error;
pub mod index;
pub mod store;
pub mod utils;
