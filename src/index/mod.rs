pub mod args;
pub mod database;
pub mod interner;
pub mod scan;
pub mod source;
pub mod stats;
pub mod table;
pub mod types;

pub use args::CompilerArgs;
pub use database::Database;
pub use interner::PathInterner;
pub use source::{Dependencies, SourceRecord};
pub use table::SourceTable;
pub use types::*;
