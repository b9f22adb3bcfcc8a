//! Utility functions shared across the crate.
//!
//! ## Modules
//!
//! - [`app_data`] - Application data directory and config management (XDG-compliant)
//! - [`encoding`] - Little-endian fixed-width and length-prefixed field encoding
//! - [`mtime`] - Filesystem modification times
//! - [`progress`] - Progress bars (no-op without the `progress` feature)

pub mod app_data;
pub mod encoding;
pub mod mtime;
pub mod progress;

pub use app_data::*;
pub use encoding::*;
pub use mtime::*;
