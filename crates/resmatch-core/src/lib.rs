//! # resmatch-core
//!
//! Core types, traits, and defaults for the resmatch job orchestration
//! service.
//!
//! This crate provides the data model shared by the matching engine, the
//! job runtime, and the HTTP API.

pub mod defaults;
pub mod error;
pub mod file_safety;
pub mod models;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use file_safety::{is_allowed_extension, sanitize_filename, validate_upload};
pub use models::*;
pub use traits::*;
