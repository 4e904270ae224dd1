//! Path-addressed content storage for darkroom.
//!
//! Binds caller-chosen string paths to deduplicated binary store entries,
//! attaching free-form metadata and lifecycle timestamps. Keeps descriptor
//! reference counts correct across overwrite, copy, and delete.

pub mod content;
pub mod error;

pub use content::{Content, ContentStore};
pub use error::{ContentError, ContentResult};
