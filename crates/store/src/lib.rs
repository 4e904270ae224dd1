//! Content-addressable blob storage for darkroom.
//!
//! This crate provides the binary store:
//! - Streamed writes to a temp location with incremental digest computation
//! - Atomic commit into a sharded, deduplicated blob layout
//! - Reference counting delegated to the descriptor index
//! - Orphan sweeps for stale temp files and unindexed blobs

pub mod error;
pub mod store;
pub mod sweep;

pub use error::{StoreError, StoreResult};
pub use store::{stream_bytes, Binary, BinaryStore, ByteStream};
