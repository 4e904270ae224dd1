//! Core domain types and shared logic for the darkroom storage core.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Content digests and incremental hashing
//! - Binary and content attribute bundles
//! - Configuration for the index, blob storage, caches, and sweeper
//! - The core error taxonomy

pub mod binary;
pub mod config;
pub mod digest;
pub mod error;

pub use binary::{BinaryAttributes, ContentAttributes};
pub use config::{
    AppConfig, CachePolicy, ContentCacheConfig, IndexConfig, StorageConfig, SweepConfig,
};
pub use digest::{Digest, DigestHasher};
pub use error::{Error, Result};

/// Default content type attached to binaries written without one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Chunk size used when streaming blobs from disk: 64 KiB.
pub const STREAM_CHUNK_SIZE: usize = 64 * 1024;
