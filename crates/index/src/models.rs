//! Row types mapping to the index schema.
//!
//! The same row structs serve both backends: sqlx maps them from relational
//! rows, the sled backend encodes them as JSON values.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;

/// Digest descriptor: metadata plus live reference count for one digest.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DescriptorRow {
    /// Content digest, lowercase hex. Primary key.
    pub digest: String,
    /// Blob size in bytes.
    pub size: i64,
    /// MIME content type.
    pub content_type: String,
    /// Live reference count. Never negative; the row is removed at zero.
    pub ref_count: i64,
}

/// Content entry: a caller-chosen path bound to a digest.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ContentRow {
    /// Caller-chosen path. Primary key.
    pub path: String,
    /// Digest of the bound binary.
    pub digest: String,
    /// Free-form metadata, JSON-encoded.
    pub meta: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Cache entry row, shared by the generic cache and the content cache.
///
/// The generic cache stores the serialized value inline and leaves
/// `size_bytes` at the value's length; the content cache stores no inline
/// value (bytes live in the content store) and sets `size_bytes` to the
/// binary size used for capacity eviction.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CacheEntryRow {
    /// Cache key. Primary key within one cache instance.
    pub cache_key: String,
    /// Inline serialized value, if any.
    pub value: Option<Vec<u8>>,
    /// Byte size used for capacity accounting.
    pub size_bytes: i64,
    /// Last read or write.
    pub accessed_at: OffsetDateTime,
    /// Absolute expiry deadline; `None` means never.
    pub expires_at: Option<OffsetDateTime>,
}

/// Aggregate descriptor statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DescriptorStats {
    /// Number of descriptor rows.
    pub count: u64,
    /// Sum of blob sizes in bytes.
    pub total_size: u64,
}

/// Aggregate cache statistics for one cache instance.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    /// Number of entries.
    pub entries: u64,
    /// Sum of `size_bytes` across entries.
    pub total_bytes: u64,
}
