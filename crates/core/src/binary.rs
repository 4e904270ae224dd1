//! Attribute bundles shared between the binary store and the content store.

use crate::digest::Digest;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Metadata describing an immutable binary blob.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BinaryAttributes {
    /// Content digest, the content-addressable key.
    pub digest: Digest,
    /// Size in bytes.
    pub size: i64,
    /// MIME content type.
    pub content_type: String,
}

/// Metadata describing a content entry: a caller-chosen path bound to a binary.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContentAttributes {
    /// The caller-chosen path.
    pub path: String,
    /// Attributes of the binary the path is bound to.
    pub binary: BinaryAttributes,
    /// Free-form metadata supplied at write time.
    pub meta: Option<serde_json::Value>,
    /// When the entry was first created.
    pub created: OffsetDateTime,
    /// When the entry was last rebound or rewritten.
    pub updated: OffsetDateTime,
}
