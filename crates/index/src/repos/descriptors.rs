//! Descriptor repository: reference-counted digest bookkeeping.

use crate::error::IndexResult;
use crate::models::{DescriptorRow, DescriptorStats};
use async_trait::async_trait;

/// Repository for digest descriptors.
///
/// Every mutation runs inside a single transaction so that concurrent
/// increment/read/decrement cannot interleave inconsistently. The returned
/// reference count is the value after the mutation.
#[async_trait]
pub trait DescriptorRepo: Send + Sync {
    /// Create a descriptor, or increment its count if the digest already has
    /// one. Idempotent under concurrent identical writes: the first caller
    /// inserts with count 1, later callers observe an elevated count.
    ///
    /// Returns the reference count after the call. A return of 1 means the
    /// caller is the first writer and owns committing the physical blob.
    async fn create_descriptor(&self, descriptor: &DescriptorRow) -> IndexResult<i64>;

    /// Increment the reference count without writing bytes.
    ///
    /// Fails with `NotFound` if the digest has no descriptor.
    async fn duplicate_descriptor(&self, digest: &str) -> IndexResult<i64>;

    /// Decrement the reference count and return the new value.
    ///
    /// The row is removed in the same transaction when the count reaches
    /// zero; callers interpret a returned `0` as "the physical blob must now
    /// be removed". Fails with `NotFound` if the digest has no descriptor.
    async fn delete_descriptor(&self, digest: &str) -> IndexResult<i64>;

    /// Read a descriptor. Fails with `NotFound` if missing.
    async fn read_descriptor(&self, digest: &str) -> IndexResult<DescriptorRow>;

    /// Check whether a descriptor exists.
    async fn descriptor_exists(&self, digest: &str) -> IndexResult<bool>;

    /// Get total descriptor count and size.
    async fn descriptor_stats(&self) -> IndexResult<DescriptorStats>;
}
