//! Path-addressed content store.

use crate::error::{ContentError, ContentResult};
use darkroom_core::{BinaryAttributes, ContentAttributes, Digest, DEFAULT_CONTENT_TYPE};
use darkroom_index::{ContentIndex, ContentRow, IndexError};
use darkroom_store::{Binary, BinaryStore, ByteStream};
use serde_json::Value;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::instrument;

/// A content entry handle: attributes plus a lazily-opened byte stream.
#[derive(Clone)]
pub struct Content {
    attributes: ContentAttributes,
    binaries: BinaryStore,
}

impl Content {
    /// The entry's attributes.
    pub fn attributes(&self) -> &ContentAttributes {
        &self.attributes
    }

    /// The caller-chosen path.
    pub fn path(&self) -> &str {
        &self.attributes.path
    }

    /// Free-form metadata supplied at write time.
    pub fn meta(&self) -> Option<&Value> {
        self.attributes.meta.as_ref()
    }

    /// Open the entry's bytes as a stream.
    pub async fn open(&self) -> ContentResult<ByteStream> {
        Ok(self.binaries.read(&self.attributes.binary.digest).await?)
    }
}

/// Maps caller-chosen string paths to binary store entries.
///
/// The store owns keeping descriptor reference counts correct as paths are
/// bound, rebound, copied, and deleted; byte storage itself is the binary
/// store's concern.
#[derive(Clone)]
pub struct ContentStore {
    binaries: BinaryStore,
    index: Arc<dyn ContentIndex>,
}

impl ContentStore {
    /// Create a content store sharing the binary store's index.
    pub fn new(binaries: BinaryStore, index: Arc<dyn ContentIndex>) -> Self {
        Self { binaries, index }
    }

    /// The underlying binary store.
    pub fn binaries(&self) -> &BinaryStore {
        &self.binaries
    }

    /// Write a stream under `path` with the default content type.
    pub async fn write(
        &self,
        path: &str,
        meta: Option<Value>,
        stream: ByteStream,
    ) -> ContentResult<Content> {
        self.write_with_type(path, meta, stream, DEFAULT_CONTENT_TYPE)
            .await
    }

    /// Write a stream under `path`.
    ///
    /// Overwrite is delete-old-then-create-new: the previous binding (and its
    /// binary reference) is released before the new bytes are committed, so
    /// transient double storage never occurs. A failed write can leave the
    /// path briefly unbound, never bound to partial content.
    #[instrument(skip(self, meta, stream), fields(path = path))]
    pub async fn write_with_type(
        &self,
        path: &str,
        meta: Option<Value>,
        stream: ByteStream,
        content_type: &str,
    ) -> ContentResult<Content> {
        validate_path(path)?;

        let mut created_at = None;
        if let Some(old) = self.index.get_content(path).await? {
            created_at = Some(old.created_at);
            self.index.delete_content(path).await?;
            self.binaries.delete(&parse_digest(&old.digest)?).await?;
        }

        let binary = self.binaries.create_with_type(stream, content_type).await?;
        let now = OffsetDateTime::now_utc();
        let created_at = created_at.unwrap_or(now);

        let row = ContentRow {
            path: path.to_string(),
            digest: binary.id().to_hex(),
            meta: encode_meta(&meta)?,
            created_at,
            updated_at: now,
        };
        if let Err(e) = self.index.put_content(&row).await {
            // Roll the fresh reference back so the binary does not leak.
            if let Err(rollback) = self.binaries.delete(binary.id()).await {
                tracing::warn!(
                    path = path,
                    error = %rollback,
                    "failed to roll back binary after content index failure"
                );
            }
            return Err(e.into());
        }

        Ok(self.assemble(path, &binary, meta, created_at, now))
    }

    /// Read a content entry. Fails with `NotFound` if the path is unbound.
    pub async fn read(&self, path: &str) -> ContentResult<Content> {
        let row = self.require(path).await?;
        let digest = parse_digest(&row.digest)?;
        let binary = self.binaries.get(&digest).await?;
        let meta = decode_meta(&row.meta)?;
        Ok(self.assemble(path, &binary, meta, row.created_at, row.updated_at))
    }

    /// Read a content entry's attributes without touching the blob.
    pub async fn attributes(&self, path: &str) -> ContentResult<ContentAttributes> {
        Ok(self.read(path).await?.attributes().clone())
    }

    /// Check whether a path is bound.
    pub async fn exists(&self, path: &str) -> ContentResult<bool> {
        Ok(self.index.content_exists(path).await?)
    }

    /// Delete a content entry, releasing its binary reference.
    ///
    /// Fails with `NotFound` if the path is unbound.
    #[instrument(skip(self), fields(path = path))]
    pub async fn delete(&self, path: &str) -> ContentResult<()> {
        let row = self.require(path).await?;
        self.index.delete_content(path).await?;
        self.binaries.delete(&parse_digest(&row.digest)?).await?;
        Ok(())
    }

    /// Copy `from` to `to` without copying bytes.
    ///
    /// The source's binary gains a reference; any binary previously bound to
    /// `to` is released. `meta: None` carries the source's metadata over.
    #[instrument(skip(self, meta), fields(from = from, to = to))]
    pub async fn copy(
        &self,
        from: &str,
        to: &str,
        meta: Option<Value>,
    ) -> ContentResult<Content> {
        validate_path(to)?;
        if from == to {
            return Err(ContentError::InvalidArgument(format!(
                "cannot copy {from} onto itself"
            )));
        }

        let src = self.require(from).await?;
        let digest = parse_digest(&src.digest)?;
        let binary = self.binaries.duplicate(&digest).await?;

        if let Some(old) = self.index.get_content(to).await? {
            self.index.delete_content(to).await?;
            self.binaries.delete(&parse_digest(&old.digest)?).await?;
        }

        let meta = match meta {
            Some(meta) => Some(meta),
            None => decode_meta(&src.meta)?,
        };
        let now = OffsetDateTime::now_utc();
        let row = ContentRow {
            path: to.to_string(),
            digest: src.digest.clone(),
            meta: encode_meta(&meta)?,
            created_at: now,
            updated_at: now,
        };
        if let Err(e) = self.index.put_content(&row).await {
            if let Err(rollback) = self.binaries.delete(&digest).await {
                tracing::warn!(
                    to = to,
                    error = %rollback,
                    "failed to roll back duplicate after content index failure"
                );
            }
            return Err(e.into());
        }

        Ok(self.assemble(to, &binary, meta, now, now))
    }

    async fn require(&self, path: &str) -> ContentResult<ContentRow> {
        self.index
            .get_content(path)
            .await?
            .ok_or_else(|| ContentError::NotFound(format!("path {path}")))
    }

    fn assemble(
        &self,
        path: &str,
        binary: &Binary,
        meta: Option<Value>,
        created: OffsetDateTime,
        updated: OffsetDateTime,
    ) -> Content {
        Content {
            attributes: ContentAttributes {
                path: path.to_string(),
                binary: BinaryAttributes {
                    digest: *binary.id(),
                    size: binary.attributes().size,
                    content_type: binary.attributes().content_type.clone(),
                },
                meta,
                created,
                updated,
            },
            binaries: self.binaries.clone(),
        }
    }
}

fn validate_path(path: &str) -> ContentResult<()> {
    if path.is_empty() {
        return Err(ContentError::InvalidArgument("empty path".to_string()));
    }
    Ok(())
}

fn parse_digest(hex: &str) -> ContentResult<Digest> {
    Digest::from_hex(hex)
        .map_err(|e| ContentError::Index(IndexError::Corrupt(format!("bad digest column: {e}"))))
}

fn encode_meta(meta: &Option<Value>) -> ContentResult<Option<String>> {
    match meta {
        Some(value) => Ok(Some(serde_json::to_string(value)?)),
        None => Ok(None),
    }
}

fn decode_meta(meta: &Option<String>) -> ContentResult<Option<Value>> {
    match meta {
        Some(raw) => Ok(Some(serde_json::from_str(raw)?)),
        None => Ok(None),
    }
}
