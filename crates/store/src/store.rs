//! Content-addressable binary store over a local filesystem.

use crate::error::{StoreError, StoreResult};
use bytes::Bytes;
use darkroom_core::{BinaryAttributes, Digest, DEFAULT_CONTENT_TYPE, STREAM_CHUNK_SIZE};
use darkroom_index::{ContentIndex, DescriptorRow};
use futures::{Stream, StreamExt};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::instrument;
use uuid::Uuid;

/// A boxed stream of bytes for streaming reads and writes.
///
/// Pull-based: the consumer drives the producer, so a slow disk naturally
/// throttles a fast upstream.
pub type ByteStream = Pin<Box<dyn Stream<Item = StoreResult<Bytes>> + Send>>;

/// Wrap an in-memory buffer as a [`ByteStream`].
pub fn stream_bytes(data: impl Into<Bytes> + Send + 'static) -> ByteStream {
    Box::pin(futures::stream::once(async move { Ok(data.into()) }))
}

/// Handle to an immutable, digest-keyed blob.
///
/// The handle carries attributes only; bytes are opened on demand through
/// [`BinaryStore::read`].
#[derive(Clone, Debug)]
pub struct Binary {
    attributes: BinaryAttributes,
}

impl Binary {
    /// The content digest identifying this binary.
    pub fn id(&self) -> &Digest {
        &self.attributes.digest
    }

    /// The binary's attributes.
    pub fn attributes(&self) -> &BinaryAttributes {
        &self.attributes
    }

    fn from_row(digest: Digest, row: &DescriptorRow) -> Self {
        Self {
            attributes: BinaryAttributes {
                digest,
                size: row.size,
                content_type: row.content_type.clone(),
            },
        }
    }
}

/// Content-addressable, deduplicating blob store.
///
/// Bytes live on the filesystem at
/// `<base_path>/<hex[0..2]>/<hex[2..4]>/<digest>`; all reference counting is
/// delegated to the descriptor index, which is authoritative: a digest absent
/// from the index does not exist, whatever the filesystem says.
#[derive(Clone)]
pub struct BinaryStore {
    index: Arc<dyn ContentIndex>,
    base_path: PathBuf,
    tmp_path: PathBuf,
}

impl BinaryStore {
    /// Create a binary store, creating its directories if needed.
    pub async fn new(
        index: Arc<dyn ContentIndex>,
        config: &darkroom_core::StorageConfig,
    ) -> StoreResult<Self> {
        fs::create_dir_all(&config.base_path).await?;
        fs::create_dir_all(&config.tmp_path).await?;
        Ok(Self {
            index,
            base_path: config.base_path.clone(),
            tmp_path: config.tmp_path.clone(),
        })
    }

    /// Absolute path of the committed blob for a digest.
    fn blob_path(&self, digest: &Digest) -> PathBuf {
        self.base_path.join(digest.blob_key())
    }

    /// Write a stream into the store with the default content type.
    pub async fn create(&self, stream: ByteStream) -> StoreResult<Binary> {
        self.create_with_type(stream, DEFAULT_CONTENT_TYPE).await
    }

    /// Write a stream into the store.
    ///
    /// The stream is drained to a uniquely-named temp file while the digest
    /// is computed incrementally; only once the bytes are fully received and
    /// hashed is the blob either committed to its digest path (first writer)
    /// or discarded (duplicate content). A partially received upload is never
    /// visible at a digest path.
    #[instrument(skip(self, stream))]
    pub async fn create_with_type(
        &self,
        mut stream: ByteStream,
        content_type: &str,
    ) -> StoreResult<Binary> {
        let temp_path = self.tmp_path.join(format!("upload-{}", Uuid::new_v4()));
        let mut file = fs::File::create(&temp_path).await?;

        let mut hasher = Digest::hasher();
        let mut size: i64 = 0;

        let received = async {
            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                file.write_all(&chunk).await?;
                hasher.update(&chunk);
                size += chunk.len() as i64;
            }
            // Flush to disk before the commit rename
            file.sync_all().await?;
            Ok::<(), StoreError>(())
        }
        .await;
        drop(file);

        if let Err(e) = received {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e);
        }

        let digest = hasher.finalize();
        let row = DescriptorRow {
            digest: digest.to_hex(),
            size,
            content_type: content_type.to_string(),
            ref_count: 1,
        };

        let count = match self.index.create_descriptor(&row).await {
            Ok(count) => count,
            Err(e) => {
                let _ = fs::remove_file(&temp_path).await;
                return Err(e.into());
            }
        };

        if count == 1 {
            // First writer commits the blob.
            if let Err(e) = self.commit_blob(&temp_path, &self.blob_path(&digest)).await {
                let _ = fs::remove_file(&temp_path).await;
                // Roll the reference back so a live count always has a blob.
                if let Err(rollback) = self.index.delete_descriptor(&row.digest).await {
                    tracing::warn!(
                        digest = %row.digest,
                        error = %rollback,
                        "failed to roll back descriptor after commit failure"
                    );
                }
                return Err(e);
            }
            tracing::debug!(digest = %digest, size, "blob committed");
        } else {
            // Duplicate content: identical bytes are already committed.
            let _ = fs::remove_file(&temp_path).await;
            tracing::debug!(digest = %digest, ref_count = count, "blob deduplicated");
        }

        Ok(Binary {
            attributes: BinaryAttributes {
                digest,
                size,
                content_type: content_type.to_string(),
            },
        })
    }

    /// Rename a fully received temp file into its sharded blob location.
    async fn commit_blob(&self, temp_path: &Path, final_path: &Path) -> StoreResult<()> {
        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        // Defensive overwrite: an occupant at the digest path can only be a
        // leftover from a crashed earlier commit, and content-addressing
        // guarantees identical bytes either way.
        match fs::remove_file(final_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        fs::rename(temp_path, final_path).await?;
        Ok(())
    }

    /// Increment the reference count without copying bytes.
    #[instrument(skip(self), fields(digest = %id))]
    pub async fn duplicate(&self, id: &Digest) -> StoreResult<Binary> {
        self.index.duplicate_descriptor(&id.to_hex()).await?;
        let row = self.index.read_descriptor(&id.to_hex()).await?;
        Ok(Binary::from_row(*id, &row))
    }

    /// Get a binary handle. Fails with `NotFound` if the digest is not
    /// indexed.
    pub async fn get(&self, id: &Digest) -> StoreResult<Binary> {
        let row = self.index.read_descriptor(&id.to_hex()).await?;
        Ok(Binary::from_row(*id, &row))
    }

    /// Check whether a digest is indexed.
    pub async fn exists(&self, id: &Digest) -> StoreResult<bool> {
        Ok(self.index.descriptor_exists(&id.to_hex()).await?)
    }

    /// Open a binary's bytes as a stream.
    ///
    /// The index is consulted first: a digest without a descriptor is
    /// `NotFound` regardless of filesystem state.
    #[instrument(skip(self), fields(digest = %id))]
    pub async fn read(&self, id: &Digest) -> StoreResult<ByteStream> {
        self.index.read_descriptor(&id.to_hex()).await?;

        let path = self.blob_path(id);
        let file = fs::File::open(&path).await?;

        // Stream the blob in chunks instead of loading it into memory
        let stream = async_stream::try_stream! {
            use tokio::io::AsyncReadExt;
            let mut file = file;
            let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
            loop {
                let n = file.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                yield Bytes::copy_from_slice(&buf[..n]);
            }
        };

        Ok(Box::pin(stream))
    }

    /// Release one reference; removes the physical blob when the count
    /// reaches zero.
    #[instrument(skip(self), fields(digest = %id))]
    pub async fn delete(&self, id: &Digest) -> StoreResult<()> {
        let count = self.index.delete_descriptor(&id.to_hex()).await?;
        if count == 0 {
            match fs::remove_file(self.blob_path(id)).await {
                Ok(()) => {
                    tracing::debug!(digest = %id, "blob removed");
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    tracing::debug!(digest = %id, "blob already absent");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    pub(crate) fn index(&self) -> &Arc<dyn ContentIndex> {
        &self.index
    }

    pub(crate) fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub(crate) fn tmp_path(&self) -> &Path {
        &self.tmp_path
    }
}
