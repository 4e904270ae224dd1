//! Index trait and the SQLite-backed implementation.

use crate::error::{IndexError, IndexResult};
use crate::models::{CacheEntryRow, CacheStats, ContentRow, DescriptorRow, DescriptorStats};
use crate::repos::{CacheEntryRepo, ContentRepo, DescriptorRepo};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use time::OffsetDateTime;

/// Combined index trait: every concern one backend must cover.
#[async_trait]
pub trait ContentIndex: DescriptorRepo + ContentRepo + CacheEntryRepo + Send + Sync {
    /// Create tables/trees for this index instance.
    async fn migrate(&self) -> IndexResult<()>;

    /// Check backend connectivity and health.
    async fn health_check(&self) -> IndexResult<()>;
}

/// Validate a logical store/cache name before it is spliced into a query.
///
/// Names become table and tree identifiers, so only `[a-z0-9_]` starting
/// with a letter is accepted.
pub(crate) fn validate_name(name: &str) -> IndexResult<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_lowercase() => {
            chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(IndexError::InvalidName(format!(
            "expected [a-z][a-z0-9_]*, got {name:?}"
        )))
    }
}

/// SQLite-backed index.
pub struct SqliteIndex {
    pool: Pool<Sqlite>,
    name: String,
}

impl SqliteIndex {
    /// Create a new SQLite index for the store named `name`.
    pub async fn new(path: impl AsRef<Path>, name: &str) -> IndexResult<Self> {
        validate_name(name)?;
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            // Prevent transient "database is locked" errors under concurrent access.
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            // SQLite permits limited write concurrency; a single connection avoids
            // persistent "database is locked" failures under concurrent callers
            // and makes each transaction the sole serialization point.
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self {
            pool,
            name: name.to_string(),
        };
        store.migrate().await?;
        tracing::debug!(name, path = %path.display(), "sqlite index ready");
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    fn descriptors_table(&self) -> String {
        format!("{}_descriptors", self.name)
    }

    fn content_table(&self) -> String {
        format!("{}_content", self.name)
    }

    fn cache_table(cache: &str) -> String {
        format!("{cache}_cache")
    }
}

#[async_trait]
impl ContentIndex for SqliteIndex {
    async fn migrate(&self) -> IndexResult<()> {
        let descriptors = self.descriptors_table();
        let content = self.content_table();
        let name = &self.name;

        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {descriptors} (
                digest        TEXT PRIMARY KEY,
                size          INTEGER NOT NULL,
                content_type  TEXT NOT NULL,
                ref_count     INTEGER NOT NULL DEFAULT 1
            )
            "#
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {content} (
                path        TEXT PRIMARY KEY,
                digest      TEXT NOT NULL,
                meta        TEXT,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            )
            "#
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{name}_content_digest ON {content}(digest)"
        ))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn health_check(&self) -> IndexResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl DescriptorRepo for SqliteIndex {
    async fn create_descriptor(&self, descriptor: &DescriptorRow) -> IndexResult<i64> {
        let table = self.descriptors_table();

        // Atomic increment-or-insert: this single statement is the sole
        // serialization point for concurrent writes of the same digest.
        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!(
            r#"
            INSERT INTO {table} (digest, size, content_type, ref_count)
            VALUES (?, ?, ?, 1)
            ON CONFLICT(digest) DO UPDATE SET ref_count = ref_count + 1
            "#
        ))
        .bind(&descriptor.digest)
        .bind(descriptor.size)
        .bind(&descriptor.content_type)
        .execute(&mut *tx)
        .await?;

        let count: i64 =
            sqlx::query_scalar(&format!("SELECT ref_count FROM {table} WHERE digest = ?"))
                .bind(&descriptor.digest)
                .fetch_one(&mut *tx)
                .await?;

        tx.commit().await?;
        Ok(count)
    }

    async fn duplicate_descriptor(&self, digest: &str) -> IndexResult<i64> {
        let table = self.descriptors_table();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(&format!(
            "UPDATE {table} SET ref_count = ref_count + 1 WHERE digest = ?"
        ))
        .bind(digest)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(IndexError::NotFound(format!("digest {digest}")));
        }

        let count: i64 =
            sqlx::query_scalar(&format!("SELECT ref_count FROM {table} WHERE digest = ?"))
                .bind(digest)
                .fetch_one(&mut *tx)
                .await?;

        tx.commit().await?;
        Ok(count)
    }

    async fn delete_descriptor(&self, digest: &str) -> IndexResult<i64> {
        let table = self.descriptors_table();
        let mut tx = self.pool.begin().await?;

        let count: Option<i64> =
            sqlx::query_scalar(&format!("SELECT ref_count FROM {table} WHERE digest = ?"))
                .bind(digest)
                .fetch_optional(&mut *tx)
                .await?;

        let count = match count {
            Some(count) => count,
            None => return Err(IndexError::NotFound(format!("digest {digest}"))),
        };

        // Row removal and reaching zero are one logical step: a digest with
        // count 0 must not be observable.
        if count <= 1 {
            sqlx::query(&format!("DELETE FROM {table} WHERE digest = ?"))
                .bind(digest)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            Ok(0)
        } else {
            sqlx::query(&format!(
                "UPDATE {table} SET ref_count = ref_count - 1 WHERE digest = ?"
            ))
            .bind(digest)
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;
            Ok(count - 1)
        }
    }

    async fn read_descriptor(&self, digest: &str) -> IndexResult<DescriptorRow> {
        let table = self.descriptors_table();
        let row = sqlx::query_as::<_, DescriptorRow>(&format!(
            "SELECT * FROM {table} WHERE digest = ?"
        ))
        .bind(digest)
        .fetch_optional(&self.pool)
        .await?;
        row.ok_or_else(|| IndexError::NotFound(format!("digest {digest}")))
    }

    async fn descriptor_exists(&self, digest: &str) -> IndexResult<bool> {
        let table = self.descriptors_table();
        let row: Option<(i32,)> =
            sqlx::query_as(&format!("SELECT 1 FROM {table} WHERE digest = ?"))
                .bind(digest)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }

    async fn descriptor_stats(&self) -> IndexResult<DescriptorStats> {
        let table = self.descriptors_table();
        let (count, total_size): (i64, i64) = sqlx::query_as(&format!(
            "SELECT COUNT(*), COALESCE(SUM(size), 0) FROM {table}"
        ))
        .fetch_one(&self.pool)
        .await?;
        Ok(DescriptorStats {
            count: count as u64,
            total_size: total_size as u64,
        })
    }
}

#[async_trait]
impl ContentRepo for SqliteIndex {
    async fn get_content(&self, path: &str) -> IndexResult<Option<ContentRow>> {
        let table = self.content_table();
        let row =
            sqlx::query_as::<_, ContentRow>(&format!("SELECT * FROM {table} WHERE path = ?"))
                .bind(path)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row)
    }

    async fn put_content(&self, row: &ContentRow) -> IndexResult<()> {
        let table = self.content_table();
        sqlx::query(&format!(
            r#"
            INSERT OR REPLACE INTO {table} (path, digest, meta, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            "#
        ))
        .bind(&row.path)
        .bind(&row.digest)
        .bind(&row.meta)
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_content(&self, path: &str) -> IndexResult<()> {
        let table = self.content_table();
        let result = sqlx::query(&format!("DELETE FROM {table} WHERE path = ?"))
            .bind(path)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(IndexError::NotFound(format!("path {path}")));
        }
        Ok(())
    }

    async fn content_exists(&self, path: &str) -> IndexResult<bool> {
        let table = self.content_table();
        let row: Option<(i32,)> = sqlx::query_as(&format!("SELECT 1 FROM {table} WHERE path = ?"))
            .bind(path)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }
}

#[async_trait]
impl CacheEntryRepo for SqliteIndex {
    async fn ensure_cache(&self, cache: &str) -> IndexResult<()> {
        validate_name(cache)?;
        let table = Self::cache_table(cache);

        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                cache_key    TEXT PRIMARY KEY,
                value        BLOB,
                size_bytes   INTEGER NOT NULL,
                accessed_at  TEXT NOT NULL,
                expires_at   TEXT
            )
            "#
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_accessed ON {table}(accessed_at)"
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_expires ON {table}(expires_at)"
        ))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_entry(&self, cache: &str, key: &str) -> IndexResult<Option<CacheEntryRow>> {
        validate_name(cache)?;
        let table = Self::cache_table(cache);
        let row = sqlx::query_as::<_, CacheEntryRow>(&format!(
            "SELECT * FROM {table} WHERE cache_key = ?"
        ))
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn put_entry(&self, cache: &str, row: &CacheEntryRow) -> IndexResult<()> {
        validate_name(cache)?;
        let table = Self::cache_table(cache);
        sqlx::query(&format!(
            r#"
            INSERT OR REPLACE INTO {table} (cache_key, value, size_bytes, accessed_at, expires_at)
            VALUES (?, ?, ?, ?, ?)
            "#
        ))
        .bind(&row.cache_key)
        .bind(&row.value)
        .bind(row.size_bytes)
        .bind(row.accessed_at)
        .bind(row.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn touch_entry(
        &self,
        cache: &str,
        key: &str,
        accessed_at: OffsetDateTime,
    ) -> IndexResult<()> {
        validate_name(cache)?;
        let table = Self::cache_table(cache);
        sqlx::query(&format!(
            "UPDATE {table} SET accessed_at = ? WHERE cache_key = ?"
        ))
        .bind(accessed_at)
        .bind(key)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_entry(&self, cache: &str, key: &str) -> IndexResult<bool> {
        validate_name(cache)?;
        let table = Self::cache_table(cache);
        let result = sqlx::query(&format!("DELETE FROM {table} WHERE cache_key = ?"))
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn select_expired(
        &self,
        cache: &str,
        now: OffsetDateTime,
        limit: u32,
    ) -> IndexResult<Vec<CacheEntryRow>> {
        validate_name(cache)?;
        let table = Self::cache_table(cache);
        let rows = sqlx::query_as::<_, CacheEntryRow>(&format!(
            r#"
            SELECT * FROM {table}
            WHERE expires_at IS NOT NULL AND expires_at < ?
            ORDER BY expires_at
            LIMIT ?
            "#
        ))
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn select_idle(
        &self,
        cache: &str,
        cutoff: OffsetDateTime,
        limit: u32,
    ) -> IndexResult<Vec<CacheEntryRow>> {
        validate_name(cache)?;
        let table = Self::cache_table(cache);
        let rows = sqlx::query_as::<_, CacheEntryRow>(&format!(
            r#"
            SELECT * FROM {table}
            WHERE accessed_at < ?
            ORDER BY accessed_at
            LIMIT ?
            "#
        ))
        .bind(cutoff)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn select_least_recent(
        &self,
        cache: &str,
        limit: u32,
    ) -> IndexResult<Vec<CacheEntryRow>> {
        validate_name(cache)?;
        let table = Self::cache_table(cache);
        let rows = sqlx::query_as::<_, CacheEntryRow>(&format!(
            r#"
            SELECT * FROM {table}
            ORDER BY accessed_at ASC, size_bytes DESC
            LIMIT ?
            "#
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn cache_stats(&self, cache: &str) -> IndexResult<CacheStats> {
        validate_name(cache)?;
        let table = Self::cache_table(cache);
        let (entries, total_bytes): (i64, i64) = sqlx::query_as(&format!(
            "SELECT COUNT(*), COALESCE(SUM(size_bytes), 0) FROM {table}"
        ))
        .fetch_one(&self.pool)
        .await?;
        Ok(CacheStats {
            entries: entries as u64,
            total_bytes: total_bytes as u64,
        })
    }
}
