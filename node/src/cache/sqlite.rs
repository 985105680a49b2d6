//! SQLite cache backend.

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::types::Json;
use sqlx::Row;
use waypost_engine::{Listing, RecordId};

use super::{CacheResult, LocalCache};

/// Durable cache in a SQLite database, one JSON document per listing.
#[derive(Debug, Clone)]
pub struct SqliteCache {
    pool: SqlitePool,
}

impl SqliteCache {
    /// Open (creating if needed) the database at `url` and apply migrations.
    pub async fn connect(url: &str) -> CacheResult<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        Self::from_pool(pool).await
    }

    /// A private in-memory database, for tests and throwaway nodes.
    ///
    /// Pinned to a single connection that never expires: every SQLite
    /// `:memory:` connection is its own database.
    pub async fn in_memory() -> CacheResult<Self> {
        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Self::from_pool(pool).await
    }

    /// Wrap an existing pool, applying migrations first.
    pub async fn from_pool(pool: SqlitePool) -> CacheResult<Self> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn decode(row: &SqliteRow) -> CacheResult<Listing> {
    let Json(listing): Json<Listing> = row.try_get("document")?;
    Ok(listing)
}

#[async_trait]
impl LocalCache for SqliteCache {
    async fn get_all(&self) -> CacheResult<Vec<Listing>> {
        let rows = sqlx::query(r#"SELECT document FROM listings ORDER BY id ASC"#)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(decode).collect()
    }

    async fn get(&self, id: &str) -> CacheResult<Option<Listing>> {
        let row = sqlx::query(r#"SELECT document FROM listings WHERE id = $1"#)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(decode).transpose()
    }

    async fn put(&self, listing: &Listing) -> CacheResult<()> {
        sqlx::query(
            r#"
            INSERT INTO listings (id, document, cached_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE SET
                document = EXCLUDED.document,
                cached_at = EXCLUDED.cached_at
            "#,
        )
        .bind(&listing.id)
        .bind(Json(listing))
        .bind(chrono::Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, id: &str) -> CacheResult<()> {
        sqlx::query(r#"DELETE FROM listings WHERE id = $1"#)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn clear(&self) -> CacheResult<()> {
        sqlx::query(r#"DELETE FROM listings"#)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn ids(&self) -> CacheResult<Vec<RecordId>> {
        let ids: Vec<(String,)> = sqlx::query_as(r#"SELECT id FROM listings ORDER BY id ASC"#)
            .fetch_all(&self.pool)
            .await?;
        Ok(ids.into_iter().map(|(id,)| id).collect())
    }
}
