use async_trait::async_trait;
use shrink_core::error::{Result, StoreError};
use shrink_core::store::{OwnedUrl, Pinger, UrlPair, UrlStore};
use shrink_core::ShortId;
use sqlx::{PgPool, Row};

/// Name of the partial unique index guarding original URL uniqueness.
/// Unique violations on this index mean "URL already shortened"; any other
/// unique violation is a short ID collision.
const ORIGINAL_URL_INDEX: &str = "idx_urls_original_url";

/// Postgres implementation of the store contract.
///
/// Soft delete is an `is_deleted` flag; the unique index on original_url
/// is partial (`WHERE NOT is_deleted`) so a deleted URL can be shortened
/// again. Multi-row writes run in one transaction with rollback on error.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a store from an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates a store by opening a new connection pool and ensuring the
    /// schema exists.
    pub async fn connect(dsn: &str) -> Result<Self> {
        let pool = PgPool::connect(dsn).await.map_err(map_sqlx_error)?;
        let store = Self::new(pool);
        store.create_schema().await?;
        Ok(store)
    }

    /// Returns a reference to the underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn create_schema(&self) -> Result<()> {
        sqlx::raw_sql(include_str!("../ddl/postgres/urls.sql"))
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn existing_short_id(&self, url: &str) -> Result<ShortId> {
        let row = sqlx::query(
            r#"
            SELECT short_id
            FROM urls
            WHERE original_url = $1
              AND NOT is_deleted
            LIMIT 1
            "#,
        )
        .bind(url)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let short_id: String = row.try_get("short_id").map_err(map_sqlx_error)?;
        Ok(ShortId::new_unchecked(short_id))
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(sqlx::error::DatabaseError::is_unique_violation)
}

fn violated_constraint(err: &sqlx::Error) -> Option<&str> {
    err.as_database_error().and_then(|db| db.constraint())
}

fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    let message = err.to_string();

    match err {
        sqlx::Error::PoolTimedOut => StoreError::Timeout(message),
        sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => StoreError::Unavailable(message),
        sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::RowNotFound => StoreError::InvalidData(message),
        _ => StoreError::Query(message),
    }
}

#[async_trait]
impl UrlStore for PostgresStore {
    async fn save(&self, short_id: &ShortId, url: &str) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO urls (short_id, original_url)
            VALUES ($1, $2)
            "#,
        )
        .bind(short_id.as_str())
        .bind(url)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => {
                if violated_constraint(&err) == Some(ORIGINAL_URL_INDEX) {
                    let existing_id = self.existing_short_id(url).await?;
                    Err(StoreError::Conflict { existing_id })
                } else {
                    // Primary key violation: the generated ID is occupied.
                    Err(StoreError::IdTaken)
                }
            }
            Err(err) => Err(map_sqlx_error(err)),
        }
    }

    async fn get(&self, short_id: &ShortId) -> Result<String> {
        let row = sqlx::query(
            r#"
            SELECT original_url, is_deleted
            FROM urls
            WHERE short_id = $1
            "#,
        )
        .bind(short_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let Some(row) = row else {
            return Err(StoreError::NotFound);
        };

        let is_deleted: bool = row.try_get("is_deleted").map_err(map_sqlx_error)?;
        if is_deleted {
            return Err(StoreError::Gone);
        }

        row.try_get("original_url").map_err(map_sqlx_error)
    }

    async fn save_batch(&self, pairs: &[UrlPair]) -> Result<()> {
        if pairs.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        for pair in pairs {
            // First writer wins on ownership: an existing row only gets
            // its owner set when it has none. A pair whose URL is already
            // live under a different short ID is skipped entirely, so one
            // duplicate never fails the rest of the batch.
            sqlx::query(
                r#"
                INSERT INTO urls (short_id, original_url, owner_id)
                SELECT $1, $2, $3
                WHERE NOT EXISTS (
                    SELECT 1
                    FROM urls
                    WHERE original_url = $2
                      AND NOT is_deleted
                      AND short_id <> $1
                )
                ON CONFLICT (short_id) DO UPDATE
                    SET owner_id = COALESCE(urls.owner_id, EXCLUDED.owner_id)
                "#,
            )
            .bind(pair.short_id.as_str())
            .bind(&pair.original_url)
            .bind(pair.owner_id.as_deref())
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn user_urls(&self, owner_id: &str) -> Result<Vec<OwnedUrl>> {
        let rows = sqlx::query(
            r#"
            SELECT short_id, original_url
            FROM urls
            WHERE owner_id = $1
              AND NOT is_deleted
            "#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter()
            .map(|row| {
                let short_id: String = row.try_get("short_id").map_err(map_sqlx_error)?;
                let original_url: String =
                    row.try_get("original_url").map_err(map_sqlx_error)?;
                Ok(OwnedUrl {
                    short_id: ShortId::new_unchecked(short_id),
                    original_url,
                })
            })
            .collect()
    }

    async fn batch_delete_user_urls(&self, owner_id: &str, short_ids: &[ShortId]) -> Result<()> {
        if short_ids.is_empty() {
            return Ok(());
        }

        let ids: Vec<String> = short_ids.iter().map(|id| id.as_str().to_owned()).collect();

        sqlx::query(
            r#"
            UPDATE urls
            SET is_deleted = TRUE
            WHERE owner_id = $1
              AND short_id = ANY($2)
              AND NOT is_deleted
            "#,
        )
        .bind(owner_id)
        .bind(&ids)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }
}

#[async_trait]
impl Pinger for PostgresStore {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }
}
