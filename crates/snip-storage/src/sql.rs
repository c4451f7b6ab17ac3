use async_trait::async_trait;
use jiff::Timestamp;
use snip_core::error::Result;
use snip_core::repository::{normalize_owner, validate_owner, validate_save, Repository};
use snip_core::{Deadline, ShortCode, StorageError, UrlMapping, UrlRecord};
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::{AnyPool, Row};
use tracing::{debug, info};

const CREATE_SHORT_URLS: &str = r#"
CREATE TABLE IF NOT EXISTS short_urls (
    short_url VARCHAR(255) NOT NULL UNIQUE,
    long_url TEXT NOT NULL,
    user_id VARCHAR(255) NOT NULL DEFAULT '',
    created_at BIGINT NOT NULL
)
"#;

const CREATE_LONG_URL_INDEX: &str = r#"
CREATE UNIQUE INDEX IF NOT EXISTS short_urls_long_url_user_id
    ON short_urls (long_url, user_id)
"#;

/// Relational implementation of the repository contract.
///
/// Backed by an `sqlx` `AnyPool`, so the same queries run against
/// PostgreSQL and SQLite. The anonymous owner is stored as `''` so the
/// `(long_url, user_id)` unique index covers anonymous mappings too.
///
/// Unlike the in-memory and file backends, re-saving an identical mapping
/// is a silent no-op (`ON CONFLICT DO NOTHING`) rather than a conflict. A
/// save whose short code is held by a different mapping still reports
/// `Conflict`.
#[derive(Debug, Clone)]
pub struct SqlRepository {
    pool: AnyPool,
}

impl SqlRepository {
    /// Creates a repository from an existing pool and runs the migration.
    pub async fn new(pool: AnyPool) -> Result<Self> {
        let repository = Self { pool };
        repository.migrate().await?;
        Ok(repository)
    }

    /// Opens a pool for `database_url` and runs the migration.
    ///
    /// Fails with `Unavailable` if the database cannot be reached.
    pub async fn connect(database_url: &str) -> Result<Self> {
        sqlx::any::install_default_drivers();

        let mut options = AnyPoolOptions::new();
        if is_in_memory_sqlite(database_url) {
            // Every connection to `:memory:` is its own database.
            options = options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }

        let pool = options
            .connect(database_url)
            .await
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        info!("connected to database");
        Self::new(pool).await
    }

    /// Returns a reference to the underlying pool.
    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    /// Creates the table and index if they do not exist yet.
    pub async fn migrate(&self) -> Result<()> {
        for statement in [CREATE_SHORT_URLS, CREATE_LONG_URL_INDEX] {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
        }
        info!("short_urls schema is ready");
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.pool.is_closed() {
            return Err(StorageError::Closed);
        }
        Ok(())
    }
}

fn is_in_memory_sqlite(database_url: &str) -> bool {
    database_url.starts_with("sqlite:") && database_url.contains(":memory:")
}

fn owner_column(owner: Option<&str>) -> &str {
    normalize_owner(owner).unwrap_or("")
}

fn parse_created_at(millis: i64) -> Result<Timestamp> {
    Timestamp::from_millisecond(millis).map_err(|e| {
        StorageError::InvalidData(format!("invalid created_at timestamp '{}': {e}", millis))
    })
}

fn record_from_row(row: &AnyRow) -> Result<UrlRecord> {
    let long_url: String = row.try_get("long_url").map_err(map_sqlx_error)?;
    let user_id: String = row.try_get("user_id").map_err(map_sqlx_error)?;
    let created_at: i64 = row.try_get("created_at").map_err(map_sqlx_error)?;

    Ok(UrlRecord {
        long_url,
        owner: (!user_id.is_empty()).then_some(user_id),
        created_at: parse_created_at(created_at)?,
    })
}

fn map_sqlx_error(err: sqlx::Error) -> StorageError {
    let message = err.to_string();

    match err {
        sqlx::Error::PoolClosed => StorageError::Closed,
        sqlx::Error::PoolTimedOut
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => StorageError::Unavailable(message),
        sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::RowNotFound => StorageError::InvalidData(message),
        _ => StorageError::Query(message),
    }
}

impl SqlRepository {
    async fn fetch_record(&self, deadline: &Deadline, code: &ShortCode) -> Result<Option<UrlRecord>> {
        let row = deadline
            .run(
                sqlx::query(
                    r#"
                    SELECT long_url, user_id, created_at
                    FROM short_urls
                    WHERE short_url = $1
                    "#,
                )
                .bind(code.as_str())
                .fetch_optional(&self.pool),
            )
            .await?
            .map_err(map_sqlx_error)?;

        row.as_ref().map(record_from_row).transpose()
    }
}

#[async_trait]
impl Repository for SqlRepository {
    async fn save(&self, deadline: &Deadline, code: &ShortCode, record: UrlRecord) -> Result<()> {
        validate_save(code, &record)?;
        self.ensure_open()?;

        let mut conn = deadline
            .run(self.pool.acquire())
            .await?
            .map_err(map_sqlx_error)?;

        // Once a connection is held the insert runs to completion, so a
        // firing deadline can never land after the row is committed.
        let result = sqlx::query(
            r#"
            INSERT INTO short_urls (short_url, long_url, user_id, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(code.as_str())
        .bind(record.long_url.as_str())
        .bind(owner_column(record.owner()))
        .bind(record.created_at.as_millisecond())
        .execute(&mut *conn)
        .await
        .map_err(map_sqlx_error)?;
        drop(conn);

        if result.rows_affected() > 0 {
            debug!(code = %code, "saved mapping");
            return Ok(());
        }

        match self.fetch_record(deadline, code).await? {
            Some(existing) if existing.matches(&record.long_url, record.owner()) => {
                debug!(code = %code, "mapping already stored, insert was a no-op");
                Ok(())
            }
            Some(_) => Err(StorageError::Conflict(format!(
                "short code '{code}' is already taken"
            ))),
            None => Err(StorageError::Conflict(
                "long url is already shortened for this owner".to_string(),
            )),
        }
    }

    async fn get(&self, deadline: &Deadline, code: &ShortCode) -> Result<Option<UrlRecord>> {
        self.ensure_open()?;
        self.fetch_record(deadline, code).await
    }

    async fn find_by_long_url(
        &self,
        deadline: &Deadline,
        long_url: &str,
        owner: Option<&str>,
    ) -> Result<Option<ShortCode>> {
        self.ensure_open()?;

        let row = deadline
            .run(
                sqlx::query(
                    r#"
                    SELECT short_url
                    FROM short_urls
                    WHERE long_url = $1
                      AND user_id = $2
                    LIMIT 1
                    "#,
                )
                .bind(long_url)
                .bind(owner_column(owner))
                .fetch_optional(&self.pool),
            )
            .await?
            .map_err(map_sqlx_error)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let short_url: String = row.try_get("short_url").map_err(map_sqlx_error)?;
        Ok(Some(ShortCode::new_unchecked(short_url)))
    }

    async fn list_by_owner(&self, deadline: &Deadline, owner: &str) -> Result<Vec<UrlMapping>> {
        let owner = validate_owner(owner)?;
        self.ensure_open()?;

        let rows = deadline
            .run(
                sqlx::query(
                    r#"
                    SELECT short_url, long_url, user_id, created_at
                    FROM short_urls
                    WHERE user_id = $1
                    ORDER BY created_at, short_url
                    "#,
                )
                .bind(owner)
                .fetch_all(&self.pool),
            )
            .await?
            .map_err(map_sqlx_error)?;

        rows.iter()
            .map(|row| -> Result<UrlMapping> {
                let short_url: String = row.try_get("short_url").map_err(map_sqlx_error)?;
                Ok(UrlMapping {
                    code: ShortCode::new_unchecked(short_url),
                    record: record_from_row(row)?,
                })
            })
            .collect()
    }

    async fn ping(&self, deadline: &Deadline) -> Result<()> {
        self.ensure_open()?;

        deadline
            .run(sqlx::query("SELECT 1").execute(&self.pool))
            .await?
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if self.pool.is_closed() {
            return Ok(());
        }
        self.pool.close().await;
        info!("closed database pool");
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "sql"
    }
}
