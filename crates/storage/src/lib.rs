pub mod memory;

use std::borrow::Cow;

use async_trait::async_trait;
use sqlx::{migrate::MigrateError, sqlite::SqlitePoolOptions, Row, SqlitePool};
use thiserror::Error;
use tracing::debug;

use job_tracker_core::{JobApplication, JobStore, StoreError, StoreOperation};

pub use memory::MemoryJobStore;

/// Top-level database handle that owns the SQLite connection pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Establishes a new SQLite connection pool for the provided connection string.
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(StorageError::Connect)?;

        apply_pragmas(&pool).await?;

        Ok(Self { pool })
    }

    /// Applies migrations located under `migrations/`.
    pub async fn run_migrations(&self) -> Result<(), StorageError> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(StorageError::Migration)?;
        Ok(())
    }

    /// Returns the document store backed by the `jobs` table.
    pub fn jobs(&self) -> JobRepository {
        JobRepository {
            pool: self.pool.clone(),
        }
    }

    /// Exposes the inner pool when lower level access is required.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

async fn apply_pragmas(pool: &SqlitePool) -> Result<(), StorageError> {
    sqlx::query("PRAGMA journal_mode = WAL;")
        .fetch_one(pool)
        .await
        .map_err(StorageError::Pragma)?;

    sqlx::query("PRAGMA synchronous = NORMAL;")
        .execute(pool)
        .await
        .map_err(StorageError::Pragma)?;

    sqlx::query("PRAGMA busy_timeout = 5000;")
        .execute(pool)
        .await
        .map_err(StorageError::Pragma)?;

    Ok(())
}

/// General storage level errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to connect to sqlite: {0}")]
    Connect(sqlx::Error),
    #[error("failed to apply pragma: {0}")]
    Pragma(sqlx::Error),
    #[error("failed to run database migrations: {0}")]
    Migration(MigrateError),
}

/// Job documents stored as JSON text, one row per id.
#[derive(Clone)]
pub struct JobRepository {
    pool: SqlitePool,
}

impl JobRepository {
    async fn insert(&self, job: &JobApplication) -> Result<(), JobRowError> {
        let document = serde_json::to_string(job)?;
        let result = sqlx::query("INSERT INTO jobs (id, document, created_at) VALUES (?, ?, ?)")
            .bind(&job.id)
            .bind(&document)
            .bind(&job.created_at)
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) => {
                if let Some(code) = db_err.code() {
                    // SQLITE_CONSTRAINT_PRIMARYKEY / SQLITE_CONSTRAINT_UNIQUE
                    if code == Cow::Borrowed("1555") || code == Cow::Borrowed("2067") {
                        return Err(JobRowError::Duplicate);
                    }
                }
                Err(JobRowError::Database(sqlx::Error::Database(db_err)))
            }
            Err(err) => Err(JobRowError::Database(err)),
        }
    }

    async fn replace(&self, job: &JobApplication) -> Result<(), JobRowError> {
        let document = serde_json::to_string(job)?;
        sqlx::query(
            "INSERT INTO jobs (id, document, created_at) VALUES (?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET document = excluded.document",
        )
        .bind(&job.id)
        .bind(&document)
        .bind(&job.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fetch_one(&self, id: &str) -> Result<Option<JobApplication>, JobRowError> {
        let row = sqlx::query("SELECT document FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let document: String = row.get("document");
                Ok(Some(serde_json::from_str(&document)?))
            }
            None => Ok(None),
        }
    }

    async fn fetch_all(&self) -> Result<Vec<JobApplication>, JobRowError> {
        let rows = sqlx::query("SELECT document FROM jobs ORDER BY created_at, id")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| {
                let document: String = row.get("document");
                serde_json::from_str(&document).map_err(JobRowError::from)
            })
            .collect()
    }

    async fn remove(&self, id: &str) -> Result<bool, JobRowError> {
        let result = sqlx::query("DELETE FROM jobs WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl JobStore for JobRepository {
    async fn get_all(&self) -> Result<Vec<JobApplication>, StoreError> {
        self.fetch_all()
            .await
            .map_err(|err| err.into_store_error(StoreOperation::List, ""))
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<JobApplication>, StoreError> {
        self.fetch_one(id)
            .await
            .map_err(|err| err.into_store_error(StoreOperation::Read, id))
    }

    async fn create(&self, job: &JobApplication) -> Result<JobApplication, StoreError> {
        self.insert(job)
            .await
            .map_err(|err| err.into_store_error(StoreOperation::Create, &job.id))?;
        debug!(stage = "store", backend = "sqlite", job_id = %job.id, "job inserted");
        Ok(job.clone())
    }

    async fn upsert(&self, id: &str, job: &JobApplication) -> Result<JobApplication, StoreError> {
        let document = JobApplication {
            id: id.to_string(),
            ..job.clone()
        };
        self.replace(&document)
            .await
            .map_err(|err| err.into_store_error(StoreOperation::Upsert, id))?;
        debug!(stage = "store", backend = "sqlite", job_id = %id, "job upserted");
        Ok(document)
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        self.remove(id)
            .await
            .map_err(|err| err.into_store_error(StoreOperation::Delete, id))
    }
}

/// Errors raised while reading or writing rows in `jobs`.
#[derive(Debug, Error)]
pub enum JobRowError {
    #[error("job already exists")]
    Duplicate,
    #[error("failed to encode or decode job document: {0}")]
    Document(#[from] serde_json::Error),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl JobRowError {
    fn into_store_error(self, operation: StoreOperation, id: &str) -> StoreError {
        match self {
            Self::Duplicate => StoreError::Conflict(id.to_string()),
            other => StoreError::backend(operation, other),
        }
    }
}
