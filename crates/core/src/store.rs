use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::JobApplication;

/// Document store holding job applications keyed (and partitioned) by id.
///
/// Implementations delegate concurrency control to their backend: two
/// concurrent upserts on the same id resolve as last-write-wins.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Returns every stored record. Order is backend defined.
    async fn get_all(&self) -> Result<Vec<JobApplication>, StoreError>;

    /// Point read; `Ok(None)` when no record exists at `id`.
    async fn get_by_id(&self, id: &str) -> Result<Option<JobApplication>, StoreError>;

    /// Inserts a new record. Fails with [`StoreError::Conflict`] when the id is taken.
    async fn create(&self, job: &JobApplication) -> Result<JobApplication, StoreError>;

    /// Inserts or fully replaces the record at `id`.
    async fn upsert(&self, id: &str, job: &JobApplication) -> Result<JobApplication, StoreError>;

    /// Removes the record at `id`, returning whether one existed.
    async fn delete(&self, id: &str) -> Result<bool, StoreError>;
}

/// Store call that failed, used to prefix backend messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOperation {
    List,
    Read,
    Create,
    Upsert,
    Delete,
}

impl StoreOperation {
    /// Returns the label used in metrics and log fields.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Read => "read",
            Self::Create => "create",
            Self::Upsert => "upsert",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for StoreOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::List => "retrieving jobs",
            Self::Read => "retrieving job",
            Self::Create => "creating job",
            Self::Upsert => "updating job",
            Self::Delete => "deleting job",
        };
        f.write_str(text)
    }
}

/// Errors surfaced by [`JobStore`] implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("error creating job: a job with id {0} already exists")]
    Conflict(String),
    #[error("error {operation}: {message}")]
    Backend {
        operation: StoreOperation,
        message: String,
    },
}

impl StoreError {
    /// Wraps any backend failure with the operation that produced it.
    pub fn backend(operation: StoreOperation, err: impl fmt::Display) -> Self {
        Self::Backend {
            operation,
            message: err.to_string(),
        }
    }
}
