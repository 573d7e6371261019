use async_trait::async_trait;
use tracing::debug;

use job_tracker_core::{JobApplication, JobStore, StoreError, StoreOperation};

use crate::client::{CosmosClient, CosmosError};

/// [`JobStore`] backed by a Cosmos DB container partitioned on `/id`.
#[derive(Clone)]
pub struct CosmosJobStore {
    client: CosmosClient,
}

impl CosmosJobStore {
    pub fn new(client: CosmosClient) -> Self {
        Self { client }
    }
}

fn store_error(operation: StoreOperation, id: &str, err: CosmosError) -> StoreError {
    if operation == StoreOperation::Create && err.is_conflict() {
        return StoreError::Conflict(id.to_string());
    }
    StoreError::backend(operation, err)
}

#[async_trait]
impl JobStore for CosmosJobStore {
    async fn get_all(&self) -> Result<Vec<JobApplication>, StoreError> {
        let jobs: Vec<JobApplication> = self
            .client
            .list_documents()
            .await
            .map_err(|err| store_error(StoreOperation::List, "", err))?;
        debug!(stage = "store", backend = "cosmos", count = jobs.len(), "read job feed");
        Ok(jobs)
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<JobApplication>, StoreError> {
        self.client
            .read_document(id)
            .await
            .map_err(|err| store_error(StoreOperation::Read, id, err))
    }

    async fn create(&self, job: &JobApplication) -> Result<JobApplication, StoreError> {
        self.client
            .create_document(&job.id, job)
            .await
            .map_err(|err| store_error(StoreOperation::Create, &job.id, err))
    }

    async fn upsert(&self, id: &str, job: &JobApplication) -> Result<JobApplication, StoreError> {
        let document = JobApplication {
            id: id.to_string(),
            ..job.clone()
        };
        self.client
            .upsert_document(id, &document)
            .await
            .map_err(|err| store_error(StoreOperation::Upsert, id, err))
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        self.client
            .delete_document(id)
            .await
            .map_err(|err| store_error(StoreOperation::Delete, id, err))
    }
}
