use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

use async_trait::async_trait;

use job_tracker_core::{JobApplication, JobStore, StoreError, StoreOperation};

/// Process-local store used for tests and throwaway runs.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: Mutex<HashMap<String, JobApplication>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(
        &self,
        operation: StoreOperation,
    ) -> Result<MutexGuard<'_, HashMap<String, JobApplication>>, StoreError> {
        self.jobs
            .lock()
            .map_err(|_| StoreError::backend(operation, "memory store lock poisoned"))
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn get_all(&self) -> Result<Vec<JobApplication>, StoreError> {
        let jobs = self.lock(StoreOperation::List)?;
        let mut all: Vec<JobApplication> = jobs.values().cloned().collect();
        all.sort_by(|a, b| (&a.created_at, &a.id).cmp(&(&b.created_at, &b.id)));
        Ok(all)
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<JobApplication>, StoreError> {
        Ok(self.lock(StoreOperation::Read)?.get(id).cloned())
    }

    async fn create(&self, job: &JobApplication) -> Result<JobApplication, StoreError> {
        let mut jobs = self.lock(StoreOperation::Create)?;
        if jobs.contains_key(&job.id) {
            return Err(StoreError::Conflict(job.id.clone()));
        }
        jobs.insert(job.id.clone(), job.clone());
        Ok(job.clone())
    }

    async fn upsert(&self, id: &str, job: &JobApplication) -> Result<JobApplication, StoreError> {
        let document = JobApplication {
            id: id.to_string(),
            ..job.clone()
        };
        self.lock(StoreOperation::Upsert)?
            .insert(id.to_string(), document.clone());
        Ok(document)
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.lock(StoreOperation::Delete)?.remove(id).is_some())
    }
}
