//! Domain types shared by the HTTP layer and the document store backends.

pub mod store;
pub mod types;

pub use store::{JobStore, StoreError, StoreOperation};
pub use types::{new_job_id, JobApplication, JobFields, RequestError};
