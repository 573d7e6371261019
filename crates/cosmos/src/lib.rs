mod auth;
pub mod client;
pub mod store;

pub use client::{CosmosClient, CosmosError};
pub use store::CosmosJobStore;
