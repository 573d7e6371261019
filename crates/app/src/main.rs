mod error;
mod jobs;
mod router;
mod telemetry;

use std::{net::SocketAddr, sync::Arc};

use tracing::info;
use url::Url;

use job_tracker_core::JobStore;
use job_tracker_cosmos::{CosmosClient, CosmosJobStore};
use job_tracker_storage::{Database, MemoryJobStore};
use job_tracker_util::{load_env_file, AppConfig, StoreConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_env_file();
    let config = AppConfig::from_env()?;

    telemetry::init_tracing(&config)?;
    let metrics = telemetry::init_metrics()?;

    let store = connect_store(&config.store).await?;
    let state = router::AppState::new(metrics, store);

    let addr: SocketAddr = config.bind_addr;
    info!(
        stage = "app",
        %addr,
        env = %config.environment.as_str(),
        store = config.store.as_str(),
        "starting HTTP server"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router::app_router(state))
        .await
        .map_err(|err| err.into())
}

/// Builds the single store instance shared by every request.
async fn connect_store(
    config: &StoreConfig,
) -> Result<Arc<dyn JobStore>, Box<dyn std::error::Error>> {
    match config {
        StoreConfig::Memory => Ok(Arc::new(MemoryJobStore::new())),
        StoreConfig::Sqlite { database_url } => {
            let database = Database::connect(database_url).await?;
            database.run_migrations().await?;
            Ok(Arc::new(database.jobs()))
        }
        StoreConfig::Cosmos(cosmos) => {
            let endpoint = Url::parse(&cosmos.endpoint)?;
            let client = CosmosClient::new(
                endpoint,
                &cosmos.key,
                cosmos.database.as_str(),
                cosmos.container.as_str(),
                reqwest::Client::builder().build()?,
            )?;
            Ok(Arc::new(CosmosJobStore::new(client)))
        }
    }
}
