//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the shared outbound HTTP client
//! - Connect and initialize the configured store
//! - Select the gates and assemble the pipeline
//!
//! # Design Decisions
//! - Fail fast: a store that cannot initialize is fatal
//! - A missing store connection string is not fatal; submissions then fail
//!   with `DB_NOT_CONFIGURED` and preflight reports it

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::config::{IntakeConfig, StorageBackend};
use crate::intake::IntakePipeline;
use crate::storage::{MemoryStore, MongoStore, StoreError, UnconfiguredStore, WaitlistStore};

/// Errors that abort startup.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("failed to initialize store: {0}")]
    Store(#[from] StoreError),

    #[error("failed to load snapshot: {0}")]
    Snapshot(#[from] std::io::Error),
}

/// Long-lived handles produced at startup.
pub struct Services {
    pub pipeline: Arc<IntakePipeline>,
    /// Set when the in-memory backend is active, so the caller can snapshot it on exit.
    pub memory_store: Option<MemoryStore>,
}

/// Outbound client shared by the limiter and the bot verifier.
pub fn http_client(config: &IntakeConfig) -> Result<reqwest::Client, StartupError> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_millis(config.timeouts.external_call_ms))
        .build()?)
}

/// Open the configured store.
pub async fn build_store(
    config: &IntakeConfig,
) -> Result<(Arc<dyn WaitlistStore>, Option<MemoryStore>), StartupError> {
    let storage = &config.storage;

    match storage.backend {
        StorageBackend::Mongodb => match &storage.mongodb_uri {
            Some(uri) => {
                let store = MongoStore::connect(
                    uri.expose_secret(),
                    &storage.database,
                    &storage.collection,
                    Duration::from_millis(config.timeouts.external_call_ms),
                )
                .await?;
                Ok((Arc::new(store), None))
            }
            None => {
                tracing::error!("MONGODB_URI is not set; submissions will fail with DB_NOT_CONFIGURED");
                Ok((Arc::new(UnconfiguredStore), None))
            }
        },
        StorageBackend::Memory => {
            let store = match &storage.snapshot_path {
                Some(path) => MemoryStore::load_snapshot(Path::new(path))?,
                None => MemoryStore::new(None),
            };
            tracing::warn!("Using in-memory waitlist store");
            Ok((Arc::new(store.clone()), Some(store)))
        }
    }
}

/// Build every service the HTTP server needs.
pub async fn build_services(config: &IntakeConfig) -> Result<Services, StartupError> {
    let client = http_client(config)?;
    let (store, memory_store) = build_store(config).await?;
    let pipeline = IntakePipeline::from_config(config, store, client);

    Ok(Services {
        pipeline: Arc::new(pipeline),
        memory_store,
    })
}
