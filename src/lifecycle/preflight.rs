//! Production readiness check.
//!
//! Reports every missing production setting by its environment variable
//! name, then pings the store. The store is opened without index creation,
//! so nothing is written.

use std::sync::Arc;
use std::time::Duration;

use crate::config::{BotVerificationMode, IntakeConfig, RateLimitBackend, StorageBackend};
use crate::resilience::call_with_deadline;
use crate::storage::{MemoryStore, MongoStore, StoreError, UnconfiguredStore, WaitlistStore};

pub const PREFLIGHT_OK: &str = "PROD_PREFLIGHT_OK";
pub const PREFLIGHT_FAILED: &str = "PROD_PREFLIGHT_FAILED";

/// Deadline for connecting to and pinging the store.
pub const STORE_PING_DEADLINE: Duration = Duration::from_secs(8);

/// Result of a preflight run.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PreflightReport {
    pub missing: Vec<&'static str>,
    pub store_error: Option<String>,
}

impl PreflightReport {
    pub fn passed(&self) -> bool {
        self.missing.is_empty() && self.store_error.is_none()
    }

    /// Lines to print: the verdict first, then one line per problem.
    pub fn lines(&self) -> Vec<String> {
        if self.passed() {
            return vec![PREFLIGHT_OK.to_string()];
        }

        let mut lines = vec![PREFLIGHT_FAILED.to_string()];
        if !self.missing.is_empty() {
            lines.push(format!("Missing settings: {}", self.missing.join(", ")));
        }
        if let Some(error) = &self.store_error {
            lines.push(format!("Store connection failed: {}", error));
        }
        lines
    }
}

/// Settings a production deployment of this config still lacks.
pub fn missing_production_settings(config: &IntakeConfig) -> Vec<&'static str> {
    let mut missing = Vec::new();

    if config.storage.backend == StorageBackend::Mongodb && config.storage.mongodb_uri.is_none() {
        missing.push("MONGODB_URI");
    }
    if config.abuse.ip_hash_salt.is_none() {
        missing.push("IP_HASH_SALT");
    }
    if config.rate_limit.backend == RateLimitBackend::Upstash {
        if config.rate_limit.upstash_url.is_none() {
            missing.push("UPSTASH_REDIS_REST_URL");
        }
        if config.rate_limit.upstash_token.is_none() {
            missing.push("UPSTASH_REDIS_REST_TOKEN");
        }
    }
    if config.bot_verification.mode == BotVerificationMode::Required
        && config.bot_verification.secret.is_none()
    {
        missing.push("TURNSTILE_SECRET_KEY");
    }

    missing
}

/// Ping `store` within [`STORE_PING_DEADLINE`].
pub async fn check_store(store: &dyn WaitlistStore) -> Result<(), String> {
    call_with_deadline("preflight_ping", STORE_PING_DEADLINE, store.ping())
        .await
        .map_err(|failure| failure.to_string())
}

/// Check settings, then, if none are missing, connect to and ping the store.
pub async fn run_preflight(config: &IntakeConfig) -> PreflightReport {
    let missing = missing_production_settings(config);
    if !missing.is_empty() {
        return PreflightReport {
            missing,
            store_error: None,
        };
    }

    let store_error = match open_store(config).await {
        Ok(store) => check_store(store.as_ref()).await.err(),
        Err(e) => Some(e.to_string()),
    };

    PreflightReport {
        missing,
        store_error,
    }
}

async fn open_store(config: &IntakeConfig) -> Result<Arc<dyn WaitlistStore>, StoreError> {
    let storage = &config.storage;
    match (storage.backend, &storage.mongodb_uri) {
        (StorageBackend::Mongodb, Some(uri)) => {
            let store =
                MongoStore::open(uri.expose_secret(), &storage.database, &storage.collection)
                    .await?;
            Ok(Arc::new(store))
        }
        (StorageBackend::Mongodb, None) => Ok(Arc::new(UnconfiguredStore)),
        (StorageBackend::Memory, _) => Ok(Arc::new(MemoryStore::new(None))),
    }
}
