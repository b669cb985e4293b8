//! Waitlist persistence.
//!
//! # Data Flow
//! ```text
//! NormalizedEntry
//!     → WaitlistUpdate (fields overwritten on every submission)
//!     → WaitlistStore::upsert(email, update)
//!         insert: created_at = now, plus update
//!         match:  update only; created_at untouched
//! ```
//!
//! # Design Decisions
//! - One record per normalized email, enforced by the engine (unique index
//!   in MongoDB, map key in memory)
//! - Upsert atomicity is delegated to the engine; callers hold no locks
//! - Handles are built and initialized at startup, then shared via `Arc`

pub mod memory;
pub mod mongo;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::intake::submission::{NormalizedEntry, Onboarding, Utm};

pub use memory::MemoryStore;
pub use mongo::MongoStore;

/// Intake channel recorded on every entry.
pub const SOURCE: &str = "waitlist";

/// A persisted waitlist entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitlistRecord {
    pub email: String,
    pub name: Option<String>,
    pub source: String,
    pub referrer: Option<String>,
    pub ip_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utm: Option<Utm>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub onboarding: Option<Onboarding>,
    /// Milliseconds since the epoch of the first insert.
    pub created_at_ms: u64,
    /// Milliseconds since the epoch of the latest write.
    pub updated_at_ms: u64,
}

/// Fields written on every successful submission.
///
/// `utm` and `onboarding` are only written when present, so a later
/// submission without them keeps what an earlier one stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitlistUpdate {
    pub name: Option<String>,
    pub source: &'static str,
    pub referrer: Option<String>,
    pub ip_hash: Option<String>,
    pub utm: Option<Utm>,
    pub onboarding: Option<Onboarding>,
}

impl WaitlistUpdate {
    pub fn from_entry(entry: &NormalizedEntry) -> Self {
        Self {
            name: entry.name.clone(),
            source: SOURCE,
            referrer: entry.referrer.clone(),
            ip_hash: entry.ip_hash.clone(),
            utm: entry.utm.clone(),
            onboarding: entry.onboarding.clone(),
        }
    }
}

/// Whether an upsert created or refreshed the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

impl UpsertOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpsertOutcome::Inserted => "inserted",
            UpsertOutcome::Updated => "updated",
        }
    }
}

/// Storage failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store is not configured")]
    NotConfigured,

    #[error("store error: {0}")]
    Backend(String),
}

/// Idempotent waitlist storage keyed by normalized email.
pub trait WaitlistStore: Send + Sync {
    /// Insert the record if absent, else overwrite its mutable fields.
    fn upsert<'a>(
        &'a self,
        email: &'a str,
        update: &'a WaitlistUpdate,
    ) -> BoxFuture<'a, Result<UpsertOutcome, StoreError>>;

    /// Round-trip to the engine.
    fn ping(&self) -> BoxFuture<'_, Result<(), StoreError>>;

    /// Short engine name for logs.
    fn backend_name(&self) -> &'static str;
}

/// Stand-in used when the deployment has no store connection configured.
#[derive(Debug, Default)]
pub struct UnconfiguredStore;

impl WaitlistStore for UnconfiguredStore {
    fn upsert<'a>(
        &'a self,
        _email: &'a str,
        _update: &'a WaitlistUpdate,
    ) -> BoxFuture<'a, Result<UpsertOutcome, StoreError>> {
        Box::pin(async { Err(StoreError::NotConfigured) })
    }

    fn ping(&self) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async { Err(StoreError::NotConfigured) })
    }

    fn backend_name(&self) -> &'static str {
        "unconfigured"
    }
}

pub(crate) fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
