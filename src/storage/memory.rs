//! In-process waitlist store with optional JSON snapshot persistence.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::BoxFuture;

use crate::storage::{now_ms, StoreError, UpsertOutcome, WaitlistRecord, WaitlistStore, WaitlistUpdate};

/// A thread-safe map of email → record.
///
/// The DashMap entry lock for a key is held for the whole
/// insert-or-update, so concurrent upserts of one email serialize.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<DashMap<String, WaitlistRecord>>,
    snapshot_path: Option<PathBuf>,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new(snapshot_path: Option<PathBuf>) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            snapshot_path,
        }
    }

    /// Load from a snapshot file if it exists; the file is also where
    /// [`save_snapshot`](Self::save_snapshot) writes.
    pub fn load_snapshot(path: &Path) -> std::io::Result<Self> {
        let store = Self::new(Some(path.to_path_buf()));
        if path.exists() {
            let reader = BufReader::new(File::open(path)?);
            let records: HashMap<String, WaitlistRecord> = serde_json::from_reader(reader)?;
            for (email, record) in records {
                store.inner.insert(email, record);
            }
            tracing::info!(records = store.inner.len(), path = %path.display(), "Loaded waitlist snapshot");
        }
        Ok(store)
    }

    /// Write all records to the snapshot file, if one is configured.
    pub fn save_snapshot(&self) -> std::io::Result<()> {
        if let Some(path) = &self.snapshot_path {
            let writer = BufWriter::new(File::create(path)?);
            let records: HashMap<_, _> = self
                .inner
                .iter()
                .map(|r| (r.key().clone(), r.value().clone()))
                .collect();
            serde_json::to_writer(writer, &records)?;
            tracing::info!(records = records.len(), path = %path.display(), "Saved waitlist snapshot");
        }
        Ok(())
    }

    /// Look up a record by normalized email.
    pub fn get(&self, email: &str) -> Option<WaitlistRecord> {
        self.inner.get(email).map(|r| r.value().clone())
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    fn upsert_now(&self, email: &str, update: &WaitlistUpdate) -> UpsertOutcome {
        let now = now_ms();
        match self.inner.entry(email.to_string()) {
            Entry::Occupied(mut occupied) => {
                let record = occupied.get_mut();
                record.name = update.name.clone();
                record.source = update.source.to_string();
                record.referrer = update.referrer.clone();
                record.ip_hash = update.ip_hash.clone();
                if update.utm.is_some() {
                    record.utm = update.utm.clone();
                }
                if update.onboarding.is_some() {
                    record.onboarding = update.onboarding.clone();
                }
                record.updated_at_ms = now;
                UpsertOutcome::Updated
            }
            Entry::Vacant(vacant) => {
                vacant.insert(WaitlistRecord {
                    email: email.to_string(),
                    name: update.name.clone(),
                    source: update.source.to_string(),
                    referrer: update.referrer.clone(),
                    ip_hash: update.ip_hash.clone(),
                    utm: update.utm.clone(),
                    onboarding: update.onboarding.clone(),
                    created_at_ms: now,
                    updated_at_ms: now,
                });
                UpsertOutcome::Inserted
            }
        }
    }
}

impl WaitlistStore for MemoryStore {
    fn upsert<'a>(
        &'a self,
        email: &'a str,
        update: &'a WaitlistUpdate,
    ) -> BoxFuture<'a, Result<UpsertOutcome, StoreError>> {
        Box::pin(async move { Ok(self.upsert_now(email, update)) })
    }

    fn ping(&self) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async { Ok(()) })
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
