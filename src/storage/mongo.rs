//! MongoDB-backed waitlist store.

use std::time::Duration;

use futures_util::future::BoxFuture;
use mongodb::bson::{doc, to_bson, DateTime, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::IndexOptions;
use mongodb::{Client, Collection, Database, IndexModel};

use crate::storage::{StoreError, UpsertOutcome, WaitlistStore, WaitlistUpdate};

const DUPLICATE_KEY: i32 = 11000;

/// Collection handle with a unique index on `email`.
#[derive(Clone)]
pub struct MongoStore {
    database: Database,
    collection: Collection<Document>,
}

impl MongoStore {
    /// Build a client and select the collection without touching the server.
    ///
    /// The driver connects lazily, so the first round-trip is whatever the
    /// caller runs next. Nothing is written.
    pub async fn open(uri: &str, database: &str, collection: &str) -> Result<Self, StoreError> {
        let client = Client::with_uri_str(uri).await.map_err(backend)?;
        let database = client.database(database);
        let collection = database.collection::<Document>(collection);

        Ok(Self {
            database,
            collection,
        })
    }

    /// Open the store and ensure the unique email index.
    ///
    /// Index creation is the first round-trip, so an unreachable cluster
    /// surfaces here rather than on the first submission.
    pub async fn connect(
        uri: &str,
        database: &str,
        collection: &str,
        deadline: Duration,
    ) -> Result<Self, StoreError> {
        let store = Self::open(uri, database, collection).await?;

        let index = IndexModel::builder()
            .keys(doc! { "email": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();

        tokio::time::timeout(deadline, store.collection.create_index(index))
            .await
            .map_err(|_| StoreError::Backend(format!("index creation timed out after {:?}", deadline)))?
            .map_err(backend)?;

        tracing::info!(
            database = %store.database.name(),
            collection = %store.collection.name(),
            "MongoDB store ready"
        );

        Ok(store)
    }

    fn update_document(update: &WaitlistUpdate) -> Result<Document, StoreError> {
        let mut set = doc! {
            "name": update.name.clone(),
            "source": update.source,
            "referrer": update.referrer.clone(),
            "ipHash": update.ip_hash.clone(),
            "updatedAt": DateTime::now(),
        };
        if let Some(utm) = &update.utm {
            set.insert("utm", to_bson(utm).map_err(backend)?);
        }
        if let Some(onboarding) = &update.onboarding {
            set.insert("onboarding", to_bson(onboarding).map_err(backend)?);
        }

        Ok(doc! {
            "$setOnInsert": { "createdAt": DateTime::now() },
            "$set": set,
        })
    }

    async fn upsert_once(&self, email: &str, update: &Document) -> Result<UpsertOutcome, mongodb::error::Error> {
        let result = self
            .collection
            .update_one(doc! { "email": email }, update.clone())
            .upsert(true)
            .await?;

        Ok(if result.upserted_id.is_some() {
            UpsertOutcome::Inserted
        } else {
            UpsertOutcome::Updated
        })
    }

    async fn upsert_entry(&self, email: &str, update: &WaitlistUpdate) -> Result<UpsertOutcome, StoreError> {
        let update = Self::update_document(update)?;

        match self.upsert_once(email, &update).await {
            Ok(outcome) => Ok(outcome),
            // Two concurrent upserts can both miss the filter; the loser hits
            // the unique index and must now match the winner's document.
            Err(e) if is_duplicate_key(&e) => {
                tracing::debug!("Upsert raced on unique email index, retrying as update");
                self.upsert_once(email, &update).await.map_err(backend)
            }
            Err(e) => Err(backend(e)),
        }
    }
}

impl WaitlistStore for MongoStore {
    fn upsert<'a>(
        &'a self,
        email: &'a str,
        update: &'a WaitlistUpdate,
    ) -> BoxFuture<'a, Result<UpsertOutcome, StoreError>> {
        Box::pin(self.upsert_entry(email, update))
    }

    fn ping(&self) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            self.database
                .run_command(doc! { "ping": 1 })
                .await
                .map(|_| ())
                .map_err(backend)
        })
    }

    fn backend_name(&self) -> &'static str {
        "mongodb"
    }
}

fn backend(e: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn is_duplicate_key(error: &mongodb::error::Error) -> bool {
    match error.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => write_error.code == DUPLICATE_KEY,
        ErrorKind::Command(command_error) => command_error.code == DUPLICATE_KEY,
        _ => false,
    }
}
