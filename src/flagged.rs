//! # Flagged Values
//!
//! One append-only store of flagged strings, instantiated per collection.
//!
//! - `exists`: linear scan, stops at the first record whose key field equals the value
//! - `add`: required fields checked before any I/O, then a plain append (no dedup)
//! - `total`: whatever counting strategy the backend has
//!
//! Every call runs under the per-request deadline. Check-then-add is two calls
//! and nothing closes the window between them; concurrent writers may or may
//! not be seen by a scan already in progress.
use std::{future::Future, sync::Arc, time::Duration};

use futures::TryStreamExt;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::{
    record::{Fields, RecordId},
    store::{DocumentStore, RecordStream, StoreError},
};

#[derive(Error, Debug)]
pub enum AddError {
    #[error("Missing fields: {}", .0.join(", "))]
    Missing(Vec<String>),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Collection {
    pub name: &'static str,
    pub key_field: &'static str,
    pub required: &'static [&'static str],
}

pub const BOT_PROFILES: Collection = Collection {
    name: "bot-profiles",
    key_field: "url",
    required: &["url"],
};

pub const BOT_COMMENTS: Collection = Collection {
    name: "bot-comments",
    key_field: "comment",
    required: &["comment"],
};

impl Collection {
    pub fn missing_fields(&self, fields: &Fields) -> Vec<String> {
        self.required
            .iter()
            .filter(|field| !fields.contains_key(**field))
            .map(|field| field.to_string())
            .collect()
    }
}

#[derive(Clone)]
pub struct FlaggedStore {
    store: Arc<dyn DocumentStore>,
    deadline: Duration,
}

impl FlaggedStore {
    pub fn new(store: Arc<dyn DocumentStore>, deadline: Duration) -> Self {
        Self { store, deadline }
    }

    pub async fn exists(&self, collection: &Collection, value: &str) -> Result<bool, StoreError> {
        let records = self.store.scan_all(collection.name);

        self.bounded(find(records, collection.key_field, value))
            .await
    }

    /// Extra fields (a profile's `reason`) are stored as given.
    pub async fn add(&self, collection: &Collection, fields: Fields) -> Result<RecordId, AddError> {
        let missing = collection.missing_fields(&fields);
        if !missing.is_empty() {
            return Err(AddError::Missing(missing));
        }

        let id = self
            .bounded(self.store.append(collection.name, fields))
            .await?;
        info!("Added {id} to {}", collection.name);

        Ok(id)
    }

    pub async fn total(&self, collection: &Collection) -> Result<u64, StoreError> {
        self.bounded(self.store.count(collection.name)).await
    }

    async fn bounded<T>(
        &self,
        operation: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        timeout(self.deadline, operation)
            .await
            .map_err(|_| StoreError::Timeout(self.deadline))?
    }
}

async fn find(mut records: RecordStream, field: &str, value: &str) -> Result<bool, StoreError> {
    while let Some(record) = records.try_next().await? {
        #[cfg(feature = "verbose")]
        debug!("Scanning record {}", record.id);

        match record.text(field) {
            Ok(stored) if stored == value => return Ok(true),
            Ok(_) => {}
            Err(e) => debug!("Skipping record {}: {e}", record.id),
        }
    }

    Ok(false)
}
