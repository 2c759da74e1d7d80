//! In-process backend for local runs and tests.
//!
//! Scans iterate over a snapshot taken when the scan starts, so appends made
//! while a scan is running are not observed by it.
use std::collections::HashMap;

use async_trait::async_trait;
use futures::{StreamExt, stream};
use parking_lot::RwLock;
use serde_json::{Map, Value};

use super::{DocumentStore, Fields, Record, RecordId, RecordStream, StoreError, tally};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CountStrategy {
    #[default]
    Aggregate,
    Scan,
}

#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<Record>>>,
    count_strategy: CountStrategy,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_count_strategy(count_strategy: CountStrategy) -> Self {
        Self {
            collections: RwLock::default(),
            count_strategy,
        }
    }

    /// Stores arbitrary field values, bypassing the string-only `append`.
    pub fn insert_raw(&self, collection: &str, fields: Map<String, Value>) -> RecordId {
        let id = RecordId::generate();

        self.collections
            .write()
            .entry(collection.to_string())
            .or_default()
            .push(Record::new(id.clone(), fields));

        id
    }

    fn snapshot(&self, collection: &str) -> Vec<Record> {
        self.collections
            .read()
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn append(&self, collection: &str, fields: Fields) -> Result<RecordId, StoreError> {
        let id = RecordId::generate();

        self.collections
            .write()
            .entry(collection.to_string())
            .or_default()
            .push(Record::from_fields(id.clone(), &fields));

        Ok(id)
    }

    fn scan_all(&self, collection: &str) -> RecordStream {
        stream::iter(self.snapshot(collection).into_iter().map(Ok)).boxed()
    }

    async fn count(&self, collection: &str) -> Result<u64, StoreError> {
        match self.count_strategy {
            CountStrategy::Aggregate => Ok(self
                .collections
                .read()
                .get(collection)
                .map_or(0, |records| records.len() as u64)),
            CountStrategy::Scan => tally(self.scan_all(collection)).await,
        }
    }
}
