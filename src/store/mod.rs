//! # Document Store
//!
//! The only seam between the service and whatever database holds the flagged
//! entries. A collection is a flat, append-only set of schema-light records.
//!
//! ## Operations
//! - `append`: persist a new record, returns the generated key
//! - `scan_all`: lazy enumeration of every record, fresh per call, unordered
//! - `count`: number of records, either natively or by exhausting a scan
//!
//! ## Backends
//! - [`firestore`]: Firestore REST API, native aggregate count
//! - [`redis`]: one hash per collection, native `HLEN` count
//! - [`memory`]: in-process, either counting strategy
//!
//! Dropping a [`RecordStream`] early releases whatever page request or cursor
//! it was holding.
use std::{future::Future, time::Duration};

use async_trait::async_trait;
use futures::{
    StreamExt, TryStreamExt,
    stream::{self, BoxStream},
};
use reqwest::StatusCode;
use thiserror::Error;

pub mod firestore;
pub mod memory;
pub mod redis;

pub use crate::record::{Fields, Record, RecordId};

pub type RecordStream = BoxStream<'static, Result<Record, StoreError>>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Store replied {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("Undecodable store reply: {0}")]
    Decode(String),

    #[error("Store did not answer within {0:?}")]
    Timeout(Duration),
}

#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    async fn append(&self, collection: &str, fields: Fields) -> Result<RecordId, StoreError>;

    fn scan_all(&self, collection: &str) -> RecordStream;

    /// Defaults to tallying a full scan. Backends with a native aggregate
    /// override this; both must agree for the same collection state.
    async fn count(&self, collection: &str) -> Result<u64, StoreError> {
        tally(self.scan_all(collection)).await
    }
}

pub async fn tally(records: RecordStream) -> Result<u64, StoreError> {
    records.try_fold(0u64, |total, _| async move { Ok(total + 1) }).await
}

/// Flattens a cursor-driven page fetch into a record stream.
///
/// `fetch` receives the cursor of the page to read and returns its records with
/// the cursor of the following page, `None` after the last one. Pages are only
/// requested as the stream is polled; empty pages are passed through.
pub fn paginate<C, F, Fut>(start: C, mut fetch: F) -> RecordStream
where
    C: Send + 'static,
    F: FnMut(C) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(Vec<Record>, Option<C>), StoreError>> + Send + 'static,
{
    stream::try_unfold(Some(start), move |cursor| {
        let page = cursor.map(&mut fetch);

        async move {
            let Some(page) = page else {
                return Ok(None);
            };
            let (records, next) = page.await?;

            Ok::<_, StoreError>(Some((records, next)))
        }
    })
    .map_ok(|records| stream::iter(records.into_iter().map(Ok::<Record, StoreError>)))
    .try_flatten()
    .boxed()
}
