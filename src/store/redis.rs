//! # Redis
//!
//! RAM database alternative to Firestore.
//!
//! ## Implementation
//!
//! - Redis hash per collection: 1 big key, then record id to JSON fields pairs
//! - Append is a single `HSET`, no read-modify-write
//! - Count is `HLEN`, O(1)
//! - Scan walks the hash with `HSCAN`, one cursor step in flight at a time
//! - An entry whose JSON does not decode comes back as a record with no fields, it still counts
use std::time::Duration;

use ::redis::{
    AsyncCommands, Client,
    aio::{ConnectionManager, ConnectionManagerConfig},
};
use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::warn;

use super::{DocumentStore, Fields, Record, RecordId, RecordStream, StoreError, paginate};

const KEY_PREFIX: &str = "botwatch";
const SCAN_BATCH: usize = 200;

pub struct RedisStore {
    connection: ConnectionManager,
}

pub async fn init_redis(redis_url: &str) -> Result<ConnectionManager, StoreError> {
    let config = ConnectionManagerConfig::new()
        .set_number_of_retries(1)
        .set_connection_timeout(Duration::from_millis(100));

    let client = Client::open(redis_url)?;
    let connection_manager = client.get_connection_manager_with_config(config).await?;

    Ok(connection_manager)
}

impl RedisStore {
    pub fn new(connection: ConnectionManager) -> Self {
        Self { connection }
    }

    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        Ok(Self::new(init_redis(redis_url).await?))
    }
}

fn hash_key(collection: &str) -> String {
    format!("{KEY_PREFIX}:{collection}")
}

fn decode_entry(id: String, raw: &str) -> Record {
    let fields = match serde_json::from_str::<Map<String, Value>>(raw) {
        Ok(fields) => fields,
        Err(e) => {
            warn!("Undecodable entry {id}: {e}");
            Map::new()
        }
    };

    Record::new(RecordId::new(id), fields)
}

#[async_trait]
impl DocumentStore for RedisStore {
    async fn append(&self, collection: &str, fields: Fields) -> Result<RecordId, StoreError> {
        let id = RecordId::generate();
        let encoded =
            serde_json::to_string(&fields).map_err(|e| StoreError::Decode(e.to_string()))?;

        let mut connection = self.connection.clone();
        let _: () = connection
            .hset(hash_key(collection), id.as_str(), encoded)
            .await?;

        Ok(id)
    }

    fn scan_all(&self, collection: &str) -> RecordStream {
        let connection = self.connection.clone();
        let key = hash_key(collection);

        paginate(0, move |cursor| next_batch(connection.clone(), key.clone(), cursor))
    }

    async fn count(&self, collection: &str) -> Result<u64, StoreError> {
        let mut connection = self.connection.clone();
        let total: u64 = connection.hlen(hash_key(collection)).await?;

        Ok(total)
    }
}

async fn next_batch(
    mut connection: ConnectionManager,
    key: String,
    cursor: u64,
) -> Result<(Vec<Record>, Option<u64>), StoreError> {
    let (next, entries): (u64, Vec<(String, String)>) = ::redis::cmd("HSCAN")
        .arg(&key)
        .arg(cursor)
        .arg("COUNT")
        .arg(SCAN_BATCH)
        .query_async(&mut connection)
        .await?;

    Ok(batch(next, entries))
}

/// `HSCAN` hands back cursor 0 once the walk is complete.
fn batch(next: u64, entries: Vec<(String, String)>) -> (Vec<Record>, Option<u64>) {
    let records = entries
        .into_iter()
        .map(|(id, raw)| decode_entry(id, &raw))
        .collect();

    (records, (next != 0).then_some(next))
}
