use std::sync::Arc;

use reqwest::Client;
use tracing::info;

use crate::{
    config::{Backend, Config},
    flagged::FlaggedStore,
    store::{
        DocumentStore, StoreError, firestore::FirestoreStore, memory::MemoryStore,
        redis::RedisStore,
    },
};

pub struct AppState {
    pub config: Config,
    pub flagged: FlaggedStore,
}

impl AppState {
    pub async fn new(config: Config) -> Result<Arc<Self>, StoreError> {
        let store: Arc<dyn DocumentStore> = match &config.backend {
            Backend::Firestore(firestore) => {
                info!("Using Firestore project {}", firestore.project_id);
                Arc::new(FirestoreStore::new(Client::builder().build()?, firestore))
            }
            Backend::Redis { url } => {
                info!("Using Redis at {url}");
                Arc::new(RedisStore::connect(url).await?)
            }
            Backend::Memory => Arc::new(MemoryStore::new()),
        };

        Ok(Self::with_store(config, store))
    }

    pub fn with_store(config: Config, store: Arc<dyn DocumentStore>) -> Arc<Self> {
        let flagged = FlaggedStore::new(store, config.request_timeout);

        Arc::new(Self { config, flagged })
    }
}
