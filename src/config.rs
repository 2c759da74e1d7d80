use std::{env, fmt::Display, fs::read_to_string, str::FromStr, time::Duration};

use thiserror::Error;
use tracing::{info, warn};

const TOKEN_KEY: &str = "FIRESTORE_TOKEN";

pub struct Config {
    pub port: u16,
    pub request_timeout: Duration,
    pub backend: Backend,
}

pub enum Backend {
    Firestore(FirestoreConfig),
    Redis { url: String },
    Memory,
}

#[derive(Clone)]
pub struct FirestoreConfig {
    pub base_url: String,
    pub project_id: String,
    pub database: String,
    pub token: Option<String>,
    pub page_size: u32,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("Invalid {key} value: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("Unknown store backend `{0}`, expected firestore, redis or memory")]
    UnknownBackend(String),
}

impl Config {
    /// Environment variables, with the Firestore token preferably read from a
    /// secret file.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| match key {
            TOKEN_KEY => read_secret(key).or_else(|| var(key)),
            _ => var(key),
        })
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let backend = match try_load::<String>(&lookup, "STORE_BACKEND", "firestore")?
            .to_lowercase()
            .as_str()
        {
            "firestore" => Backend::Firestore(FirestoreConfig {
                base_url: try_load(&lookup, "FIRESTORE_URL", "https://firestore.googleapis.com/v1")?,
                project_id: lookup("FIRESTORE_PROJECT")
                    .filter(|project| !project.is_empty())
                    .ok_or(ConfigError::Missing("FIRESTORE_PROJECT"))?,
                database: try_load(&lookup, "FIRESTORE_DATABASE", "(default)")?,
                token: lookup(TOKEN_KEY).filter(|token| !token.is_empty()),
                page_size: try_load(&lookup, "FIRESTORE_PAGE_SIZE", "300")?,
            }),
            "redis" => Backend::Redis {
                url: try_load(&lookup, "REDIS_URL", "redis://127.0.0.1:6379")?,
            },
            "memory" => {
                warn!("Using the in-memory store, nothing will be persisted");
                Backend::Memory
            }
            other => return Err(ConfigError::UnknownBackend(other.to_string())),
        };

        Ok(Self {
            port: try_load(&lookup, "RUST_PORT", "8080")?,
            request_timeout: Duration::from_millis(try_load(&lookup, "REQUEST_TIMEOUT_MS", "5000")?),
            backend,
        })
    }
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn try_load<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: &str,
) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    lookup(key)
        .unwrap_or_else(|| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
        })
}

fn read_secret(secret_name: &str) -> Option<String> {
    let path = format!("/run/secrets/{secret_name}");

    read_to_string(&path)
        .map(|s| s.trim().to_string())
        .map_err(|e| {
            warn!("Failed to read {secret_name} from file: {e}");
        })
        .ok()
}
