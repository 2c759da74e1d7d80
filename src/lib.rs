//! Documentation of a flagged bot profile and comment registry.
//!
//! Clients (browser extension, moderators) ask whether a profile URL or a comment
//! has already been flagged as a bot, and report new ones.
//!
//!
//!
//! # Endpoints
//! - `GET /`, `GET /ping`: liveness, plain `ping`
//! - `POST /urlcheck` `{url}`: is this profile flagged
//! - `POST /addprofile` `{profileUrl, reason?}`: flag a profile
//! - `POST /commentvalid` `{comment}`: is this comment flagged
//! - `POST /commentadd` `{comment}`: flag a comment
//! - `GET /total`: number of flagged profiles
//!
//! Missing fields answer 400 naming them. Anything going wrong below the store
//! port answers a bare 500, details stay in the logs.
//!
//!
//!
//! # Notes
//!
//! ## Duplicates
//! Adding never checks for an existing entry, the same URL can be flagged many
//! times. Checking scans the whole collection until the first match, which is
//! fine at the size these collections reach.
//!
//! ## Backends
//! Firestore in production. Redis and an in-memory store exist for local runs,
//! selected by `STORE_BACKEND`.
//!
//!
//!
//! # Setup
//!
//! Run against the Firestore emulator.
//! ```sh
//! STORE_BACKEND=firestore FIRESTORE_PROJECT=demo FIRESTORE_URL=http://localhost:8081/v1 cargo run
//! ```
//!
//! Run without any database.
//! ```sh
//! STORE_BACKEND=memory RUST_LOG=botwatch=debug cargo run
//! ```
use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    http::{Method, header::CONTENT_TYPE},
    routing::{get, post},
};

use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

pub mod config;
pub mod error;
pub mod flagged;
pub mod models;
pub mod record;
pub mod routes;
pub mod state;
pub mod store;

use config::Config;
use routes::{
    add_profile_handler, comment_add_handler, comment_valid_handler, ping_handler,
    total_handler, url_check_handler,
};
use state::AppState;

pub fn app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .route("/", get(ping_handler))
        .route("/ping", get(ping_handler))
        .route("/urlcheck", post(url_check_handler))
        .route("/addprofile", post(add_profile_handler))
        .route("/commentvalid", post(comment_valid_handler))
        .route("/commentadd", post(comment_add_handler))
        .route("/total", get(total_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

pub async fn start_server() -> anyhow::Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Loading config...");
    let config = Config::load()?;

    info!("Initializing state...");
    let state = AppState::new(config).await?;

    info!("Starting server...");

    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address).await?;
    info!("Server running on {address}");

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                error!("Failed to install Ctrl+C handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
