pub mod activity;
pub mod auth;
pub mod config;
pub mod db;
pub mod documents;
pub mod error;
pub mod extract;
pub mod milestones;
pub mod models;
pub mod notifications;
pub mod parser;
pub mod routes;
pub mod s3;
pub mod schema;
pub mod signing;
pub mod state;
pub mod storage;
pub mod transactions;

use tracing_subscriber::EnvFilter;

/// Compact stderr logging filtered by `RUST_LOG` (default `info`).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
