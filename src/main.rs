mod api;
mod client;
mod clock;
mod config;
mod db;
mod detector;
mod error;
mod normalizer;
mod store;
mod sync;
mod types;

use std::sync::Arc;

use sqlx::sqlite::SqliteConnectOptions;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::api::routes::{router, ApiState};
use crate::client::PolymarketClient;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::detector::MovementDetector;
use crate::error::Result;
use crate::store::MarketStore;
use crate::sync::SyncEngine;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Database setup ---
    let options = SqliteConnectOptions::new()
        .filename(&cfg.db_path)
        .create_if_missing(true);
    let pool = sqlx::SqlitePool::connect_with(options).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database ready at {}", cfg.db_path);

    // --- Sync engine ---
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let client = PolymarketClient::new(&cfg)?;
    let store = MarketStore::new(pool.clone(), Arc::clone(&clock));
    let detector = MovementDetector::new(pool.clone(), Arc::clone(&clock));
    let engine = Arc::new(SyncEngine::new(
        client,
        store,
        detector,
        cfg.movement_threshold_percent,
    ));

    // Scheduled sync loop (first cycle fires immediately)
    let sync_engine = Arc::clone(&engine);
    let interval_secs = cfg.sync_interval_secs;
    tokio::spawn(async move { sync_engine.run(interval_secs).await });
    info!(
        interval_secs,
        threshold_percent = cfg.movement_threshold_percent,
        "Sync loop started"
    );

    // --- HTTP API server ---
    let api_state = ApiState { pool, engine };
    let app = router(api_state);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
