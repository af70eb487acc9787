use crate::error::{AppError, Result};

pub const CLOB_API_URL: &str = "https://clob.polymarket.com";

/// Bounded timeout for the upstream fetch — a hung CLOB call must not
/// block the sync cycle indefinitely. No retries at this layer.
pub const FETCH_TIMEOUT_SECS: u64 = 30;

/// The movement detector only compares samples recorded within this window.
pub const HISTORY_WINDOW_HOURS: i64 = 24;

/// At most one movement per market within this trailing window.
pub const DEDUP_WINDOW_SECS: i64 = 3600;

/// Default threshold for the /movements feed (percent change).
pub const SIGNIFICANT_THRESHOLD_PERCENT: f64 = 10.0;

#[derive(Debug, Clone)]
pub struct Config {
    pub clob_api_url: String,
    /// Sent as the POLY-API-KEY header. Empty means unauthenticated.
    pub api_key: String,
    pub log_level: String,
    pub db_path: String,
    pub api_port: u16,
    /// Seconds between scheduled sync cycles (SYNC_INTERVAL_SECS)
    pub sync_interval_secs: u64,
    /// Single bounded `limit` request parameter for the markets fetch (FETCH_LIMIT)
    pub fetch_limit: usize,
    /// Minimum percent change for the detector (MOVEMENT_THRESHOLD_PERCENT)
    pub movement_threshold_percent: f64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            clob_api_url: std::env::var("POLYMARKET_API_URL")
                .unwrap_or_else(|_| CLOB_API_URL.to_string()),
            api_key: std::env::var("POLYMARKET_API_KEY").unwrap_or_default(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "pulse.db".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            sync_interval_secs: std::env::var("SYNC_INTERVAL_SECS")
                .unwrap_or_else(|_| "300".to_string())
                .parse::<u64>()
                .unwrap_or(300),
            fetch_limit: std::env::var("FETCH_LIMIT")
                .unwrap_or_else(|_| "1000".to_string())
                .parse::<usize>()
                .unwrap_or(1000),
            movement_threshold_percent: std::env::var("MOVEMENT_THRESHOLD_PERCENT")
                .unwrap_or_else(|_| "1.0".to_string())
                .parse::<f64>()
                .unwrap_or(1.0),
        })
    }
}
