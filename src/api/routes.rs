use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::config::SIGNIFICANT_THRESHOLD_PERCENT;
use crate::db::models::{MarketRow, MovementRow, PricePointRow};
use crate::error::AppError;
use crate::sync::SyncEngine;
use crate::types::SyncReport;

#[derive(Clone)]
pub struct ApiState {
    pub pool: sqlx::SqlitePool,
    pub engine: Arc<SyncEngine>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/movements", get(get_movements))
        .route("/markets/search", get(search_markets))
        .route("/markets/:id", get(get_market))
        .route("/markets/:id/price-history", get(get_price_history))
        .route("/stats", get(get_stats))
        .route("/sync", post(trigger_sync))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct MovementsQuery {
    pub threshold: Option<f64>,
    pub hours: Option<i64>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Deserialize)]
pub struct HoursQuery {
    pub hours: Option<i64>,
}

#[derive(Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct MarketResponse {
    pub id: i64,
    pub polymarket_id: String,
    pub question: String,
    pub current_probability: f64,
    pub volume: Option<f64>,
    pub category: Option<String>,
    pub end_date: Option<String>,
    pub active: bool,
    pub updated_at: String,
}

#[derive(Serialize)]
pub struct MovementResponse {
    pub id: i64,
    pub market_id: i64,
    pub question: Option<String>,
    pub probability_before: f64,
    pub probability_after: f64,
    pub change_percentage: f64,
    pub movement_started_at: String,
    pub movement_detected_at: String,
    pub volume_during_movement: Option<f64>,
}

#[derive(Serialize)]
pub struct PricePointResponse {
    pub probability: f64,
    pub volume: Option<f64>,
    pub recorded_at: String,
}

#[derive(Serialize)]
pub struct MarketDetailResponse {
    pub market: MarketResponse,
    pub movements: Vec<MovementResponse>,
    pub price_history: Vec<PricePointResponse>,
}

#[derive(Serialize)]
pub struct StatsResponse {
    pub active_markets: i64,
    pub movements_today: i64,
    pub significant_movements_today: i64,
    pub average_movement_size: Option<f64>,
    pub last_sync: Option<String>,
}

#[derive(Serialize)]
pub struct SyncResponse {
    pub success: bool,
    pub message: String,
    #[serde(flatten)]
    pub report: SyncReport,
}

fn fmt_ts(ts: i64) -> String {
    Utc.timestamp_opt(ts, 0)
        .single()
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_default()
}

impl From<MarketRow> for MarketResponse {
    fn from(r: MarketRow) -> Self {
        Self {
            id: r.id,
            polymarket_id: r.polymarket_id,
            question: r.question,
            current_probability: r.current_probability,
            volume: r.volume,
            category: r.category,
            end_date: r.end_date.map(fmt_ts),
            active: r.active,
            updated_at: fmt_ts(r.updated_at),
        }
    }
}

fn movement_response(r: MovementRow, question: Option<String>) -> MovementResponse {
    MovementResponse {
        id: r.id,
        market_id: r.market_id,
        question,
        probability_before: r.probability_before,
        probability_after: r.probability_after,
        change_percentage: r.change_percentage,
        movement_started_at: fmt_ts(r.movement_started_at),
        movement_detected_at: fmt_ts(r.movement_detected_at),
        volume_during_movement: r.volume_during_movement,
    }
}

fn now_ts() -> i64 {
    Utc::now().timestamp()
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Movements above a threshold within the last N hours, newest first,
/// paginated with limit/offset.
async fn get_movements(
    State(state): State<ApiState>,
    Query(params): Query<MovementsQuery>,
) -> Result<Json<Vec<MovementResponse>>, AppError> {
    let threshold = params.threshold.unwrap_or(SIGNIFICANT_THRESHOLD_PERCENT);
    let hours = params.hours.unwrap_or(24);
    let limit = params.limit.unwrap_or(20).clamp(1, 100);
    let offset = params.offset.unwrap_or(0).max(0);
    let since = now_ts() - hours * 3600;

    let rows = sqlx::query_as::<_, MovementRow>(
        "SELECT id, market_id, probability_before, probability_after,
                change_percentage, movement_started_at, movement_detected_at,
                volume_during_movement, additional_data
         FROM market_movements
         WHERE change_percentage >= ? AND movement_detected_at >= ?
         ORDER BY movement_detected_at DESC
         LIMIT ? OFFSET ?",
    )
    .bind(threshold)
    .bind(since)
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.pool)
    .await?;

    let mut movements = Vec::with_capacity(rows.len());
    for movement in rows {
        let question: Option<String> =
            sqlx::query_scalar("SELECT question FROM markets WHERE id = ?")
                .bind(movement.market_id)
                .fetch_optional(&state.pool)
                .await?;
        movements.push(movement_response(movement, question));
    }

    Ok(Json(movements))
}

/// Market details plus recent movements and price history for the chart.
async fn get_market(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    Query(params): Query<HoursQuery>,
) -> Result<Json<MarketDetailResponse>, AppError> {
    let hours = params.hours.unwrap_or(24);
    let since = now_ts() - hours * 3600;

    let market = sqlx::query_as::<_, MarketRow>(
        "SELECT id, polymarket_id, question, current_probability, volume, category,
                end_date, active, metadata, created_at, updated_at
         FROM markets WHERE id = ?",
    )
    .bind(id)
    .fetch_one(&state.pool)
    .await?;

    let movements = sqlx::query_as::<_, MovementRow>(
        "SELECT id, market_id, probability_before, probability_after, change_percentage,
                movement_started_at, movement_detected_at, volume_during_movement,
                additional_data
         FROM market_movements
         WHERE market_id = ? AND movement_detected_at >= ?
         ORDER BY movement_detected_at DESC",
    )
    .bind(id)
    .bind(since)
    .fetch_all(&state.pool)
    .await?;

    let question = market.question.clone();
    let price_history = fetch_price_history(&state.pool, id, since).await?;

    Ok(Json(MarketDetailResponse {
        market: market.into(),
        movements: movements
            .into_iter()
            .map(|m| movement_response(m, Some(question.clone())))
            .collect(),
        price_history,
    }))
}

/// Ascending price samples for a market within the last N hours.
async fn get_price_history(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    Query(params): Query<HoursQuery>,
) -> Result<Json<Vec<PricePointResponse>>, AppError> {
    let hours = params.hours.unwrap_or(24);
    let since = now_ts() - hours * 3600;
    let history = fetch_price_history(&state.pool, id, since).await?;
    Ok(Json(history))
}

async fn fetch_price_history(
    pool: &sqlx::SqlitePool,
    market_id: i64,
    since: i64,
) -> Result<Vec<PricePointResponse>, AppError> {
    let rows = sqlx::query_as::<_, PricePointRow>(
        "SELECT id, market_id, probability, volume, recorded_at
         FROM market_price_history
         WHERE market_id = ? AND recorded_at >= ?
         ORDER BY recorded_at ASC",
    )
    .bind(market_id)
    .bind(since)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| PricePointResponse {
            probability: r.probability,
            volume: r.volume,
            recorded_at: fmt_ts(r.recorded_at),
        })
        .collect())
}

/// Active markets whose question matches the query, by volume descending.
async fn search_markets(
    State(state): State<ApiState>,
    Query(params): Query<SearchQuery>,
) -> Result<Json<Vec<MarketResponse>>, AppError> {
    let Some(q) = params.q.filter(|q| !q.is_empty()) else {
        return Ok(Json(Vec::new()));
    };

    let pattern = format!("%{q}%");
    let rows = sqlx::query_as::<_, MarketRow>(
        "SELECT id, polymarket_id, question, current_probability, volume, category,
                end_date, active, metadata, created_at, updated_at
         FROM markets
         WHERE active = 1 AND question LIKE ?
         ORDER BY volume DESC
         LIMIT 10",
    )
    .bind(pattern)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(rows.into_iter().map(MarketResponse::from).collect()))
}

/// Aggregate stats for the dashboard.
async fn get_stats(State(state): State<ApiState>) -> Result<Json<StatsResponse>, AppError> {
    let day_ago = now_ts() - 24 * 3600;

    let active_markets: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM markets WHERE active = 1")
        .fetch_one(&state.pool)
        .await?;

    let movements_today: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM market_movements WHERE movement_detected_at >= ?")
            .bind(day_ago)
            .fetch_one(&state.pool)
            .await?;

    let significant_movements_today: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM market_movements
         WHERE movement_detected_at >= ? AND change_percentage >= ?",
    )
    .bind(day_ago)
    .bind(SIGNIFICANT_THRESHOLD_PERCENT)
    .fetch_one(&state.pool)
    .await?;

    let average_movement_size: Option<f64> = sqlx::query_scalar(
        "SELECT AVG(change_percentage) FROM market_movements WHERE movement_detected_at >= ?",
    )
    .bind(day_ago)
    .fetch_one(&state.pool)
    .await?;

    let last_sync: Option<i64> = sqlx::query_scalar("SELECT MAX(updated_at) FROM markets")
        .fetch_one(&state.pool)
        .await?;

    Ok(Json(StatsResponse {
        active_markets,
        movements_today,
        significant_movements_today,
        average_movement_size,
        last_sync: last_sync.map(fmt_ts),
    }))
}

/// Manual "run one cycle now" trigger. Failures surface as a success=false
/// body with a message, never an internal error dump.
async fn trigger_sync(State(state): State<ApiState>) -> Json<SyncResponse> {
    let report = state.engine.run_cycle().await;
    if report.total > 0 && report.processed == 0 {
        error!(errors = report.errors, "Manual sync processed no records");
        return Json(SyncResponse {
            success: false,
            message: "Sync completed but no records were processed".to_string(),
            report,
        });
    }
    Json(SyncResponse {
        success: true,
        message: "Sync completed successfully".to_string(),
        report,
    })
}
