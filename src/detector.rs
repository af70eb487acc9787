use std::sync::Arc;

use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::config::{DEDUP_WINDOW_SECS, HISTORY_WINDOW_HOURS};
use crate::db::models::{MarketRow, MovementRow, PricePointRow};
use crate::error::Result;

/// Detects significant price movements by comparing the two most recent
/// history samples. Comparing consecutive samples (not window extremes)
/// keeps detection cheap and stable under the fixed sync cadence; a genuine
/// trend re-triggers once the dedup window lapses.
pub struct MovementDetector {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl MovementDetector {
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    /// Compare the market's two latest samples within the 24h window and
    /// record a movement if the change meets `threshold_percent`, at most
    /// once per market per trailing hour.
    pub async fn detect(
        &self,
        market: &MarketRow,
        threshold_percent: f64,
    ) -> Result<Option<MovementRow>> {
        let now = self.clock.now_ts();
        let window_start = now - HISTORY_WINDOW_HOURS * 3600;

        let history = sqlx::query_as::<_, PricePointRow>(
            "SELECT id, market_id, probability, volume, recorded_at
             FROM market_price_history
             WHERE market_id = ? AND recorded_at >= ?
             ORDER BY recorded_at ASC",
        )
        .bind(market.id)
        .bind(window_start)
        .fetch_all(&self.pool)
        .await?;

        if history.len() < 2 {
            return Ok(None);
        }

        let current = &history[history.len() - 1];
        let previous = &history[history.len() - 2];

        // A change from exactly zero has no well-defined percentage.
        if previous.probability == 0.0 {
            return Ok(None);
        }

        let change_percentage =
            (current.probability - previous.probability) / previous.probability * 100.0;

        if change_percentage.abs() < threshold_percent {
            return Ok(None);
        }

        // Dedup guard: one movement per market per trailing hour, so a
        // volatile market doesn't re-alert on every cycle.
        let recent_movements: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM market_movements
             WHERE market_id = ? AND movement_detected_at >= ?",
        )
        .bind(market.id)
        .bind(now - DEDUP_WINDOW_SECS)
        .fetch_one(&self.pool)
        .await?;

        if recent_movements > 0 {
            debug!(
                market_id = market.id,
                change_percentage, "Movement suppressed by dedup window"
            );
            return Ok(None);
        }

        let additional_data = serde_json::json!({
            "threshold_used": threshold_percent,
            "detection_method": "consecutive_price_comparison",
        })
        .to_string();

        let movement = sqlx::query_as::<_, MovementRow>(
            r#"
            INSERT INTO market_movements (
                market_id, probability_before, probability_after, change_percentage,
                movement_started_at, movement_detected_at, volume_during_movement,
                additional_data
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id, market_id, probability_before, probability_after,
                      change_percentage, movement_started_at, movement_detected_at,
                      volume_during_movement, additional_data
            "#,
        )
        .bind(market.id)
        .bind(previous.probability)
        .bind(current.probability)
        .bind(change_percentage)
        .bind(previous.recorded_at)
        .bind(now)
        .bind(current.volume)
        .bind(additional_data)
        .fetch_one(&self.pool)
        .await?;

        info!(
            market_id = market.id,
            question = %market.question,
            change_percentage,
            probability_before = previous.probability,
            probability_after = current.probability,
            "Significant market movement detected"
        );

        Ok(Some(movement))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
