use std::sync::Arc;

use sqlx::SqlitePool;

use crate::clock::Clock;
use crate::db::models::MarketRow;
use crate::error::Result;
use crate::types::MarketSnapshot;

/// Persistent market store. Markets are keyed by the upstream condition id;
/// every successful sync appends one price history point.
pub struct MarketStore {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl MarketStore {
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    /// Upsert the market for this snapshot and append a history point.
    ///
    /// Identity-idempotent: the same `external_id` always maps to the same
    /// row. Not effect-idempotent: every call appends a new history point
    /// and refreshes `updated_at` — that is how the time series is built
    /// and how sync freshness is signalled.
    pub async fn upsert(&self, snapshot: &MarketSnapshot) -> Result<MarketRow> {
        let now = self.clock.now_ts();
        let metadata = serde_json::to_string(&snapshot.raw_metadata)?;

        let market = sqlx::query_as::<_, MarketRow>(
            r#"
            INSERT INTO markets (
                polymarket_id, question, current_probability, volume,
                category, end_date, active, metadata, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(polymarket_id) DO UPDATE SET
                question = excluded.question,
                current_probability = excluded.current_probability,
                volume = excluded.volume,
                category = excluded.category,
                end_date = excluded.end_date,
                active = excluded.active,
                metadata = excluded.metadata,
                updated_at = excluded.updated_at
            RETURNING id, polymarket_id, question, current_probability, volume,
                      category, end_date, active, metadata, created_at, updated_at
            "#,
        )
        .bind(&snapshot.external_id)
        .bind(&snapshot.question)
        .bind(snapshot.probability)
        .bind(snapshot.volume)
        .bind(&snapshot.category)
        .bind(snapshot.end_date)
        .bind(snapshot.active)
        .bind(metadata)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        sqlx::query(
            "INSERT INTO market_price_history (market_id, probability, volume, recorded_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(market.id)
        .bind(snapshot.probability)
        .bind(snapshot.volume)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(market)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::clock::test_clock::FixedClock;
    use crate::db::models::PricePointRow;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    fn fixed_clock() -> Arc<FixedClock> {
        Arc::new(FixedClock::new(
            chrono::Utc.with_ymd_and_hms(2025, 8, 9, 12, 0, 0).unwrap(),
        ))
    }

    fn snapshot(probability: f64) -> MarketSnapshot {
        MarketSnapshot {
            external_id: "c1".to_string(),
            question: "Will it happen?".to_string(),
            probability,
            volume: Some(1000.0),
            category: Some("Politics".to_string()),
            end_date: None,
            active: true,
            raw_metadata: serde_json::json!({"condition_id": "c1"}),
        }
    }

    #[tokio::test]
    async fn upsert_twice_creates_one_market_and_two_history_points() {
        let pool = test_pool().await;
        let clock = fixed_clock();
        let store = MarketStore::new(pool.clone(), clock.clone());

        let first = store.upsert(&snapshot(0.30)).await.unwrap();
        clock.advance_secs(300);
        let second = store.upsert(&snapshot(0.45)).await.unwrap();

        assert_eq!(first.id, second.id);
        assert!((second.current_probability - 0.45).abs() < 1e-9);

        let market_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM markets")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(market_count, 1);

        let history = sqlx::query_as::<_, PricePointRow>(
            "SELECT id, market_id, probability, volume, recorded_at
             FROM market_price_history WHERE market_id = ? ORDER BY recorded_at ASC",
        )
        .bind(first.id)
        .fetch_all(&pool)
        .await
        .unwrap();
        assert_eq!(history.len(), 2);
        assert!((history[0].probability - 0.30).abs() < 1e-9);
        assert!((history[1].probability - 0.45).abs() < 1e-9);
    }

    #[tokio::test]
    async fn upsert_fully_replaces_mutable_fields() {
        let pool = test_pool().await;
        let store = MarketStore::new(pool, fixed_clock());

        store.upsert(&snapshot(0.30)).await.unwrap();

        let mut updated = snapshot(0.45);
        updated.question = "Rephrased question".to_string();
        updated.volume = None;
        updated.category = None;
        let market = store.upsert(&updated).await.unwrap();

        assert_eq!(market.question, "Rephrased question");
        assert_eq!(market.volume, None);
        assert_eq!(market.category, None);
    }

    #[tokio::test]
    async fn updated_at_refreshes_even_when_values_are_unchanged() {
        let pool = test_pool().await;
        let clock = fixed_clock();
        let store = MarketStore::new(pool, clock.clone());

        let first = store.upsert(&snapshot(0.30)).await.unwrap();
        clock.advance_secs(600);
        let second = store.upsert(&snapshot(0.30)).await.unwrap();

        assert_eq!(second.created_at, first.created_at);
        assert_eq!(second.updated_at, first.updated_at + 600);
    }
}
