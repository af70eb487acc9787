use std::time::Duration;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::client::PolymarketClient;
use crate::detector::MovementDetector;
use crate::normalizer::normalize;
use crate::store::MarketStore;
use crate::types::SyncReport;

/// Drives one full sync cycle: fetch -> normalize -> store -> detect.
/// Per-record failures are counted and never abort the cycle.
pub struct SyncEngine {
    client: PolymarketClient,
    store: MarketStore,
    detector: MovementDetector,
    threshold_percent: f64,
    /// Serialises cycles so a manual trigger and the scheduled run cannot
    /// interleave upserts for the same market.
    cycle_lock: Mutex<()>,
}

impl SyncEngine {
    pub fn new(
        client: PolymarketClient,
        store: MarketStore,
        detector: MovementDetector,
        threshold_percent: f64,
    ) -> Self {
        Self {
            client,
            store,
            detector,
            threshold_percent,
            cycle_lock: Mutex::new(()),
        }
    }

    /// Run one full sync cycle. Always completes with aggregate counts; an
    /// empty or failed fetch yields a zero report, not an error.
    pub async fn run_cycle(&self) -> SyncReport {
        let _guard = self.cycle_lock.lock().await;

        info!("Starting Polymarket sync");
        let records = self.client.fetch_active_markets().await;

        if records.is_empty() {
            warn!("No markets fetched from Polymarket");
            return SyncReport::default();
        }

        let report = self.process_records(&records).await;
        info!(
            processed = report.processed,
            errors = report.errors,
            total = report.total,
            "Polymarket sync completed"
        );
        report
    }

    /// Fold every raw record through normalize -> upsert -> detect,
    /// accumulating counts. Records are handled strictly in sequence.
    async fn process_records(&self, records: &[Value]) -> SyncReport {
        let mut report = SyncReport {
            total: records.len(),
            ..SyncReport::default()
        };

        for raw in records {
            if !raw.is_object() {
                warn!("Skipping non-object market record");
                report.errors += 1;
                continue;
            }

            let snapshot = match normalize(raw) {
                Ok(s) => s,
                Err(reason) => {
                    let condition_id =
                        raw.get("condition_id").and_then(Value::as_str).unwrap_or("unknown");
                    let question = raw.get("question").and_then(Value::as_str).unwrap_or("unknown");
                    info!(
                        reason = %reason,
                        condition_id,
                        question = question.get(..50).unwrap_or(question),
                        "Skipping market record"
                    );
                    report.errors += 1;
                    continue;
                }
            };

            let market = match self.store.upsert(&snapshot).await {
                Ok(m) => m,
                Err(e) => {
                    error!(
                        condition_id = %snapshot.external_id,
                        "Error storing market: {e}"
                    );
                    report.errors += 1;
                    continue;
                }
            };

            match self.detector.detect(&market, self.threshold_percent).await {
                Ok(_) => report.processed += 1,
                Err(e) => {
                    error!(market_id = market.id, "Error detecting movements: {e}");
                    report.errors += 1;
                }
            }
        }

        report
    }

    /// Scheduled loop: one cycle per interval, forever. The interval owns
    /// the cadence; a slow cycle simply delays the next tick.
    pub async fn run(&self, interval_secs: u64) {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            self.run_cycle().await;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
