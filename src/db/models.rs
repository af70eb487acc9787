//! Database row types. All timestamps are Unix seconds.

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MarketRow {
    pub id: i64,
    pub polymarket_id: String,
    pub question: String,
    pub current_probability: f64,
    pub volume: Option<f64>,
    pub category: Option<String>,
    pub end_date: Option<i64>,
    pub active: bool,
    pub metadata: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PricePointRow {
    pub id: i64,
    pub market_id: i64,
    pub probability: f64,
    pub volume: Option<f64>,
    pub recorded_at: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MovementRow {
    pub id: i64,
    pub market_id: i64,
    pub probability_before: f64,
    pub probability_after: f64,
    pub change_percentage: f64,
    pub movement_started_at: i64,
    pub movement_detected_at: i64,
    pub volume_during_movement: Option<f64>,
    /// JSON text: threshold used and detection method tag.
    pub additional_data: Option<String>,
}
