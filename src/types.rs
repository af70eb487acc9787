use serde::Serialize;

// ---------------------------------------------------------------------------
// MarketSnapshot
// ---------------------------------------------------------------------------

/// One normalized, validated reading of a market's state at sync time.
/// Produced by the normalizer — nothing downstream touches raw JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketSnapshot {
    /// Upstream condition id. Stable, unique, immutable after creation.
    pub external_id: String,
    pub question: String,
    /// Always clamped to [0, 1].
    pub probability: f64,
    pub volume: Option<f64>,
    pub category: Option<String>,
    /// Unix seconds; None if the upstream end date was absent or unparseable.
    pub end_date: Option<i64>,
    pub active: bool,
    /// Last-seen raw payload, persisted verbatim for diagnostics.
    pub raw_metadata: serde_json::Value,
}

// ---------------------------------------------------------------------------
// RejectReason
// ---------------------------------------------------------------------------

/// Typed normalization rejection. Each one is counted as an error by the
/// sync cycle but never aborts the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Missing or empty condition id.
    NoIdentity,
    /// Not active, or archived.
    Inactive,
    /// No usable price in any supported field.
    NoProbability,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RejectReason::NoIdentity => "no_identity",
            RejectReason::Inactive => "inactive",
            RejectReason::NoProbability => "no_probability",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// SyncReport
// ---------------------------------------------------------------------------

/// Aggregate counts for one completed sync cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub processed: usize,
    pub errors: usize,
    pub total: usize,
}
