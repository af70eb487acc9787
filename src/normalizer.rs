use chrono::{DateTime, NaiveDate};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::types::{MarketSnapshot, RejectReason};

/// Convert one raw CLOB market record into a validated snapshot.
///
/// This is the only place allowed to probe the upstream JSON shape — every
/// consumer downstream gets a fully-typed `MarketSnapshot`.
pub fn normalize(raw: &Value) -> Result<MarketSnapshot, RejectReason> {
    let external_id = raw
        .get("condition_id")
        .and_then(Value::as_str)
        .unwrap_or("");
    if external_id.is_empty() {
        return Err(RejectReason::NoIdentity);
    }

    let active = raw.get("active").and_then(Value::as_bool).unwrap_or(false);
    let archived = raw.get("archived").and_then(Value::as_bool).unwrap_or(false);
    let closed = raw.get("closed").and_then(Value::as_bool).unwrap_or(false);

    if !active || archived {
        return Err(RejectReason::Inactive);
    }

    let question = raw
        .get("question")
        .and_then(Value::as_str)
        .unwrap_or("Unknown Market")
        .to_string();

    // Closed markets that are still flagged active are accepted; logged so
    // the policy can be revisited against product intent.
    if closed {
        let accepting_orders = raw
            .get("accepting_orders")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let has_volume = raw.get("volume").and_then(value_as_f64).unwrap_or(0.0) > 0.0;
        info!(
            condition_id = external_id,
            accepting_orders,
            has_volume,
            "Processing closed market with activity"
        );
    }

    let probability = match extract_probability(raw) {
        Some(p) => p,
        None => return Err(RejectReason::NoProbability),
    };

    let volume = raw.get("volume").and_then(value_as_f64);
    let category = extract_category(raw);

    let end_date = match raw.get("end_date_iso").and_then(Value::as_str) {
        Some(s) => {
            let parsed = parse_end_date(s);
            if parsed.is_none() {
                warn!(condition_id = external_id, end_date_iso = s, "Could not parse end_date_iso");
            }
            parsed
        }
        None => None,
    };

    Ok(MarketSnapshot {
        external_id: external_id.to_string(),
        question,
        probability,
        volume,
        category,
        end_date,
        active,
        raw_metadata: raw.clone(),
    })
}

/// Probability extraction fallback chain, first usable number wins:
/// 1. `tokens` entry whose outcome is "yes" (case-insensitive), or the first
///    entry of a two-token binary market
/// 2. first `tokens` entry with a price
/// 3. legacy `outcome_prices[0]`
/// 4. flat `price`
/// 5. flat `last_trade_price`
///
/// Every extracted value is clamped to [0, 1].
fn extract_probability(raw: &Value) -> Option<f64> {
    if let Some(tokens) = raw.get("tokens").and_then(Value::as_array) {
        let binary = tokens.len() == 2;
        for token in tokens {
            let outcome = token.get("outcome").and_then(Value::as_str);
            let price = token.get("price").and_then(value_as_f64);
            if let (Some(outcome), Some(price)) = (outcome, price) {
                if outcome.eq_ignore_ascii_case("yes") || binary {
                    return Some(clamp_probability(price));
                }
            }
        }

        if let Some(price) = tokens.first().and_then(|t| t.get("price")).and_then(value_as_f64) {
            return Some(clamp_probability(price));
        }
    }

    if let Some(prices) = raw.get("outcome_prices").and_then(Value::as_array) {
        return prices.first().and_then(value_as_f64).map(clamp_probability);
    }

    if let Some(price) = raw.get("price").and_then(value_as_f64) {
        return Some(clamp_probability(price));
    }

    if let Some(price) = raw.get("last_trade_price").and_then(value_as_f64) {
        return Some(clamp_probability(price));
    }

    debug!("No probability field found in market record");
    None
}

fn clamp_probability(p: f64) -> f64 {
    p.clamp(0.0, 1.0)
}

/// First tag that isn't the literal "All", if any.
fn extract_category(raw: &Value) -> Option<String> {
    raw.get("tags")
        .and_then(Value::as_array)?
        .iter()
        .filter_map(Value::as_str)
        .find(|tag| *tag != "All")
        .map(str::to_string)
}

/// CLOB prices arrive as either JSON numbers or numeric strings.
fn value_as_f64(v: &Value) -> Option<f64> {
    v.as_f64().or_else(|| v.as_str().and_then(|s| s.parse().ok()))
}

/// Parse an ISO-ish end date to Unix seconds. RFC 3339 first, then a bare
/// `YYYY-MM-DD` taken as midnight UTC. None means "accept with no end date".
fn parse_end_date(s: &str) -> Option<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s.trim()) {
        return Some(dt.timestamp());
    }
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base_record() -> Value {
        json!({
            "condition_id": "c1",
            "active": true,
            "archived": false,
            "closed": false,
            "question": "Will it happen?",
            "tokens": [
                {"outcome": "Yes", "price": "0.30"},
                {"outcome": "No", "price": "0.70"}
            ]
        })
    }

    #[test]
    fn missing_condition_id_rejects_no_identity() {
        let mut raw = base_record();
        raw.as_object_mut().unwrap().remove("condition_id");
        assert_eq!(normalize(&raw), Err(RejectReason::NoIdentity));

        raw["condition_id"] = json!("");
        assert_eq!(normalize(&raw), Err(RejectReason::NoIdentity));
    }

    #[test]
    fn inactive_market_rejects() {
        let mut raw = base_record();
        raw["active"] = json!(false);
        assert_eq!(normalize(&raw), Err(RejectReason::Inactive));
    }

    #[test]
    fn archived_market_rejects_even_if_active() {
        let mut raw = base_record();
        raw["archived"] = json!(true);
        assert_eq!(normalize(&raw), Err(RejectReason::Inactive));
    }

    #[test]
    fn missing_active_flag_defaults_to_inactive() {
        let mut raw = base_record();
        raw.as_object_mut().unwrap().remove("active");
        assert_eq!(normalize(&raw), Err(RejectReason::Inactive));
    }

    #[test]
    fn closed_but_active_is_accepted() {
        let mut raw = base_record();
        raw["closed"] = json!(true);
        let snap = normalize(&raw).unwrap();
        assert_eq!(snap.external_id, "c1");
        assert!((snap.probability - 0.30).abs() < 1e-9);
    }

    #[test]
    fn yes_token_wins_over_position() {
        let raw = json!({
            "condition_id": "c1",
            "active": true,
            "tokens": [
                {"outcome": "Maybe", "price": "0.10"},
                {"outcome": "YES", "price": "0.60"},
                {"outcome": "No", "price": "0.30"}
            ]
        });
        let snap = normalize(&raw).unwrap();
        assert!((snap.probability - 0.60).abs() < 1e-9);
    }

    #[test]
    fn binary_market_uses_first_token_regardless_of_label() {
        let raw = json!({
            "condition_id": "c1",
            "active": true,
            "tokens": [
                {"outcome": "Up", "price": 0.42},
                {"outcome": "Down", "price": 0.58}
            ]
        });
        let snap = normalize(&raw).unwrap();
        assert!((snap.probability - 0.42).abs() < 1e-9);
    }

    #[test]
    fn falls_back_to_first_token_with_price() {
        // Three outcomes, none labelled "yes": first token's price is used.
        let raw = json!({
            "condition_id": "c1",
            "active": true,
            "tokens": [
                {"outcome": "A", "price": "0.25"},
                {"outcome": "B", "price": "0.35"},
                {"outcome": "C", "price": "0.40"}
            ]
        });
        let snap = normalize(&raw).unwrap();
        assert!((snap.probability - 0.25).abs() < 1e-9);
    }

    #[test]
    fn legacy_outcome_prices_fallback() {
        let raw = json!({
            "condition_id": "c1",
            "active": true,
            "outcome_prices": ["0.65", "0.35"]
        });
        let snap = normalize(&raw).unwrap();
        assert!((snap.probability - 0.65).abs() < 1e-9);
    }

    #[test]
    fn flat_price_and_last_trade_price_fallbacks() {
        let raw = json!({"condition_id": "c1", "active": true, "price": 0.12});
        assert!((normalize(&raw).unwrap().probability - 0.12).abs() < 1e-9);

        let raw = json!({"condition_id": "c1", "active": true, "last_trade_price": "0.88"});
        assert!((normalize(&raw).unwrap().probability - 0.88).abs() < 1e-9);
    }

    #[test]
    fn no_price_source_rejects_no_probability() {
        let raw = json!({"condition_id": "c1", "active": true, "question": "?"});
        assert_eq!(normalize(&raw), Err(RejectReason::NoProbability));
    }

    #[test]
    fn probability_clamped_to_unit_interval() {
        let raw = json!({"condition_id": "c1", "active": true, "price": 1.5});
        assert!((normalize(&raw).unwrap().probability - 1.0).abs() < 1e-9);

        let raw = json!({"condition_id": "c1", "active": true, "price": -0.3});
        assert_eq!(normalize(&raw).unwrap().probability, 0.0);
    }

    #[test]
    fn question_defaults_to_placeholder() {
        let raw = json!({"condition_id": "c1", "active": true, "price": 0.5});
        assert_eq!(normalize(&raw).unwrap().question, "Unknown Market");
    }

    #[test]
    fn category_skips_all_tag() {
        let mut raw = base_record();
        raw["tags"] = json!(["All", "Politics", "Elections"]);
        assert_eq!(normalize(&raw).unwrap().category, Some("Politics".to_string()));

        raw["tags"] = json!(["All"]);
        assert_eq!(normalize(&raw).unwrap().category, None);

        raw.as_object_mut().unwrap().remove("tags");
        assert_eq!(normalize(&raw).unwrap().category, None);
    }

    #[test]
    fn end_date_parses_rfc3339_and_bare_date() {
        let mut raw = base_record();
        raw["end_date_iso"] = json!("2025-11-05T00:00:00Z");
        assert_eq!(normalize(&raw).unwrap().end_date, Some(1762300800));

        raw["end_date_iso"] = json!("2025-11-05");
        assert_eq!(normalize(&raw).unwrap().end_date, Some(1762300800));
    }

    #[test]
    fn unparseable_end_date_accepted_as_null() {
        let mut raw = base_record();
        raw["end_date_iso"] = json!("not a date");
        let snap = normalize(&raw).unwrap();
        assert_eq!(snap.end_date, None);
    }

    #[test]
    fn volume_is_not_clamped() {
        let mut raw = base_record();
        raw["volume"] = json!("125000.50");
        let snap = normalize(&raw).unwrap();
        assert_eq!(snap.volume, Some(125000.50));
    }

    #[test]
    fn raw_metadata_carries_full_payload() {
        let raw = base_record();
        let snap = normalize(&raw).unwrap();
        assert_eq!(snap.raw_metadata, raw);
    }
}
