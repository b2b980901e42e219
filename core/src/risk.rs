//! Heuristic risk, pattern, and anomaly scoring.
//!
//! Every score is computed for one record against a reference set
//! (the analyzed slice of the working set). Each scorer scans the whole
//! reference set, so `run_analytics` is quadratic in the slice size and
//! must run on a background lane.
//!
//! These heuristics are illustrative, not a certified fraud model.

use crate::{transaction::Transaction, types::TxnId};
use chrono::{DateTime, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ── Constants ────────────────────────────────────────────────────────────────

/// Below this many records analytics returns an all-zero result.
pub const MIN_ANALYZED_RECORDS: usize = 100;
pub const HIGH_RISK_THRESHOLD: f64 = 0.7;

const FAMILIAR_MERCHANT_MIN: usize = 5;
const LARGE_AMOUNT: f64 = 1000.0;
const EARLY_HOUR: u32 = 6;

const SIMILAR_AMOUNT_DELTA: f64 = 10.0;
const SIMILAR_MIN: usize = 3; // strictly more than this
const VELOCITY_MIN: usize = 5; // strictly more than this

const RECENT_LOCATIONS: usize = 10;
const LOCATION_ANOMALY: f64 = 0.4;
const DEVIATION_WEIGHT: f64 = 0.3;

// ── Results ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskFactors {
    pub merchant_risk: f64,
    pub amount_risk: f64,
    pub time_risk: f64,
}

impl RiskFactors {
    /// Combined risk in [0.3, 1.8].
    pub fn total(&self) -> f64 {
        self.merchant_risk + self.amount_risk + self.time_risk
    }
}

/// Output of one analytics run. Superseded wholesale by the next run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAnalytics {
    pub total_risk: f64,
    pub high_risk_transactions: usize,
    pub patterns: HashMap<TxnId, f64>,
    pub anomalies: HashMap<TxnId, f64>,
    pub generated_at: DateTime<Utc>,
    /// Number of records the run analyzed.
    pub analyzed: usize,
}

impl RiskAnalytics {
    pub fn empty(generated_at: DateTime<Utc>) -> Self {
        Self {
            total_risk: 0.0,
            high_risk_transactions: 0,
            patterns: HashMap::new(),
            anomalies: HashMap::new(),
            generated_at,
            analyzed: 0,
        }
    }
}

// ── Scorers ──────────────────────────────────────────────────────────────────

/// Merchant familiarity, amount size, and time-of-day risk.
pub fn risk_factors(record: &Transaction, set: &[Transaction]) -> RiskFactors {
    let merchant_history = set
        .iter()
        .filter(|t| t.merchant_name == record.merchant_name)
        .count();

    RiskFactors {
        merchant_risk: if merchant_history < FAMILIAR_MERCHANT_MIN { 0.8 } else { 0.2 },
        amount_risk: if record.amount > LARGE_AMOUNT { 0.6 } else { 0.1 },
        time_risk: if record.timestamp.hour() < EARLY_HOUR { 0.4 } else { 0.1 },
    }
}

/// Repeat-payment and velocity score in [0, 0.8].
pub fn pattern_score(record: &Transaction, set: &[Transaction]) -> f64 {
    let similar = set
        .iter()
        .filter(|t| {
            t.id != record.id
                && t.merchant_name == record.merchant_name
                && (t.amount - record.amount).abs() < SIMILAR_AMOUNT_DELTA
        })
        .count();

    let window_ms = Duration::hours(1).num_milliseconds();
    let velocity = set
        .iter()
        .filter(|t| {
            t.user_id == record.user_id
                && (t.timestamp - record.timestamp).num_milliseconds().abs() <= window_ms
        })
        .count();

    let mut score = 0.0;
    if similar > SIMILAR_MIN {
        score += 0.3;
    }
    if velocity > VELOCITY_MIN {
        score += 0.5;
    }
    score
}

/// Amount deviation from the user's mean plus an unfamiliar-location bump,
/// capped at 1.0.
pub fn anomaly_score(record: &Transaction, set: &[Transaction]) -> f64 {
    let user_records: Vec<&Transaction> =
        set.iter().filter(|t| t.user_id == record.user_id).collect();
    let has_history = user_records.iter().any(|t| t.id != record.id);

    let deviation = if has_history {
        let mean = user_records.iter().map(|t| t.amount).sum::<f64>() / user_records.len() as f64;
        if mean > 0.0 {
            (record.amount - mean).abs() / mean
        } else {
            0.0
        }
    } else {
        0.0
    };

    let location_anomaly = match &record.location {
        Some(location) if has_history => {
            let mut others: Vec<&&Transaction> =
                user_records.iter().filter(|t| t.id != record.id).collect();
            others.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
            let seen = others
                .iter()
                .take(RECENT_LOCATIONS)
                .any(|t| t.location.as_deref() == Some(location.as_str()));
            if seen { 0.0 } else { LOCATION_ANOMALY }
        }
        // A first-ever record has no location history to deviate from.
        _ => 0.0,
    };

    (DEVIATION_WEIGHT * deviation + location_anomaly).clamp(0.0, 1.0)
}

/// Score every record against the whole set.
pub fn run_analytics(records: &[Transaction]) -> RiskAnalytics {
    let generated_at = Utc::now();
    if records.len() < MIN_ANALYZED_RECORDS {
        return RiskAnalytics::empty(generated_at);
    }

    let mut analytics = RiskAnalytics::empty(generated_at);
    analytics.analyzed = records.len();
    for record in records {
        let risk = risk_factors(record, records).total();
        analytics.total_risk += risk;
        if risk > HIGH_RISK_THRESHOLD {
            analytics.high_risk_transactions += 1;
        }
        analytics
            .patterns
            .insert(record.id.clone(), pattern_score(record, records));
        analytics
            .anomalies
            .insert(record.id.clone(), anomaly_score(record, records));
    }

    log::debug!(
        "analytics: {} records, total_risk={:.2}, high_risk={}",
        records.len(),
        analytics.total_risk,
        analytics.high_risk_transactions
    );
    analytics
}
