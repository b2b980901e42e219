//! Risk engine: factor scores, pattern and anomaly scoring, analytics runs.

use chrono::{DateTime, Duration, TimeZone, Utc};
use ledgerflow_core::risk::{
    anomaly_score, pattern_score, risk_factors, run_analytics, HIGH_RISK_THRESHOLD,
    MIN_ANALYZED_RECORDS,
};
use ledgerflow_core::transaction::{Transaction, TxnStatus, TxnType};

fn noon() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap()
}

fn txn(id: &str, user: &str, merchant: &str, amount: f64, at: DateTime<Utc>) -> Transaction {
    Transaction {
        id: id.to_string(),
        timestamp: at,
        amount,
        currency: "USD".to_string(),
        txn_type: TxnType::Debit,
        category: "Shopping".to_string(),
        description: format!("Transaction {id} - Order - Books"),
        merchant_name: merchant.to_string(),
        status: TxnStatus::Completed,
        user_id: user.to_string(),
        account_id: format!("acct_{user}_0"),
        location: None,
    }
}

fn spread(n: usize) -> Vec<Transaction> {
    (0..n)
        .map(|i| {
            txn(
                &format!("s{i}"),
                &format!("user_{}", i % 40),
                ["Amazon", "Target", "Shell", "Uber"][i % 4],
                20.0 + (i * 37 % 900) as f64,
                noon() - Duration::hours(i as i64 * 5),
            )
        })
        .collect()
}

/// Below the minimum sample size analytics is all zeros.
#[test]
fn small_sets_produce_empty_analytics() {
    let a = run_analytics(&spread(50));
    assert_eq!(a.total_risk, 0.0);
    assert_eq!(a.high_risk_transactions, 0);
    assert!(a.patterns.is_empty());
    assert!(a.anomalies.is_empty());
    assert_eq!(a.analyzed, 0);
}

#[test]
fn full_run_scores_every_record() {
    let records = spread(MIN_ANALYZED_RECORDS + 20);
    let a = run_analytics(&records);
    assert_eq!(a.analyzed, records.len());
    assert_eq!(a.patterns.len(), records.len());
    assert_eq!(a.anomalies.len(), records.len());
    assert!(a.total_risk > 0.0);
    assert!(a.high_risk_transactions <= records.len());
    assert!(a.anomalies.values().all(|v| (0.0..=1.0).contains(v)));
    assert!(a.patterns.values().all(|v| (0.0..=0.8).contains(v)));
}

#[test]
fn risk_factor_thresholds() {
    let early = Utc.with_ymd_and_hms(2024, 5, 10, 3, 0, 0).unwrap();
    let big_unknown = txn("x", "user_1", "Tiny Shop", 1500.0, early);
    let f = risk_factors(&big_unknown, &[big_unknown.clone()]);
    assert_eq!((f.merchant_risk, f.amount_risk, f.time_risk), (0.8, 0.6, 0.4));
    assert!((f.total() - 1.8).abs() < 1e-9);
    assert!(f.total() > HIGH_RISK_THRESHOLD);

    // Five records at the same merchant make it familiar.
    let familiar: Vec<Transaction> = (0..5)
        .map(|i| txn(&format!("f{i}"), "user_1", "Amazon", 12.0, noon()))
        .collect();
    let f = risk_factors(&familiar[0], &familiar);
    assert_eq!((f.merchant_risk, f.amount_risk, f.time_risk), (0.2, 0.1, 0.1));
}

/// More than three similar payments to the same merchant add 0.3;
/// more than five records for the user within an hour add 0.5.
#[test]
fn pattern_score_detects_repeats_and_velocity() {
    let mut set: Vec<Transaction> = (0..5)
        .map(|i| txn(&format!("r{i}"), "user_2", "Netflix", 15.0 + i as f64, noon() + Duration::minutes(i * 10)))
        .collect();
    // r0 sees four similar others and five same-user records within the hour.
    assert!((pattern_score(&set[0], &set) - 0.3).abs() < 1e-9);

    set.push(txn("r5", "user_2", "Walmart", 400.0, noon() + Duration::minutes(55)));
    assert!((pattern_score(&set[0], &set) - 0.8).abs() < 1e-9);

    let lone = txn("lone", "user_9", "Walmart", 400.0, noon());
    assert_eq!(pattern_score(&lone, &[lone.clone()]), 0.0);
}

/// The velocity window includes records exactly one hour away.
#[test]
fn velocity_window_is_inclusive() {
    let set: Vec<Transaction> = (0..6)
        .map(|i| txn(&format!("v{i}"), "user_4", &format!("M{i}"), 50.0, noon() + Duration::minutes(i * 12)))
        .collect();
    // v0 at 12:00, v5 at 13:00 exactly.
    assert!((pattern_score(&set[0], &set) - 0.5).abs() < 1e-9);
}

/// A user with no other records has nothing to deviate from.
#[test]
fn anomaly_without_history_is_zero() {
    let mut first = txn("only", "user_5", "Apple Store", 4000.0, noon());
    first.location = Some("Miami, FL".to_string());
    assert_eq!(anomaly_score(&first, &[first.clone()]), 0.0);
}

#[test]
fn anomaly_combines_deviation_and_location() {
    let mut history: Vec<Transaction> = (0..3)
        .map(|i| {
            let mut t = txn(&format!("h{i}"), "user_6", "Target", 100.0, noon() - Duration::days(i + 1));
            t.location = Some("Chicago, IL".to_string());
            t
        })
        .collect();

    let mut familiar = txn("now", "user_6", "Target", 100.0, noon());
    familiar.location = Some("Chicago, IL".to_string());
    history.push(familiar.clone());
    assert_eq!(anomaly_score(&familiar, &history), 0.0);

    // Mean with self: (100*3 + 500) / 4 = 200, deviation 1.5, weighted 0.45, plus 0.4.
    let mut strange = txn("now", "user_6", "Target", 500.0, noon());
    strange.location = Some("Denver, CO".to_string());
    let last = history.len() - 1;
    history[last] = strange.clone();
    assert!((anomaly_score(&strange, &history) - 0.85).abs() < 1e-9);

    // Large deviations clamp to 1.0.
    let mut extreme = strange.clone();
    extreme.amount = 50_000.0;
    history[last] = extreme.clone();
    assert_eq!(anomaly_score(&extreme, &history), 1.0);
}
