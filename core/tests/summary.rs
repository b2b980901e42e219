//! Summary aggregation and the daily series.

use chrono::{Duration, TimeZone, Utc};
use ledgerflow_core::summary::{daily_series, summarize};
use ledgerflow_core::transaction::{Transaction, TxnStatus, TxnType};
use proptest::prelude::*;

fn txn(amount: f64, txn_type: TxnType, category: &str, day: i64) -> Transaction {
    Transaction {
        id: format!("t-{amount}-{day}"),
        timestamp: Utc.with_ymd_and_hms(2024, 6, 1, 9, 30, 0).unwrap() + Duration::days(day),
        amount,
        currency: "USD".to_string(),
        txn_type,
        category: category.to_string(),
        description: "Transaction 0 - Payment - Groceries".to_string(),
        merchant_name: "Target".to_string(),
        status: TxnStatus::Completed,
        user_id: "user_3".to_string(),
        account_id: "acct_3_1".to_string(),
        location: None,
    }
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

#[test]
fn three_record_scenario() {
    let records = vec![
        txn(100.5, TxnType::Credit, "Salary", 0),
        txn(50.25, TxnType::Debit, "Food", 0),
        txn(200.0, TxnType::Credit, "Bonus", 0),
    ];
    let s = summarize(&records);

    assert_eq!(s.total_transactions, 3);
    assert!(close(s.total_amount, 350.75), "total {}", s.total_amount);
    assert!(close(s.total_credits, 300.5));
    assert!(close(s.total_debits, 50.25));
    assert!(close(s.avg_transaction_amount, 350.75 / 3.0));
    assert_eq!(s.category_counts.len(), 3);
    for category in ["Salary", "Food", "Bonus"] {
        assert_eq!(s.category_counts[category], 1);
    }
}

/// No records means zeros everywhere, not a NaN average.
#[test]
fn empty_input_has_zero_average() {
    let s = summarize(&[]);
    assert_eq!(s.total_transactions, 0);
    assert_eq!(s.avg_transaction_amount, 0.0);
    assert!(s.category_counts.is_empty());
}

#[test]
fn daily_series_groups_and_smooths() {
    let mut records = Vec::new();
    for day in 0..8 {
        records.push(txn(10.0 * (day + 1) as f64, TxnType::Debit, "Food", day));
    }
    // A second record on day 0.
    records.push(txn(30.0, TxnType::Credit, "Food", 0));

    let series = daily_series(&records);
    assert_eq!(series.len(), 8);
    assert!(series.windows(2).all(|w| w[0].date < w[1].date), "ascending dates");

    assert_eq!(series[0].count, 2);
    assert!(close(series[0].total, 40.0));
    assert!(close(series[0].avg, 20.0));
    assert!(close(series[0].moving_average, 40.0));

    // Day 7: window is days 1..=7, totals 20..=80.
    let expected = (20..=80).step_by(10).map(|v| v as f64).sum::<f64>() / 7.0;
    assert!(close(series[7].moving_average, expected));
}

proptest! {
    #[test]
    fn summary_conserves_amounts(amounts in prop::collection::vec((0.0f64..10_000.0, any::<bool>()), 0..60)) {
        let records: Vec<Transaction> = amounts
            .iter()
            .enumerate()
            .map(|(i, (amount, credit))| {
                let kind = if *credit { TxnType::Credit } else { TxnType::Debit };
                let mut t = txn(*amount, kind, "Misc", 0);
                t.id = format!("p-{i}");
                t
            })
            .collect();
        let s = summarize(&records);
        let expected: f64 = records.iter().map(|t| t.amount).sum();
        prop_assert!((s.total_amount - expected).abs() < 1e-6);
        prop_assert!((s.total_credits + s.total_debits - s.total_amount).abs() < 1e-6);
        prop_assert_eq!(s.total_transactions, records.len());
    }
}
