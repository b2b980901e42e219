//! One-pass aggregation of a record set, plus the per-day series.

use crate::transaction::{Transaction, TransactionSummary, TxnType};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

/// Width of the trailing moving-average window, in days with data.
pub const MOVING_AVERAGE_DAYS: usize = 7;

pub fn summarize(records: &[Transaction]) -> TransactionSummary {
    let mut summary = records.iter().fold(
        TransactionSummary {
            total_transactions: records.len(),
            ..TransactionSummary::default()
        },
        |mut acc, t| {
            acc.total_amount += t.amount;
            match t.txn_type {
                TxnType::Credit => acc.total_credits += t.amount,
                TxnType::Debit => acc.total_debits += t.amount,
            }
            *acc.category_counts.entry(t.category.clone()).or_insert(0) += 1;
            acc
        },
    );
    if summary.total_transactions > 0 {
        summary.avg_transaction_amount = summary.total_amount / summary.total_transactions as f64;
    }
    summary
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyPoint {
    pub date: NaiveDate,
    pub total: f64,
    pub count: usize,
    pub avg: f64,
    /// Mean of `total` over this day and up to six preceding days with data.
    pub moving_average: f64,
}

/// Per-UTC-day totals in ascending date order.
pub fn daily_series(records: &[Transaction]) -> Vec<DailyPoint> {
    let mut days: BTreeMap<NaiveDate, (f64, usize)> = BTreeMap::new();
    for t in records {
        let entry = days.entry(t.timestamp.date_naive()).or_insert((0.0, 0));
        entry.0 += t.amount;
        entry.1 += 1;
    }

    let totals: Vec<f64> = days.values().map(|(total, _)| *total).collect();
    days.into_iter()
        .enumerate()
        .map(|(i, (date, (total, count)))| {
            let start = i.saturating_sub(MOVING_AVERAGE_DAYS - 1);
            let window = &totals[start..=i];
            DailyPoint {
                date,
                total,
                count,
                avg: total / count as f64,
                moving_average: window.iter().sum::<f64>() / window.len() as f64,
            }
        })
        .collect()
}
