//! Synthetic transaction generation from curated vocabularies.
//!
//! Field values are random, field shapes are fixed:
//!   - amount uniform in [1, 5001), rounded to cents
//!   - 60% credit / 40% debit
//!   - ~90% completed, the remainder split evenly pending/failed
//!   - location present ~70% of the time
//!   - timestamp uniform over the year before the anchor time
//!
//! Ids combine the generator's sequence counter, the anchor time in
//! milliseconds, and a random suffix, so they never repeat within a process.

use crate::{
    rng::LaneRng,
    transaction::{Transaction, TxnStatus, TxnType},
};
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

pub const MIN_AMOUNT: f64 = 1.0;
pub const MAX_AMOUNT: f64 = 5001.0;
pub const CREDIT_SHARE: f64 = 0.60;
pub const COMPLETED_SHARE: f64 = 0.90;
pub const LOCATION_SHARE: f64 = 0.70;
pub const USER_POOL: u64 = 1_000;
const LOOKBACK_MS: i64 = 365 * 24 * 60 * 60 * 1000;

pub struct TransactionGenerator {
    rng: LaneRng,
    currency: String,
    next_seq: u64,
}

impl TransactionGenerator {
    pub fn new(rng: LaneRng, currency: impl Into<String>) -> Self {
        Self {
            rng,
            currency: currency.into(),
            next_seq: 0,
        }
    }

    /// Generate `count` records anchored at the current time.
    pub fn generate(&mut self, count: usize) -> Vec<Transaction> {
        self.generate_at(count, Utc::now())
    }

    /// Generate `count` records with timestamps in the year before `anchor`.
    pub fn generate_at(&mut self, count: usize, anchor: DateTime<Utc>) -> Vec<Transaction> {
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            out.push(self.next_record(anchor));
        }
        log::debug!("{}: generated {count} records", self.rng.name);
        out
    }

    fn next_record(&mut self, anchor: DateTime<Utc>) -> Transaction {
        let seq = self.next_seq;
        self.next_seq += 1;

        let rng = &mut self.rng;
        let amount = (rng.uniform(MIN_AMOUNT, MAX_AMOUNT) * 100.0).round() / 100.0;
        let offset_ms = (rng.next_f64() * LOOKBACK_MS as f64) as i64;
        let timestamp = anchor - Duration::milliseconds(offset_ms);

        let txn_type = if rng.chance(CREDIT_SHARE) {
            TxnType::Credit
        } else {
            TxnType::Debit
        };
        let status = if rng.chance(COMPLETED_SHARE) {
            TxnStatus::Completed
        } else if rng.chance(0.5) {
            TxnStatus::Pending
        } else {
            TxnStatus::Failed
        };

        let category = rng.pick(CATEGORIES).to_string();
        let merchant_name = rng.pick(MERCHANTS).to_string();
        let description = format!("Transaction {seq} - {} - {}", rng.pick(ACTIONS), rng.pick(ITEMS));
        let user = rng.next_u64_below(USER_POOL);
        let account_slot = rng.next_u64_below(3);
        let location = if rng.chance(LOCATION_SHARE) {
            Some(rng.pick(LOCATIONS).to_string())
        } else {
            None
        };

        let suffix = Uuid::new_v4().simple().to_string();
        Transaction {
            id: format!("txn_{seq}_{}_{}", anchor.timestamp_millis(), &suffix[..12]),
            timestamp,
            amount,
            currency: self.currency.clone(),
            txn_type,
            category,
            description,
            merchant_name,
            status,
            user_id: format!("user_{user}"),
            account_id: format!("acct_{user}_{account_slot}"),
            location,
        }
    }
}

// ── Vocabularies ─────────────────────────────────────────────────────────────

pub const CATEGORIES: &[&str] = &[
    "Food & Dining", "Groceries", "Shopping", "Transportation", "Entertainment",
    "Utilities", "Healthcare", "Travel", "Education", "Salary", "Transfer", "Subscriptions",
];

pub const MERCHANTS: &[&str] = &[
    "Amazon", "Starbucks", "Walmart", "Target", "McDonalds", "Shell", "Netflix",
    "Spotify", "Uber", "Lyft", "Apple", "Google", "PayPal", "Venmo", "Square",
    "Stripe", "Costco", "Whole Foods", "Home Depot", "Delta Air Lines",
];

pub const LOCATIONS: &[&str] = &[
    "New York, NY", "Los Angeles, CA", "Chicago, IL", "Houston, TX", "Phoenix, AZ",
    "Philadelphia, PA", "San Antonio, TX", "San Diego, CA", "Dallas, TX", "Seattle, WA",
    "Denver, CO", "Boston, MA", "Miami, FL", "Atlanta, GA", "London, UK",
];

const ACTIONS: &[&str] = &["Purchase", "Payment", "Transfer", "Withdrawal", "Deposit", "Refund"];

const ITEMS: &[&str] = &["Coffee", "Groceries", "Gas", "Movie ticket", "Subscription", "ATM withdrawal"];
