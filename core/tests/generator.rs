//! Record generator: field shapes, vocabularies, determinism per seed.

use chrono::{Duration, TimeZone, Utc};
use ledgerflow_core::generator::{
    TransactionGenerator, CATEGORIES, MAX_AMOUNT, MERCHANTS, MIN_AMOUNT,
};
use ledgerflow_core::rng::{LaneSlot, RngBank};
use ledgerflow_core::transaction::{TxnStatus, TxnType};
use std::collections::HashSet;

fn generator(seed: u64) -> TransactionGenerator {
    TransactionGenerator::new(RngBank::new(seed).for_lane(LaneSlot::Bulk, 0), "EUR")
}

#[test]
fn fields_stay_in_their_domains() {
    let anchor = Utc.with_ymd_and_hms(2024, 12, 31, 23, 0, 0).unwrap();
    let records = generator(42).generate_at(2_000, anchor);
    assert_eq!(records.len(), 2_000);

    for t in &records {
        assert!(t.amount >= MIN_AMOUNT && t.amount <= MAX_AMOUNT, "amount {}", t.amount);
        assert_eq!((t.amount * 100.0).round() / 100.0, t.amount, "amount has cents precision");
        assert!(t.timestamp <= anchor && t.timestamp >= anchor - Duration::days(365));
        assert!(CATEGORIES.contains(&t.category.as_str()));
        assert!(MERCHANTS.contains(&t.merchant_name.as_str()));
        assert_eq!(t.currency, "EUR");
        assert!(t.description.starts_with("Transaction "));
        assert!(t.user_id.starts_with("user_"));
        assert!(t.account_id.starts_with(&format!("acct_{}_", &t.user_id[5..])));
    }
}

#[test]
fn ids_are_unique_across_batches() {
    let mut g = generator(7);
    let mut seen = HashSet::new();
    for _ in 0..5 {
        for t in g.generate(500) {
            assert!(seen.insert(t.id.clone()), "duplicate id {}", t.id);
        }
    }
}

/// Credits are the majority type and most records complete.
#[test]
fn distribution_skews_credit_and_completed() {
    let records = generator(99).generate(10_000);
    let credits = records.iter().filter(|t| t.txn_type == TxnType::Credit).count();
    let completed = records.iter().filter(|t| t.status == TxnStatus::Completed).count();
    let located = records.iter().filter(|t| t.location.is_some()).count();

    assert!((5_500..6_500).contains(&credits), "credits {credits}");
    assert!((8_700..9_300).contains(&completed), "completed {completed}");
    assert!((6_500..7_500).contains(&located), "located {located}");
    assert!(records.iter().any(|t| t.status == TxnStatus::Pending));
    assert!(records.iter().any(|t| t.status == TxnStatus::Failed));
}

/// The same seed reproduces every field except the random id suffix.
#[test]
fn same_seed_same_records() {
    let anchor = Utc.with_ymd_and_hms(2024, 7, 4, 0, 0, 0).unwrap();
    let a = generator(1234).generate_at(100, anchor);
    let b = generator(1234).generate_at(100, anchor);
    for (x, y) in a.iter().zip(&b) {
        assert_eq!(
            (x.amount, x.timestamp, x.txn_type, &x.merchant_name, &x.description),
            (y.amount, y.timestamp, y.txn_type, &y.merchant_name, &y.description)
        );
    }
    let c = generator(4321).generate_at(100, anchor);
    assert_ne!(
        a.iter().map(|t| t.amount).collect::<Vec<_>>(),
        c.iter().map(|t| t.amount).collect::<Vec<_>>()
    );
}
