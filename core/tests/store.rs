//! Capped SQLite store: lifecycle, paging, eviction, durability.

use chrono::{DateTime, Duration, TimeZone, Utc};
use ledgerflow_core::config::StoreConfig;
use ledgerflow_core::error::LedgerError;
use ledgerflow_core::store::{IndexedField, StoreState, TransactionStore};
use ledgerflow_core::transaction::{SortField, SortOrder, Transaction, TxnStatus, TxnType};
use proptest::prelude::*;

fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

fn txn(i: usize) -> Transaction {
    Transaction {
        id: format!("txn_{i:05}"),
        timestamp: epoch() + Duration::minutes(i as i64),
        amount: ((i * 7919) % 5000) as f64 + 0.5,
        currency: "USD".to_string(),
        txn_type: if i % 5 < 3 { TxnType::Credit } else { TxnType::Debit },
        category: ["Shopping", "Travel", "Utilities"][i % 3].to_string(),
        description: format!("Transaction {i} - Purchase - Electronics"),
        merchant_name: ["Amazon", "Delta Air Lines", "Shell"][i % 3].to_string(),
        status: if i % 10 == 0 { TxnStatus::Pending } else { TxnStatus::Completed },
        user_id: format!("user_{}", i % 17),
        account_id: format!("acct_{}_0", i % 17),
        location: (i % 2 == 0).then(|| "Austin, TX".to_string()),
    }
}

fn batch(range: std::ops::Range<usize>) -> Vec<Transaction> {
    range.map(txn).collect()
}

fn ready(max_records: usize, eviction_buffer: usize) -> TransactionStore {
    let mut store = TransactionStore::new(StoreConfig {
        path: None,
        max_records,
        eviction_buffer,
    });
    store.init().unwrap();
    store
}

#[test]
fn operations_require_init() {
    let store = TransactionStore::new(StoreConfig::default());
    assert_eq!(store.state(), StoreState::Uninitialized);
    assert!(matches!(store.count(), Err(LedgerError::NotInitialized)));
    assert!(matches!(
        store.page(0, 10, SortField::Timestamp, SortOrder::Desc),
        Err(LedgerError::NotInitialized)
    ));
}

#[test]
fn init_is_idempotent_and_close_is_final() {
    let mut store = ready(100, 10);
    store.init().unwrap();
    assert_eq!(store.state(), StoreState::Ready);

    store.close().unwrap();
    assert_eq!(store.state(), StoreState::Closed);
    assert!(matches!(store.count(), Err(LedgerError::StoreClosed)));
    assert!(matches!(store.init(), Err(LedgerError::StoreClosed)));
}

/// 1,500 records into a 1,000 + 100 store keeps the newest 1,000.
#[test]
fn eviction_keeps_most_recent() {
    let mut store = ready(1_000, 100);
    let outcome = store.add(&batch(0..1_500)).unwrap();

    assert_eq!(outcome.written, 1_500);
    assert_eq!(outcome.evicted, 500);
    assert_eq!(outcome.count, 1_000);
    assert_eq!(store.count().unwrap(), 1_000);

    let oldest = store.page(0, 1, SortField::Timestamp, SortOrder::Asc).unwrap();
    assert_eq!(oldest[0].id, "txn_00500");
    let newest = store.page(0, 1, SortField::Timestamp, SortOrder::Desc).unwrap();
    assert_eq!(newest[0].id, "txn_01499");
}

/// The buffer absorbs small overshoots without an eviction pass.
#[test]
fn buffer_defers_eviction() {
    let mut store = ready(1_000, 100);
    store.add(&batch(0..1_000)).unwrap();
    let outcome = store.add(&batch(1_000..1_050)).unwrap();
    assert_eq!(outcome.evicted, 0);
    assert_eq!(outcome.count, 1_050);

    let outcome = store.add(&batch(1_050..1_101)).unwrap();
    assert_eq!(outcome.evicted, 101);
    assert_eq!(outcome.count, 1_000);
}

/// Re-adding an id overwrites the row instead of duplicating it.
#[test]
fn add_upserts_by_id() {
    let mut store = ready(100, 10);
    store.add(&batch(0..5)).unwrap();
    let mut changed = txn(3);
    changed.amount = 9_999.0;
    changed.status = TxnStatus::Failed;
    let outcome = store.add(&[changed.clone()]).unwrap();

    assert_eq!(outcome.count, 5);
    assert_eq!(store.get("txn_00003").unwrap(), Some(changed));
    assert_eq!(store.get("missing").unwrap(), None);
}

#[test]
fn pages_follow_sort_field_and_order() {
    let mut store = ready(1_000, 100);
    let records = batch(0..50);
    store.add(&records).unwrap();

    let page = store.page(10, 10, SortField::Timestamp, SortOrder::Desc).unwrap();
    let ids: Vec<&str> = page.iter().map(|t| t.id.as_str()).collect();
    let expected: Vec<String> = (30..40).rev().map(|i| format!("txn_{i:05}")).collect();
    assert_eq!(ids, expected.iter().map(String::as_str).collect::<Vec<_>>());

    let by_amount = store.page(0, 50, SortField::Amount, SortOrder::Asc).unwrap();
    assert!(by_amount.windows(2).all(|w| w[0].amount <= w[1].amount));
    assert!(store.page(50, 10, SortField::Amount, SortOrder::Asc).unwrap().is_empty());
}

#[test]
fn find_by_uses_secondary_indexes() {
    let mut store = ready(1_000, 100);
    store.add(&batch(0..30)).unwrap();

    let shell = store.find_by(IndexedField::Merchant, "Shell", 100).unwrap();
    assert_eq!(shell.len(), 10);
    assert!(shell.windows(2).all(|w| w[0].timestamp >= w[1].timestamp), "newest first");

    let pending = store.find_by(IndexedField::Status, "pending", 100).unwrap();
    assert_eq!(pending.len(), 3);
    let debits = store.find_by(IndexedField::Type, "debit", 5).unwrap();
    assert_eq!(debits.len(), 5);
    assert!(store.find_by(IndexedField::Category, "Nope", 5).unwrap().is_empty());
}

#[test]
fn search_matches_text_columns() {
    let mut store = ready(1_000, 100);
    store.add(&batch(0..30)).unwrap();

    let delta = store.search("delta air", None).unwrap();
    assert_eq!(delta.len(), 10);
    let one = store.search("Transaction 17 ", None).unwrap();
    assert_eq!(one.len(), 1);
    assert_eq!(one[0].id, "txn_00017");
    // LIKE wildcards in the query are literal.
    assert!(store.search("%_%", None).unwrap().is_empty());
    // Default limit is 1% of capacity.
    assert_eq!(store.search("transaction", None).unwrap().len(), 10);
    assert_eq!(store.search("transaction", Some(25)).unwrap().len(), 25);
}

#[test]
fn evict_oldest_removes_smallest_timestamps() {
    let mut store = ready(1_000, 100);
    store.add(&batch(0..20)).unwrap();
    assert_eq!(store.evict_oldest(5).unwrap(), 5);
    assert_eq!(store.count().unwrap(), 15);
    assert!(store.get("txn_00004").unwrap().is_none());
    assert!(store.get("txn_00005").unwrap().is_some());
}

/// Reopening a file-backed store keeps its rows.
#[test]
fn reopen_preserves_data() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig {
        path: Some(dir.path().join("ledger.db")),
        max_records: 1_000,
        eviction_buffer: 100,
    };

    let mut store = TransactionStore::new(config.clone());
    store.init().unwrap();
    store.add(&batch(0..42)).unwrap();
    store.close().unwrap();

    let mut reopened = TransactionStore::new(config);
    reopened.init().unwrap();
    assert_eq!(reopened.count().unwrap(), 42);
    assert_eq!(reopened.get("txn_00041").unwrap(), Some(txn(41)));
}

/// An index name taken by another table means the migration cannot
/// create it, and init must refuse the database.
#[test]
fn init_rejects_missing_index() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.db");
    {
        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE decoy (merchant_name TEXT);
             CREATE INDEX idx_transactions_merchant ON decoy (merchant_name);",
        )
        .unwrap();
    }

    let mut store = TransactionStore::new(StoreConfig {
        path: Some(path),
        max_records: 100,
        eviction_buffer: 10,
    });
    match store.init() {
        Err(LedgerError::MissingIndex { name }) => assert_eq!(name, "idx_transactions_merchant"),
        other => panic!("expected a missing index, got {other:?}"),
    }
    assert_eq!(store.state(), StoreState::Uninitialized);
    assert!(matches!(store.count(), Err(LedgerError::NotInitialized)));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// No sequence of adds lets the store outgrow max_records + buffer.
    #[test]
    fn count_never_exceeds_ceiling(sizes in prop::collection::vec(1usize..160, 1..12)) {
        let mut store = ready(200, 20);
        let mut next = 0;
        for size in sizes {
            let outcome = store.add(&batch(next..next + size)).unwrap();
            next += size;
            prop_assert!(outcome.count <= 220, "count {} after batch of {}", outcome.count, size);
            prop_assert_eq!(outcome.count, store.count().unwrap());
        }
    }
}
