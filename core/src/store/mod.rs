//! SQLite persistence for the capped transaction collection.
//!
//! RULE: Only the store module talks to the database.
//! The coordinator reaches it through `StoreLane`; nothing else executes SQL.
//!
//! Lifecycle: Uninitialized -> Initializing -> Ready -> Closed.
//! Every operation other than `init` requires `Ready`.
//!
//! Capacity: after any `add` the row count is at most
//! `max_records + eviction_buffer`. An add that would cross that ceiling
//! evicts the oldest rows (by timestamp, across old and new rows alike)
//! down to `max_records`, inside the same SQL transaction as the writes.

mod lane;

pub use lane::{StoreCommand, StoreLane};

use crate::{
    config::StoreConfig,
    error::{LedgerError, LedgerResult},
    transaction::{SortField, SortOrder, Transaction},
};
use chrono::{DateTime, Utc};
use rusqlite::{params, types::Type, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::collections::HashSet;

/// Secondary indexes `init` must find after applying migrations.
pub const REQUIRED_INDEXES: &[&str] = &[
    "idx_transactions_merchant",
    "idx_transactions_category",
    "idx_transactions_timestamp",
    "idx_transactions_status",
    "idx_transactions_type",
    "idx_transactions_amount",
];

const COLUMNS: &str = "id, timestamp_ms, amount, currency, txn_type, category, description,
                       merchant_name, status, user_id, account_id, location";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreState {
    Uninitialized,
    Initializing,
    Ready,
    Closed,
}

/// Result of one atomic `add`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct AddOutcome {
    /// Rows inserted or overwritten.
    pub written: usize,
    pub evicted: usize,
    /// Row count after the batch committed.
    pub count: usize,
}

/// Columns with an equality index usable by `find_by`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexedField {
    Merchant,
    Category,
    Status,
    Type,
}

impl IndexedField {
    fn column(&self) -> &'static str {
        match self {
            Self::Merchant => "merchant_name",
            Self::Category => "category",
            Self::Status => "status",
            Self::Type => "txn_type",
        }
    }
}

pub struct TransactionStore {
    config: StoreConfig,
    conn: Option<Connection>,
    state: StoreState,
}

impl TransactionStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            conn: None,
            state: StoreState::Uninitialized,
        }
    }

    pub fn state(&self) -> StoreState {
        self.state
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Open (or create) the database and apply the schema.
    /// Reopening an existing file keeps its rows. Calling `init` on a
    /// ready store is a no-op.
    pub fn init(&mut self) -> LedgerResult<()> {
        match self.state {
            StoreState::Ready => return Ok(()),
            StoreState::Closed => return Err(LedgerError::StoreClosed),
            StoreState::Uninitialized | StoreState::Initializing => {}
        }
        self.state = StoreState::Initializing;

        match self.open_and_migrate() {
            Ok(conn) => {
                self.conn = Some(conn);
                self.state = StoreState::Ready;
                log::info!(
                    "store ready at {} (max_records={}, buffer={})",
                    self.location(),
                    self.config.max_records,
                    self.config.eviction_buffer
                );
                Ok(())
            }
            Err(err) => {
                self.state = StoreState::Uninitialized;
                Err(err)
            }
        }
    }

    fn open_and_migrate(&self) -> LedgerResult<Connection> {
        let conn = match &self.config.path {
            Some(path) => {
                let conn = Connection::open(path)?;
                // WAL mode only matters for real files.
                let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
                conn
            }
            None => Connection::open_in_memory()?,
        };
        conn.execute_batch(include_str!("../../../migrations/001_transactions.sql"))?;
        verify_indexes(&conn)?;
        Ok(conn)
    }

    fn location(&self) -> String {
        match &self.config.path {
            Some(path) => path.display().to_string(),
            None => ":memory:".to_string(),
        }
    }

    fn conn(&self) -> LedgerResult<&Connection> {
        match (self.state, self.conn.as_ref()) {
            (StoreState::Ready, Some(conn)) => Ok(conn),
            (StoreState::Closed, _) => Err(LedgerError::StoreClosed),
            _ => Err(LedgerError::NotInitialized),
        }
    }

    fn conn_mut(&mut self) -> LedgerResult<&mut Connection> {
        match (self.state, self.conn.as_mut()) {
            (StoreState::Ready, Some(conn)) => Ok(conn),
            (StoreState::Closed, _) => Err(LedgerError::StoreClosed),
            _ => Err(LedgerError::NotInitialized),
        }
    }

    // ── Reads ──────────────────────────────────────────────────

    pub fn count(&self) -> LedgerResult<usize> {
        count_rows(self.conn()?)
    }

    /// Up to `limit` records from `offset`, ordered through the index on `field`.
    /// Ties are broken by id in the same direction.
    pub fn page(
        &self,
        offset: usize,
        limit: usize,
        field: SortField,
        order: SortOrder,
    ) -> LedgerResult<Vec<Transaction>> {
        let column = match field {
            SortField::Timestamp => "timestamp_ms",
            SortField::Amount => "amount",
        };
        let direction = match order {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        };
        let sql = format!(
            "SELECT {COLUMNS} FROM transactions
             ORDER BY {column} {direction}, id {direction}
             LIMIT ?1 OFFSET ?2"
        );
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![clamp_i64(limit), clamp_i64(offset)], row_to_transaction)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn get(&self, id: &str) -> LedgerResult<Option<Transaction>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {COLUMNS} FROM transactions WHERE id = ?1");
        let found = conn
            .query_row(&sql, params![id], row_to_transaction)
            .optional()?;
        Ok(found)
    }

    /// Exact-match lookup on one secondary index, newest first.
    pub fn find_by(
        &self,
        field: IndexedField,
        value: &str,
        limit: usize,
    ) -> LedgerResult<Vec<Transaction>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM transactions WHERE {} = ?1
             ORDER BY timestamp_ms DESC, id DESC LIMIT ?2",
            field.column()
        );
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![value, limit as i64], row_to_transaction)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Case-insensitive substring search over description, merchant,
    /// category, and id, newest first. Defaults to 1% of capacity rows.
    /// Queries shorter than two characters return the newest rows.
    pub fn search(&self, query: &str, limit: Option<usize>) -> LedgerResult<Vec<Transaction>> {
        let limit = limit.unwrap_or_else(|| self.config.search_limit());
        let query = query.trim();
        if query.chars().count() < crate::search::MIN_SEARCH_LEN {
            return self.page(0, limit, SortField::Timestamp, SortOrder::Desc);
        }
        let pattern = format!("%{}%", escape_like(&query.to_lowercase()));
        let sql = format!(
            "SELECT {COLUMNS} FROM transactions
             WHERE lower(description)   LIKE ?1 ESCAPE '\\'
                OR lower(merchant_name) LIKE ?1 ESCAPE '\\'
                OR lower(category)      LIKE ?1 ESCAPE '\\'
                OR lower(id)            LIKE ?1 ESCAPE '\\'
             ORDER BY timestamp_ms DESC, id DESC LIMIT ?2"
        );
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![pattern, limit as i64], row_to_transaction)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ── Writes ─────────────────────────────────────────────────

    /// Upsert `records` and enforce the capacity ceiling as one transaction.
    /// Either the whole batch (with its eviction) commits or none of it does.
    pub fn add(&mut self, records: &[Transaction]) -> LedgerResult<AddOutcome> {
        let max_records = self.config.max_records;
        let ceiling = self.config.ceiling();
        let conn = self.conn_mut()?;
        let tx = conn.transaction()?;

        let written = {
            let sql = format!(
                "INSERT OR REPLACE INTO transactions ({COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
            );
            let mut stmt = tx.prepare(&sql)?;
            for t in records {
                stmt.execute(params![
                    t.id,
                    t.timestamp.timestamp_millis(),
                    t.amount,
                    t.currency,
                    t.txn_type.as_str(),
                    t.category,
                    t.description,
                    t.merchant_name,
                    t.status.as_str(),
                    t.user_id,
                    t.account_id,
                    t.location,
                ])?;
            }
            records.len()
        };

        let projected = count_rows(&tx)?;
        let evicted = if projected > ceiling {
            delete_oldest(&tx, projected - max_records)?
        } else {
            0
        };
        tx.commit()?;

        let count = projected - evicted;
        if evicted > 0 {
            log::debug!("store: evicted {evicted} oldest records, {count} remain");
        }
        Ok(AddOutcome { written, evicted, count })
    }

    /// Remove the `n` records with the smallest timestamps.
    pub fn evict_oldest(&mut self, n: usize) -> LedgerResult<usize> {
        let conn = self.conn_mut()?;
        let tx = conn.transaction()?;
        let removed = delete_oldest(&tx, n)?;
        tx.commit()?;
        Ok(removed)
    }

    pub fn close(&mut self) -> LedgerResult<()> {
        if let Some(conn) = self.conn.take() {
            conn.close().map_err(|(_, err)| LedgerError::Database(err))?;
        }
        self.state = StoreState::Closed;
        log::info!("store at {} closed", self.location());
        Ok(())
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn verify_indexes(conn: &Connection) -> LedgerResult<()> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type = 'index' AND tbl_name = 'transactions'",
    )?;
    let present = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<HashSet<_>, _>>()?;
    for name in REQUIRED_INDEXES {
        if !present.contains(*name) {
            return Err(LedgerError::MissingIndex { name: name.to_string() });
        }
    }
    Ok(())
}

fn clamp_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn count_rows(conn: &Connection) -> LedgerResult<usize> {
    let n: i64 = conn.query_row("SELECT COUNT(*) FROM transactions", [], |row| row.get(0))?;
    Ok(n as usize)
}

fn delete_oldest(conn: &Connection, n: usize) -> LedgerResult<usize> {
    if n == 0 {
        return Ok(0);
    }
    let removed = conn.execute(
        "DELETE FROM transactions WHERE id IN (
             SELECT id FROM transactions ORDER BY timestamp_ms ASC, id ASC LIMIT ?1
         )",
        params![n as i64],
    )?;
    Ok(removed)
}

fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

fn row_to_transaction(row: &Row<'_>) -> rusqlite::Result<Transaction> {
    let millis: i64 = row.get(1)?;
    let timestamp = DateTime::<Utc>::from_timestamp_millis(millis)
        .ok_or_else(|| conversion_error(1, format!("timestamp out of range: {millis}")))?;
    let txn_type = row
        .get::<_, String>(4)?
        .parse()
        .map_err(|e: crate::transaction::ParseEnumError| conversion_error(4, e.to_string()))?;
    let status = row
        .get::<_, String>(8)?
        .parse()
        .map_err(|e: crate::transaction::ParseEnumError| conversion_error(8, e.to_string()))?;

    Ok(Transaction {
        id: row.get(0)?,
        timestamp,
        amount: row.get(2)?,
        currency: row.get(3)?,
        txn_type,
        category: row.get(5)?,
        description: row.get(6)?,
        merchant_name: row.get(7)?,
        status,
        user_id: row.get(9)?,
        account_id: row.get(10)?,
        location: row.get(11)?,
    })
}
