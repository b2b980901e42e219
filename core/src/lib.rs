//! LedgerFlow core: a transaction ledger with live ingestion, search,
//! filtering, aggregation, and heuristic risk scoring over a capped
//! SQLite store.
//!
//! The pure engines (`search`, `filter`, `summary`, `risk`) never touch
//! shared state. The `Coordinator` owns the working set and talks to the
//! background lanes (`store`, `producer`, `analytics_lane`) by message only.

pub mod analytics_lane;
pub mod config;
pub mod coordinator;
pub mod debounce;
pub mod error;
pub mod filter;
pub mod generator;
pub mod insight;
pub mod message;
pub mod producer;
pub mod risk;
pub mod rng;
pub mod search;
pub mod store;
pub mod summary;
pub mod transaction;
pub mod types;

pub use config::LedgerConfig;
pub use coordinator::{Coordinator, LedgerView, PersistenceStatus};
pub use error::{LedgerError, LedgerResult};
pub use transaction::{FilterOptions, Transaction, TransactionSummary, TxnStatus, TxnType};
