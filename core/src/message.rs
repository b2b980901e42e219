//! Cross-lane messages.
//!
//! RULE: Background lanes never touch coordinator state.
//! They deliver new data or computed results as LaneMessages on the
//! coordinator's inbox, and the coordinator alone decides what to keep.

use crate::{
    risk::RiskAnalytics,
    store::AddOutcome,
    transaction::Transaction,
    types::RequestId,
};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::mpsc::Sender;
use std::time::Duration;

/// Sending half of the coordinator inbox, cloned into every lane.
pub type LaneSender = Sender<LaneMessage>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lane {
    Bulk,
    Producer,
    Store,
    Analytics,
}

impl Lane {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Bulk => "bulk",
            Self::Producer => "producer",
            Self::Store => "store",
            Self::Analytics => "analytics",
        }
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone)]
pub enum LaneMessage {
    // ── Bulk generation ────────────────────────────
    /// One slice of the initial dataset. `index` is the offset of the
    /// chunk's first record; chunks arrive in increasing index order.
    TransactionChunk {
        index: usize,
        total: usize,
        records: Vec<Transaction>,
    },
    GenerationCompleted {
        total: usize,
    },

    // ── Producer ───────────────────────────────────
    NewTransactions {
        records: Vec<Transaction>,
        generated_at: DateTime<Utc>,
    },
    PollingStarted {
        interval: Duration,
    },
    PollingStopped,

    // ── Store ──────────────────────────────────────
    BatchStored {
        batch_id: u64,
        outcome: AddOutcome,
    },

    // ── Analytics ──────────────────────────────────
    AnalyticsCompleted {
        request_id: RequestId,
        analytics: RiskAnalytics,
    },
    AnalyticsFailed {
        request_id: RequestId,
        error: String,
    },

    // ── Failures ───────────────────────────────────
    /// A recoverable failure on a background lane.
    LaneFailed {
        lane: Lane,
        error: String,
    },
}

/// Render a caught panic payload for a `LaneFailed` message.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "lane panicked".to_string()
    }
}
