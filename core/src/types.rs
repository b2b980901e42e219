//! Shared primitive types used across the core.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A stable, unique identifier for a transaction record.
pub type TxnId = String;

/// Identity of one background analytics request.
/// Issued in strictly increasing order by the coordinator, so a completion
/// can be compared against newer requests without closure identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestId(pub u64);

impl RequestId {
    pub fn next(self) -> Self {
        RequestId(self.0 + 1)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}
