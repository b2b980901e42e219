use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store not initialized")]
    NotInitialized,

    #[error("Store closed")]
    StoreClosed,

    #[error("Missing index '{name}' on transactions table")]
    MissingIndex { name: String },

    #[error("Invalid config field '{field}': {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    #[error("Page {page} is out of range")]
    PageOutOfRange { page: usize },

    #[error("Lane '{lane}' disconnected")]
    LaneDisconnected { lane: &'static str },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type LedgerResult<T> = Result<T, LedgerError>;
