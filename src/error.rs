use thiserror::Error;

/// Failures that stop a run from starting. Everything else the engine
/// receives (stale guesses, out-of-order hints) is ignored rather than
/// reported.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("unknown level: {0}")]
    UnknownLevel(String),

    #[error("no items available for level {0}")]
    EmptyItemPool(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("malformed stored data: {0}")]
    Json(#[from] serde_json::Error),
}
