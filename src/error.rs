use thiserror::Error;

/// Error taxonomy for the engine core.
///
/// Parse problems are absorbed per file and never surface here; everything
/// below either aborts a run (`Io`, `Invariant`, `IndexLocked`) or is a
/// distinct query result (`UnknownSymbol`, `MalformedSymbolId`).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("input error: {0}")]
    Input(String),

    #[error("index locked by pid {0}")]
    IndexLocked(u32),

    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),

    #[error("malformed symbol id: {0}")]
    MalformedSymbolId(String),

    #[error("invariant violation: {0}")]
    Invariant(String),

    #[error("scan cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    /// Process exit code for the indexer driver.
    pub fn exit_code(&self) -> i32 {
        match self {
            EngineError::Input(_)
            | EngineError::UnknownSymbol(_)
            | EngineError::MalformedSymbolId(_) => 1,
            EngineError::IndexLocked(_) => 2,
            EngineError::Io(_) | EngineError::Json(_) => 4,
            EngineError::Invariant(_) => 5,
            EngineError::Cancelled => 0,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
