use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoreError {
    #[error("Source not found: {0}")]
    SourceNotFound(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("LLM backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("LLM backend timed out after {timeout_secs}s")]
    BackendTimeout { timeout_secs: u64 },

    #[error("Unrecoverable LLM response: {0}")]
    UnrecoverableResponse(String),

    #[error("Scan already in progress for {0}")]
    ScanInProgress(String),

    #[error("Write aborted, target untouched: {0}")]
    WriteAborted(String),

    #[error("Database error: {0}")]
    Database(#[from] libsql::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl LoreError {
    /// Transport-level failures the orchestrator retries with bounded
    /// attempts before skipping a chunk.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LoreError::BackendUnavailable(_) | LoreError::BackendTimeout { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, LoreError>;
