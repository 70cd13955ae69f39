//! Error types for the ctxweave domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all ctxweave operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Generation backend errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Action errors ---
    #[error("Action error: {0}")]
    Action(#[from] ActionError),

    // --- Retrieval errors ---
    #[error("Retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    // --- Persistence errors ---
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    // --- Turn execution errors ---
    #[error("Turn failed: {0}")]
    Turn(#[from] TurnError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("Action not found: {0}")]
    NotFound(String),

    #[error("Action execution failed: {action} ({reason})")]
    ExecutionFailed { action: String, reason: String },

    #[error("Invalid action arguments: {0}")]
    InvalidArguments(String),
}

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("Retrieval backend unavailable: {0}")]
    Unavailable(String),

    #[error("Ingestion failed: {0}")]
    IngestFailed(String),
}

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Corrupted checkpoint for thread {thread_id}: {reason}")]
    Corrupted { thread_id: String, reason: String },
}

#[derive(Debug, Error)]
pub enum TurnError {
    #[error("conversation has no messages to build context from")]
    EmptyHistory,

    #[error("generation round limit of {limit} reached while actions were still requested")]
    RoundLimitExceeded { limit: u32 },

    #[error("procedure step {requested} out of range ({total} steps)")]
    StepOutOfRange { requested: usize, total: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn turn_error_displays_limit() {
        let err = Error::from(TurnError::RoundLimitExceeded { limit: 3 });
        assert!(err.to_string().contains("limit of 3"));
    }

    #[test]
    fn action_error_displays_correctly() {
        let err = Error::Action(ActionError::ExecutionFailed {
            action: "strlen".into(),
            reason: "missing text".into(),
        });
        assert!(err.to_string().contains("strlen"));
        assert!(err.to_string().contains("missing text"));
    }
}
