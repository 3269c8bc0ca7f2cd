use crate::session::SessionState;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScribeError>;

/// Library error taxonomy. Transient failures are worth retrying; the rest
/// surface to the caller unchanged.
#[derive(Debug, Error)]
pub enum ScribeError {
    #[error("invalid session state transition: {from:?} -> {to:?}")]
    InvalidStateTransition {
        from: SessionState,
        to: SessionState,
    },

    #[error("transient network failure: {0}")]
    TransientNetwork(String),

    #[error("permanent upload failure: {0}")]
    PermanentUpload(String),

    #[error("backend rejected {stage} request: {message}")]
    BackendRejection {
        stage: &'static str,
        message: String,
    },

    #[error("{failed} of {total} chunks failed to upload")]
    PartialUploadFailure { failed: usize, total: usize },

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("cannot resume session {0}: no stored transaction metadata")]
    MissingMetadata(String),

    #[error("chunk not found: {0}")]
    ChunkNotFound(String),

    #[error("audio encoding failed: {0}")]
    Encode(#[from] hound::Error),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
