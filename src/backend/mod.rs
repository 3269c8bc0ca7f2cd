pub mod http;
pub mod models;

pub use http::HttpBackendApi;
pub use models::*;

use async_trait::async_trait;
use thiserror::Error;

/// Backend call failure, split by whether a retry could help.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The backend understood the request and said no.
    #[error("backend rejected request: {0}")]
    Rejected(String),
    /// The request never completed; safe to retry.
    #[error("network error: {0}")]
    Network(String),
}

impl ApiError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

/// Outcome of one result poll.
#[derive(Debug, Clone)]
pub enum PollResponse {
    /// The backend is still analyzing; poll again later.
    Processing,
    Ready(TransactionResultResponse),
}

/// The remote transcription backend. One transaction per session, advanced
/// through init, stop, commit and result polling.
#[async_trait]
pub trait BackendApi: Send + Sync {
    async fn init_transaction(
        &self,
        session_id: &str,
        request: &InitTransactionRequest,
    ) -> Result<InitTransactionResponse, ApiError>;

    async fn stop_transaction(
        &self,
        session_id: &str,
        request: &StopTransactionRequest,
    ) -> Result<StopTransactionResponse, ApiError>;

    async fn commit_transaction(
        &self,
        session_id: &str,
        request: &StopTransactionRequest,
    ) -> Result<StopTransactionResponse, ApiError>;

    async fn transaction_result(&self, session_id: &str) -> Result<PollResponse, ApiError>;

    async fn fetch_credentials(&self) -> Result<CredentialsResponse, ApiError>;
}
