use super::models::*;
use super::{ApiError, BackendApi, PollResponse};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::debug;

/// REST client for the transcription backend.
pub struct HttpBackendApi {
    client: reqwest::Client,
    base_url: String,
    credentials_url: String,
}

impl HttpBackendApi {
    pub fn new(base_url: impl Into<String>, credentials_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials_url: credentials_url.into(),
        }
    }

    fn transaction_url(&self, action: &str, session_id: &str) -> String {
        format!(
            "{}/voice/api/v2/transaction/{}/{}",
            self.base_url, action, session_id
        )
    }

    async fn post_json<B, R>(&self, url: &str, body: &B) -> Result<R, ApiError>
    where
        B: serde::Serialize + Sync,
        R: DeserializeOwned,
    {
        debug!("POST {}", url);
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        Self::decode(response).await
    }

    async fn decode<R: DeserializeOwned>(response: reqwest::Response) -> Result<R, ApiError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| {
                    v.pointer("/error/message")
                        .or_else(|| v.get("message"))
                        .and_then(|m| m.as_str().map(str::to_string))
                })
                .unwrap_or(body);
            return Err(ApiError::Rejected(format!("{status}: {message}")));
        }

        serde_json::from_str(&body)
            .map_err(|e| ApiError::Rejected(format!("malformed response: {e}")))
    }
}

#[async_trait]
impl BackendApi for HttpBackendApi {
    async fn init_transaction(
        &self,
        session_id: &str,
        request: &InitTransactionRequest,
    ) -> Result<InitTransactionResponse, ApiError> {
        self.post_json(&self.transaction_url("init", session_id), request)
            .await
    }

    async fn stop_transaction(
        &self,
        session_id: &str,
        request: &StopTransactionRequest,
    ) -> Result<StopTransactionResponse, ApiError> {
        self.post_json(&self.transaction_url("stop", session_id), request)
            .await
    }

    async fn commit_transaction(
        &self,
        session_id: &str,
        request: &StopTransactionRequest,
    ) -> Result<StopTransactionResponse, ApiError> {
        self.post_json(&self.transaction_url("commit", session_id), request)
            .await
    }

    async fn transaction_result(&self, session_id: &str) -> Result<PollResponse, ApiError> {
        let url = format!("{}/voice/api/v3/status/{}", self.base_url, session_id);
        debug!("GET {}", url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        if response.status() == StatusCode::ACCEPTED {
            return Ok(PollResponse::Processing);
        }
        Ok(PollResponse::Ready(Self::decode(response).await?))
    }

    async fn fetch_credentials(&self) -> Result<CredentialsResponse, ApiError> {
        let response = self
            .client
            .get(&self.credentials_url)
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        Self::decode(response).await
    }
}
