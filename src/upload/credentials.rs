use crate::backend::BackendApi;
use crate::error::{Result, ScribeError};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// Temporary object-storage credentials.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub access_key: String,
    pub secret_key: String,
    pub session_token: String,
}

/// Caches backend-issued credentials across uploads. A failed attempt calls
/// `refresh` so the next try runs with a fresh set.
pub struct CredentialCache {
    api: Arc<dyn BackendApi>,
    cached: Mutex<Option<Credentials>>,
}

impl CredentialCache {
    pub fn new(api: Arc<dyn BackendApi>) -> Self {
        Self {
            api,
            cached: Mutex::new(None),
        }
    }

    /// Returns the cached credentials, fetching on first use.
    pub async fn get(&self) -> Result<Credentials> {
        let mut cached = self.cached.lock().await;
        if let Some(credentials) = cached.as_ref() {
            return Ok(credentials.clone());
        }
        let fresh = self.fetch().await?;
        *cached = Some(fresh.clone());
        Ok(fresh)
    }

    /// Drops the cache and fetches a fresh set.
    pub async fn refresh(&self) -> Result<Credentials> {
        let mut cached = self.cached.lock().await;
        let fresh = self.fetch().await?;
        *cached = Some(fresh.clone());
        Ok(fresh)
    }

    async fn fetch(&self) -> Result<Credentials> {
        let response = self
            .api
            .fetch_credentials()
            .await
            .map_err(|e| ScribeError::TransientNetwork(e.to_string()))?;
        info!("fetched fresh storage credentials");
        Ok(Credentials {
            access_key: response.access_key_id,
            secret_key: response.secret_key,
            session_token: response.session_token,
        })
    }
}
