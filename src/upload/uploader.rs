use super::credentials::CredentialCache;
use super::{ObjectTransport, UploadError, UploadMetadata};
use crate::store::Store;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Uploads encoded chunks with bounded retries and duplicate suppression.
///
/// A chunk id is held in the in-flight set for the whole attempt, so a
/// concurrent upload of the same chunk fails fast instead of racing the
/// first one.
pub struct ChunkUploader {
    transport: Arc<dyn ObjectTransport>,
    credentials: Arc<CredentialCache>,
    store: Arc<dyn Store>,
    max_retry_count: u32,
    in_flight: Mutex<HashSet<String>>,
}

impl ChunkUploader {
    pub fn new(
        transport: Arc<dyn ObjectTransport>,
        credentials: Arc<CredentialCache>,
        store: Arc<dyn Store>,
        max_retry_count: u32,
    ) -> Self {
        Self {
            transport,
            credentials,
            store,
            max_retry_count,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Uploads one file, retrying transient failures up to the budget.
    /// Returns the remote identifier on success.
    pub async fn upload(
        &self,
        file: &Path,
        metadata: &UploadMetadata,
    ) -> Result<String, UploadError> {
        {
            let mut in_flight = self.in_flight.lock().await;
            if !in_flight.insert(metadata.chunk_id.clone()) {
                return Err(UploadError::permanent(format!(
                    "chunk {} is already uploading",
                    metadata.chunk_id
                )));
            }
        }

        let result = self.upload_with_retry(file, metadata).await;
        self.in_flight.lock().await.remove(&metadata.chunk_id);
        result
    }

    async fn upload_with_retry(
        &self,
        file: &Path,
        metadata: &UploadMetadata,
    ) -> Result<String, UploadError> {
        if !file.exists() {
            return Err(UploadError::permanent(format!(
                "file missing for chunk {}: {}",
                metadata.chunk_id,
                file.display()
            )));
        }

        let key = format!(
            "{}/{}/{}",
            metadata.folder_name, metadata.session_id, metadata.file_name
        );

        let mut attempt = 0u32;
        loop {
            let credentials = if attempt == 0 {
                self.credentials.get().await
            } else {
                // A failed attempt may mean the token expired.
                self.credentials.refresh().await
            }
            .map_err(|e| UploadError::retryable(e.to_string()))?;

            match self.transport.put(file, &key, &credentials, metadata).await {
                Ok(remote_id) => {
                    info!(
                        "uploaded chunk {} to {} (attempt {})",
                        metadata.chunk_id,
                        key,
                        attempt + 1
                    );
                    return Ok(remote_id);
                }
                Err(err) if err.retryable && attempt < self.max_retry_count => {
                    warn!(
                        "upload attempt {} for chunk {} failed, retrying: {}",
                        attempt + 1,
                        metadata.chunk_id,
                        err
                    );
                    self.record_attempt_failure(&metadata.chunk_id).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Bookkeeping between attempts. Store errors are logged, never allowed
    /// to abort the retry loop.
    async fn record_attempt_failure(&self, chunk_id: &str) {
        if let Err(e) = self.store.mark_failed(chunk_id).await {
            warn!("failed to record upload failure for {}: {}", chunk_id, e);
        }
        if let Err(e) = self.store.mark_in_progress(chunk_id).await {
            warn!("failed to restart upload record for {}: {}", chunk_id, e);
        }
    }
}
