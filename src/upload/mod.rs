pub mod credentials;
pub mod uploader;

pub use credentials::{CredentialCache, Credentials};
pub use uploader::ChunkUploader;

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

/// Everything the transport needs to describe one chunk upload.
#[derive(Debug, Clone)]
pub struct UploadMetadata {
    pub chunk_id: String,
    pub session_id: String,
    pub index: usize,
    pub file_name: String,
    pub folder_name: String,
    pub txn_ref: String,
    pub mime_type: &'static str,
}

/// Upload failure, tagged with whether another attempt could succeed.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct UploadError {
    pub message: String,
    pub retryable: bool,
}

impl UploadError {
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }
}

/// Moves one encoded file into object storage. Implementations wrap the
/// platform's transfer facility (multipart S3, a transfer manager, a mock).
#[async_trait]
pub trait ObjectTransport: Send + Sync {
    /// Uploads `file` under `key` and returns the remote identifier.
    async fn put(
        &self,
        file: &Path,
        key: &str,
        credentials: &Credentials,
        metadata: &UploadMetadata,
    ) -> Result<String, UploadError>;
}
