pub mod memory;

pub use memory::MemoryStore;

use crate::error::Result;
use crate::session::SessionState;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Upload lifecycle of a single chunk.
///
/// Legal transitions: `Pending -> InProgress -> {Success | Failed}` and
/// `Failed -> InProgress` for retries. `retry_count` increments only on a
/// transition into `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UploadState {
    Pending,
    InProgress,
    Success,
    Failed,
}

/// Backend transaction stage, persisted so that a fresh process can resume
/// exactly the remaining steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UploadStage {
    Init,
    Stop,
    Commit,
    Analyzing,
    Completed,
    Failure,
    Error,
}

impl UploadStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failure | Self::Error)
    }
}

/// Durable record of one encoded chunk and its upload outcome.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub chunk_id: String,
    pub session_id: String,
    pub index: usize,
    pub file_path: PathBuf,
    pub file_name: String,
    pub start_ms: u64,
    pub end_ms: u64,
    pub duration_ms: u64,
    pub upload_state: UploadState,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
}

/// Durable record of one recording session. Created at session start,
/// updated throughout, deleted only by explicit cleanup.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub state: SessionState,
    pub chunk_count: usize,
    pub upload_stage: UploadStage,
    pub folder_name: Option<String>,
    pub remote_txn_ref: Option<String>,
    /// Serialized init request, kept for crash recovery.
    pub metadata_json: Option<String>,
}

impl SessionRecord {
    pub fn new(session_id: String) -> Self {
        let now = Utc::now();
        Self {
            session_id,
            created_at: now,
            updated_at: now,
            state: SessionState::Starting,
            chunk_count: 0,
            upload_stage: UploadStage::Init,
            folder_name: None,
            remote_txn_ref: None,
            metadata_json: None,
        }
    }
}

/// Durable CRUD over session and chunk records. The persistence technology
/// is supplied by the embedding application.
#[async_trait]
pub trait Store: Send + Sync {
    async fn save_session(&self, session: SessionRecord) -> Result<()>;
    async fn session(&self, session_id: &str) -> Result<Option<SessionRecord>>;
    async fn update_session_state(&self, session_id: &str, state: SessionState) -> Result<()>;
    async fn update_upload_stage(&self, session_id: &str, stage: UploadStage) -> Result<()>;
    async fn update_session_metadata(&self, session_id: &str, metadata_json: String)
        -> Result<()>;
    async fn update_remote_refs(
        &self,
        session_id: &str,
        folder_name: String,
        txn_ref: String,
    ) -> Result<()>;
    /// Sessions currently parked at the given stage; used by recovery sweeps.
    async fn sessions_by_stage(&self, stage: UploadStage) -> Result<Vec<SessionRecord>>;
    async fn delete_session(&self, session_id: &str) -> Result<()>;

    async fn save_chunk(&self, chunk: ChunkRecord) -> Result<()>;
    async fn mark_in_progress(&self, chunk_id: &str) -> Result<()>;
    async fn mark_uploaded(&self, chunk_id: &str) -> Result<()>;
    /// Marks the chunk failed and increments its retry count.
    async fn mark_failed(&self, chunk_id: &str) -> Result<()>;
    async fn chunk_count(&self, session_id: &str) -> Result<usize>;
    async fn chunks(&self, session_id: &str) -> Result<Vec<ChunkRecord>>;
    async fn uploaded_chunks(&self, session_id: &str) -> Result<Vec<ChunkRecord>>;
    /// Failed chunks that still have retry budget left.
    async fn failed_chunks(&self, session_id: &str, max_retries: u32)
        -> Result<Vec<ChunkRecord>>;
    async fn all_chunks_uploaded(&self, session_id: &str) -> Result<bool>;
}
