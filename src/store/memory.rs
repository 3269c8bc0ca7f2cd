use super::{ChunkRecord, SessionRecord, Store, UploadStage, UploadState};
use crate::error::{Result, ScribeError};
use crate::session::SessionState;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// In-memory store. The default backing for tests and for hosts that manage
/// durability themselves.
#[derive(Default)]
pub struct MemoryStore {
    sessions: RwLock<HashMap<String, SessionRecord>>,
    chunks: RwLock<HashMap<String, ChunkRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn with_session<F>(&self, session_id: &str, f: F) -> Result<()>
    where
        F: FnOnce(&mut SessionRecord),
    {
        let mut sessions = self.sessions.write().await;
        let record = sessions
            .get_mut(session_id)
            .ok_or_else(|| ScribeError::SessionNotFound(session_id.to_string()))?;
        f(record);
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn with_chunk<F>(&self, chunk_id: &str, f: F) -> Result<()>
    where
        F: FnOnce(&mut ChunkRecord),
    {
        let mut chunks = self.chunks.write().await;
        let record = chunks
            .get_mut(chunk_id)
            .ok_or_else(|| ScribeError::ChunkNotFound(chunk_id.to_string()))?;
        f(record);
        Ok(())
    }

    async fn session_chunks(&self, session_id: &str) -> Vec<ChunkRecord> {
        let mut records: Vec<ChunkRecord> = self
            .chunks
            .read()
            .await
            .values()
            .filter(|c| c.session_id == session_id)
            .cloned()
            .collect();
        records.sort_by_key(|c| c.index);
        records
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn save_session(&self, session: SessionRecord) -> Result<()> {
        self.sessions
            .write()
            .await
            .insert(session.session_id.clone(), session);
        Ok(())
    }

    async fn session(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        Ok(self.sessions.read().await.get(session_id).cloned())
    }

    async fn update_session_state(&self, session_id: &str, state: SessionState) -> Result<()> {
        self.with_session(session_id, |s| s.state = state).await
    }

    async fn update_upload_stage(&self, session_id: &str, stage: UploadStage) -> Result<()> {
        self.with_session(session_id, |s| s.upload_stage = stage)
            .await
    }

    async fn update_session_metadata(
        &self,
        session_id: &str,
        metadata_json: String,
    ) -> Result<()> {
        self.with_session(session_id, |s| s.metadata_json = Some(metadata_json))
            .await
    }

    async fn update_remote_refs(
        &self,
        session_id: &str,
        folder_name: String,
        txn_ref: String,
    ) -> Result<()> {
        self.with_session(session_id, |s| {
            s.folder_name = Some(folder_name);
            s.remote_txn_ref = Some(txn_ref);
        })
        .await
    }

    async fn sessions_by_stage(&self, stage: UploadStage) -> Result<Vec<SessionRecord>> {
        let mut records: Vec<SessionRecord> = self
            .sessions
            .read()
            .await
            .values()
            .filter(|s| s.upload_stage == stage)
            .cloned()
            .collect();
        records.sort_by_key(|s| s.created_at);
        Ok(records)
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        self.sessions.write().await.remove(session_id);
        self.chunks
            .write()
            .await
            .retain(|_, c| c.session_id != session_id);
        Ok(())
    }

    async fn save_chunk(&self, chunk: ChunkRecord) -> Result<()> {
        let session_id = chunk.session_id.clone();
        self.chunks
            .write()
            .await
            .insert(chunk.chunk_id.clone(), chunk);
        let count = self.session_chunks(&session_id).await.len();
        self.with_session(&session_id, |s| s.chunk_count = count)
            .await
    }

    async fn mark_in_progress(&self, chunk_id: &str) -> Result<()> {
        self.with_chunk(chunk_id, |c| c.upload_state = UploadState::InProgress)
            .await
    }

    async fn mark_uploaded(&self, chunk_id: &str) -> Result<()> {
        self.with_chunk(chunk_id, |c| c.upload_state = UploadState::Success)
            .await
    }

    async fn mark_failed(&self, chunk_id: &str) -> Result<()> {
        self.with_chunk(chunk_id, |c| {
            c.upload_state = UploadState::Failed;
            c.retry_count += 1;
        })
        .await
    }

    async fn chunk_count(&self, session_id: &str) -> Result<usize> {
        Ok(self.session_chunks(session_id).await.len())
    }

    async fn chunks(&self, session_id: &str) -> Result<Vec<ChunkRecord>> {
        Ok(self.session_chunks(session_id).await)
    }

    async fn uploaded_chunks(&self, session_id: &str) -> Result<Vec<ChunkRecord>> {
        Ok(self
            .session_chunks(session_id)
            .await
            .into_iter()
            .filter(|c| c.upload_state == UploadState::Success)
            .collect())
    }

    async fn failed_chunks(
        &self,
        session_id: &str,
        max_retries: u32,
    ) -> Result<Vec<ChunkRecord>> {
        Ok(self
            .session_chunks(session_id)
            .await
            .into_iter()
            .filter(|c| c.upload_state == UploadState::Failed && c.retry_count <= max_retries)
            .collect())
    }

    async fn all_chunks_uploaded(&self, session_id: &str) -> Result<bool> {
        Ok(self
            .session_chunks(session_id)
            .await
            .iter()
            .all(|c| c.upload_state == UploadState::Success))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn chunk(session_id: &str, index: usize) -> ChunkRecord {
        ChunkRecord {
            chunk_id: format!("{session_id}_{index}"),
            session_id: session_id.to_string(),
            index,
            file_path: PathBuf::from(format!("{session_id}_{}.wav", index + 1)),
            file_name: format!("{}.wav", index + 1),
            start_ms: index as u64 * 10_000,
            end_ms: (index as u64 + 1) * 10_000,
            duration_ms: 10_000,
            upload_state: UploadState::Pending,
            retry_count: 0,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn saving_chunks_updates_session_count() {
        let store = MemoryStore::new();
        store
            .save_session(SessionRecord::new("a-1".to_string()))
            .await
            .unwrap();
        store.save_chunk(chunk("a-1", 0)).await.unwrap();
        store.save_chunk(chunk("a-1", 1)).await.unwrap();

        let session = store.session("a-1").await.unwrap().unwrap();
        assert_eq!(session.chunk_count, 2);
        assert_eq!(store.chunk_count("a-1").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn mark_failed_increments_retry_count() {
        let store = MemoryStore::new();
        store
            .save_session(SessionRecord::new("a-1".to_string()))
            .await
            .unwrap();
        store.save_chunk(chunk("a-1", 0)).await.unwrap();

        store.mark_failed("a-1_0").await.unwrap();
        store.mark_in_progress("a-1_0").await.unwrap();
        store.mark_failed("a-1_0").await.unwrap();

        let chunks = store.chunks("a-1").await.unwrap();
        assert_eq!(chunks[0].retry_count, 2);
        assert_eq!(chunks[0].upload_state, UploadState::Failed);
    }

    #[tokio::test]
    async fn failed_chunks_respects_retry_budget() {
        let store = MemoryStore::new();
        store
            .save_session(SessionRecord::new("a-1".to_string()))
            .await
            .unwrap();
        store.save_chunk(chunk("a-1", 0)).await.unwrap();
        store.save_chunk(chunk("a-1", 1)).await.unwrap();

        store.mark_failed("a-1_0").await.unwrap();
        for _ in 0..4 {
            store.mark_failed("a-1_1").await.unwrap();
        }

        let retryable = store.failed_chunks("a-1", 2).await.unwrap();
        assert_eq!(retryable.len(), 1);
        assert_eq!(retryable[0].chunk_id, "a-1_0");
    }

    #[tokio::test]
    async fn all_chunks_uploaded_only_when_every_chunk_succeeded() {
        let store = MemoryStore::new();
        store
            .save_session(SessionRecord::new("a-1".to_string()))
            .await
            .unwrap();
        store.save_chunk(chunk("a-1", 0)).await.unwrap();
        store.save_chunk(chunk("a-1", 1)).await.unwrap();

        store.mark_uploaded("a-1_0").await.unwrap();
        assert!(!store.all_chunks_uploaded("a-1").await.unwrap());
        store.mark_uploaded("a-1_1").await.unwrap();
        assert!(store.all_chunks_uploaded("a-1").await.unwrap());
        assert_eq!(store.uploaded_chunks("a-1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn updating_unknown_chunk_is_an_error() {
        let store = MemoryStore::new();
        let err = store.mark_uploaded("missing").await.unwrap_err();
        assert!(matches!(err, ScribeError::ChunkNotFound(_)));
    }

    #[tokio::test]
    async fn delete_session_removes_its_chunks() {
        let store = MemoryStore::new();
        store
            .save_session(SessionRecord::new("a-1".to_string()))
            .await
            .unwrap();
        store.save_chunk(chunk("a-1", 0)).await.unwrap();

        store.delete_session("a-1").await.unwrap();
        assert!(store.session("a-1").await.unwrap().is_none());
        assert!(store.chunks("a-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sessions_by_stage_filters_on_stage() {
        let store = MemoryStore::new();
        store
            .save_session(SessionRecord::new("a-1".to_string()))
            .await
            .unwrap();
        store
            .save_session(SessionRecord::new("a-2".to_string()))
            .await
            .unwrap();
        store
            .update_upload_stage("a-2", UploadStage::Stop)
            .await
            .unwrap();

        let stuck = store.sessions_by_stage(UploadStage::Stop).await.unwrap();
        assert_eq!(stuck.len(), 1);
        assert_eq!(stuck[0].session_id, "a-2");
    }
}
