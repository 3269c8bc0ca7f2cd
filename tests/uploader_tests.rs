mod common;

use chrono::Utc;
use common::{MockApi, MockTransport};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use voicescribe::store::{ChunkRecord, MemoryStore, SessionRecord, Store, UploadState};
use voicescribe::upload::{ChunkUploader, CredentialCache, UploadMetadata};

async fn store_with_chunk(file_path: &Path) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store
        .save_session(SessionRecord::new("a-1".to_string()))
        .await
        .unwrap();
    store
        .save_chunk(ChunkRecord {
            chunk_id: "a-1_0".to_string(),
            session_id: "a-1".to_string(),
            index: 0,
            file_path: file_path.to_path_buf(),
            file_name: "1.wav".to_string(),
            start_ms: 0,
            end_ms: 10_000,
            duration_ms: 10_000,
            upload_state: UploadState::InProgress,
            retry_count: 0,
            created_at: Utc::now(),
        })
        .await
        .unwrap();
    store
}

fn metadata() -> UploadMetadata {
    UploadMetadata {
        chunk_id: "a-1_0".to_string(),
        session_id: "a-1".to_string(),
        index: 0,
        file_name: "1.wav".to_string(),
        folder_name: "260824".to_string(),
        txn_ref: "txn-1".to_string(),
        mime_type: "audio/wav",
    }
}

fn temp_chunk_file(dir: &tempfile::TempDir) -> PathBuf {
    let path = dir.path().join("a-1_1.wav");
    std::fs::write(&path, b"RIFF").unwrap();
    path
}

#[tokio::test]
async fn transient_failures_retry_within_budget_then_succeed() {
    let dir = tempfile::tempdir().unwrap();
    let file = temp_chunk_file(&dir);
    let store = store_with_chunk(&file).await;
    let transport = Arc::new(MockTransport::failing_first(2));
    let credentials = Arc::new(CredentialCache::new(Arc::new(MockApi::default())));
    let uploader = ChunkUploader::new(transport.clone(), credentials, store.clone(), 2);

    let remote = uploader.upload(&file, &metadata()).await.unwrap();

    assert_eq!(remote, "remote-a-1_0");
    assert_eq!(transport.call_count(), 3);
    let chunk = &store.chunks("a-1").await.unwrap()[0];
    assert_eq!(chunk.retry_count, 2);
    assert_eq!(
        transport.uploaded_keys(),
        vec!["260824/a-1/1.wav".to_string()]
    );
}

#[tokio::test]
async fn retry_budget_exhaustion_surfaces_the_error() {
    let dir = tempfile::tempdir().unwrap();
    let file = temp_chunk_file(&dir);
    let store = store_with_chunk(&file).await;
    let transport = Arc::new(MockTransport::failing_first(10));
    let credentials = Arc::new(CredentialCache::new(Arc::new(MockApi::default())));
    let uploader = ChunkUploader::new(transport.clone(), credentials, store, 2);

    let err = uploader.upload(&file, &metadata()).await.unwrap_err();

    assert!(err.retryable);
    // One initial attempt plus two retries.
    assert_eq!(transport.call_count(), 3);
}

#[tokio::test]
async fn missing_file_fails_permanently_without_a_transfer() {
    let store = Arc::new(MemoryStore::new());
    let transport = Arc::new(MockTransport::succeeding());
    let credentials = Arc::new(CredentialCache::new(Arc::new(MockApi::default())));
    let uploader = ChunkUploader::new(transport.clone(), credentials, store, 2);

    let err = uploader
        .upload(Path::new("/nonexistent/1.wav"), &metadata())
        .await
        .unwrap_err();

    assert!(!err.retryable);
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test]
async fn concurrent_upload_of_same_chunk_fails_fast() {
    let dir = tempfile::tempdir().unwrap();
    let file = temp_chunk_file(&dir);
    let store = store_with_chunk(&file).await;
    let transport =
        Arc::new(MockTransport::succeeding().with_delay(Duration::from_millis(100)));
    let credentials = Arc::new(CredentialCache::new(Arc::new(MockApi::default())));
    let uploader = Arc::new(ChunkUploader::new(
        transport.clone(),
        credentials,
        store,
        2,
    ));

    let first = {
        let uploader = uploader.clone();
        let file = file.clone();
        tokio::spawn(async move { uploader.upload(&file, &metadata()).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    let second = uploader.upload(&file, &metadata()).await;

    let second_err = second.unwrap_err();
    assert!(!second_err.retryable);
    assert!(second_err.message.contains("already uploading"));

    assert!(first.await.unwrap().is_ok());
    // The duplicate never reached the transport.
    assert_eq!(transport.call_count(), 1);
}

#[tokio::test]
async fn credentials_are_refreshed_between_attempts() {
    let dir = tempfile::tempdir().unwrap();
    let file = temp_chunk_file(&dir);
    let store = store_with_chunk(&file).await;
    let transport = Arc::new(MockTransport::failing_first(1));
    let api = Arc::new(MockApi::default());
    let credentials = Arc::new(CredentialCache::new(api.clone()));
    let uploader = ChunkUploader::new(transport, credentials, store, 2);

    uploader.upload(&file, &metadata()).await.unwrap();

    // One fetch for the first attempt, one forced refresh for the retry.
    assert_eq!(MockApi::count(&api.credential_calls), 2);
}

#[tokio::test]
async fn chunk_can_be_uploaded_again_after_completion() {
    let dir = tempfile::tempdir().unwrap();
    let file = temp_chunk_file(&dir);
    let store = store_with_chunk(&file).await;
    let transport = Arc::new(MockTransport::succeeding());
    let credentials = Arc::new(CredentialCache::new(Arc::new(MockApi::default())));
    let uploader = ChunkUploader::new(transport.clone(), credentials, store, 2);

    uploader.upload(&file, &metadata()).await.unwrap();
    uploader.upload(&file, &metadata()).await.unwrap();

    // Sequential uploads are not duplicates; only concurrent ones are.
    assert_eq!(transport.call_count(), 2);
}
