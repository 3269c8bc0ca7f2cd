pub mod frame_stream;
pub mod monitor;

pub use frame_stream::FrameStream;
pub use monitor::DegradationPolicy;

use crate::audio::{
    AudioAnalyser, AudioChunk, AudioEncoder, AudioFrame, AudioQuality, RingBuffer, VoiceActivity,
};
use crate::chunker::Chunker;
use crate::store::{ChunkRecord, Store, UploadState};
use crate::upload::{ChunkUploader, UploadMetadata};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Everything the pipeline stages need for one session.
pub struct PipelineContext {
    pub session_id: String,
    pub folder_name: String,
    pub txn_ref: String,
    pub output_dir: PathBuf,
    pub sample_rate: u32,
    pub enable_analyser: bool,
    pub frame_channel_capacity: usize,
    pub chunk_channel_capacity: usize,
    pub analyser: Arc<dyn AudioAnalyser>,
    pub encoder: Arc<dyn AudioEncoder>,
    pub store: Arc<dyn Store>,
    pub uploader: Arc<ChunkUploader>,
}

/// The per-session processing pipeline: ring buffer, frame stream, chunking
/// stage and persist/upload stage, connected by bounded channels.
///
/// Shutdown runs strictly downstream: stop the frame stream (final drain,
/// sender dropped), let the chunk stage flush on channel closure, then wait
/// for the persist stage to finish the chunks already in flight. The
/// analyser is advisory and simply aborted.
pub struct ChunkPipeline {
    ring: Arc<RingBuffer>,
    frame_stream: FrameStream,
    chunk_task: JoinHandle<()>,
    persist_task: JoinHandle<()>,
    analyser_task: JoinHandle<()>,
    activity_rx: watch::Receiver<Option<VoiceActivity>>,
    quality_rx: watch::Receiver<Option<AudioQuality>>,
}

impl ChunkPipeline {
    pub fn spawn(ctx: PipelineContext, chunker: Chunker, ring: Arc<RingBuffer>) -> Self {
        let (frame_tx, frame_rx) = mpsc::channel::<AudioFrame>(ctx.frame_channel_capacity);
        let (chunk_tx, chunk_rx) = mpsc::channel::<AudioChunk>(ctx.chunk_channel_capacity);
        let (analyse_tx, analyse_rx) = mpsc::channel::<AudioFrame>(ctx.frame_channel_capacity);
        let (quality_tx, quality_rx) = watch::channel::<Option<AudioQuality>>(None);

        let activity_rx = chunker.activity();
        let frame_stream = FrameStream::spawn(ring.clone(), frame_tx);

        let analyser_task = Self::spawn_analyser(ctx.analyser.clone(), analyse_rx, quality_tx);
        let chunk_task = Self::spawn_chunk_stage(
            chunker,
            frame_rx,
            chunk_tx,
            analyse_tx,
            quality_rx.clone(),
            ctx.enable_analyser,
        );
        let persist_task = Self::spawn_persist_stage(
            chunk_rx,
            ctx.session_id.clone(),
            ctx.folder_name.clone(),
            ctx.txn_ref.clone(),
            ctx.output_dir.clone(),
            ctx.sample_rate,
            ctx.encoder.clone(),
            ctx.store.clone(),
            ctx.uploader.clone(),
        );

        Self {
            ring,
            frame_stream,
            chunk_task,
            persist_task,
            analyser_task,
            activity_rx,
            quality_rx,
        }
    }

    /// Per-frame voice activity, one datum per processed frame.
    pub fn voice_activity(&self) -> watch::Receiver<Option<VoiceActivity>> {
        self.activity_rx.clone()
    }

    /// Latest quality snapshot from the analyser side channel.
    pub fn audio_quality(&self) -> watch::Receiver<Option<AudioQuality>> {
        self.quality_rx.clone()
    }

    fn spawn_analyser(
        analyser: Arc<dyn AudioAnalyser>,
        mut rx: mpsc::Receiver<AudioFrame>,
        quality_tx: watch::Sender<Option<AudioQuality>>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                if let Some(quality) = analyser.analyse(&frame) {
                    quality_tx.send_replace(Some(quality));
                }
            }
        })
    }

    fn spawn_chunk_stage(
        mut chunker: Chunker,
        mut frame_rx: mpsc::Receiver<AudioFrame>,
        chunk_tx: mpsc::Sender<AudioChunk>,
        analyse_tx: mpsc::Sender<AudioFrame>,
        quality_rx: watch::Receiver<Option<AudioQuality>>,
        enable_analyser: bool,
    ) -> JoinHandle<()> {
        let policy = DegradationPolicy::default();
        tokio::spawn(async move {
            while let Some(frame) = frame_rx.recv().await {
                if enable_analyser
                    && !policy.should_skip_analysis(frame_rx.len(), frame_rx.max_capacity())
                {
                    // Advisory path: when the analyser channel is full the
                    // frame simply goes unanalysed.
                    let _ = analyse_tx.try_send(frame.clone());
                }

                let quality = *quality_rx.borrow();
                if let Some(chunk) = chunker.feed(frame, quality) {
                    if chunk_tx.send(chunk).await.is_err() {
                        return;
                    }
                }
            }
            // Frame channel closed: emit whatever is still accumulated.
            if let Some(chunk) = chunker.flush() {
                let _ = chunk_tx.send(chunk).await;
            }
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn spawn_persist_stage(
        mut chunk_rx: mpsc::Receiver<AudioChunk>,
        session_id: String,
        folder_name: String,
        txn_ref: String,
        output_dir: PathBuf,
        sample_rate: u32,
        encoder: Arc<dyn AudioEncoder>,
        store: Arc<dyn Store>,
        uploader: Arc<ChunkUploader>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(chunk) = chunk_rx.recv().await {
                let chunk_id = chunk.chunk_id.clone();
                if let Err(e) = Self::persist_and_upload(
                    chunk,
                    &session_id,
                    &folder_name,
                    &txn_ref,
                    &output_dir,
                    sample_rate,
                    encoder.as_ref(),
                    store.as_ref(),
                    uploader.as_ref(),
                )
                .await
                {
                    // One bad chunk must not take the stage down; the
                    // record stays Failed for the post-stop retry sweep.
                    error!("chunk {} failed to persist or upload: {}", chunk_id, e);
                }
            }
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn persist_and_upload(
        chunk: AudioChunk,
        session_id: &str,
        folder_name: &str,
        txn_ref: &str,
        output_dir: &std::path::Path,
        sample_rate: u32,
        encoder: &dyn AudioEncoder,
        store: &dyn Store,
        uploader: &ChunkUploader,
    ) -> crate::error::Result<()> {
        // File names are 1-based on the wire.
        let file_name = format!("{}.wav", chunk.index + 1);
        let file_path = output_dir.join(format!("{}_{}.wav", session_id, chunk.index + 1));

        let encoded = encoder.encode(&chunk.frames, sample_rate, &file_path)?;
        info!(
            "encoded chunk {} ({} bytes, {}ms)",
            chunk.chunk_id, encoded.size_bytes, encoded.duration_ms
        );

        store
            .save_chunk(ChunkRecord {
                chunk_id: chunk.chunk_id.clone(),
                session_id: session_id.to_string(),
                index: chunk.index,
                file_path: file_path.clone(),
                file_name: file_name.clone(),
                start_ms: chunk.start_ms,
                end_ms: chunk.end_ms,
                duration_ms: chunk.duration_ms(),
                upload_state: UploadState::Pending,
                retry_count: 0,
                created_at: Utc::now(),
            })
            .await?;

        store.mark_in_progress(&chunk.chunk_id).await?;

        let metadata = UploadMetadata {
            chunk_id: chunk.chunk_id.clone(),
            session_id: session_id.to_string(),
            index: chunk.index,
            file_name,
            folder_name: folder_name.to_string(),
            txn_ref: txn_ref.to_string(),
            mime_type: "audio/wav",
        };

        match uploader.upload(&file_path, &metadata).await {
            Ok(remote_id) => {
                store.mark_uploaded(&chunk.chunk_id).await?;
                if let Err(e) = std::fs::remove_file(&file_path) {
                    warn!(
                        "uploaded chunk file could not be removed ({}): {}",
                        file_path.display(),
                        e
                    );
                }
                info!("chunk {} uploaded as {}", chunk.chunk_id, remote_id);
                Ok(())
            }
            Err(err) => {
                // File stays on disk for the retry sweep.
                store.mark_failed(&chunk.chunk_id).await?;
                Err(upload_failure(err))
            }
        }
    }

    /// Drains and shuts the pipeline down in stage order, guaranteeing no
    /// accepted frame is silently lost.
    pub async fn stop(self) {
        self.frame_stream.stop_and_drain().await;
        let _ = self.chunk_task.await;
        let _ = self.persist_task.await;
        self.analyser_task.abort();
        self.ring.clear();
        info!("pipeline stopped and drained");
    }
}

/// Maps a final upload failure onto the error taxonomy: a retryable failure
/// that exhausted its in-loop budget is still transient, not permanent.
fn upload_failure(err: crate::upload::UploadError) -> crate::error::ScribeError {
    if err.retryable {
        crate::error::ScribeError::TransientNetwork(err.message)
    } else {
        crate::error::ScribeError::PermanentUpload(err.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScribeError;
    use crate::upload::UploadError;

    #[test]
    fn exhausted_retryable_failure_stays_transient() {
        let err = upload_failure(UploadError::retryable("connection reset"));
        assert!(matches!(err, ScribeError::TransientNetwork(_)));
    }

    #[test]
    fn permanent_failure_maps_to_permanent_upload() {
        let err = upload_failure(UploadError::permanent("file missing"));
        assert!(matches!(err, ScribeError::PermanentUpload(_)));
    }
}
