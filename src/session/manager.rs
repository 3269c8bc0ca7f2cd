use super::{SessionConfig, SessionEvent, SessionResult, SessionState};
use crate::audio::{
    AudioAnalyser, AudioEncoder, AudioQuality, AudioSource, AudioFrame, EnergyVad, RingBuffer,
    RmsAnalyser, VoiceActivity, VoiceActivityDetector, WavEncoder,
};
use crate::backend::BackendApi;
use crate::chunker::Chunker;
use crate::config::ScribeConfig;
use crate::error::{Result, ScribeError};
use crate::pipeline::{ChunkPipeline, PipelineContext};
use crate::store::{SessionRecord, Store};
use crate::transaction::{PollSettings, TransactionManager, TransactionOutcome};
use crate::upload::{ChunkUploader, CredentialCache, ObjectTransport};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

const DESTROY_TIMEOUT: Duration = Duration::from_secs(10);

struct ActiveSession {
    session_id: String,
    pipeline: ChunkPipeline,
    forward_tasks: Vec<JoinHandle<()>>,
}

/// Owns the session lifecycle: wires the capture source into a per-session
/// pipeline, enforces the state machine, and hands the finished session to
/// the transaction manager.
///
/// One session at a time; the state machine rejects a second `start` until
/// the current session has returned to `Idle`.
pub struct SessionManager {
    config: ScribeConfig,
    store: Arc<dyn Store>,
    transaction: Arc<TransactionManager>,
    uploader: Arc<ChunkUploader>,
    encoder: Arc<dyn AudioEncoder>,
    analyser: Arc<dyn AudioAnalyser>,
    vad: Arc<dyn VoiceActivityDetector>,
    source: Mutex<Box<dyn AudioSource>>,
    state_tx: Arc<watch::Sender<SessionState>>,
    activity_tx: Arc<watch::Sender<Option<VoiceActivity>>>,
    quality_tx: Arc<watch::Sender<Option<AudioQuality>>>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<SessionEvent>>>,
    active: Mutex<Option<ActiveSession>>,
}

impl SessionManager {
    pub fn new(
        config: ScribeConfig,
        source: Box<dyn AudioSource>,
        api: Arc<dyn BackendApi>,
        transport: Arc<dyn ObjectTransport>,
        store: Arc<dyn Store>,
    ) -> Self {
        let credentials = Arc::new(CredentialCache::new(api.clone()));
        let uploader = Arc::new(ChunkUploader::new(
            transport,
            credentials,
            store.clone(),
            config.max_upload_retries,
        ));
        let transaction = Arc::new(TransactionManager::new(
            api,
            store.clone(),
            uploader.clone(),
            config.bucket_name.clone(),
            config.max_upload_retries,
            PollSettings {
                max_attempts: config.poll_max_attempts,
                delay: Duration::from_millis(config.poll_delay_ms),
            },
        ));

        let (state_tx, _) = watch::channel(SessionState::Idle);
        let (activity_tx, _) = watch::channel(None);
        let (quality_tx, _) = watch::channel(None);
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Self {
            config,
            store,
            transaction,
            uploader,
            encoder: Arc::new(WavEncoder),
            analyser: Arc::new(RmsAnalyser::default()),
            vad: Arc::new(EnergyVad::default()),
            source: Mutex::new(source),
            state_tx: Arc::new(state_tx),
            activity_tx: Arc::new(activity_tx),
            quality_tx: Arc::new(quality_tx),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            active: Mutex::new(None),
        }
    }

    pub fn with_vad(mut self, vad: Arc<dyn VoiceActivityDetector>) -> Self {
        self.vad = vad;
        self
    }

    pub fn with_analyser(mut self, analyser: Arc<dyn AudioAnalyser>) -> Self {
        self.analyser = analyser;
        self
    }

    pub fn with_encoder(mut self, encoder: Arc<dyn AudioEncoder>) -> Self {
        self.encoder = encoder;
        self
    }

    /// Current lifecycle state; changes are observable through the receiver.
    pub fn state(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Voice activity stream, stable across sessions.
    pub fn voice_activity(&self) -> watch::Receiver<Option<VoiceActivity>> {
        self.activity_tx.subscribe()
    }

    /// Quality snapshot stream, stable across sessions.
    pub fn audio_quality(&self) -> watch::Receiver<Option<AudioQuality>> {
        self.quality_tx.subscribe()
    }

    /// The session event stream. Can be taken once.
    pub async fn take_events(&self) -> Option<mpsc::UnboundedReceiver<SessionEvent>> {
        self.events_rx.lock().await.take()
    }

    /// Starts a new recording session, returning its id once audio is
    /// flowing. Fails if a session is already underway.
    pub async fn start(&self, session_config: SessionConfig) -> Result<String> {
        self.transition(SessionState::Starting)?;
        let session_id = format!("a-{}", Uuid::new_v4());

        match self.start_inner(&session_id, session_config).await {
            Ok(()) => {
                self.emit(SessionEvent::Started {
                    session_id: session_id.clone(),
                });
                info!("session {} recording", session_id);
                Ok(session_id)
            }
            Err(e) => {
                self.fail(&session_id, &e.to_string()).await;
                Err(e)
            }
        }
    }

    async fn start_inner(&self, session_id: &str, session_config: SessionConfig) -> Result<()> {
        self.store
            .save_session(SessionRecord::new(session_id.to_string()))
            .await?;

        let init = self
            .transaction
            .init_transaction(session_id, &session_config)
            .await?;

        let ring = Arc::new(RingBuffer::new(self.config.pre_buffer_capacity));
        let chunker = Chunker::new(
            self.vad.clone(),
            self.config.chunking.clone(),
            session_id.to_string(),
        );
        let pipeline = ChunkPipeline::spawn(
            PipelineContext {
                session_id: session_id.to_string(),
                folder_name: init.folder_name,
                txn_ref: init.txn_ref,
                output_dir: self.config.output_dir.clone(),
                sample_rate: self.config.sample_rate,
                enable_analyser: self.config.enable_analyser,
                frame_channel_capacity: self.config.frame_channel_capacity,
                chunk_channel_capacity: self.config.chunk_channel_capacity,
                analyser: self.analyser.clone(),
                encoder: self.encoder.clone(),
                store: self.store.clone(),
                uploader: self.uploader.clone(),
            },
            chunker,
            ring.clone(),
        );

        let forward_tasks = vec![
            forward_watch(pipeline.voice_activity(), self.activity_tx.clone()),
            forward_watch(pipeline.audio_quality(), self.quality_tx.clone()),
        ];

        // Any failure past this point must tear the spawned tasks down
        // again, or they would poll the ring for the process lifetime.
        if let Err(e) = self.begin_recording(session_id, ring).await {
            if let Err(stop_err) = self.source.lock().await.stop() {
                warn!("audio source stop after failed start: {}", stop_err);
            }
            for task in forward_tasks {
                task.abort();
            }
            pipeline.stop().await;
            return Err(e);
        }

        *self.active.lock().await = Some(ActiveSession {
            session_id: session_id.to_string(),
            pipeline,
            forward_tasks,
        });
        Ok(())
    }

    async fn begin_recording(&self, session_id: &str, ring: Arc<RingBuffer>) -> Result<()> {
        self.source.lock().await.start(frame_sink(ring))?;
        self.store
            .update_session_state(session_id, SessionState::Recording)
            .await?;
        self.transition(SessionState::Recording)
    }

    /// Pauses frame production. The pipeline keeps draining what is already
    /// buffered.
    pub async fn pause(&self) -> Result<()> {
        self.require_state(SessionState::Recording, SessionState::Paused)?;
        self.source.lock().await.pause()?;
        self.transition(SessionState::Paused)?;

        if let Some(active) = self.active.lock().await.as_ref() {
            self.persist_state(&active.session_id, SessionState::Paused)
                .await;
            self.emit(SessionEvent::Paused {
                session_id: active.session_id.clone(),
            });
        }
        Ok(())
    }

    pub async fn resume(&self) -> Result<()> {
        self.require_state(SessionState::Paused, SessionState::Recording)?;
        self.source.lock().await.resume()?;
        self.transition(SessionState::Recording)?;

        if let Some(active) = self.active.lock().await.as_ref() {
            self.persist_state(&active.session_id, SessionState::Recording)
                .await;
            self.emit(SessionEvent::Resumed {
                session_id: active.session_id.clone(),
            });
        }
        Ok(())
    }

    /// Stops recording, drains the pipeline, and drives the backend
    /// transaction to its result.
    ///
    /// Returns the transcription result, or `None` when the backend was
    /// still analyzing after the polling budget; the session then completes
    /// locally and [`retry_session`](Self::retry_session) picks it up later.
    pub async fn stop(&self) -> Result<Option<SessionResult>> {
        self.transition(SessionState::Stopping)?;

        let active = self.active.lock().await.take().ok_or_else(|| {
            ScribeError::SessionNotFound("no active session".to_string())
        })?;
        let session_id = active.session_id;

        if let Err(e) = self.source.lock().await.stop() {
            warn!("audio source stop failed: {}", e);
        }
        active.pipeline.stop().await;
        for task in active.forward_tasks {
            task.abort();
        }

        let chunk_count = self.store.chunk_count(&session_id).await.unwrap_or(0);
        self.emit(SessionEvent::Stopped {
            session_id: session_id.clone(),
            chunk_count,
        });

        self.transition(SessionState::Processing)?;
        self.persist_state(&session_id, SessionState::Processing).await;

        match self
            .transaction
            .check_and_progress(&session_id, None, false)
            .await
        {
            Ok(TransactionOutcome::Completed(result)) => {
                self.complete(&session_id).await?;
                self.emit(SessionEvent::Completed {
                    result: result.clone(),
                });
                Ok(Some(result))
            }
            Ok(TransactionOutcome::PollTimeout) => {
                // Uploads and commit went through; only the result is late.
                warn!("session {} result not ready yet", session_id);
                self.complete(&session_id).await?;
                Ok(None)
            }
            Ok(TransactionOutcome::AlreadyTerminal) => {
                self.complete(&session_id).await?;
                Ok(None)
            }
            Err(e) => {
                self.fail(&session_id, &e.to_string()).await;
                Err(e)
            }
        }
    }

    /// Re-drives a stalled transaction from its persisted stage. `force`
    /// proceeds past chunks that exhausted their upload retries.
    pub async fn retry_session(
        &self,
        session_id: &str,
        force: bool,
    ) -> Result<Option<SessionResult>> {
        match self
            .transaction
            .check_and_progress(session_id, None, force)
            .await?
        {
            TransactionOutcome::Completed(result) => {
                self.emit(SessionEvent::Completed {
                    result: result.clone(),
                });
                Ok(Some(result))
            }
            TransactionOutcome::PollTimeout => Ok(None),
            TransactionOutcome::AlreadyTerminal => Ok(None),
        }
    }

    /// Returns a finished session to `Idle` so a new one can start.
    pub fn reset(&self) -> Result<()> {
        self.transition(SessionState::Idle)?;
        Ok(())
    }

    /// Tears the manager down regardless of state. Bypasses the state
    /// machine; the escape hatch for host shutdown.
    pub async fn destroy(&self) {
        if let Some(active) = self.active.lock().await.take() {
            if let Err(e) = self.source.lock().await.stop() {
                warn!("audio source stop failed during destroy: {}", e);
            }
            if tokio::time::timeout(DESTROY_TIMEOUT, active.pipeline.stop())
                .await
                .is_err()
            {
                error!("pipeline did not drain within {:?}", DESTROY_TIMEOUT);
            }
            for task in active.forward_tasks {
                task.abort();
            }
        }
        self.state_tx.send_replace(SessionState::Idle);
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events_tx.send(event);
    }

    /// Guarded state change. The watch value is updated only when the
    /// transition is legal; otherwise the state is untouched and the caller
    /// gets the offending pair back.
    fn transition(&self, to: SessionState) -> Result<()> {
        let mut outcome = Ok(());
        self.state_tx.send_modify(|state| {
            if state.can_transition_to(to) {
                *state = to;
            } else {
                outcome = Err(ScribeError::InvalidStateTransition { from: *state, to });
            }
        });
        outcome
    }

    fn require_state(&self, expected: SessionState, to: SessionState) -> Result<()> {
        let current = *self.state_tx.borrow();
        if current != expected {
            return Err(ScribeError::InvalidStateTransition { from: current, to });
        }
        Ok(())
    }

    async fn persist_state(&self, session_id: &str, state: SessionState) {
        if let Err(e) = self.store.update_session_state(session_id, state).await {
            warn!("failed to persist state {:?} for {}: {}", state, session_id, e);
        }
    }

    async fn complete(&self, session_id: &str) -> Result<()> {
        self.transition(SessionState::Completed)?;
        self.persist_state(session_id, SessionState::Completed).await;
        Ok(())
    }

    async fn fail(&self, session_id: &str, message: &str) {
        error!("session {} failed: {}", session_id, message);
        self.state_tx.send_replace(SessionState::Error);
        self.persist_state(session_id, SessionState::Error).await;
        self.emit(SessionEvent::Failed {
            session_id: session_id.to_string(),
            message: message.to_string(),
        });
    }
}

/// Capture-thread callback: a non-blocking write into the ring buffer, with
/// a throttled warning when frames start dropping.
fn frame_sink(ring: Arc<RingBuffer>) -> Box<dyn FnMut(AudioFrame) + Send> {
    let mut dropped_since_warn = 0u64;
    Box::new(move |frame| {
        if !ring.write(frame) {
            dropped_since_warn += 1;
            if dropped_since_warn == 1 || dropped_since_warn % 100 == 0 {
                warn!(
                    "capture overflow: {} frames dropped (total {})",
                    dropped_since_warn,
                    ring.dropped()
                );
            }
        } else {
            dropped_since_warn = 0;
        }
    })
}

fn forward_watch<T>(mut rx: watch::Receiver<T>, tx: Arc<watch::Sender<T>>) -> JoinHandle<()>
where
    T: Copy + Send + Sync + 'static,
{
    tokio::spawn(async move {
        tx.send_replace(*rx.borrow());
        while rx.changed().await.is_ok() {
            let value = *rx.borrow();
            tx.send_replace(value);
        }
    })
}
