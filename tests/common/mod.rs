#![allow(dead_code)]

use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use voicescribe::audio::{AudioFrame, AudioSource, FrameSink};
use voicescribe::backend::{
    ApiError, BackendApi, CredentialsResponse, InitTransactionRequest, InitTransactionResponse,
    PollResponse, ResultData, ResultStatus, StopTransactionRequest, StopTransactionResponse,
    TemplateOutput, TransactionResultResponse,
};
use voicescribe::error::Result;
use voicescribe::upload::{Credentials, ObjectTransport, UploadError, UploadMetadata};

/// Best-effort tracing for test debugging; safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_test_writer()
        .try_init();
}

/// Object transport with scripted failures and call accounting.
pub struct MockTransport {
    /// The first N puts fail with a retryable error.
    pub fail_first: u32,
    /// Every put fails permanently.
    pub permanent: bool,
    /// Simulated transfer time.
    pub delay: Duration,
    pub calls: AtomicU32,
    pub keys: Mutex<Vec<String>>,
}

impl MockTransport {
    pub fn succeeding() -> Self {
        Self {
            fail_first: 0,
            permanent: false,
            delay: Duration::ZERO,
            calls: AtomicU32::new(0),
            keys: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_first(n: u32) -> Self {
        Self {
            fail_first: n,
            ..Self::succeeding()
        }
    }

    pub fn always_permanent() -> Self {
        Self {
            permanent: true,
            ..Self::succeeding()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn uploaded_keys(&self) -> Vec<String> {
        self.keys.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectTransport for MockTransport {
    async fn put(
        &self,
        _file: &Path,
        key: &str,
        _credentials: &Credentials,
        metadata: &UploadMetadata,
    ) -> std::result::Result<String, UploadError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.permanent {
            return Err(UploadError::permanent("bucket rejected the object"));
        }
        if call < self.fail_first {
            return Err(UploadError::retryable("connection reset"));
        }
        self.keys.lock().unwrap().push(key.to_string());
        Ok(format!("remote-{}", metadata.chunk_id))
    }
}

/// Backend with per-endpoint call counters and a scriptable result poll.
pub struct MockApi {
    pub init_calls: AtomicU32,
    pub stop_calls: AtomicU32,
    pub commit_calls: AtomicU32,
    pub poll_calls: AtomicU32,
    pub credential_calls: AtomicU32,
    /// Reject the init call outright.
    pub fail_init: bool,
    /// Polls answered with "still processing" before the result is ready.
    pub processing_responses: u32,
    pub result_status: ResultStatus,
}

impl Default for MockApi {
    fn default() -> Self {
        Self {
            init_calls: AtomicU32::new(0),
            stop_calls: AtomicU32::new(0),
            commit_calls: AtomicU32::new(0),
            poll_calls: AtomicU32::new(0),
            credential_calls: AtomicU32::new(0),
            fail_init: false,
            processing_responses: 0,
            result_status: ResultStatus::Success,
        }
    }
}

impl MockApi {
    pub fn count(counter: &AtomicU32) -> u32 {
        counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BackendApi for MockApi {
    async fn init_transaction(
        &self,
        _session_id: &str,
        _request: &InitTransactionRequest,
    ) -> std::result::Result<InitTransactionResponse, ApiError> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_init {
            return Err(ApiError::Rejected("invalid speciality".to_string()));
        }
        Ok(InitTransactionResponse {
            txn_ref: Some("txn-1".to_string()),
            txn_id: Some("txn-1".to_string()),
            message: None,
            status: Some("ok".to_string()),
            error: None,
        })
    }

    async fn stop_transaction(
        &self,
        _session_id: &str,
        _request: &StopTransactionRequest,
    ) -> std::result::Result<StopTransactionResponse, ApiError> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        Ok(StopTransactionResponse {
            message: None,
            status: Some("ok".to_string()),
        })
    }

    async fn commit_transaction(
        &self,
        _session_id: &str,
        _request: &StopTransactionRequest,
    ) -> std::result::Result<StopTransactionResponse, ApiError> {
        self.commit_calls.fetch_add(1, Ordering::SeqCst);
        Ok(StopTransactionResponse {
            message: None,
            status: Some("ok".to_string()),
        })
    }

    async fn transaction_result(
        &self,
        _session_id: &str,
    ) -> std::result::Result<PollResponse, ApiError> {
        let call = self.poll_calls.fetch_add(1, Ordering::SeqCst);
        if call < self.processing_responses {
            return Ok(PollResponse::Processing);
        }
        Ok(PollResponse::Ready(TransactionResultResponse {
            data: Some(ResultData {
                output: Some(vec![TemplateOutput {
                    name: Some("clinical-note".to_string()),
                    template_id: Some("tpl-1".to_string()),
                    status: Some(self.result_status),
                    output_type: Some("text".to_string()),
                    value: Some("Patient presented with...".to_string()),
                }]),
            }),
        }))
    }

    async fn fetch_credentials(
        &self,
    ) -> std::result::Result<CredentialsResponse, ApiError> {
        self.credential_calls.fetch_add(1, Ordering::SeqCst);
        Ok(CredentialsResponse {
            access_key_id: "AK".to_string(),
            secret_key: "SK".to_string(),
            session_token: "ST".to_string(),
        })
    }
}

/// Audio source that delivers a fixed frame script synchronously on start.
pub struct ScriptedSource {
    frames: Vec<AudioFrame>,
}

impl ScriptedSource {
    pub fn new(frames: Vec<AudioFrame>) -> Self {
        Self { frames }
    }
}

impl AudioSource for ScriptedSource {
    fn start(&mut self, mut sink: FrameSink) -> Result<()> {
        for frame in std::mem::take(&mut self.frames) {
            sink(frame);
        }
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Audio source whose start always fails, as when the microphone is busy.
pub struct FailingSource;

impl AudioSource for FailingSource {
    fn start(&mut self, _sink: FrameSink) -> Result<()> {
        Err(voicescribe::ScribeError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "microphone unavailable",
        )))
    }

    fn pause(&mut self) -> Result<()> {
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        Ok(())
    }
}

/// 100ms speech frame, loud enough for the default energy gate.
pub fn speech_frame(index: u64) -> AudioFrame {
    AudioFrame {
        samples: vec![4000; 1600],
        captured_at_ms: index * 100,
        sample_rate: 16_000,
        sequence: index,
    }
}

/// 100ms silent frame.
pub fn silence_frame(index: u64) -> AudioFrame {
    AudioFrame {
        samples: vec![0; 1600],
        captured_at_ms: index * 100,
        sample_rate: 16_000,
        sequence: index,
    }
}

/// A speech run followed by a trailing pause, timestamps contiguous.
pub fn speech_then_silence(speech: u64, silence: u64) -> Vec<AudioFrame> {
    (0..speech)
        .map(speech_frame)
        .chain((speech..speech + silence).map(silence_frame))
        .collect()
}
