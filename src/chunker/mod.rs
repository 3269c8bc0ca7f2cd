use crate::audio::{chunk_id, AudioChunk, AudioFrame, AudioQuality, VoiceActivity, VoiceActivityDetector};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

/// Cut thresholds for the VAD-driven chunking policy.
///
/// The three rules are evaluated in order and OR-ed: a chunk is cut as soon
/// as any rule is satisfied.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChunkPolicy {
    /// Rule 1: natural break once speech exceeds this and silence exceeds
    /// `min_silence_to_chunk_ms`.
    pub preferred_duration_ms: u64,
    pub min_silence_to_chunk_ms: u64,
    /// Rule 2: forced break despite insufficient silence.
    pub desperation_duration_ms: u64,
    pub desperation_silence_ms: u64,
    /// Rule 3: hard cut regardless of silence.
    pub max_duration_ms: u64,
}

impl Default for ChunkPolicy {
    fn default() -> Self {
        Self {
            preferred_duration_ms: 10_000,
            min_silence_to_chunk_ms: 500,
            desperation_duration_ms: 20_000,
            desperation_silence_ms: 100,
            max_duration_ms: 25_000,
        }
    }
}

/// Accumulates frames for one session and cuts speech-bounded chunks.
///
/// Owns only the duration bookkeeping and the cut decision; speech/silence
/// classification is delegated to the injected detector, and the quality
/// snapshot is supplied externally by the analyser stage.
pub struct Chunker {
    vad: Arc<dyn VoiceActivityDetector>,
    policy: ChunkPolicy,
    session_id: String,
    frames: Vec<AudioFrame>,
    qualities: Vec<AudioQuality>,
    chunk_index: usize,
    chunk_start_ms: u64,
    speech_ms: u64,
    silence_ms: u64,
    activity_tx: watch::Sender<Option<VoiceActivity>>,
}

impl Chunker {
    pub fn new(
        vad: Arc<dyn VoiceActivityDetector>,
        policy: ChunkPolicy,
        session_id: String,
    ) -> Self {
        let (activity_tx, _) = watch::channel(None);
        Self {
            vad,
            policy,
            session_id,
            frames: Vec::new(),
            qualities: Vec::new(),
            chunk_index: 0,
            chunk_start_ms: 0,
            speech_ms: 0,
            silence_ms: 0,
            activity_tx,
        }
    }

    /// Latest voice-activity datum, one entry per fed frame.
    pub fn activity(&self) -> watch::Receiver<Option<VoiceActivity>> {
        self.activity_tx.subscribe()
    }

    /// Classifies the frame, updates the duration counters and returns a
    /// chunk when a cut condition fires.
    pub fn feed(
        &mut self,
        frame: AudioFrame,
        quality: Option<AudioQuality>,
    ) -> Option<AudioChunk> {
        let is_speech = self.vad.is_speech(&frame);
        self.activity_tx.send_replace(Some(VoiceActivity {
            is_speech,
            amplitude: frame.rms_amplitude(),
            timestamp_ms: frame.captured_at_ms,
        }));

        if self.frames.is_empty() {
            self.chunk_start_ms = frame.captured_at_ms;
        }
        if let Some(quality) = quality {
            self.qualities.push(quality);
        }

        let frame_ms = frame.duration_ms();
        if is_speech {
            self.speech_ms += frame_ms;
            self.silence_ms = 0;
        } else {
            self.silence_ms += frame_ms;
        }

        let end_ms = frame.captured_at_ms + frame_ms;
        self.frames.push(frame);

        if self.should_cut() {
            Some(self.cut(end_ms))
        } else {
            None
        }
    }

    /// Emits whatever remains; called when the frame channel closes.
    pub fn flush(&mut self) -> Option<AudioChunk> {
        let last = self.frames.last()?;
        let end_ms = last.captured_at_ms + last.duration_ms();
        Some(self.cut(end_ms))
    }

    fn should_cut(&self) -> bool {
        let p = &self.policy;
        if self.speech_ms > p.preferred_duration_ms
            && self.silence_ms > p.min_silence_to_chunk_ms
        {
            return true;
        }
        if self.speech_ms > p.desperation_duration_ms
            && self.silence_ms > p.desperation_silence_ms
        {
            return true;
        }
        if self.speech_ms >= p.max_duration_ms {
            return true;
        }
        false
    }

    fn cut(&mut self, end_ms: u64) -> AudioChunk {
        let chunk = AudioChunk {
            chunk_id: chunk_id(&self.session_id, self.chunk_index),
            session_id: self.session_id.clone(),
            index: self.chunk_index,
            frames: std::mem::take(&mut self.frames),
            start_ms: self.chunk_start_ms,
            end_ms,
            quality: self.average_quality(),
        };

        debug!(
            "chunk #{} cut: {}ms, {} frames",
            self.chunk_index,
            chunk.duration_ms(),
            chunk.frames.len()
        );

        self.chunk_index += 1;
        self.qualities.clear();
        self.speech_ms = 0;
        self.silence_ms = 0;
        chunk
    }

    fn average_quality(&self) -> Option<AudioQuality> {
        if self.qualities.is_empty() {
            return None;
        }
        let n = self.qualities.len() as f32;
        Some(AudioQuality {
            snr: self.qualities.iter().map(|q| q.snr).sum::<f32>() / n,
            clipping: self.qualities.iter().map(|q| q.clipping).sum::<f32>() / n,
            loudness: self.qualities.iter().map(|q| q.loudness).sum::<f32>() / n,
            overall_score: self.qualities.iter().map(|q| q.overall_score).sum::<f32>() / n,
        })
    }
}
