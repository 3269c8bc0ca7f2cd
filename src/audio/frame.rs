/// One frame of 16-bit mono PCM as delivered by the capture callback.
///
/// Frames are immutable: produced once at fixed cadence, consumed exactly
/// once by the chunker.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw PCM samples (i16, mono).
    pub samples: Vec<i16>,
    /// Capture timestamp in milliseconds since recording started.
    pub captured_at_ms: u64,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Monotonic frame counter assigned by the audio source.
    pub sequence: u64,
}

impl AudioFrame {
    /// Playback duration of this frame.
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        (self.samples.len() as u64 * 1000) / self.sample_rate as u64
    }

    /// Root-mean-square amplitude, in raw sample units.
    pub fn rms_amplitude(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum: f64 = self
            .samples
            .iter()
            .map(|&s| (s as f64) * (s as f64))
            .sum();
        (sum / self.samples.len() as f64).sqrt() as f32
    }
}

/// Quality snapshot produced by the analyser for a single frame, and
/// averaged per chunk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioQuality {
    pub snr: f32,
    pub clipping: f32,
    pub loudness: f32,
    pub overall_score: f32,
}

/// Per-frame voice activity datum published on the activity stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiceActivity {
    pub is_speech: bool,
    pub amplitude: f32,
    pub timestamp_ms: u64,
}

/// A contiguous run of frames bounded by a cut decision, the unit of
/// encoding and upload.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Deterministic id derived from session id and index, which makes
    /// re-processing after a crash idempotent.
    pub chunk_id: String,
    pub session_id: String,
    /// 0-based position within the session.
    pub index: usize,
    pub frames: Vec<AudioFrame>,
    pub start_ms: u64,
    /// End of the last frame (its timestamp plus its duration), so that
    /// chunk durations sum to the total accepted input duration.
    pub end_ms: u64,
    pub quality: Option<AudioQuality>,
}

impl AudioChunk {
    pub fn duration_ms(&self) -> u64 {
        self.end_ms.saturating_sub(self.start_ms)
    }
}

/// Deterministic chunk id: `<session_id>_<index>`.
pub fn chunk_id(session_id: &str, index: usize) -> String {
    format!("{session_id}_{index}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_duration_follows_sample_count() {
        let frame = AudioFrame {
            samples: vec![0; 1600],
            captured_at_ms: 0,
            sample_rate: 16_000,
            sequence: 0,
        };
        assert_eq!(frame.duration_ms(), 100);
    }

    #[test]
    fn chunk_id_is_deterministic() {
        assert_eq!(chunk_id("a-123", 4), "a-123_4");
        assert_eq!(chunk_id("a-123", 4), chunk_id("a-123", 4));
    }

    #[test]
    fn rms_amplitude_of_silence_is_zero() {
        let frame = AudioFrame {
            samples: vec![0; 512],
            captured_at_ms: 0,
            sample_rate: 16_000,
            sequence: 0,
        };
        assert_eq!(frame.rms_amplitude(), 0.0);
    }
}
