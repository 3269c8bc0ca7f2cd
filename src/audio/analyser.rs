use super::{AudioFrame, AudioQuality};

/// Optional per-frame quality analysis. Runs off the critical path: the
/// pipeline dispatches frames to it fire-and-forget and drops them when the
/// analyser falls behind.
pub trait AudioAnalyser: Send + Sync {
    fn analyse(&self, frame: &AudioFrame) -> Option<AudioQuality>;
}

/// Cheap signal-statistics analyser: loudness from RMS, clipping from the
/// fraction of near-full-scale samples, SNR approximated against a fixed
/// noise floor.
pub struct RmsAnalyser {
    noise_floor: f32,
}

impl RmsAnalyser {
    pub fn new(noise_floor: f32) -> Self {
        Self { noise_floor }
    }
}

impl Default for RmsAnalyser {
    fn default() -> Self {
        Self { noise_floor: 40.0 }
    }
}

impl AudioAnalyser for RmsAnalyser {
    fn analyse(&self, frame: &AudioFrame) -> Option<AudioQuality> {
        if frame.samples.is_empty() {
            return None;
        }
        let rms = frame.rms_amplitude();
        let clipped = frame
            .samples
            .iter()
            .filter(|&&s| s.unsigned_abs() >= 32_000)
            .count();
        let clipping = clipped as f32 / frame.samples.len() as f32;
        let loudness = rms / i16::MAX as f32;
        let snr = if rms > 0.0 {
            20.0 * (rms / self.noise_floor).log10()
        } else {
            0.0
        };
        let overall_score =
            ((snr / 60.0).clamp(0.0, 1.0) * (1.0 - clipping)).clamp(0.0, 1.0);

        Some(AudioQuality {
            snr,
            clipping,
            loudness,
            overall_score,
        })
    }
}

/// Analyser that reports nothing; used when quality analysis is disabled.
pub struct NoOpAnalyser;

impl AudioAnalyser for NoOpAnalyser {
    fn analyse(&self, _frame: &AudioFrame) -> Option<AudioQuality> {
        None
    }
}
