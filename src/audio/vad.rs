use super::AudioFrame;

/// Binary speech/silence classification per frame.
pub trait VoiceActivityDetector: Send + Sync {
    fn is_speech(&self, frame: &AudioFrame) -> bool;
}

/// RMS energy gate. A stand-in for a model-backed detector: frames whose
/// RMS amplitude exceeds the threshold count as speech.
pub struct EnergyVad {
    threshold: f32,
}

impl EnergyVad {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }
}

impl Default for EnergyVad {
    fn default() -> Self {
        // Raw i16 RMS units; roughly -40 dBFS.
        Self { threshold: 330.0 }
    }
}

impl VoiceActivityDetector for EnergyVad {
    fn is_speech(&self, frame: &AudioFrame) -> bool {
        frame.rms_amplitude() > self.threshold
    }
}
