pub mod analyser;
pub mod encoder;
pub mod frame;
pub mod ring;
pub mod source;
pub mod vad;

pub use analyser::{AudioAnalyser, NoOpAnalyser, RmsAnalyser};
pub use encoder::{AudioEncoder, EncodedFile, WavEncoder};
pub use frame::{chunk_id, AudioChunk, AudioFrame, AudioQuality, VoiceActivity};
pub use ring::RingBuffer;
pub use source::{AudioSource, FrameSink};
pub use vad::{EnergyVad, VoiceActivityDetector};
