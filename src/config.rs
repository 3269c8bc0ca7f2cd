use crate::chunker::ChunkPolicy;
use crate::error::Result;
use serde::Deserialize;
use std::path::PathBuf;

/// Top-level configuration for the recording pipeline and backend transaction.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScribeConfig {
    /// Capture sample rate in Hz.
    pub sample_rate: u32,
    /// Samples per frame delivered by the audio source.
    pub frame_size: usize,
    /// Directory for encoded chunk files awaiting upload.
    pub output_dir: PathBuf,
    /// Remote bucket for chunk objects.
    pub bucket_name: String,
    /// Base URL of the transaction API.
    pub api_base_url: String,
    /// URL of the upload-credentials endpoint.
    pub credentials_url: String,
    /// Whether the quality analyser runs at all.
    pub enable_analyser: bool,
    /// Additional upload attempts after the first, per chunk.
    pub max_upload_retries: u32,
    /// Ring buffer capacity absorbing the capture thread (frames).
    pub pre_buffer_capacity: usize,
    pub frame_channel_capacity: usize,
    pub chunk_channel_capacity: usize,
    /// Result polling: attempts and fixed delay between them.
    pub poll_max_attempts: u32,
    pub poll_delay_ms: u64,
    pub chunking: ChunkPolicy,
}

impl Default for ScribeConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            frame_size: 512,
            output_dir: PathBuf::from("voicescribe_audio"),
            bucket_name: "m-prod-voice-record".to_string(),
            api_base_url: String::new(),
            credentials_url: String::new(),
            enable_analyser: true,
            max_upload_retries: 2,
            pre_buffer_capacity: 200,
            frame_channel_capacity: 64,
            chunk_channel_capacity: 8,
            poll_max_attempts: 5,
            poll_delay_ms: 2_000,
            chunking: ChunkPolicy::default(),
        }
    }
}

impl ScribeConfig {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
