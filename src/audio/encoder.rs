use super::AudioFrame;
use crate::error::Result;
use std::fs;
use std::path::{Path, PathBuf};

/// Result of encoding one chunk to disk.
#[derive(Debug, Clone)]
pub struct EncodedFile {
    pub file_path: PathBuf,
    pub size_bytes: u64,
    pub duration_ms: u64,
}

/// Encodes a chunk's frames into a file ready for upload. Platform codecs
/// plug in here; the default writes WAV.
pub trait AudioEncoder: Send + Sync {
    fn encode(
        &self,
        frames: &[AudioFrame],
        sample_rate: u32,
        out_path: &Path,
    ) -> Result<EncodedFile>;
}

/// 16-bit mono WAV encoder.
pub struct WavEncoder;

impl AudioEncoder for WavEncoder {
    fn encode(
        &self,
        frames: &[AudioFrame],
        sample_rate: u32,
        out_path: &Path,
    ) -> Result<EncodedFile> {
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut writer = hound::WavWriter::create(out_path, spec)?;
        let mut sample_count = 0u64;
        for frame in frames {
            for &sample in &frame.samples {
                writer.write_sample(sample)?;
            }
            sample_count += frame.samples.len() as u64;
        }
        writer.finalize()?;

        let size_bytes = fs::metadata(out_path)?.len();
        let duration_ms = if sample_rate > 0 {
            sample_count * 1000 / sample_rate as u64
        } else {
            0
        };

        Ok(EncodedFile {
            file_path: out_path.to_path_buf(),
            size_bytes,
            duration_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_frames_to_wav() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("chunk.wav");
        let frames: Vec<AudioFrame> = (0..10)
            .map(|i| AudioFrame {
                samples: vec![(i * 100) as i16; 1600],
                captured_at_ms: i * 100,
                sample_rate: 16_000,
                sequence: i,
            })
            .collect();

        let encoded = WavEncoder.encode(&frames, 16_000, &out).unwrap();

        assert!(out.exists());
        assert!(encoded.size_bytes > 0);
        assert_eq!(encoded.duration_ms, 1000);
    }
}
