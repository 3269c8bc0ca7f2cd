//! Microphone-to-transcript recording pipeline.
//!
//! Captured frames flow through a lock-free ring buffer into an async
//! pipeline that cuts speech-bounded chunks, encodes them to WAV, and
//! uploads them while recording continues. A persisted transaction state
//! machine drives the backend through init, stop, commit and result
//! polling, and can resume from any stage after a crash.
//!
//! The host supplies the platform pieces: an [`audio::AudioSource`] for
//! capture, an [`upload::ObjectTransport`] for storage, and optionally a
//! [`store::Store`] for durability.

pub mod audio;
pub mod backend;
pub mod chunker;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod session;
pub mod store;
pub mod transaction;
pub mod upload;

pub use audio::{AudioChunk, AudioFrame, AudioQuality, AudioSource, VoiceActivity};
pub use chunker::{ChunkPolicy, Chunker};
pub use config::ScribeConfig;
pub use error::{Result, ScribeError};
pub use session::{SessionConfig, SessionEvent, SessionManager, SessionResult, SessionState};
pub use store::{MemoryStore, Store, UploadStage, UploadState};
pub use transaction::{TransactionManager, TransactionOutcome};
pub use upload::{ChunkUploader, ObjectTransport};
