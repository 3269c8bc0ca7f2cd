pub mod manager;

pub use manager::SessionManager;

use serde::{Deserialize, Serialize};

/// Recording session lifecycle. All mutations go through
/// [`SessionState::can_transition_to`]; an illegal request leaves the state
/// untouched and surfaces an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    Starting,
    Recording,
    Paused,
    Stopping,
    Processing,
    Completed,
    Error,
}

impl SessionState {
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Idle, Starting)
                | (Starting, Recording)
                | (Starting, Error)
                | (Recording, Paused)
                | (Recording, Stopping)
                | (Recording, Error)
                | (Paused, Recording)
                | (Paused, Stopping)
                | (Paused, Error)
                | (Stopping, Processing)
                | (Stopping, Completed)
                | (Stopping, Error)
                | (Processing, Completed)
                | (Processing, Error)
                | (Completed, Idle)
                | (Error, Idle)
        )
    }

    pub fn is_active(self) -> bool {
        matches!(self, Self::Recording | Self::Paused)
    }
}

/// Per-session transcription parameters supplied by the host application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub languages: Vec<String>,
    pub mode: String,
    pub model_type: String,
    pub output_templates: Vec<OutputTemplate>,
    pub patient: PatientInfo,
    pub section: String,
    pub speciality: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            languages: vec!["en-IN".to_string()],
            mode: "dictation".to_string(),
            model_type: "pro".to_string(),
            output_templates: Vec::new(),
            patient: PatientInfo::default(),
            section: String::new(),
            speciality: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputTemplate {
    pub template_id: String,
    pub template_type: String,
    pub template_name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatientInfo {
    pub biological_sex: String,
    pub username: String,
    pub oid: String,
    pub visit_id: String,
}

/// Milestones emitted over the session event channel.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Started { session_id: String },
    Paused { session_id: String },
    Resumed { session_id: String },
    Stopped { session_id: String, chunk_count: usize },
    Completed { result: SessionResult },
    Failed { session_id: String, message: String },
}

/// Final transcription output for a session.
#[derive(Debug, Clone)]
pub struct SessionResult {
    pub session_id: String,
    pub outputs: Vec<TemplateResult>,
}

#[derive(Debug, Clone)]
pub struct TemplateResult {
    pub template_id: String,
    pub name: String,
    pub succeeded: bool,
    pub value: String,
}
