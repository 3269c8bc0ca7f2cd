use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Body of the transaction-init call. Field names follow the backend's wire
/// contract, not Rust convention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitTransactionRequest {
    #[serde(rename = "input_language")]
    pub input_languages: Vec<String>,
    pub mode: String,
    #[serde(rename = "output_format_template")]
    pub output_templates: Vec<OutputTemplateSpec>,
    #[serde(rename = "s3_url")]
    pub s3_url: String,
    #[serde(rename = "Section")]
    pub section: String,
    pub speciality: String,
    /// Always "vaded": chunks are speech-bounded before upload.
    pub transfer: String,
    pub model_type: String,
    pub patient_details: PatientDetails,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatientDetails {
    #[serde(rename = "biologicalSex")]
    pub biological_sex: String,
    pub username: String,
    pub oid: String,
    pub visit_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputTemplateSpec {
    pub template_id: String,
    pub template_type: String,
    pub template_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InitTransactionResponse {
    #[serde(rename = "b_id")]
    pub txn_ref: Option<String>,
    pub txn_id: Option<String>,
    pub message: Option<String>,
    pub status: Option<String>,
    pub error: Option<ErrorDetails>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorDetails {
    pub code: Option<String>,
    pub message: Option<String>,
}

/// Body of the stop and commit calls. Commit sends the same file list with
/// empty chunk timings.
#[derive(Debug, Clone, Serialize)]
pub struct StopTransactionRequest {
    pub audio_files: Vec<String>,
    pub chunk_info: Vec<HashMap<String, ChunkTiming>>,
}

/// Chunk start/end offsets in seconds, keyed by file name on the wire.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ChunkTiming {
    pub st: f64,
    pub et: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StopTransactionResponse {
    pub message: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransactionResultResponse {
    pub data: Option<ResultData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResultData {
    pub output: Option<Vec<TemplateOutput>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TemplateOutput {
    pub name: Option<String>,
    pub template_id: Option<String>,
    pub status: Option<ResultStatus>,
    #[serde(rename = "type")]
    pub output_type: Option<String>,
    pub value: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum ResultStatus {
    #[serde(rename = "in-progress")]
    InProgress,
    #[serde(rename = "success")]
    Success,
    #[serde(rename = "failure")]
    Failure,
    #[serde(rename = "partial_success")]
    PartialSuccess,
}

/// Temporary object-storage credentials, PascalCase on the wire.
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialsResponse {
    #[serde(rename = "AccessKeyId")]
    pub access_key_id: String,
    #[serde(rename = "SecretKey")]
    pub secret_key: String,
    #[serde(rename = "SessionToken")]
    pub session_token: String,
}
