use crate::backend::{
    ApiError, BackendApi, ChunkTiming, InitTransactionRequest, OutputTemplateSpec,
    PatientDetails, PollResponse, ResultStatus, StopTransactionRequest,
    TransactionResultResponse,
};
use crate::error::{Result, ScribeError};
use crate::session::{SessionConfig, SessionResult, TemplateResult};
use crate::store::{Store, UploadStage};
use crate::upload::{ChunkUploader, UploadMetadata};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// Result polling parameters.
#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub max_attempts: u32,
    pub delay: Duration,
}

/// Outcome of one polling run.
#[derive(Debug)]
pub enum PollOutcome {
    Success(TransactionResultResponse),
    Failed(String),
    /// Attempts exhausted while the backend was still analyzing.
    Timeout,
}

/// Outcome of driving a transaction toward completion.
#[derive(Debug)]
pub enum TransactionOutcome {
    Completed(SessionResult),
    /// The backend is still analyzing; retry later resumes at Analyzing.
    PollTimeout,
    /// The transaction had already reached a terminal stage.
    AlreadyTerminal,
}

/// Remote references established by the init call.
#[derive(Debug, Clone)]
pub struct InitHandle {
    pub folder_name: String,
    pub txn_ref: String,
}

/// Drives the backend transaction through its stages, persisting each stage
/// before moving on so that any step can be re-run after a crash. Stage
/// updates happen only after the corresponding backend call succeeded, which
/// makes every step at-least-once and the whole sequence idempotent.
pub struct TransactionManager {
    api: Arc<dyn BackendApi>,
    store: Arc<dyn Store>,
    uploader: Arc<ChunkUploader>,
    bucket: String,
    max_upload_retries: u32,
    poll: PollSettings,
}

impl TransactionManager {
    pub fn new(
        api: Arc<dyn BackendApi>,
        store: Arc<dyn Store>,
        uploader: Arc<ChunkUploader>,
        bucket: String,
        max_upload_retries: u32,
        poll: PollSettings,
    ) -> Self {
        Self {
            api,
            store,
            uploader,
            bucket,
            max_upload_retries,
            poll,
        }
    }

    /// Opens the backend transaction and records the remote references.
    pub async fn init_transaction(
        &self,
        session_id: &str,
        config: &SessionConfig,
    ) -> Result<InitHandle> {
        let folder_name = Utc::now().format("%y%m%d").to_string();
        let s3_url = format!("s3://{}/{}/{}", self.bucket, folder_name, session_id);
        let request = build_init_request(config, s3_url);
        self.run_init(session_id, folder_name, request).await
    }

    async fn run_init(
        &self,
        session_id: &str,
        folder_name: String,
        request: InitTransactionRequest,
    ) -> Result<InitHandle> {
        // Persist the request before calling out so a crash mid-init can
        // replay it verbatim.
        match serde_json::to_string(&request) {
            Ok(json) => {
                if let Err(e) = self.store.update_session_metadata(session_id, json).await {
                    warn!("failed to persist init metadata for {}: {}", session_id, e);
                }
            }
            Err(e) => warn!("failed to serialize init metadata: {}", e),
        }

        let response = self
            .api
            .init_transaction(session_id, &request)
            .await
            .map_err(|e| map_api_error(e, "init"))?;

        let txn_ref = response
            .txn_ref
            .or(response.txn_id)
            .ok_or_else(|| ScribeError::BackendRejection {
                stage: "init",
                message: response
                    .error
                    .and_then(|e| e.message)
                    .or(response.message)
                    .unwrap_or_else(|| "no transaction reference returned".to_string()),
            })?;

        self.store
            .update_upload_stage(session_id, UploadStage::Stop)
            .await?;
        self.store
            .update_remote_refs(session_id, folder_name.clone(), txn_ref.clone())
            .await?;

        info!("transaction {} opened for session {}", txn_ref, session_id);
        Ok(InitHandle {
            folder_name,
            txn_ref,
        })
    }

    /// Tells the backend recording has stopped, listing every uploaded chunk
    /// with its timing.
    pub async fn stop_transaction(&self, session_id: &str) -> Result<()> {
        let uploaded = self.store.uploaded_chunks(session_id).await?;
        let audio_files: Vec<String> = uploaded.iter().map(|c| c.file_name.clone()).collect();
        let chunk_info = uploaded
            .iter()
            .map(|c| {
                let mut timing = HashMap::new();
                timing.insert(
                    c.file_name.clone(),
                    ChunkTiming {
                        st: c.start_ms as f64 / 1000.0,
                        et: c.end_ms as f64 / 1000.0,
                    },
                );
                timing
            })
            .collect();

        self.api
            .stop_transaction(
                session_id,
                &StopTransactionRequest {
                    audio_files,
                    chunk_info,
                },
            )
            .await
            .map_err(|e| map_api_error(e, "stop"))?;

        self.store
            .update_upload_stage(session_id, UploadStage::Commit)
            .await?;
        Ok(())
    }

    /// Finalizes the file list; after commit the backend starts analyzing.
    pub async fn commit_transaction(&self, session_id: &str) -> Result<()> {
        let uploaded = self.store.uploaded_chunks(session_id).await?;
        let audio_files: Vec<String> = uploaded.iter().map(|c| c.file_name.clone()).collect();

        self.api
            .commit_transaction(
                session_id,
                &StopTransactionRequest {
                    audio_files,
                    chunk_info: Vec::new(),
                },
            )
            .await
            .map_err(|e| map_api_error(e, "commit"))?;

        self.store
            .update_upload_stage(session_id, UploadStage::Analyzing)
            .await?;
        Ok(())
    }

    /// Re-attempts every failed chunk with retry budget left. Returns whether
    /// the session's chunks are now all uploaded.
    pub async fn retry_failed_uploads(&self, session_id: &str) -> Result<bool> {
        let session = self
            .store
            .session(session_id)
            .await?
            .ok_or_else(|| ScribeError::SessionNotFound(session_id.to_string()))?;
        let folder_name = session.folder_name.unwrap_or_default();
        let txn_ref = session.remote_txn_ref.unwrap_or_default();

        for chunk in self
            .store
            .failed_chunks(session_id, self.max_upload_retries)
            .await?
        {
            if !chunk.file_path.exists() {
                warn!(
                    "chunk {} has no local file left, skipping retry",
                    chunk.chunk_id
                );
                continue;
            }

            self.store.mark_in_progress(&chunk.chunk_id).await?;
            let metadata = UploadMetadata {
                chunk_id: chunk.chunk_id.clone(),
                session_id: session_id.to_string(),
                index: chunk.index,
                file_name: chunk.file_name.clone(),
                folder_name: folder_name.clone(),
                txn_ref: txn_ref.clone(),
                mime_type: "audio/wav",
            };

            match self.uploader.upload(&chunk.file_path, &metadata).await {
                Ok(_) => {
                    self.store.mark_uploaded(&chunk.chunk_id).await?;
                    if let Err(e) = std::fs::remove_file(&chunk.file_path) {
                        warn!(
                            "retried chunk file could not be removed ({}): {}",
                            chunk.file_path.display(),
                            e
                        );
                    }
                }
                Err(e) => {
                    warn!("retry upload for chunk {} failed: {}", chunk.chunk_id, e);
                    self.store.mark_failed(&chunk.chunk_id).await?;
                }
            }
        }

        self.store.all_chunks_uploaded(session_id).await
    }

    /// Polls until the backend produces a result or attempts run out.
    pub async fn poll_result(&self, session_id: &str) -> Result<PollOutcome> {
        for attempt in 0..self.poll.max_attempts {
            match self.api.transaction_result(session_id).await {
                Ok(PollResponse::Processing) => {
                    info!(
                        "session {} still analyzing (attempt {}/{})",
                        session_id,
                        attempt + 1,
                        self.poll.max_attempts
                    );
                }
                Ok(PollResponse::Ready(response)) => {
                    let statuses: Vec<ResultStatus> = response
                        .data
                        .as_ref()
                        .and_then(|d| d.output.as_ref())
                        .map(|outputs| outputs.iter().filter_map(|o| o.status).collect())
                        .unwrap_or_default();

                    let any_succeeded = statuses.iter().any(|s| {
                        matches!(s, ResultStatus::Success | ResultStatus::PartialSuccess)
                    });
                    let all_failed = !statuses.is_empty()
                        && statuses.iter().all(|s| *s == ResultStatus::Failure);

                    if any_succeeded {
                        self.store
                            .update_upload_stage(session_id, UploadStage::Completed)
                            .await?;
                        return Ok(PollOutcome::Success(response));
                    }
                    if all_failed {
                        self.store
                            .update_upload_stage(session_id, UploadStage::Failure)
                            .await?;
                        return Ok(PollOutcome::Failed(
                            "backend reported failure for every template".to_string(),
                        ));
                    }
                    // Outputs present but still in progress.
                }
                Err(e) => warn!("result poll for {} failed: {}", session_id, e),
            }
            if attempt + 1 < self.poll.max_attempts {
                sleep(self.poll.delay).await;
            }
        }
        Ok(PollOutcome::Timeout)
    }

    /// Resumes the transaction from its persisted stage and drives it as far
    /// as possible. Safe to call repeatedly: completed steps are skipped.
    ///
    /// `force` proceeds to stop even when some chunks never uploaded.
    pub async fn check_and_progress(
        &self,
        session_id: &str,
        config: Option<&SessionConfig>,
        force: bool,
    ) -> Result<TransactionOutcome> {
        loop {
            let session = self
                .store
                .session(session_id)
                .await?
                .ok_or_else(|| ScribeError::SessionNotFound(session_id.to_string()))?;

            match session.upload_stage {
                stage if stage.is_terminal() => return Ok(TransactionOutcome::AlreadyTerminal),
                UploadStage::Init => {
                    let folder_name = session
                        .folder_name
                        .unwrap_or_else(|| Utc::now().format("%y%m%d").to_string());
                    let request = match config {
                        Some(config) => {
                            let s3_url = format!(
                                "s3://{}/{}/{}",
                                self.bucket, folder_name, session_id
                            );
                            build_init_request(config, s3_url)
                        }
                        None => {
                            let json = session.metadata_json.ok_or_else(|| {
                                ScribeError::MissingMetadata(session_id.to_string())
                            })?;
                            serde_json::from_str(&json)?
                        }
                    };
                    self.run_init(session_id, folder_name, request).await?;
                }
                UploadStage::Stop => {
                    let all_uploaded = self.retry_failed_uploads(session_id).await?;
                    if !all_uploaded {
                        let chunks = self.store.chunks(session_id).await?;
                        let failed = chunks
                            .iter()
                            .filter(|c| {
                                c.upload_state != crate::store::UploadState::Success
                            })
                            .count();
                        if !force {
                            return Err(ScribeError::PartialUploadFailure {
                                failed,
                                total: chunks.len(),
                            });
                        }
                        warn!(
                            "forcing stop for {} with {}/{} chunks missing",
                            session_id,
                            failed,
                            chunks.len()
                        );
                    }
                    self.stop_transaction(session_id).await?;
                }
                UploadStage::Commit => {
                    self.commit_transaction(session_id).await?;
                }
                UploadStage::Analyzing => {
                    return match self.poll_result(session_id).await? {
                        PollOutcome::Success(response) => Ok(TransactionOutcome::Completed(
                            session_result(session_id, response),
                        )),
                        PollOutcome::Failed(message) => Err(ScribeError::BackendRejection {
                            stage: "result",
                            message,
                        }),
                        PollOutcome::Timeout => Ok(TransactionOutcome::PollTimeout),
                    };
                }
                _ => unreachable!("terminal stages handled by the guard arm"),
            }
        }
    }
}

fn map_api_error(error: ApiError, stage: &'static str) -> ScribeError {
    match error {
        ApiError::Network(message) => ScribeError::TransientNetwork(message),
        ApiError::Rejected(message) => ScribeError::BackendRejection { stage, message },
    }
}

fn build_init_request(config: &SessionConfig, s3_url: String) -> InitTransactionRequest {
    InitTransactionRequest {
        input_languages: config.languages.clone(),
        mode: config.mode.clone(),
        output_templates: config
            .output_templates
            .iter()
            .map(|t| OutputTemplateSpec {
                template_id: t.template_id.clone(),
                template_type: t.template_type.clone(),
                template_name: t.template_name.clone(),
            })
            .collect(),
        s3_url,
        section: config.section.clone(),
        speciality: config.speciality.clone(),
        transfer: "vaded".to_string(),
        model_type: config.model_type.clone(),
        patient_details: PatientDetails {
            biological_sex: config.patient.biological_sex.clone(),
            username: config.patient.username.clone(),
            oid: config.patient.oid.clone(),
            visit_id: config.patient.visit_id.clone(),
        },
    }
}

fn session_result(session_id: &str, response: TransactionResultResponse) -> SessionResult {
    let outputs = response
        .data
        .and_then(|d| d.output)
        .unwrap_or_default()
        .into_iter()
        .map(|o| TemplateResult {
            template_id: o.template_id.unwrap_or_default(),
            name: o.name.unwrap_or_default(),
            succeeded: matches!(
                o.status,
                Some(ResultStatus::Success) | Some(ResultStatus::PartialSuccess)
            ),
            value: o.value.unwrap_or_default(),
        })
        .collect();

    SessionResult {
        session_id: session_id.to_string(),
        outputs,
    }
}
