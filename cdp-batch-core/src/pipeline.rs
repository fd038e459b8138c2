//! High-level pipeline: orchestrates read → build → encode → write → presign → upload.
//!
//! # Responsibilities
//! - Reads and parses the guest CSV, builds guest records and the compressed payload
//! - Writes the local ND-JSON and gzip artifacts before any network call
//! - Drives the batch protocol as a small state machine ([`BatchState`]):
//!   `Presign → Upload → Done`, with `Failed` reachable from either network step
//! - Aggregates what happened into a [`PipelineReport`]
//!
//! # Error Handling
//! Only a missing or unreadable source file is returned as an error ([`FatalInputError`]),
//! and it is returned before anything is written or sent. Every later failure is logged,
//! recorded in the report's [`PipelineOutcome`] and swallowed, so the caller can always
//! finish normally and flush its logs.
//!
//! # Navigation
//! - Main entrypoint: [`run_pipeline`]
//! - Batch protocol alone: [`run_batch`]

use std::fmt;
use std::path::PathBuf;

use tracing::{debug, error, info, instrument, warn};

use crate::artifacts::{write_artifacts, ArtifactPaths};
use crate::config::PipelineConfig;
use crate::payload::{encode_nd_json, CompressedPayload};
use crate::records::build_guest_records;
use crate::source::{parse_csv, read_source, FatalInputError};
use crate::uploader::{
    BatchError, BatchHandle, BatchUploader, PayloadInfo, PresignedLocation, UploadReceipt,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ParseCsv,
    BuildRecords,
    Encode,
    WriteArtifacts,
    Presign,
    Upload,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::ParseCsv => "parse_csv",
            Stage::BuildRecords => "build_records",
            Stage::Encode => "encode",
            Stage::WriteArtifacts => "write_artifacts",
            Stage::Presign => "presign",
            Stage::Upload => "upload",
        };
        f.write_str(name)
    }
}

/// Progress of one batch through the presign/upload protocol.
#[derive(Debug)]
pub enum BatchState {
    Presign,
    Upload(PresignedLocation),
    Done {
        reference: String,
        receipt: UploadReceipt,
    },
    Failed {
        stage: Stage,
        error: BatchError,
    },
}

impl BatchState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchState::Done { .. } | BatchState::Failed { .. })
    }

    /// Perform the network step for the current state and return the next one.
    /// Terminal states are returned unchanged.
    pub async fn advance<U>(
        self,
        uploader: &U,
        handle: &BatchHandle,
        payload: &CompressedPayload,
    ) -> BatchState
    where
        U: BatchUploader + ?Sized,
    {
        match self {
            BatchState::Presign => presign(uploader, handle, payload.info()).await,
            BatchState::Upload(location) => upload(uploader, location, payload).await,
            terminal => terminal,
        }
    }
}

async fn presign<U>(uploader: &U, handle: &BatchHandle, info: &PayloadInfo) -> BatchState
where
    U: BatchUploader + ?Sized,
{
    debug!(
        uuid = %handle,
        checksum = %info.checksum,
        size = info.size,
        "Presign request info"
    );
    match uploader.presign(handle, info).await {
        Ok(location) => {
            info!(
                reference = %location.reference,
                href = %location.upload_url(),
                "Presign request succeeded"
            );
            BatchState::Upload(location)
        }
        Err(e) => {
            log_batch_error(Stage::Presign, &e);
            BatchState::Failed {
                stage: Stage::Presign,
                error: e,
            }
        }
    }
}

async fn upload<U>(uploader: &U, location: PresignedLocation, payload: &CompressedPayload) -> BatchState
where
    U: BatchUploader + ?Sized,
{
    debug!(
        reference = %location.reference,
        href = %location.upload_url(),
        md5 = %payload.content_md5(),
        "Upload request info"
    );
    match uploader.upload(&location, payload).await {
        Ok(receipt) => {
            if receipt.is_success() {
                info!(status = receipt.status, reference = %location.reference, "Upload request succeeded");
            } else {
                warn!(
                    status = receipt.status,
                    body = %receipt.body,
                    reference = %location.reference,
                    "Upload request completed with a non-success status"
                );
            }
            BatchState::Done {
                reference: location.reference,
                receipt,
            }
        }
        Err(e) => {
            log_batch_error(Stage::Upload, &e);
            BatchState::Failed {
                stage: Stage::Upload,
                error: e,
            }
        }
    }
}

fn log_batch_error(stage: Stage, e: &BatchError) {
    match e {
        BatchError::Presign {
            message,
            status,
            body,
            headers,
        } => error!(
            %stage,
            message = %message,
            status = ?status,
            body = body.as_deref().unwrap_or(""),
            headers = ?headers,
            "Presign request error"
        ),
        BatchError::Upload { message } => {
            error!(%stage, message = %message, "Upload request error")
        }
    }
}

/// Drive a batch from `Presign` to a terminal state.
pub async fn run_batch<U>(uploader: &U, handle: &BatchHandle, payload: &CompressedPayload) -> BatchState
where
    U: BatchUploader + ?Sized,
{
    let mut state = BatchState::Presign;
    while !state.is_terminal() {
        state = state.advance(uploader, handle, payload).await;
    }
    state
}

#[derive(Debug)]
pub enum PipelineOutcome {
    /// A local stage failed; nothing was sent.
    Halted { stage: Stage, reason: String },
    /// The batch protocol ran to a terminal state.
    Batch(BatchState),
}

#[derive(Debug)]
pub struct PipelineReport {
    pub source: PathBuf,
    pub row_count: usize,
    pub record_count: usize,
    pub artifacts: Option<ArtifactPaths>,
    pub payload: Option<PayloadInfo>,
    pub batch: Option<BatchHandle>,
    pub outcome: PipelineOutcome,
}

impl PipelineReport {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, PipelineOutcome::Batch(BatchState::Done { .. }))
    }
}

#[derive(Default)]
struct Progress {
    row_count: usize,
    record_count: usize,
    artifacts: Option<ArtifactPaths>,
    payload: Option<PayloadInfo>,
    batch: Option<BatchHandle>,
}

fn halt(stage: Stage, reason: impl fmt::Display) -> PipelineOutcome {
    let reason = reason.to_string();
    error!(%stage, reason = %reason, "Pipeline halted before upload");
    PipelineOutcome::Halted { stage, reason }
}

/// Run the whole pipeline for one CSV file.
#[instrument(skip_all, fields(source = %config.source.display()))]
pub async fn run_pipeline<U>(
    config: &PipelineConfig,
    uploader: &U,
) -> Result<PipelineReport, FatalInputError>
where
    U: BatchUploader + ?Sized,
{
    info!("Starting batch pipeline");
    let text = read_source(&config.source).await?;

    let mut progress = Progress::default();
    let outcome = drive(config, uploader, &text, &mut progress).await;

    let report = PipelineReport {
        source: config.source.clone(),
        row_count: progress.row_count,
        record_count: progress.record_count,
        artifacts: progress.artifacts,
        payload: progress.payload,
        batch: progress.batch,
        outcome,
    };
    info!(
        success = report.is_success(),
        records = report.record_count,
        "Batch pipeline finished"
    );
    Ok(report)
}

async fn drive<U>(
    config: &PipelineConfig,
    uploader: &U,
    text: &str,
    progress: &mut Progress,
) -> PipelineOutcome
where
    U: BatchUploader + ?Sized,
{
    let rows = match parse_csv(text) {
        Ok(rows) => rows,
        Err(e) => return halt(Stage::ParseCsv, e),
    };
    progress.row_count = rows.len();

    let records = match build_guest_records(&rows, &config.records) {
        Ok(records) => records,
        Err(e) => return halt(Stage::BuildRecords, e),
    };
    progress.record_count = records.len();
    if records.is_empty() {
        warn!("Source contains no rows; uploading an empty batch");
    }

    let nd_json = match encode_nd_json(&records) {
        Ok(text) => text,
        Err(e) => return halt(Stage::Encode, e),
    };
    let payload = match CompressedPayload::from_text(&nd_json) {
        Ok(payload) => payload,
        Err(e) => return halt(Stage::Encode, e),
    };
    info!(
        checksum = %payload.info().checksum,
        size = payload.info().size,
        "Payload info"
    );
    progress.payload = Some(payload.info().clone());

    let paths = ArtifactPaths::for_source(&config.source, &config.timestamp);
    if let Err(e) = write_artifacts(&paths, &nd_json, &payload).await {
        return halt(Stage::WriteArtifacts, e);
    }
    progress.artifacts = Some(paths);

    let handle = BatchHandle::generate();
    info!(uuid = %handle, "Generated batch handle");
    progress.batch = Some(handle);

    PipelineOutcome::Batch(run_batch(uploader, &handle, &payload).await)
}
