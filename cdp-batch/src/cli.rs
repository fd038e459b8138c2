//! # cdp-batch CLI interface
//!
//! This module implements the CLI interface for cdp-batch: argument parsing and the async
//! `run` entrypoint that hands a merged configuration to the core pipeline.
//!
//! All pipeline logic (records, payload, presign/upload orchestration) lives in
//! [`cdp-batch-core`]. This module is strictly CLI glue.
//!
//! ## How To Use
//! - For command-line users: use the installed `cdp-batch` binary with `--help`.
//! - For programmatic/integration use: call [`run`] with a constructed [`Cli`].
//!
//! [`cdp-batch-core`]: ../../cdp-batch-core/

use crate::load_config::load_config;
use crate::upload::BatchClient;
use anyhow::{Context, Result};
use cdp_batch_core::artifacts::RunTimestamp;
use cdp_batch_core::pipeline::{run_pipeline, BatchState, PipelineOutcome, PipelineReport};
use clap::Parser;
use std::path::PathBuf;

/// CLI for cdp-batch: upload a guest CSV export to the CDP batch API.
#[derive(Parser, Debug, Clone)]
#[clap(
    name = "cdp-batch",
    version,
    about = "Convert a guest CSV export into a gzip ND-JSON batch and upload it to the CDP batch API"
)]
pub struct Cli {
    /// Path to the guest CSV file
    #[clap(long)]
    pub file: Option<PathBuf>,

    /// Comma-separated identifier column names
    #[clap(long)]
    pub identifiers: Option<String>,

    /// Comma-separated subscription column names
    #[clap(long)]
    pub subscriptions: Option<String>,

    /// Point of sale written into every guest record
    #[clap(long = "pointOfSale", alias = "point-of-sale")]
    pub point_of_sale: Option<String>,

    /// Client key for basic auth (falls back to CLIENT_KEY)
    #[clap(long = "CLIENT_KEY", alias = "client-key")]
    pub client_key: Option<String>,

    /// API token for basic auth (falls back to API_TOKEN)
    #[clap(long = "API_TOKEN", alias = "api-token")]
    pub api_token: Option<String>,

    /// Base URL of the batch API (falls back to API_ENDPOINT)
    #[clap(long)]
    pub api_endpoint: Option<String>,

    /// Directory for the run's log file
    #[clap(long, default_value = "logs")]
    pub log_dir: PathBuf,
}

/// Extracted async CLI logic entrypoint for integration tests and main().
///
/// A missing or unreadable source file is logged and ends the run before anything is
/// written. Presign and upload failures are logged and reported. In every case the run
/// completes normally; only setup failures (the HTTP client) return an error.
pub async fn run(cli: Cli, timestamp: RunTimestamp) -> Result<()> {
    tracing::info!("trace_initialised");

    let Some(config) = load_config(&cli, timestamp) else {
        tracing::warn!("No --file given; nothing to upload");
        return Ok(());
    };
    config.trace_loaded();

    let client = BatchClient::new(config.api.clone()).context("Failed to build HTTP client")?;

    match run_pipeline(&config.pipeline, &client).await {
        Ok(report) => {
            log_report(&report);
            Ok(())
        }
        Err(e) => {
            // Same clean exit as a run without --file; nothing was written or sent.
            tracing::error!(error = %e, "Batch pipeline aborted");
            Ok(())
        }
    }
}

fn log_report(report: &PipelineReport) {
    let artifacts = report
        .artifacts
        .as_ref()
        .map(|a| format!("{}, {}", a.nd_json.display(), a.gzip.display()))
        .unwrap_or_default();
    match &report.outcome {
        PipelineOutcome::Batch(BatchState::Done { reference, receipt }) => tracing::info!(
            reference = %reference,
            status = receipt.status,
            records = report.record_count,
            artifacts = %artifacts,
            "Batch upload complete"
        ),
        PipelineOutcome::Batch(BatchState::Failed { stage, error }) => tracing::error!(
            %stage,
            error = %error,
            artifacts = %artifacts,
            "Batch upload failed; local artifacts kept"
        ),
        PipelineOutcome::Batch(state) => {
            tracing::warn!(?state, "Batch stopped in a non-terminal state")
        }
        PipelineOutcome::Halted { stage, reason } => tracing::error!(
            %stage,
            reason = %reason,
            "Batch pipeline halted before upload"
        ),
    }
}
