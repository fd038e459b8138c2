//! `load_config` module: merges CLI flags with environment secrets into the pipeline and
//! batch client configuration.
//!
//! # Responsibilities
//! - Split the comma-separated `--identifiers` / `--subscriptions` lists
//! - Resolve `CLIENT_KEY` / `API_TOKEN`: a CLI flag wins over the environment
//! - Resolve `API_ENDPOINT`: `--api-endpoint` wins over the environment
//!
//! Missing secrets are not an error here. The batch client reports them as a presign
//! failure after the local artifacts have been written.

use cdp_batch_core::artifacts::RunTimestamp;
use cdp_batch_core::config::PipelineConfig;
use cdp_batch_core::records::{GuestRecordConfig, RecordMode};
use tracing::{debug, info};

use crate::cli::Cli;
use crate::upload::ApiSettings;

#[derive(Debug, Clone)]
pub struct CliConfig {
    pub pipeline: PipelineConfig,
    pub api: ApiSettings,
}

impl CliConfig {
    /// Echo the resolved configuration; secrets are only reported as set or unset.
    pub fn trace_loaded(&self) {
        self.pipeline.trace_loaded();
        info!(
            file = %self.pipeline.source.display(),
            identifiers = ?self.pipeline.records.identifiers,
            subscriptions = ?self.pipeline.records.subscriptions,
            point_of_sale = self.pipeline.records.point_of_sale.as_deref().unwrap_or(""),
            endpoint = self.api.endpoint.as_deref().unwrap_or(""),
            client_key_set = self.api.client_key.is_some(),
            api_token_set = self.api.api_token.is_some(),
            "Resolved batch configuration"
        );
    }
}

/// Build the run configuration. Returns `None` when no `--file` was given.
pub fn load_config(cli: &Cli, timestamp: RunTimestamp) -> Option<CliConfig> {
    let source = cli.file.clone()?;

    let records = GuestRecordConfig {
        mode: RecordMode::Upsert,
        identifiers: split_field_list(cli.identifiers.as_deref()),
        subscriptions: split_field_list(cli.subscriptions.as_deref()),
        point_of_sale: non_empty(cli.point_of_sale.clone()),
    };
    debug!(?records, "Parsed guest record selection from arguments");

    let api = ApiSettings {
        endpoint: non_empty(cli.api_endpoint.clone()).or_else(|| env_var("API_ENDPOINT")),
        client_key: non_empty(cli.client_key.clone()).or_else(|| env_var("CLIENT_KEY")),
        api_token: non_empty(cli.api_token.clone()).or_else(|| env_var("API_TOKEN")),
    };

    Some(CliConfig {
        pipeline: PipelineConfig {
            source,
            records,
            timestamp,
        },
        api,
    })
}

/// `"id, email,,"` becomes `["id", "email"]`.
pub fn split_field_list(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(String::from)
            .collect()
    })
    .unwrap_or_default()
}

fn env_var(key: &str) -> Option<String> {
    let value = non_empty(std::env::var(key).ok());
    debug!(key, found = value.is_some(), "Checked environment variable");
    value
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
