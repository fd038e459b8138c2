use std::path::PathBuf;
use tracing::{debug, info};

use crate::artifacts::RunTimestamp;
use crate::records::GuestRecordConfig;

/// Everything one pipeline run needs apart from the uploader.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub source: PathBuf,
    pub records: GuestRecordConfig,
    pub timestamp: RunTimestamp,
}

impl PipelineConfig {
    pub fn trace_loaded(&self) {
        info!(
            source = %self.source.display(),
            identifiers = self.records.identifiers.len(),
            subscriptions = self.records.subscriptions.len(),
            timestamp = %self.timestamp,
            "Loaded PipelineConfig"
        );
        debug!(?self, "PipelineConfig loaded (full debug)");
    }
}
