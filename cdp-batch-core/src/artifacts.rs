//! Local copies of the batch: the ND-JSON text and its gzip, written next to the source CSV.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{error, info};

use crate::payload::CompressedPayload;

/// Timestamp shared by everything a single run writes (artifacts, log file).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunTimestamp(String);

impl RunTimestamp {
    pub fn now() -> Self {
        Self::at(Utc::now())
    }

    /// `YYYYMMDDHHMMSSmmm` in UTC.
    pub fn at(instant: DateTime<Utc>) -> Self {
        Self(instant.format("%Y%m%d%H%M%S%3f").to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RunTimestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub nd_json: PathBuf,
    pub gzip: PathBuf,
}

impl ArtifactPaths {
    /// `<dir>/<stem>_cdp_batch_<timestamp>.json` and the same with `.gz` appended,
    /// where `<stem>` is the source file name without a trailing `.csv`.
    pub fn for_source(source: &Path, timestamp: &RunTimestamp) -> Self {
        let file_name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let stem = strip_csv_extension(&file_name);
        let dir = source.parent().unwrap_or_else(|| Path::new(""));

        let nd_json = dir.join(format!("{stem}_cdp_batch_{timestamp}.json"));
        let mut gzip = nd_json.clone().into_os_string();
        gzip.push(".gz");
        Self {
            nd_json,
            gzip: PathBuf::from(gzip),
        }
    }
}

fn strip_csv_extension(name: &str) -> &str {
    let split = name.len().saturating_sub(4);
    match name.get(split..) {
        Some(ext) if split > 0 && ext.eq_ignore_ascii_case(".csv") => &name[..split],
        _ => name,
    }
}

#[derive(Debug, Error)]
#[error("failed to write {}: {source}", path.display())]
pub struct ArtifactError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Write the ND-JSON text and the compressed payload to `paths`.
pub async fn write_artifacts(
    paths: &ArtifactPaths,
    nd_json: &str,
    payload: &CompressedPayload,
) -> Result<(), ArtifactError> {
    write_file(&paths.nd_json, nd_json.as_bytes()).await?;
    info!(path = %paths.nd_json.display(), bytes = nd_json.len(), "Wrote ND-JSON batch file");

    write_file(&paths.gzip, payload.bytes()).await?;
    info!(path = %paths.gzip.display(), bytes = payload.bytes().len(), "Wrote gzip batch file");
    Ok(())
}

async fn write_file(path: &Path, contents: &[u8]) -> Result<(), ArtifactError> {
    tokio::fs::write(path, contents).await.map_err(|e| {
        error!(path = %path.display(), error = ?e, "Failed to write artifact");
        ArtifactError {
            path: path.to_path_buf(),
            source: e,
        }
    })
}
