//! Reads the guest CSV export and splits it into header-keyed rows.

use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, error, info};

/// One CSV row keyed by header name.
pub type Row = HashMap<String, String>;

/// The source file cannot be used; nothing else may happen in this run.
#[derive(Debug, Error)]
pub enum FatalInputError {
    #[error("source file does not exist: {}", path.display())]
    Missing { path: PathBuf },

    #[error("source file {} could not be read: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid CSV: {0}")]
    Csv(#[from] csv::Error),
}

pub fn ensure_source_exists(path: &Path) -> Result<(), FatalInputError> {
    if path.is_file() {
        Ok(())
    } else {
        error!(path = %path.display(), "Source file does not exist");
        Err(FatalInputError::Missing {
            path: path.to_path_buf(),
        })
    }
}

/// Check the source path and read it as UTF-8 text.
pub async fn read_source(path: &Path) -> Result<String, FatalInputError> {
    ensure_source_exists(path)?;
    match tokio::fs::read_to_string(path).await {
        Ok(text) => {
            info!(path = %path.display(), bytes = text.len(), "Source file read");
            Ok(text)
        }
        Err(e) => {
            error!(path = %path.display(), error = ?e, "Failed to read source file");
            Err(FatalInputError::Unreadable {
                path: path.to_path_buf(),
                source: e,
            })
        }
    }
}

/// Parse CSV text with a header line into rows keyed by column name.
pub fn parse_csv(text: &str) -> Result<Vec<Row>, ParseError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(Cursor::new(text.as_bytes()));

    let headers: Vec<String> = reader.headers()?.iter().map(String::from).collect();
    debug!(?headers, "CSV headers parsed");

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(
            headers
                .iter()
                .cloned()
                .zip(record.iter().map(String::from))
                .collect(),
        );
    }
    info!(rows = rows.len(), columns = headers.len(), "CSV parsed");
    Ok(rows)
}
