//! Turns parsed CSV rows into guest records for the batch payload.
//!
//! Each row yields exactly one [`GuestRecord`] holding the configured identifier and
//! subscription columns, the point of sale and the record mode. Attribute order follows the
//! configuration: identifiers, subscriptions, `pointOfSale`, `mode`.

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::source::Row;

pub const POINT_OF_SALE_KEY: &str = "pointOfSale";
pub const MODE_KEY: &str = "mode";

/// How the batch API should apply each record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordMode {
    #[default]
    Upsert,
}

impl RecordMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordMode::Upsert => "upsert",
        }
    }
}

/// Which columns of a row end up in its guest record.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GuestRecordConfig {
    pub mode: RecordMode,
    pub identifiers: Vec<String>,
    pub subscriptions: Vec<String>,
    pub point_of_sale: Option<String>,
}

impl GuestRecordConfig {
    /// Rejects a configuration that would produce records without any key field.
    pub fn validate(&self) -> Result<(), RecordError> {
        if self.identifiers.is_empty() {
            return Err(RecordError::NoIdentifiers);
        }
        Ok(())
    }

    fn selected_fields(&self) -> impl Iterator<Item = &String> {
        self.identifiers.iter().chain(self.subscriptions.iter())
    }
}

/// One input row, reduced to the selected attributes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct GuestRecord(Map<String, Value>);

impl GuestRecord {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("no identifier fields configured; every guest record needs at least one identifier")]
    NoIdentifiers,

    #[error("row {row}: column '{field}' not found")]
    MissingField { row: usize, field: String },
}

/// Build one guest record per row, preserving row order.
pub fn build_guest_records(
    rows: &[Row],
    config: &GuestRecordConfig,
) -> Result<Vec<GuestRecord>, RecordError> {
    config.validate().map_err(|e| {
        error!(error = %e, "Guest record configuration rejected");
        e
    })?;

    info!(
        rows = rows.len(),
        identifiers = ?config.identifiers,
        subscriptions = ?config.subscriptions,
        point_of_sale = config.point_of_sale.as_deref().unwrap_or(""),
        mode = config.mode.as_str(),
        "Building guest records"
    );

    let records = rows
        .iter()
        .enumerate()
        .map(|(index, row)| build_record(index, row, config))
        .collect::<Result<Vec<_>, _>>()?;

    debug!(records = records.len(), "Guest records built");
    Ok(records)
}

fn build_record(
    index: usize,
    row: &Row,
    config: &GuestRecordConfig,
) -> Result<GuestRecord, RecordError> {
    let mut attributes = Map::new();
    for field in config.selected_fields() {
        let value = row.get(field).ok_or_else(|| {
            error!(row = index, field = %field, "Configured column missing from row");
            RecordError::MissingField {
                row: index,
                field: field.clone(),
            }
        })?;
        attributes.insert(field.clone(), Value::String(value.clone()));
    }
    if let Some(pos) = &config.point_of_sale {
        attributes.insert(POINT_OF_SALE_KEY.to_string(), Value::String(pos.clone()));
    }
    attributes.insert(
        MODE_KEY.to_string(),
        Value::String(config.mode.as_str().to_string()),
    );
    Ok(GuestRecord(attributes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, &str)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn config(ids: &[&str], subs: &[&str]) -> GuestRecordConfig {
        GuestRecordConfig {
            mode: RecordMode::Upsert,
            identifiers: ids.iter().map(|s| s.to_string()).collect(),
            subscriptions: subs.iter().map(|s| s.to_string()).collect(),
            point_of_sale: Some("POS1".into()),
        }
    }

    #[test]
    fn drops_unselected_columns_and_orders_attributes() {
        let rows = vec![row(&[
            ("sub_news", "true"),
            ("email", "a@x.com"),
            ("id", "1"),
            ("nickname", "al"),
        ])];
        let records = build_guest_records(&rows, &config(&["id", "email"], &["sub_news"])).unwrap();

        assert_eq!(records.len(), 1);
        let keys: Vec<_> = records[0].keys().collect();
        assert_eq!(keys, vec!["id", "email", "sub_news", "pointOfSale", "mode"]);
        assert_eq!(records[0].get("nickname"), None);
        assert_eq!(records[0].get("mode"), Some("upsert"));
    }

    #[test]
    fn empty_identifiers_is_a_configuration_error() {
        let rows = vec![row(&[("id", "1")])];
        let err = build_guest_records(&rows, &config(&[], &["id"])).unwrap_err();
        assert_eq!(err, RecordError::NoIdentifiers);
    }

    #[test]
    fn missing_column_reports_row_and_field() {
        let rows = vec![row(&[("id", "1")]), row(&[("email", "b@x.com")])];
        let err = build_guest_records(&rows, &config(&["id"], &[])).unwrap_err();
        assert_eq!(
            err,
            RecordError::MissingField {
                row: 1,
                field: "id".into()
            }
        );
    }

    #[test]
    fn point_of_sale_is_omitted_when_unset() {
        let mut cfg = config(&["id"], &[]);
        cfg.point_of_sale = None;
        let records = build_guest_records(&[row(&[("id", "7")])], &cfg).unwrap();
        let keys: Vec<_> = records[0].keys().collect();
        assert_eq!(keys, vec!["id", "mode"]);
    }

    #[test]
    fn record_serializes_as_a_flat_object() {
        let records = build_guest_records(&[row(&[("id", "7")])], &config(&["id"], &[])).unwrap();
        assert_eq!(
            serde_json::to_string(&records[0]).unwrap(),
            r#"{"id":"7","pointOfSale":"POS1","mode":"upsert"}"#
        );
    }
}
