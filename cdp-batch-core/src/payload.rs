//! ND-JSON encoding, gzip compression and checksum accounting for the batch payload.
//!
//! Everything here is pure: the same records always produce the same text, the same text
//! always produces the same compressed bytes, and [`PayloadInfo`] is always derived from
//! the exact bytes that get written to disk and uploaded.

use std::io::Write;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use flate2::write::GzEncoder;
use flate2::Compression;
use thiserror::Error;
use tracing::debug;

use crate::records::GuestRecord;
use crate::uploader::PayloadInfo;

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("failed to serialize guest record {index}: {source}")]
    Serialize {
        index: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("gzip compression failed: {0}")]
    Compress(#[from] std::io::Error),
}

/// Serialize each record as one JSON line. No enclosing array, no trailing newline.
pub fn encode_nd_json(records: &[GuestRecord]) -> Result<String, PayloadError> {
    let lines = records
        .iter()
        .enumerate()
        .map(|(index, record)| {
            serde_json::to_string(record).map_err(|source| PayloadError::Serialize { index, source })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(lines.join("\n"))
}

/// Gzip the UTF-8 bytes of `text`. The gzip header carries no mtime or file name.
pub fn compress(text: &str) -> Result<Vec<u8>, PayloadError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(text.as_bytes())?;
    Ok(encoder.finish()?)
}

/// Hex MD5 and length of `bytes`.
pub fn digest(bytes: &[u8]) -> PayloadInfo {
    PayloadInfo {
        checksum: format!("{:x}", md5::compute(bytes)),
        size: bytes.len() as u64,
    }
}

/// Base64 of the raw MD5 of `bytes`, as expected in a `Content-MD5` header.
pub fn content_md5(bytes: &[u8]) -> String {
    STANDARD.encode(md5::compute(bytes).0)
}

/// The compressed ND-JSON body together with its checksum and size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedPayload {
    bytes: Vec<u8>,
    info: PayloadInfo,
}

impl CompressedPayload {
    pub fn from_text(text: &str) -> Result<Self, PayloadError> {
        let bytes = compress(text)?;
        let info = digest(&bytes);
        debug!(
            text_bytes = text.len(),
            compressed_bytes = info.size,
            checksum = %info.checksum,
            "Payload compressed"
        );
        Ok(Self { bytes, info })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn info(&self) -> &PayloadInfo {
        &self.info
    }

    pub fn content_md5(&self) -> String {
        content_md5(&self.bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{build_guest_records, GuestRecordConfig, RecordMode};
    use crate::source::parse_csv;
    use flate2::read::GzDecoder;
    use std::io::Read;

    fn sample_records() -> Vec<GuestRecord> {
        let rows = parse_csv("id,email,sub_news\n1,a@x.com,true\n2,b@x.com,false").unwrap();
        let config = GuestRecordConfig {
            mode: RecordMode::Upsert,
            identifiers: vec!["id".into(), "email".into()],
            subscriptions: vec!["sub_news".into()],
            point_of_sale: Some("POS1".into()),
        };
        build_guest_records(&rows, &config).unwrap()
    }

    #[test]
    fn one_line_per_record_without_trailing_newline() {
        let text = encode_nd_json(&sample_records()).unwrap();
        assert_eq!(
            text,
            "{\"id\":\"1\",\"email\":\"a@x.com\",\"sub_news\":\"true\",\"pointOfSale\":\"POS1\",\"mode\":\"upsert\"}\n\
             {\"id\":\"2\",\"email\":\"b@x.com\",\"sub_news\":\"false\",\"pointOfSale\":\"POS1\",\"mode\":\"upsert\"}"
        );
    }

    #[test]
    fn no_records_encode_to_empty_text() {
        assert_eq!(encode_nd_json(&[]).unwrap(), "");
    }

    #[test]
    fn encoding_and_compression_are_deterministic() {
        let records = sample_records();
        let first = CompressedPayload::from_text(&encode_nd_json(&records).unwrap()).unwrap();
        let second = CompressedPayload::from_text(&encode_nd_json(&records).unwrap()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn decompressing_yields_the_original_text() {
        let text = encode_nd_json(&sample_records()).unwrap();
        let payload = CompressedPayload::from_text(&text).unwrap();

        let mut decoded = String::new();
        GzDecoder::new(payload.bytes())
            .read_to_string(&mut decoded)
            .unwrap();
        assert_eq!(decoded, text);
    }

    #[test]
    fn info_matches_the_compressed_bytes() {
        let payload = CompressedPayload::from_text("{\"id\":\"1\"}").unwrap();
        let independent = md5::compute(payload.bytes());
        assert_eq!(payload.info().checksum, format!("{:x}", independent));
        assert_eq!(payload.info().size, payload.bytes().len() as u64);
    }

    #[test]
    fn content_md5_is_base64_of_raw_digest() {
        // MD5("hello world") = 5eb63bbbe01eeed093cb22bb8f5acdc3
        assert_eq!(content_md5(b"hello world"), "XrY7u+Ae7tCTyyK7j1rNww==");
    }
}
