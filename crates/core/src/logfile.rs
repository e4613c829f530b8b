//! CloudTrail log object decoding.
//!
//! CloudTrail delivers `{"Records": [...]}` documents, normally gzip
//! compressed. Compression is detected from the magic bytes rather than the
//! object key, so uncompressed test fixtures decode the same way.

use async_compression::tokio::bufread::GzipDecoder;
use serde::Deserialize;
use serde_json::Value;
use tokio::io::AsyncReadExt;

use crate::error::SourceError;

/// Upper bound on the decompressed size of one log object.
pub const MAX_DECODED_BYTES: u64 = 256 * 1024 * 1024;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Deserialize)]
struct LogDocument {
    #[serde(rename = "Records")]
    records: Vec<Value>,
}

/// True when `body` starts with the gzip magic bytes.
pub fn is_gzip(body: &[u8]) -> bool {
    body.starts_with(&GZIP_MAGIC)
}

/// Decodes a log object body into its raw records.
///
/// Records are returned unvalidated; a structurally bad record must not
/// prevent the rest of the object from being processed.
pub async fn decode_records(body: &[u8]) -> Result<Vec<Value>, SourceError> {
    let json = if is_gzip(body) {
        gunzip(body).await?
    } else {
        body.to_vec()
    };
    let document: LogDocument =
        serde_json::from_slice(&json).map_err(|e| SourceError::Decode(e.to_string()))?;
    Ok(document.records)
}

async fn gunzip(body: &[u8]) -> Result<Vec<u8>, SourceError> {
    let mut decoded = Vec::new();
    GzipDecoder::new(body)
        .take(MAX_DECODED_BYTES + 1)
        .read_to_end(&mut decoded)
        .await
        .map_err(|e| SourceError::Decode(format!("gzip: {e}")))?;
    if decoded.len() as u64 > MAX_DECODED_BYTES {
        return Err(SourceError::Decode(format!(
            "decompressed object exceeds {MAX_DECODED_BYTES} bytes"
        )));
    }
    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use async_compression::tokio::write::GzipEncoder;
    use tokio::io::AsyncWriteExt;

    use super::*;

    const DOC: &str = r#"{"Records":[{"eventName":"ConsoleLogin"},{"eventName":"GetObject"}]}"#;

    async fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzipEncoder::new(Vec::new());
        encoder.write_all(data).await.unwrap();
        encoder.shutdown().await.unwrap();
        encoder.into_inner()
    }

    #[tokio::test]
    async fn decodes_plain_json() {
        let records = decode_records(DOC.as_bytes()).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["eventName"], "ConsoleLogin");
    }

    #[tokio::test]
    async fn decodes_gzip_json() {
        let body = gzip(DOC.as_bytes()).await;
        assert!(is_gzip(&body));
        let records = decode_records(&body).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1]["eventName"], "GetObject");
    }

    #[tokio::test]
    async fn empty_records_list_is_ok() {
        let records = decode_records(br#"{"Records":[]}"#).await.unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn missing_records_key_is_decode_error() {
        let err = decode_records(br#"{"logEvents":[]}"#).await.unwrap_err();
        assert!(matches!(err, SourceError::Decode(_)));
    }

    #[tokio::test]
    async fn corrupt_gzip_is_decode_error() {
        let err = decode_records(&[0x1f, 0x8b, 0x00, 0x01, 0x02])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("gzip"));
    }

    #[tokio::test]
    async fn keeps_malformed_records_for_caller() {
        let records = decode_records(br#"{"Records":[{"noEventName":true}, 5]}"#)
            .await
            .unwrap();
        assert_eq!(records.len(), 2);
    }
}
