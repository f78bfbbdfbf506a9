//! Inline audio payloads
//!
//! Synthesized speech arrives as an ordered sequence of byte chunks. The
//! chunks are concatenated in arrival order and shipped to the client as a
//! base64 `data:` URI.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use futures::{Stream, StreamExt};

use crate::{Error, Result};

/// MIME type of synthesized speech
pub const MPEG_MIME: &str = "audio/mpeg";

/// Decoded `data:` URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUri {
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// Drain a chunk stream into one buffer, preserving arrival order
///
/// # Errors
///
/// Returns the first error yielded by the stream; bytes read so far are dropped
pub async fn collect_chunks<S>(stream: S) -> Result<Vec<u8>>
where
    S: Stream<Item = Result<Bytes>>,
{
    futures::pin_mut!(stream);

    let mut buffer = Vec::new();
    let mut chunks = 0usize;
    while let Some(chunk) = stream.next().await {
        buffer.extend_from_slice(&chunk?);
        chunks += 1;
    }

    tracing::trace!(chunks, bytes = buffer.len(), "audio stream collected");
    Ok(buffer)
}

/// Encode bytes as a base64 `data:` URI
#[must_use]
pub fn encode(mime_type: &str, data: &[u8]) -> String {
    format!("data:{mime_type};base64,{}", STANDARD.encode(data))
}

/// Decode a base64 `data:` URI
///
/// # Errors
///
/// Returns error if the URI is not a base64 `data:` URI or the payload is invalid
pub fn decode(uri: &str) -> Result<DataUri> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| Error::DataUri("missing data: scheme".to_string()))?;

    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| Error::DataUri("missing payload separator".to_string()))?;

    let mime_type = header
        .strip_suffix(";base64")
        .ok_or_else(|| Error::DataUri("only base64 payloads are supported".to_string()))?;

    let data = STANDARD
        .decode(payload)
        .map_err(|e| Error::DataUri(format!("invalid base64: {e}")))?;

    Ok(DataUri {
        mime_type: mime_type.to_string(),
        data,
    })
}
