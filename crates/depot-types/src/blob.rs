use std::fmt;

use bytes::Bytes;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::blob_id::BlobId;
use crate::error::TypeError;
use crate::headers::Headers;

/// Hex-encoded content digest.
///
/// Callers that stream a file into a store compute the digest up front and
/// pass it along; in-memory content is hashed with BLAKE3.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentHash(String);

impl ContentHash {
    /// BLAKE3 digest of `data`.
    pub fn of(data: &[u8]) -> Self {
        Self(blake3::hash(data).to_hex().to_string())
    }

    /// Parse a hex digest. Accepts any even-length, non-empty hex string.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        if bytes.is_empty() {
            return Err(TypeError::InvalidLength {
                expected: 1,
                actual: 0,
            });
        }
        Ok(Self(hex::encode(bytes)))
    }

    /// The lowercase hex digest.
    pub fn as_hex(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short = self.0.get(..8).unwrap_or(&self.0);
        write!(f, "ContentHash({short})")
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Size, digest and creation time of a stored blob.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobMetrics {
    pub creation_time: NaiveDateTime,
    pub content_hash: ContentHash,
    pub content_size: u64,
}

/// An immutable blob: content, headers and metrics under one [`BlobId`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Blob {
    id: BlobId,
    headers: Headers,
    content: Bytes,
    metrics: BlobMetrics,
}

impl Blob {
    pub fn new(id: BlobId, headers: Headers, content: Bytes, metrics: BlobMetrics) -> Self {
        Self {
            id,
            headers,
            content,
            metrics,
        }
    }

    pub fn id(&self) -> &BlobId {
        &self.id
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// The blob content. Cloning the returned `Bytes` is cheap.
    pub fn content(&self) -> &Bytes {
        &self.content
    }

    pub fn metrics(&self) -> &BlobMetrics {
        &self.metrics
    }

    /// Same content and metrics under a different identifier.
    pub fn with_id(&self, id: BlobId, headers: Headers) -> Self {
        Self {
            id,
            headers,
            content: self.content.clone(),
            metrics: self.metrics.clone(),
        }
    }
}
