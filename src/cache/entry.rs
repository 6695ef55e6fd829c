//! Persisted cache entries and their header encoding
//!
//! Headers are stored as an opaque text blob so a store only has to persist
//! plain columns. The blob format is versioned: `v1:` followed by the
//! standard base64 encoding of a JSON array of `[name, value]` pairs, in the
//! order the headers were received.

use std::sync::OnceLock;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::http::{Headers, Response};

/// Version prefix for the current header blob encoding
const HEADER_BLOB_V1: &str = "v1:";

/// Encodes a header mapping into its stored text form
pub fn encode_headers(headers: &Headers) -> Result<String, StoreError> {
    let json = serde_json::to_vec(headers)?;
    Ok(format!("{}{}", HEADER_BLOB_V1, STANDARD.encode(json)))
}

/// Decodes a stored header blob
///
/// An empty blob decodes to an empty mapping. Unknown version prefixes and
/// malformed payloads are reported as [`StoreError::Corrupt`].
pub fn decode_headers(blob: &str) -> Result<Headers, StoreError> {
    if blob.is_empty() {
        return Ok(Headers::new());
    }

    let payload = blob
        .strip_prefix(HEADER_BLOB_V1)
        .ok_or_else(|| StoreError::Corrupt(format!("unknown header encoding: {:.8}", blob)))?;

    let json = STANDARD
        .decode(payload)
        .map_err(|e| StoreError::Corrupt(format!("invalid header base64: {}", e)))?;

    serde_json::from_slice(&json)
        .map_err(|e| StoreError::Corrupt(format!("invalid header JSON: {}", e)))
}

/// Serializes response bodies as standard base64 so binary content survives
/// a JSON-backed store
mod content_base64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(content: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(content))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

/// One cached response, keyed by `(service, url)`
///
/// `time_saved` is only present for entries written by the time-aware
/// policies; entries without it never satisfy an age-filtered query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub service: String,
    pub url: String,
    pub status: u16,
    header_blob: String,
    #[serde(with = "content_base64")]
    pub content: Vec<u8>,
    #[serde(default)]
    pub time_saved: Option<DateTime<Utc>>,
    /// Set when the entry was loaded from a store, so a save updates instead of inserting
    #[serde(skip)]
    persisted: bool,
    #[serde(skip)]
    decoded_headers: OnceLock<Headers>,
}

impl CacheEntry {
    /// Creates a new, not yet persisted entry from a response
    pub fn from_response(
        service: &str,
        url: &str,
        response: &Response,
        time_saved: Option<DateTime<Utc>>,
    ) -> Result<Self, StoreError> {
        let mut entry = Self {
            service: service.to_string(),
            url: url.to_string(),
            status: response.status,
            header_blob: String::new(),
            content: response.body.clone(),
            time_saved,
            persisted: false,
            decoded_headers: OnceLock::new(),
        };
        entry.set_headers(response.headers.clone())?;
        Ok(entry)
    }

    /// Overwrites this entry's response data in place, keeping its identity
    pub fn update_from_response(
        &mut self,
        response: &Response,
        time_saved: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        self.status = response.status;
        self.content = response.body.clone();
        self.time_saved = time_saved;
        self.set_headers(response.headers.clone())
    }

    /// Returns the stored headers, decoding the blob on first access
    pub fn headers(&self) -> Result<&Headers, StoreError> {
        if let Some(headers) = self.decoded_headers.get() {
            return Ok(headers);
        }
        let decoded = decode_headers(&self.header_blob)?;
        Ok(self.decoded_headers.get_or_init(|| decoded))
    }

    /// Replaces the headers and re-encodes the stored blob
    pub fn set_headers(&mut self, headers: Headers) -> Result<(), StoreError> {
        self.header_blob = encode_headers(&headers)?;
        self.decoded_headers = OnceLock::from(headers);
        Ok(())
    }

    /// The encoded header blob as it is persisted
    pub fn header_blob(&self) -> &str {
        &self.header_blob
    }

    /// Whether this entry was read from a store
    pub fn is_persisted(&self) -> bool {
        self.persisted
    }

    pub(crate) fn mark_persisted(mut self) -> Self {
        self.persisted = true;
        self
    }

    /// Time elapsed since the entry was saved, if it carries a timestamp
    pub fn age(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.time_saved.map(|saved| now - saved)
    }

    /// Reconstructs the cached response
    pub fn to_response(&self) -> Result<Response, StoreError> {
        Ok(Response::new(self.status, self.content.clone()).with_headers(self.headers()?.clone()))
    }
}
