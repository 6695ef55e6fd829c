//! Error types for the Spotseeker client
//!
//! Internal layers each have their own error enum. Everything a caller of
//! [`Dao`](crate::dao::Dao) or [`SpotseekerClient`](crate::data::SpotseekerClient)
//! sees is folded into a single [`DataFailureError`].

use thiserror::Error;

/// Errors raised by an [`EntryStore`](crate::cache::EntryStore)
#[derive(Debug, Error)]
pub enum StoreError {
    /// Another writer already inserted a row for this key
    #[error("Cache entry already exists for {service} {url}")]
    Duplicate { service: String, url: String },

    /// Reading or writing the backing storage failed
    #[error("Cache storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// An entry could not be serialized
    #[error("Failed to encode cache entry: {0}")]
    Encoding(#[from] serde_json::Error),

    /// A stored entry could not be decoded
    #[error("Corrupt cache entry: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Whether this error is the benign outcome of losing an insert race
    pub fn is_duplicate(&self) -> bool {
        matches!(self, StoreError::Duplicate { .. })
    }
}

/// Errors raised while a cache policy makes its decision
#[derive(Debug, Error)]
pub enum CacheError {
    /// The server answered 304 but there is nothing stored to validate against
    #[error("304 Not Modified received for {url}, but no cached entry exists")]
    NotModifiedWithoutEntry { url: String },

    /// The underlying store failed for a reason other than a duplicate key
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors raised by a [`Transport`](crate::dao::Transport)
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Reading a fixture file failed
    #[error("Failed to read mock resource: {0}")]
    Io(#[from] std::io::Error),

    /// A fixture's `.http-headers` sidecar was not valid JSON
    #[error("Invalid mock headers file: {0}")]
    InvalidHeaders(#[from] serde_json::Error),

    /// A request URL could not be prepared for signing
    #[error("Invalid request URL: {0}")]
    InvalidUrl(String),
}

/// The error every caller-facing operation returns
///
/// Carries the URL that was requested, the HTTP status that was observed (if
/// any), and a diagnostic message.
#[derive(Debug, Error)]
#[error("Error fetching {url}. Status code: {}. Message: {msg}.", status_text(.status))]
pub struct DataFailureError {
    pub url: String,
    pub status: Option<u16>,
    pub msg: String,
}

impl DataFailureError {
    pub fn new(url: impl Into<String>, status: Option<u16>, msg: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status,
            msg: msg.into(),
        }
    }
}

fn status_text(status: &Option<u16>) -> String {
    match status {
        Some(status) => status.to_string(),
        None => "none".to_string(),
    }
}
