//! The transport seam between the mediator and the network

use async_trait::async_trait;

use crate::error::TransportError;
use crate::http::{Request, Response};

/// Performs a single HTTP exchange
///
/// Non-2xx statuses are responses, not errors; an `Err` means no response
/// was obtained at all.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short name for logging
    fn name(&self) -> &str;

    async fn fetch(&self, request: &Request) -> Result<Response, TransportError>;
}
