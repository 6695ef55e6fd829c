//! The cache policy contract and policy selection
//!
//! A policy is consulted twice per GET: [`ResponseCache::get_cache`] before
//! the fetch, and [`ResponseCache::process_response`] after it. Which policy
//! a client uses is picked once, from a [`CachePolicy`] value, when the
//! client is built.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::clock::Clock;
use super::coordinator::WriteCoordinator;
use super::etag::EtagCache;
use super::timed::{TimedCache, TimedConfig};
use crate::error::CacheError;
use crate::http::{Headers, Response};

/// Result of consulting a policy before fetching
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    /// Nothing usable is cached; fetch from the transport
    Miss,
    /// Use this response and skip the fetch entirely
    Hit(Response),
}

/// A strategy deciding when cached responses replace live fetches
pub trait ResponseCache: Send + Sync {
    /// Called before fetching
    ///
    /// May add conditional-request headers to `headers`; those are used for
    /// the fetch when the lookup is a [`CacheLookup::Miss`].
    fn get_cache(
        &self,
        service: &str,
        url: &str,
        headers: &mut Headers,
    ) -> Result<CacheLookup, CacheError>;

    /// Called with the fetched response
    ///
    /// Returns a replacement response when the policy decides the stored
    /// one is authoritative, `None` to keep the fetched response.
    fn process_response(
        &self,
        service: &str,
        url: &str,
        response: &Response,
    ) -> Result<Option<Response>, CacheError>;
}

/// Never caches anything; every request goes to the server
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCache;

impl ResponseCache for NoCache {
    fn get_cache(&self, _: &str, _: &str, _: &mut Headers) -> Result<CacheLookup, CacheError> {
        Ok(CacheLookup::Miss)
    }

    fn process_response(&self, _: &str, _: &str, _: &Response) -> Result<Option<Response>, CacheError> {
        Ok(None)
    }
}

/// Which cache policy a client uses
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CachePolicy {
    /// No caching
    #[default]
    None,
    /// Serve stored responses younger than a fixed age
    Timed(TimedConfig),
    /// Always fetch, revalidating stored responses with their ETag
    #[serde(rename = "etag")]
    ETag,
}

impl CachePolicy {
    /// Builds the policy, writing through `coordinator` and reading time from `clock`
    pub fn build(
        &self,
        coordinator: Arc<WriteCoordinator>,
        clock: Arc<dyn Clock>,
    ) -> Arc<dyn ResponseCache> {
        match self {
            CachePolicy::None => Arc::new(NoCache),
            CachePolicy::Timed(config) => Arc::new(TimedCache::new(*config, coordinator, clock)),
            CachePolicy::ETag => Arc::new(EtagCache::new(coordinator, clock)),
        }
    }
}
