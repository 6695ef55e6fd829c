//! ETag-conditional cache policy
//!
//! Every request reaches the server. When a stored entry carries an `ETag`,
//! the request is sent with `If-None-Match`, and a `304 Not Modified` answer
//! is replaced by the stored response.

use std::sync::Arc;

use tracing::debug;

use super::clock::Clock;
use super::coordinator::WriteCoordinator;
use super::entry::CacheEntry;
use super::policy::{CacheLookup, ResponseCache};
use crate::error::CacheError;
use crate::http::{Headers, Response, STATUS_NOT_MODIFIED};

/// Caches responses purely by ETag validation
pub struct EtagCache {
    coordinator: Arc<WriteCoordinator>,
    clock: Arc<dyn Clock>,
}

impl EtagCache {
    pub fn new(coordinator: Arc<WriteCoordinator>, clock: Arc<dyn Clock>) -> Self {
        Self { coordinator, clock }
    }
}

impl ResponseCache for EtagCache {
    fn get_cache(
        &self,
        service: &str,
        url: &str,
        headers: &mut Headers,
    ) -> Result<CacheLookup, CacheError> {
        if let Some(hit) = self.coordinator.entry_store().get(service, url)? {
            if let Some(etag) = hit.headers()?.get("ETag") {
                debug!(service, url, etag, "Revalidating cached entry");
                headers.set("If-None-Match", etag);
            }
        }
        // Always revalidate with the server, even when the entry has no ETag
        Ok(CacheLookup::Miss)
    }

    fn process_response(
        &self,
        service: &str,
        url: &str,
        response: &Response,
    ) -> Result<Option<Response>, CacheError> {
        let existing = self.coordinator.entry_store().get(service, url)?;

        if response.status == STATUS_NOT_MODIFIED {
            let entry = existing.ok_or_else(|| CacheError::NotModifiedWithoutEntry {
                url: url.to_string(),
            })?;
            debug!(service, url, "Not modified, serving cached entry");
            return Ok(Some(entry.to_response()?));
        }

        let now = self.clock.now();
        let entry = match existing {
            Some(mut entry) => {
                entry.update_from_response(response, Some(now))?;
                entry
            }
            None => CacheEntry::from_response(service, url, response, Some(now))?,
        };

        match self.coordinator.store(entry) {
            Ok(()) => Ok(None),
            Err(e) if e.is_duplicate() => {
                debug!(service, url, "Lost cache insert race");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{EntryStore, ManualClock, MemoryStore};
    use chrono::{Duration, Utc};

    const SERVICE: &str = "spotseeker";
    const URL: &str = "/api/v1/spot/123";

    fn setup() -> (Arc<MemoryStore>, Arc<ManualClock>, EtagCache) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let coordinator = Arc::new(WriteCoordinator::new(store.clone()));
        let cache = EtagCache::new(coordinator, clock.clone());
        (store, clock, cache)
    }

    fn tagged(status: u16, body: &str, etag: &str) -> Response {
        Response::new(status, body).with_headers(Headers::new().with("ETag", etag))
    }

    #[test]
    fn test_get_cache_without_entry_adds_nothing() {
        let (_store, _clock, cache) = setup();
        let mut headers = Headers::new();

        let lookup = cache.get_cache(SERVICE, URL, &mut headers).expect("lookup");

        assert_eq!(lookup, CacheLookup::Miss);
        assert!(headers.is_empty());
    }

    #[test]
    fn test_get_cache_adds_if_none_match() {
        let (_store, _clock, cache) = setup();
        cache
            .process_response(SERVICE, URL, &tagged(200, "v1", "\"abc\""))
            .expect("process");

        let mut headers = Headers::new().with("Accept", "application/json");
        let lookup = cache.get_cache(SERVICE, URL, &mut headers).expect("lookup");

        assert_eq!(lookup, CacheLookup::Miss, "ETag policy never short-circuits");
        assert_eq!(headers.get("If-None-Match"), Some("\"abc\""));
        assert_eq!(headers.get("Accept"), Some("application/json"));
    }

    #[test]
    fn test_get_cache_without_etag_still_misses() {
        let (_store, _clock, cache) = setup();
        cache
            .process_response(SERVICE, URL, &Response::new(200, "untagged"))
            .expect("process");

        let mut headers = Headers::new();
        let lookup = cache.get_cache(SERVICE, URL, &mut headers).expect("lookup");

        assert_eq!(lookup, CacheLookup::Miss);
        assert!(!headers.contains("If-None-Match"));
    }

    #[test]
    fn test_not_modified_returns_stored_response() {
        let (_store, _clock, cache) = setup();
        let original = tagged(200, "{\"id\": 123}", "\"abc\"");
        cache.process_response(SERVICE, URL, &original).expect("process");

        let replacement = cache
            .process_response(SERVICE, URL, &Response::new(304, ""))
            .expect("process");

        assert_eq!(replacement, Some(original));
    }

    #[test]
    fn test_not_modified_without_entry_is_an_error() {
        let (_store, _clock, cache) = setup();

        let err = cache
            .process_response(SERVICE, URL, &Response::new(304, ""))
            .unwrap_err();

        assert!(matches!(err, CacheError::NotModifiedWithoutEntry { ref url } if url == URL));
    }

    #[test]
    fn test_new_response_replaces_entry_unconditionally() {
        let (store, clock, cache) = setup();
        cache
            .process_response(SERVICE, URL, &tagged(200, "good", "\"1\""))
            .expect("process");

        clock.advance(Duration::minutes(1));
        let replacement = cache
            .process_response(SERVICE, URL, &Response::new(500, "bad"))
            .expect("process");

        assert!(replacement.is_none());
        let stored = store.get(SERVICE, URL).expect("get").expect("row");
        assert_eq!(stored.status, 500);
        assert_eq!(stored.content, b"bad");
        assert_eq!(stored.time_saved, Some(clock.now()));
        assert_eq!(store.len(), 1);
    }
}
