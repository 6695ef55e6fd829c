//! Time-windowed cache policy
//!
//! Serves any stored response younger than `max_age_seconds` without
//! contacting the server. Two refinements keep errors from sticking:
//!
//! - A stored error response is only served while it is younger than
//!   `max_error_age_seconds`; after that the request is retried.
//! - A fresh error never replaces a successful entry that is younger than
//!   `overwrite_success_with_error_after`; the stored success is returned
//!   instead.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::clock::Clock;
use super::coordinator::WriteCoordinator;
use super::entry::CacheEntry;
use super::policy::{CacheLookup, ResponseCache};
use crate::error::CacheError;
use crate::http::{Headers, Response, STATUS_OK};

/// Default for how long a stored error response is served (5 minutes)
pub const DEFAULT_MAX_ERROR_AGE_SECONDS: u64 = 60 * 5;

/// Default for how long a success is protected from being overwritten by an error (8 hours)
pub const DEFAULT_OVERWRITE_SUCCESS_WITH_ERROR_AFTER: u64 = 60 * 60 * 8;

fn default_max_error_age() -> u64 {
    DEFAULT_MAX_ERROR_AGE_SECONDS
}

fn default_overwrite_after() -> u64 {
    DEFAULT_OVERWRITE_SUCCESS_WITH_ERROR_AFTER
}

/// Parameters of a [`TimedCache`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimedConfig {
    /// Maximum age of a stored response that may be served. Zero disables hits.
    pub max_age_seconds: u64,
    #[serde(default = "default_max_error_age")]
    pub max_error_age_seconds: u64,
    #[serde(default = "default_overwrite_after")]
    pub overwrite_success_with_error_after: u64,
}

impl TimedConfig {
    pub fn with_max_age(max_age_seconds: u64) -> Self {
        Self {
            max_age_seconds,
            max_error_age_seconds: DEFAULT_MAX_ERROR_AGE_SECONDS,
            overwrite_success_with_error_after: DEFAULT_OVERWRITE_SUCCESS_WITH_ERROR_AFTER,
        }
    }

    /// Caches every url for 60 seconds
    pub fn simple() -> Self {
        Self::with_max_age(60)
    }

    /// Caches every url for 4 hours, for resources that don't send a useful
    /// expiry and aren't worth an ETag round trip
    pub fn four_hour() -> Self {
        Self::with_max_age(60 * 60 * 4)
    }

    pub fn max_error_age(mut self, seconds: u64) -> Self {
        self.max_error_age_seconds = seconds;
        self
    }

    pub fn overwrite_success_with_error_after(mut self, seconds: u64) -> Self {
        self.overwrite_success_with_error_after = seconds;
        self
    }
}

/// Serves stored responses for a fixed time window
pub struct TimedCache {
    config: TimedConfig,
    coordinator: Arc<WriteCoordinator>,
    clock: Arc<dyn Clock>,
}

impl TimedCache {
    pub fn new(config: TimedConfig, coordinator: Arc<WriteCoordinator>, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            coordinator,
            clock,
        }
    }

    pub fn config(&self) -> &TimedConfig {
        &self.config
    }
}

/// Largest window chrono can represent as a `Duration`
const MAX_WINDOW_SECONDS: u64 = (i64::MAX / 1000) as u64;

fn seconds(value: u64) -> Duration {
    Duration::seconds(value.min(MAX_WINDOW_SECONDS) as i64)
}

/// `now` minus `value` seconds, saturating at the earliest representable time
fn seconds_before(now: DateTime<Utc>, value: u64) -> DateTime<Utc> {
    now.checked_sub_signed(seconds(value))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

impl ResponseCache for TimedCache {
    fn get_cache(
        &self,
        service: &str,
        url: &str,
        _headers: &mut Headers,
    ) -> Result<CacheLookup, CacheError> {
        // A zero window would still match an entry saved this same instant
        if self.config.max_age_seconds == 0 {
            return Ok(CacheLookup::Miss);
        }

        let now = self.clock.now();
        let time_limit = seconds_before(now, self.config.max_age_seconds);

        let store = self.coordinator.entry_store();
        let Some(hit) = store.query(service, url, time_limit)? else {
            debug!(service, url, "Timed cache miss");
            return Ok(CacheLookup::Miss);
        };

        if hit.status != STATUS_OK {
            let error_limit = seconds_before(now, self.config.max_error_age_seconds);
            if hit.time_saved.is_some_and(|saved| error_limit > saved) {
                debug!(service, url, status = hit.status, "Stored error too old, retrying");
                return Ok(CacheLookup::Miss);
            }
        }

        debug!(service, url, status = hit.status, "Timed cache hit");
        Ok(CacheLookup::Hit(hit.to_response()?))
    }

    fn process_response(
        &self,
        service: &str,
        url: &str,
        response: &Response,
    ) -> Result<Option<Response>, CacheError> {
        let now = self.clock.now();
        let existing = self.coordinator.entry_store().get(service, url)?;

        if response.status != STATUS_OK {
            if let Some(current) = existing.as_ref().filter(|e| e.status == STATUS_OK) {
                let protected = seconds(self.config.overwrite_success_with_error_after);
                if current.age(now).is_some_and(|age| age < protected) {
                    debug!(
                        service,
                        url,
                        status = response.status,
                        "Keeping recent successful entry over error response"
                    );
                    return Ok(Some(current.to_response()?));
                }
            }
        }

        let entry = match existing {
            Some(mut entry) => {
                entry.update_from_response(response, Some(now))?;
                entry
            }
            None => CacheEntry::from_response(service, url, response, Some(now))?,
        };

        match self.coordinator.store(entry) {
            Ok(()) => Ok(None),
            // Someone else saved an entry first; that one is recent enough
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

    const SERVICE: &str = "spotseeker";
    const URL: &str = "/api/v1/spot/123";

    struct Fixture {
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
        cache: TimedCache,
    }

    fn fixture(config: TimedConfig) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let coordinator = Arc::new(WriteCoordinator::new(store.clone()));
        let cache = TimedCache::new(config, coordinator, clock.clone());
        Fixture { store, clock, cache }
    }

    fn lookup(cache: &TimedCache) -> CacheLookup {
        cache.get_cache(SERVICE, URL, &mut Headers::new()).expect("lookup")
    }

    #[test]
    fn test_presets() {
        assert_eq!(TimedConfig::simple().max_age_seconds, 60);
        assert_eq!(TimedConfig::four_hour().max_age_seconds, 14_400);
        assert_eq!(TimedConfig::simple().max_error_age_seconds, 300);
        assert_eq!(TimedConfig::simple().overwrite_success_with_error_after, 28_800);
    }

    #[test]
    fn test_miss_when_nothing_stored() {
        let f = fixture(TimedConfig::simple());
        assert_eq!(lookup(&f.cache), CacheLookup::Miss);
    }

    #[test]
    fn test_hit_within_window() {
        let f = fixture(TimedConfig::simple());
        f.cache
            .process_response(SERVICE, URL, &Response::new(200, "fresh"))
            .expect("process");

        f.clock.advance(Duration::seconds(59));
        assert_eq!(lookup(&f.cache), CacheLookup::Hit(Response::new(200, "fresh")));
    }

    #[test]
    fn test_miss_after_window() {
        let f = fixture(TimedConfig::simple());
        f.cache
            .process_response(SERVICE, URL, &Response::new(200, "fresh"))
            .expect("process");

        f.clock.advance(Duration::seconds(61));
        assert_eq!(lookup(&f.cache), CacheLookup::Miss);
    }

    #[test]
    fn test_zero_max_age_always_misses() {
        let f = fixture(TimedConfig::with_max_age(0));
        f.cache
            .process_response(SERVICE, URL, &Response::new(200, "now"))
            .expect("process");

        assert_eq!(f.store.len(), 1, "Responses are still stored");
        assert_eq!(lookup(&f.cache), CacheLookup::Miss);
    }

    #[test]
    fn test_recent_error_is_served() {
        let f = fixture(TimedConfig::four_hour());
        f.cache
            .process_response(SERVICE, URL, &Response::new(503, "down"))
            .expect("process");

        f.clock.advance(Duration::seconds(120));
        assert_eq!(lookup(&f.cache), CacheLookup::Hit(Response::new(503, "down")));
    }

    #[test]
    fn test_old_error_is_retried() {
        let f = fixture(TimedConfig::four_hour());
        f.cache
            .process_response(SERVICE, URL, &Response::new(503, "down"))
            .expect("process");

        f.clock.advance(Duration::seconds(301));
        assert_eq!(lookup(&f.cache), CacheLookup::Miss);
    }

    #[test]
    fn test_old_success_is_still_served() {
        let f = fixture(TimedConfig::four_hour());
        f.cache
            .process_response(SERVICE, URL, &Response::new(200, "ok"))
            .expect("process");

        f.clock.advance(Duration::hours(3));
        assert_eq!(lookup(&f.cache), CacheLookup::Hit(Response::new(200, "ok")));
    }

    #[test]
    fn test_error_does_not_clobber_recent_success() {
        let f = fixture(TimedConfig::simple());
        let ok = Response::new(200, "good").with_headers(Headers::new().with("ETag", "\"1\""));
        f.cache.process_response(SERVICE, URL, &ok).expect("process");

        f.clock.advance(Duration::hours(1));
        let replacement = f
            .cache
            .process_response(SERVICE, URL, &Response::new(500, "bad"))
            .expect("process");

        assert_eq!(replacement, Some(ok.clone()));
        let stored = f.store.get(SERVICE, URL).expect("get").expect("row");
        assert_eq!(stored.status, 200);
        assert_eq!(stored.content, b"good");
    }

    #[test]
    fn test_error_overwrites_old_success() {
        let f = fixture(TimedConfig::simple());
        f.cache
            .process_response(SERVICE, URL, &Response::new(200, "good"))
            .expect("process");

        f.clock.advance(Duration::hours(9));
        let replacement = f
            .cache
            .process_response(SERVICE, URL, &Response::new(500, "bad"))
            .expect("process");

        assert!(replacement.is_none());
        let stored = f.store.get(SERVICE, URL).expect("get").expect("row");
        assert_eq!(stored.status, 500);
        assert_eq!(stored.content, b"bad");
        assert_eq!(f.store.len(), 1);
    }

    #[test]
    fn test_error_overwrites_previous_error() {
        let f = fixture(TimedConfig::simple());
        f.cache
            .process_response(SERVICE, URL, &Response::new(500, "first"))
            .expect("process");
        f.clock.advance(Duration::seconds(10));
        let replacement = f
            .cache
            .process_response(SERVICE, URL, &Response::new(404, "second"))
            .expect("process");

        assert!(replacement.is_none());
        assert_eq!(f.store.get(SERVICE, URL).expect("get").expect("row").status, 404);
    }

    #[test]
    fn test_save_stamps_time_and_headers() {
        let f = fixture(TimedConfig::simple());
        let response = Response::new(200, "body").with_headers(Headers::new().with("ETag", "\"x\""));
        f.cache.process_response(SERVICE, URL, &response).expect("process");

        let stored = f.store.get(SERVICE, URL).expect("get").expect("row");
        assert_eq!(stored.time_saved, Some(f.clock.now()));
        assert_eq!(stored.headers().expect("headers").get("etag"), Some("\"x\""));
    }

    /// Store where another writer always inserts the key just before us
    struct RacingStore {
        inner: MemoryStore,
    }

    impl EntryStore for RacingStore {
        fn get(&self, service: &str, url: &str) -> Result<Option<CacheEntry>, crate::error::StoreError> {
            self.inner.get(service, url)
        }

        fn insert(&self, entry: &CacheEntry) -> Result<(), crate::error::StoreError> {
            let winner = CacheEntry::from_response(
                &entry.service,
                &entry.url,
                &Response::new(200, "winner"),
                entry.time_saved,
            )?;
            self.inner.insert(&winner)?;
            self.inner.insert(entry)
        }

        fn update(&self, entry: &CacheEntry) -> Result<(), crate::error::StoreError> {
            self.inner.update(entry)
        }
    }

    #[test]
    fn test_lost_insert_race_is_not_an_error() {
        let store = Arc::new(RacingStore {
            inner: MemoryStore::new(),
        });
        let coordinator = Arc::new(WriteCoordinator::new(store.clone()));
        let cache = TimedCache::new(
            TimedConfig::simple(),
            coordinator,
            Arc::new(ManualClock::new(Utc::now())),
        );

        let result = cache
            .process_response(SERVICE, URL, &Response::new(200, "loser"))
            .expect("a lost race is not an error");

        assert!(result.is_none());
        assert_eq!(store.inner.len(), 1);
        assert_eq!(store.inner.get(SERVICE, URL).expect("get").expect("row").content, b"winner");
    }
}
