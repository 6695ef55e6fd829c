//! Data access: transports and the response mediator
//!
//! [`Dao`] runs one logical request for a service. GETs go through the
//! configured cache policy; POST, PUT and DELETE go straight to the
//! transport.

mod file;
mod live;
mod transport;

use std::sync::Arc;

use tracing::debug;

pub use file::{bundled_resource_dir, convert_to_platform_safe, FileTransport};
pub use live::{LiveTransport, OAuthConsumer};
pub use transport::Transport;

use crate::cache::{CacheLookup, ResponseCache, WriteCoordinator};
use crate::error::{CacheError, DataFailureError, TransportError};
use crate::http::{Headers, Method, Request, Response, STATUS_NOT_MODIFIED};

/// Mediates requests for one service between a cache policy and a transport
pub struct Dao {
    service: String,
    transport: Arc<dyn Transport>,
    cache: Arc<dyn ResponseCache>,
    coordinator: Arc<WriteCoordinator>,
}

impl Dao {
    pub fn new(
        service: impl Into<String>,
        transport: Arc<dyn Transport>,
        cache: Arc<dyn ResponseCache>,
        coordinator: Arc<WriteCoordinator>,
    ) -> Self {
        Self {
            service: service.into(),
            transport,
            cache,
            coordinator,
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    /// The coordinator cache writes go through, for wrapping a fan-out in a batch
    pub fn coordinator(&self) -> &WriteCoordinator {
        &self.coordinator
    }

    /// Fetches `url`, consulting the cache policy before and after
    ///
    /// A cache hit is returned without touching the transport. Otherwise the
    /// fetched response is returned unless the policy substitutes a stored
    /// one.
    pub async fn get_url(&self, url: &str, headers: Headers) -> Result<Response, DataFailureError> {
        let mut headers = headers;

        match self
            .cache
            .get_cache(&self.service, url, &mut headers)
            .map_err(|e| cache_failure(url, None, e))?
        {
            CacheLookup::Hit(response) => {
                debug!(service = %self.service, url, "Serving cached response");
                return Ok(response);
            }
            CacheLookup::Miss => {}
        }

        let response = self
            .transport
            .fetch(&Request::get(url, headers))
            .await
            .map_err(|e| transport_failure(url, e))?;

        let replacement = self
            .cache
            .process_response(&self.service, url, &response)
            .map_err(|e| cache_failure(url, Some(response.status), e))?;

        Ok(replacement.unwrap_or(response))
    }

    pub async fn post_url(
        &self,
        url: &str,
        headers: Headers,
        body: Option<String>,
    ) -> Result<Response, DataFailureError> {
        self.send(Method::Post, url, headers, body).await
    }

    pub async fn put_url(
        &self,
        url: &str,
        headers: Headers,
        body: Option<String>,
    ) -> Result<Response, DataFailureError> {
        self.send(Method::Put, url, headers, body).await
    }

    pub async fn delete_url(&self, url: &str, headers: Headers) -> Result<Response, DataFailureError> {
        self.send(Method::Delete, url, headers, None).await
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        headers: Headers,
        body: Option<String>,
    ) -> Result<Response, DataFailureError> {
        let request = Request {
            method,
            url: url.to_string(),
            headers,
            body,
        };
        self.transport
            .fetch(&request)
            .await
            .map_err(|e| transport_failure(url, e))
    }
}

fn transport_failure(url: &str, error: TransportError) -> DataFailureError {
    DataFailureError::new(url, None, error.to_string())
}

fn cache_failure(url: &str, status: Option<u16>, error: CacheError) -> DataFailureError {
    let status = match error {
        CacheError::NotModifiedWithoutEntry { .. } => Some(STATUS_NOT_MODIFIED),
        CacheError::Store(_) => status,
    };
    DataFailureError::new(url, status, error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CachePolicy, Clock, EntryStore, ManualClock, MemoryStore, TimedConfig};
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use std::sync::Mutex;

    /// Transport that replays canned responses and records requests
    struct ScriptedTransport {
        responses: Mutex<Vec<Response>>,
        requests: Mutex<Vec<Request>>,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<Response>) -> Self {
            Self {
                responses: Mutex::new(responses),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn requests(&self) -> Vec<Request> {
            self.requests.lock().expect("lock").clone()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn fetch(&self, request: &Request) -> Result<Response, TransportError> {
            self.requests.lock().expect("lock").push(request.clone());
            let mut responses = self.responses.lock().expect("lock");
            Ok(if responses.is_empty() {
                Response::new(404, "")
            } else {
                responses.remove(0)
            })
        }
    }

    struct Harness {
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
        transport: Arc<ScriptedTransport>,
        dao: Dao,
    }

    fn harness(policy: CachePolicy, responses: Vec<Response>) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let coordinator = Arc::new(WriteCoordinator::new(store.clone()));
        let cache = policy.build(coordinator.clone(), clock.clone());
        let transport = Arc::new(ScriptedTransport::new(responses));
        let dao = Dao::new("spotseeker", transport.clone(), cache, coordinator);
        Harness {
            store,
            clock,
            transport,
            dao,
        }
    }

    const URL: &str = "/api/v1/spot/123";

    #[tokio::test]
    async fn test_no_cache_always_fetches() {
        let h = harness(
            CachePolicy::None,
            vec![Response::new(200, "one"), Response::new(200, "two")],
        );

        assert_eq!(h.dao.get_url(URL, Headers::new()).await.expect("get").body, b"one");
        assert_eq!(h.dao.get_url(URL, Headers::new()).await.expect("get").body, b"two");
        assert_eq!(h.transport.requests().len(), 2);
        assert!(h.store.is_empty());
    }

    #[tokio::test]
    async fn test_timed_hit_skips_transport() {
        let h = harness(
            CachePolicy::Timed(TimedConfig::simple()),
            vec![Response::new(200, "first"), Response::new(200, "second")],
        );

        let first = h.dao.get_url(URL, Headers::new()).await.expect("get");
        h.clock.advance(Duration::seconds(30));
        let second = h.dao.get_url(URL, Headers::new()).await.expect("get");

        assert_eq!(first.body, b"first");
        assert_eq!(second.body, b"first");
        assert_eq!(h.transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_timed_error_falls_back_to_recent_success() {
        let h = harness(
            CachePolicy::Timed(TimedConfig::simple()),
            vec![Response::new(200, "good"), Response::new(503, "down")],
        );

        h.dao.get_url(URL, Headers::new()).await.expect("get");
        h.clock.advance(Duration::minutes(5));
        let response = h.dao.get_url(URL, Headers::new()).await.expect("get");

        assert_eq!(response.status, 200);
        assert_eq!(response.body, b"good");
        assert_eq!(h.transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_etag_sends_conditional_request_and_serves_stored_on_304() {
        let h = harness(
            CachePolicy::ETag,
            vec![
                Response::new(200, "spot").with_headers(Headers::new().with("ETag", "\"v1\"")),
                Response::new(304, ""),
            ],
        );

        let first = h.dao.get_url(URL, Headers::new()).await.expect("get");
        let second = h.dao.get_url(URL, Headers::new()).await.expect("get");

        assert_eq!(first, second);
        let requests = h.transport.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].headers.get("If-None-Match").is_none());
        assert_eq!(requests[1].headers.get("If-None-Match"), Some("\"v1\""));
    }

    #[tokio::test]
    async fn test_etag_304_without_entry_is_data_failure() {
        let h = harness(CachePolicy::ETag, vec![Response::new(304, "")]);

        let err = h.dao.get_url(URL, Headers::new()).await.unwrap_err();

        assert_eq!(err.url, URL);
        assert_eq!(err.status, Some(304));
    }

    #[tokio::test]
    async fn test_non_get_requests_bypass_cache() {
        let h = harness(
            CachePolicy::Timed(TimedConfig::simple()),
            vec![Response::new(201, ""), Response::new(204, ""), Response::new(204, "")],
        );

        let posted = h
            .dao
            .post_url("/api/v1/spot", Headers::new(), Some("{}".to_string()))
            .await
            .expect("post");
        let put = h
            .dao
            .put_url(URL, Headers::new(), Some("{}".to_string()))
            .await
            .expect("put");
        let deleted = h.dao.delete_url(URL, Headers::new()).await.expect("delete");

        assert_eq!((posted.status, put.status, deleted.status), (201, 204, 204));
        let methods: Vec<Method> = h.transport.requests().iter().map(|r| r.method).collect();
        assert_eq!(methods, vec![Method::Post, Method::Put, Method::Delete]);
        assert!(h.store.is_empty());
    }

    #[tokio::test]
    async fn test_storage_failure_surfaces_as_data_failure() {
        let h = harness(CachePolicy::Timed(TimedConfig::simple()), Vec::new());
        let corrupt = crate::cache::CacheEntry::from_response(
            "spotseeker",
            URL,
            &Response::new(200, "").with_headers(Headers::new().with("ETag", "\"v1\"")),
            Some(h.clock.now()),
        )
        .expect("entry");
        h.store.insert(&corrupt).expect("insert");
        // Replace the row with one whose header blob can't be decoded
        let json = serde_json::to_string(&corrupt)
            .expect("serialize")
            .replace("\"v1:", "\"v9:");
        let broken: crate::cache::CacheEntry = serde_json::from_str(&json).expect("deserialize");
        h.store.update(&broken).expect("update");

        let err = h.dao.get_url(URL, Headers::new()).await.unwrap_err();
        assert_eq!(err.url, URL);
        assert!(err.msg.contains("Corrupt"));
        assert!(h.transport.requests().is_empty());
    }
}
