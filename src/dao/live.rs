//! Live transport against a Spotseeker server
//!
//! Requests can be signed with two-legged OAuth 1.0a (consumer key and
//! secret, no token), which is what Spotseeker servers expect from trusted
//! clients.

use std::fmt;

use async_trait::async_trait;
use oauth1_request as oauth;
use reqwest::header::{HeaderMap, AUTHORIZATION};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::transport::Transport;
use crate::error::TransportError;
use crate::http::{Headers, Method, Request, Response};

/// OAuth 1.0a consumer credentials
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthConsumer {
    pub key: String,
    pub secret: String,
}

impl fmt::Debug for OAuthConsumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthConsumer")
            .field("key", &self.key)
            .field("secret", &"***")
            .finish()
    }
}

impl OAuthConsumer {
    pub fn new(key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            secret: secret.into(),
        }
    }

    /// Builds the `Authorization` header value for a request
    ///
    /// Query parameters of `url` are part of the signature base string.
    pub fn authorization(&self, method: Method, url: &str) -> Result<String, TransportError> {
        let (base_uri, query) = match url.split_once('?') {
            Some((base, query)) => (base, query),
            None => (url, ""),
        };
        let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query)
            .map_err(|e| TransportError::InvalidUrl(format!("{}: {}", url, e)))?;
        let params: oauth::request::ParameterList<String, String> = pairs.into_iter().collect();

        let builder: oauth::Builder<_, &str> = oauth::Builder::new(
            oauth::Credentials::new(self.key.as_str(), self.secret.as_str()),
            oauth::HMAC_SHA1,
        );
        Ok(builder.authorize(method.as_str(), base_uri, &params))
    }
}

/// Sends requests to a live server over HTTP(S)
#[derive(Debug, Clone)]
pub struct LiveTransport {
    client: Client,
    host: String,
    oauth: Option<OAuthConsumer>,
}

impl LiveTransport {
    /// Creates a transport for `host` (e.g. `https://spotseeker.example.edu`)
    pub fn new(host: impl Into<String>) -> Self {
        Self::with_client(Client::new(), host)
    }

    /// Creates a transport with a custom HTTP client
    pub fn with_client(client: Client, host: impl Into<String>) -> Self {
        Self {
            client,
            host: host.into().trim_end_matches('/').to_string(),
            oauth: None,
        }
    }

    /// Signs every request with the given consumer credentials
    pub fn with_oauth(mut self, consumer: OAuthConsumer) -> Self {
        self.oauth = Some(consumer);
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Full URL for a request path
    fn full_url(&self, url: &str) -> String {
        format!("{}{}", self.host, url)
    }

    /// Turns a request into a reqwest request, signing it when configured
    fn build_request(&self, request: &Request) -> Result<reqwest::Request, TransportError> {
        let url = self.full_url(&request.url);

        let mut builder = self.client.request(reqwest_method(request.method), &url);
        for (name, value) in request.headers.iter() {
            builder = builder.header(name, value);
        }
        if let Some(consumer) = &self.oauth {
            builder = builder.header(AUTHORIZATION, consumer.authorization(request.method, &url)?);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        Ok(builder.build()?)
    }
}

fn reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Delete => reqwest::Method::DELETE,
    }
}

/// Copies response headers, joining repeated names with `", "`
fn collect_headers(map: &HeaderMap) -> Headers {
    let mut headers = Headers::new();
    for (name, value) in map {
        headers.append(name.as_str(), String::from_utf8_lossy(value.as_bytes()));
    }
    headers
}

#[async_trait]
impl Transport for LiveTransport {
    fn name(&self) -> &str {
        "live"
    }

    async fn fetch(&self, request: &Request) -> Result<Response, TransportError> {
        let built = self.build_request(request)?;
        debug!(
            method = request.method.as_str(),
            url = %built.url(),
            signed = self.oauth.is_some(),
            "Sending request"
        );

        let response = self.client.execute(built).await?;
        let status = response.status().as_u16();
        let headers = collect_headers(response.headers());
        let body = response.bytes().await?.to_vec();

        Ok(Response::new(status, body).with_headers(headers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn signed_transport() -> LiveTransport {
        LiveTransport::new("https://spotseeker.example.edu").with_oauth(OAuthConsumer::new("key", "secret"))
    }

    #[test]
    fn test_full_url_joins_host_and_path() {
        let transport = LiveTransport::new("https://spotseeker.example.edu/");
        assert_eq!(transport.host(), "https://spotseeker.example.edu");
        assert_eq!(
            transport.full_url("/api/v1/spot/123"),
            "https://spotseeker.example.edu/api/v1/spot/123"
        );
    }

    #[test]
    fn test_method_mapping() {
        assert_eq!(reqwest_method(Method::Get), reqwest::Method::GET);
        assert_eq!(reqwest_method(Method::Put), reqwest::Method::PUT);
    }

    #[test]
    fn test_signed_request_carries_oauth_authorization() {
        let transport = signed_transport();
        let request = Request::get("/api/v1/spot?limit=5", Headers::new().with("Accept", "application/json"));

        let built = transport.build_request(&request).expect("build");

        let auth = built
            .headers()
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .expect("authorization header");
        assert!(auth.starts_with("OAuth "));
        assert!(auth.contains("oauth_consumer_key=\"key\""));
        assert!(auth.contains("oauth_signature_method=\"HMAC-SHA1\""));
        assert!(auth.contains("oauth_signature="));
        assert!(!auth.contains("oauth_token="));
        assert_eq!(built.url().query(), Some("limit=5"));
        assert_eq!(built.headers().get("accept"), Some(&HeaderValue::from_static("application/json")));
    }

    #[test]
    fn test_unsigned_request_has_no_authorization() {
        let transport = LiveTransport::new("https://spotseeker.example.edu");

        let built = transport
            .build_request(&Request::get("/api/v1/spot/123", Headers::new()))
            .expect("build");

        assert!(built.headers().get(AUTHORIZATION).is_none());
    }

    #[test]
    fn test_consumer_debug_hides_secret() {
        let rendered = format!("{:?}", OAuthConsumer::new("key", "hunter2"));
        assert!(rendered.contains("key"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_repeated_response_headers_are_joined() {
        let mut map = HeaderMap::new();
        map.append("set-cookie", HeaderValue::from_static("a=1"));
        map.append("set-cookie", HeaderValue::from_static("b=2"));
        map.insert("etag", HeaderValue::from_static("\"v1\""));

        let headers = collect_headers(&map);

        assert_eq!(headers.get("Set-Cookie"), Some("a=1, b=2"));
        assert_eq!(headers.get("ETag"), Some("\"v1\""));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport_error() {
        let transport = LiveTransport::new("http://127.0.0.1:9");
        let result = transport
            .fetch(&Request::get("/api/v1/spot/1", Headers::new()))
            .await;
        assert!(matches!(result, Err(TransportError::Request(_))));
    }
}
