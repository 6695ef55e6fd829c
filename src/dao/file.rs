//! File-backed mock transport
//!
//! Resolves requests against fixture files so the client can run without a
//! server. For a service `S` and url `U`, each resource directory `D` is
//! searched for `D/S/file/U`. A fixture may have a `.http-headers` JSON
//! sidecar that adds headers and optionally overrides the status.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use super::transport::Transport;
use crate::error::TransportError;
use crate::http::{Headers, Method, Request, Response};

/// Characters that can't appear in fixture file names on every platform
const RESERVED_CHARS: &[char] = &['?', '|', '<', '>', '=', ':', '*', ',', ';', '+', '&', '"', '@'];

/// Name of the implementation directory under each service
const IMPLEMENTATION_NAME: &str = "file";

/// Replaces characters that are reserved in file names with `_`
pub fn convert_to_platform_safe(name: &str) -> String {
    name.chars()
        .map(|c| if RESERVED_CHARS.contains(&c) { '_' } else { c })
        .collect()
}

/// Contents of a `.http-headers` sidecar file
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum HeaderFile {
    Wrapped {
        headers: HashMap<String, Value>,
        #[serde(default)]
        status: Option<u16>,
    },
    Flat(HashMap<String, Value>),
}

fn header_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Serves responses from fixture files
#[derive(Debug, Clone)]
pub struct FileTransport {
    service: String,
    resource_dirs: Vec<PathBuf>,
}

impl FileTransport {
    /// Creates a transport searching `resource_dirs` in order
    pub fn new(service: impl Into<String>, resource_dirs: Vec<PathBuf>) -> Self {
        Self {
            service: service.into(),
            resource_dirs,
        }
    }

    /// Creates a transport using only the fixtures shipped with this crate
    pub fn bundled(service: impl Into<String>) -> Self {
        Self::new(service, vec![bundled_resource_dir()])
    }

    pub fn resource_dirs(&self) -> &[PathBuf] {
        &self.resource_dirs
    }

    fn data_source(&self) -> String {
        format!("{} file mock data", self.service)
    }

    /// Candidate fixture paths for `url` under one resource directory, in lookup order
    fn candidate_paths(&self, resource_dir: &Path, url: &str) -> Vec<PathBuf> {
        let root = resource_dir
            .join(&self.service)
            .join(IMPLEMENTATION_NAME)
            .to_string_lossy()
            .into_owned();
        let unquoted = urlencoding::decode(url)
            .map(|u| u.into_owned())
            .unwrap_or_else(|_| url.to_string());

        let mut paths = Vec::with_capacity(8);
        for variant in [url, unquoted.as_str()] {
            let safe = format!("{}{}", root, convert_to_platform_safe(variant));
            let raw = format!("{}{}", root, variant);
            paths.push(PathBuf::from(&safe));
            paths.push(PathBuf::from(format!("{}/index.html", safe)));
            paths.push(PathBuf::from(&raw));
            paths.push(PathBuf::from(format!("{}/index.html", raw)));
        }
        paths
    }

    /// Loads a fixture from one resource directory, if it has one for `url`
    fn load_from_dir(&self, resource_dir: &Path, url: &str) -> Result<Option<Response>, TransportError> {
        let Some(path) = self
            .candidate_paths(resource_dir, url)
            .into_iter()
            .find(|p| p.is_file())
        else {
            return Ok(None);
        };

        debug!(url, dir = %resource_dir.display(), file = %path.display(), "Resolved mock resource");

        let body = fs::read(&path)?;
        let mut response = Response::new(200, body)
            .with_headers(Headers::new().with("X-Data-Source", self.data_source()));

        let mut sidecar = path.into_os_string();
        sidecar.push(".http-headers");
        let sidecar = PathBuf::from(sidecar);
        if sidecar.is_file() {
            let header_file: HeaderFile = serde_json::from_str(&fs::read_to_string(&sidecar)?)?;
            let (extra, status) = match header_file {
                HeaderFile::Wrapped { headers, status } => (headers, status),
                HeaderFile::Flat(headers) => (headers, None),
            };
            let mut names: Vec<_> = extra.keys().cloned().collect();
            names.sort();
            for name in names {
                response.headers.set(name.clone(), header_value(&extra[&name]));
            }
            if let Some(status) = status {
                response.status = status;
            }
        }

        Ok(Some(response))
    }

    fn get(&self, url: &str) -> Result<Response, TransportError> {
        for dir in &self.resource_dirs {
            if let Some(response) = self.load_from_dir(dir, url)? {
                return Ok(response);
            }
        }

        info!(
            url,
            path = %format!("resources/{}/{}{}", self.service, IMPLEMENTATION_NAME, convert_to_platform_safe(url)),
            "404 for mock url"
        );
        Ok(Response::new(404, ""))
    }

    fn echo_headers(&self, request: &Request) -> Headers {
        let mut headers = Headers::new().with("X-Data-Source", self.data_source());
        if let Some(content_type) = request.headers.get("Content-Type") {
            headers.set("Content-Type", content_type);
        }
        headers
    }

    fn post(&self, request: &Request) -> Response {
        if request.body.is_none() {
            return Response::new(400, "Bad Request: no POST body");
        }
        let status = if request.url.contains("dispatch") { 200 } else { 201 };
        Response::new(status, "").with_headers(self.echo_headers(request))
    }

    fn put(&self, request: &Request) -> Response {
        if request.body.is_none() {
            return Response::new(400, "Bad Request: no PUT body");
        }
        Response::new(204, "").with_headers(self.echo_headers(request))
    }
}

#[async_trait]
impl Transport for FileTransport {
    fn name(&self) -> &str {
        "file"
    }

    async fn fetch(&self, request: &Request) -> Result<Response, TransportError> {
        match request.method {
            Method::Get => self.get(&request.url),
            Method::Post => Ok(self.post(request)),
            Method::Put => Ok(self.put(request)),
            Method::Delete => Ok(Response::new(204, "")),
        }
    }
}

/// The `resources/` directory shipped in this crate
pub fn bundled_resource_dir() -> PathBuf {
    PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/resources"))
}
