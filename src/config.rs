//! Client configuration
//!
//! A [`ClientConfig`] names the transport, the cache policy and where cached
//! entries live. Both choices are resolved once, when the client is built.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::{CachePolicy, Clock, EntryStore, FileStore, MemoryStore, SystemClock, WriteCoordinator};
use crate::dao::{bundled_resource_dir, Dao, FileTransport, LiveTransport, OAuthConsumer, Transport};
use crate::data::SpotseekerClient;

/// Service name used for cache keys and fixture lookup
pub const SERVICE_NAME: &str = "spotseeker";

/// Where requests are sent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportConfig {
    /// Serve responses from fixture files, searching the directories in order
    File { resource_dirs: Vec<PathBuf> },
    /// Send requests to a live server, signing them when `oauth` is set
    Live {
        host: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        oauth: Option<OAuthConsumer>,
    },
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig::File {
            resource_dirs: vec![bundled_resource_dir()],
        }
    }
}

impl TransportConfig {
    fn build(&self) -> Arc<dyn Transport> {
        match self {
            TransportConfig::File { resource_dirs } => {
                Arc::new(FileTransport::new(SERVICE_NAME, resource_dirs.clone()))
            }
            TransportConfig::Live { host, oauth } => {
                let transport = LiveTransport::new(host.clone());
                match oauth {
                    Some(consumer) => Arc::new(transport.with_oauth(consumer.clone())),
                    None => Arc::new(transport),
                }
            }
        }
    }
}

/// Settings for building a [`Dao`] or [`SpotseekerClient`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub transport: TransportConfig,
    pub cache: CachePolicy,
    /// Directory for cached entries; the XDG cache directory when unset
    pub cache_dir: Option<PathBuf>,
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transport(mut self, transport: TransportConfig) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_cache(mut self, cache: CachePolicy) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(cache_dir.into());
        self
    }

    /// Opens the entry store the cache policy writes to
    ///
    /// Falls back to an in-memory store when no cache directory can be
    /// resolved. A client without caching never touches the disk.
    pub fn entry_store(&self) -> Arc<dyn EntryStore> {
        if self.cache == CachePolicy::None {
            return Arc::new(MemoryStore::new());
        }

        match &self.cache_dir {
            Some(dir) => Arc::new(FileStore::with_dir(dir.clone())),
            None => match FileStore::new() {
                Some(store) => {
                    debug!(dir = %store.cache_dir().display(), "Caching entries on disk");
                    Arc::new(store)
                }
                None => {
                    debug!("No cache directory available, caching in memory");
                    Arc::new(MemoryStore::new())
                }
            },
        }
    }

    /// Builds a [`Dao`] using the system clock
    pub fn build_dao(&self) -> Dao {
        self.build_dao_with(self.entry_store(), Arc::new(SystemClock))
    }

    /// Builds a [`Dao`] over an explicit store and clock
    pub fn build_dao_with(&self, store: Arc<dyn EntryStore>, clock: Arc<dyn Clock>) -> Dao {
        let coordinator = Arc::new(WriteCoordinator::new(store));
        let cache = self.cache.build(coordinator.clone(), clock);
        debug!(transport = ?self.transport, cache = ?self.cache, "Built spotseeker DAO");
        Dao::new(SERVICE_NAME, self.transport.build(), cache, coordinator)
    }

    /// Builds a [`SpotseekerClient`] using the system clock
    pub fn client(&self) -> SpotseekerClient {
        SpotseekerClient::new(Arc::new(self.build_dao()))
    }
}
