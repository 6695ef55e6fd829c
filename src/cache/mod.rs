//! Response caching between the transport and the domain mapper
//!
//! A [`ResponseCache`] policy decides, per GET, whether a stored response can
//! stand in for a live fetch and what to persist afterwards. Entries live in
//! an [`EntryStore`], one row per `(service, url)`, and are written through a
//! [`WriteCoordinator`] that can buffer writes during a parallel batch.
//!
//! Three policies are provided: [`NoCache`], [`TimedCache`] and [`EtagCache`].

mod clock;
mod coordinator;
mod entry;
mod etag;
mod file_store;
mod policy;
mod store;
mod timed;

pub use clock::{Clock, ManualClock, SystemClock};
pub use coordinator::{BatchGuard, FlushReport, WriteCoordinator};
pub use entry::{decode_headers, encode_headers, CacheEntry};
pub use etag::EtagCache;
pub use file_store::FileStore;
pub use policy::{CacheLookup, CachePolicy, NoCache, ResponseCache};
pub use store::{EntryStore, MemoryStore};
pub use timed::{TimedCache, TimedConfig};
