//! Buffered writes in front of an entry store
//!
//! When many requests are fetched in parallel, every cache policy writes its
//! entry at roughly the same moment. Against a store that serializes inserts
//! on a shared index that turns into lock contention and duplicate-key races.
//! [`WriteCoordinator`] lets the caller driving the fan-out switch writes to a
//! queue for the duration of the batch and flush them from one place
//! afterwards.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use super::entry::CacheEntry;
use super::store::EntryStore;
use crate::error::StoreError;

/// Outcome of draining the pending write queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Entries written through to the store
    pub written: usize,
    /// Entries skipped because an earlier entry in the batch had the same url
    pub dropped: usize,
    /// Entries whose write failed and were discarded
    pub failed: usize,
}

/// Routes cache writes either straight to the store or into a pending queue
///
/// Workers only call [`WriteCoordinator::store`]. Switching modes is meant to
/// be done by the task that owns the batch. Batches may overlap: queueing
/// stays on until the last open [`BatchGuard`] ends.
pub struct WriteCoordinator {
    store: Arc<dyn EntryStore>,
    queueing: AtomicBool,
    pending: Mutex<Vec<CacheEntry>>,
    batch_depth: Mutex<usize>,
}

impl WriteCoordinator {
    pub fn new(store: Arc<dyn EntryStore>) -> Self {
        Self {
            store,
            queueing: AtomicBool::new(false),
            pending: Mutex::new(Vec::new()),
            batch_depth: Mutex::new(0),
        }
    }

    /// The store reads and direct writes go to
    pub fn entry_store(&self) -> &dyn EntryStore {
        self.store.as_ref()
    }

    pub fn is_queueing(&self) -> bool {
        self.queueing.load(Ordering::Acquire)
    }

    /// Number of entries waiting for a flush
    pub fn pending(&self) -> usize {
        self.pending.lock().map(|q| q.len()).unwrap_or(0)
    }

    /// Starts queueing writes instead of writing through. Idempotent.
    pub fn enable_queueing(&self) {
        self.queueing.store(true, Ordering::Release);
    }

    /// Stops queueing and flushes whatever was queued
    pub fn disable_queueing(&self) -> FlushReport {
        self.queueing.store(false, Ordering::Release);
        self.flush()
    }

    /// Enables queueing until the returned guard, and every other open
    /// guard, is dropped
    pub fn batch(&self) -> BatchGuard<'_> {
        let mut depth = self.batch_depth.lock().unwrap_or_else(|e| e.into_inner());
        *depth += 1;
        self.enable_queueing();
        BatchGuard { coordinator: self }
    }

    /// Closes one batch; the last one to close stops queueing and flushes
    fn end_batch(&self) -> FlushReport {
        {
            let mut depth = self.batch_depth.lock().unwrap_or_else(|e| e.into_inner());
            *depth = depth.saturating_sub(1);
            if *depth > 0 {
                debug!(open = *depth, "Batch ended, others still open");
                return FlushReport::default();
            }
            self.queueing.store(false, Ordering::Release);
        }
        self.flush()
    }

    /// Persists an entry, or queues it while queueing is enabled
    pub fn store(&self, entry: CacheEntry) -> Result<(), StoreError> {
        if self.is_queueing() {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            pending.push(entry);
            return Ok(());
        }
        self.store.upsert(&entry)
    }

    /// Writes every queued entry through to the store
    ///
    /// Entries are written in the order they were queued; a later entry with
    /// a url already written in this pass is dropped. A failed write is logged
    /// and skipped. The queue is always left empty.
    pub fn flush(&self) -> FlushReport {
        let queued = {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *pending)
        };

        let mut report = FlushReport::default();
        let mut seen_urls = HashSet::new();

        for entry in queued {
            if !seen_urls.insert(entry.url.clone()) {
                report.dropped += 1;
                continue;
            }

            match self.store.upsert(&entry) {
                Ok(()) => report.written += 1,
                Err(e) if e.is_duplicate() => {
                    debug!(url = %entry.url, "Cache entry already saved by another writer");
                    report.written += 1;
                }
                Err(e) => {
                    warn!(url = %entry.url, error = %e, "Error bulk saving cache entry");
                    report.failed += 1;
                }
            }
        }

        debug!(
            written = report.written,
            dropped = report.dropped,
            failed = report.failed,
            "Flushed queued cache entries"
        );
        report
    }
}

/// Keeps a [`WriteCoordinator`] in queueing mode for its lifetime
///
/// Dropping the last open guard disables queueing, which flushes the queue.
pub struct BatchGuard<'a> {
    coordinator: &'a WriteCoordinator,
}

impl BatchGuard<'_> {
    /// Ends the batch now and returns what the flush did
    ///
    /// The report is empty when another batch is still open; its entries are
    /// flushed when that batch ends.
    pub fn finish(self) -> FlushReport {
        let coordinator = self.coordinator;
        std::mem::forget(self);
        coordinator.end_batch()
    }
}

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        self.coordinator.end_batch();
    }
}
