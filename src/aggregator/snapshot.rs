//! Wholesale-replaced snapshot cells
//!
//! A `SnapshotCell` only ever swaps its whole value. Loaders build a new
//! value from a complete batch and publish it in one step; a failed batch
//! leaves the previous value visible and is recorded as an error instead.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::trace;

use crate::poller::Liveness;

/// One consistent value plus when it was taken
#[derive(Debug)]
pub struct Snapshot<T> {
    value: Arc<T>,
    version: u64,
    taken_at: Option<DateTime<Utc>>,
}

impl<T> Clone for Snapshot<T> {
    fn clone(&self) -> Self {
        Self {
            value: self.value.clone(),
            version: self.version,
            taken_at: self.taken_at,
        }
    }
}

impl<T> Snapshot<T> {
    fn initial(value: T) -> Self {
        Self {
            value: Arc::new(value),
            version: 0,
            taken_at: None,
        }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    /// Number of successful publishes so far; 0 means "still loading"
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is_loaded(&self) -> bool {
        self.version > 0
    }

    pub fn taken_at(&self) -> Option<DateTime<Utc>> {
        self.taken_at
    }
}

pub struct SnapshotCell<T> {
    name: &'static str,
    value: watch::Sender<Snapshot<T>>,
    last_error: watch::Sender<Option<String>>,
    failures: AtomicU64,
}

impl<T: Send + Sync + 'static> SnapshotCell<T> {
    pub fn new(name: &'static str, initial: T) -> Self {
        let (value, _) = watch::channel(Snapshot::initial(initial));
        let (last_error, _) = watch::channel(None);
        Self {
            name,
            value,
            last_error,
            failures: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn current(&self) -> Snapshot<T> {
        self.value.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot<T>> {
        self.value.subscribe()
    }

    pub fn subscribe_errors(&self) -> watch::Receiver<Option<String>> {
        self.last_error.subscribe()
    }

    /// Replace the snapshot. Clears the error state.
    pub fn publish(&self, value: T) -> u64 {
        let version = self.current().version + 1;
        self.value.send_replace(Snapshot {
            value: Arc::new(value),
            version,
            taken_at: Some(Utc::now()),
        });
        self.clear_error();
        trace!("📸 {} snapshot v{}", self.name, version);
        version
    }

    /// Publish unless the invocation was cancelled; returns whether it did
    pub fn publish_if_live(&self, liveness: &Liveness, value: T) -> bool {
        if liveness.is_cancelled() {
            trace!("Discarding {} snapshot from a cancelled refresh", self.name);
            return false;
        }
        self.publish(value);
        true
    }

    /// Back to the unloaded state, e.g. after the account changed
    pub fn reset(&self, value: T) {
        self.value.send_replace(Snapshot::initial(value));
        self.clear_error();
    }

    /// Error subscribers only hear about transitions back to healthy
    fn clear_error(&self) {
        self.last_error.send_if_modified(|err| err.take().is_some());
    }

    /// Record a failed batch; the current value is left untouched
    pub fn record_failure(&self, message: impl Into<String>) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        self.last_error.send_replace(Some(message.into()));
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.borrow().clone()
    }
}

// ============================================
// TESTS
// ============================================
