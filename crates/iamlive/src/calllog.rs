//! Call Log (§2, §5): an append-only in-memory buffer shared across the
//! proxy handler pool, the CSM receive loop, and the synthesizer. Appends
//! and full-snapshot reads are mutually exclusive; a single `parking_lot`
//! mutex is the coordinator (the spec permits either a mutex or an
//! actor-owned log; the teacher's codebase favors `parking_lot` for hot
//! shared state, so this follows suit rather than introducing an actor).

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::model::{AzureEntry, CallEntry, GcpEntry};

#[derive(Default)]
struct Inner {
    aws: Vec<CallEntry>,
    azure: Vec<AzureEntry>,
    gcp: Vec<GcpEntry>,
}

/// Shared, append-only call log. Cheaply cloneable (`Arc` inside).
#[derive(Clone)]
pub struct CallLog {
    inner: Arc<Mutex<Inner>>,
    /// Signaled after every append, so a synthesis flush loop can wait
    /// instead of polling.
    pub notify: Arc<Notify>,
}

impl Default for CallLog {
    fn default() -> Self {
        Self::new()
    }
}

impl CallLog {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn push_aws(&self, entry: CallEntry) {
        self.inner.lock().aws.push(entry);
        self.notify.notify_waiters();
    }

    pub fn push_azure(&self, entry: AzureEntry) {
        self.inner.lock().azure.push(entry);
        self.notify.notify_waiters();
    }

    pub fn push_gcp(&self, entry: GcpEntry) {
        self.inner.lock().gcp.push(entry);
        self.notify.notify_waiters();
    }

    pub fn snapshot_aws(&self) -> Vec<CallEntry> {
        self.inner.lock().aws.clone()
    }

    pub fn snapshot_azure(&self) -> Vec<AzureEntry> {
        self.inner.lock().azure.clone()
    }

    pub fn snapshot_gcp(&self) -> Vec<GcpEntry> {
        self.inner.lock().gcp.clone()
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.lock();
        inner.aws.len() + inner.azure.len() + inner.gcp.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
