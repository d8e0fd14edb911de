//! Fan-out of enriched payloads to live observers
//!
//! Observers are registered with a bounded sender; delivery is
//! non-blocking so one slow or dead observer cannot stall the pass. A
//! failed delivery marks the observer for removal, and all marked
//! observers are pruned after the fan-out completes.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Identity of a registered observer
pub type ObserverId = u64;

/// Per-observer delivery queue depth
pub const OBSERVER_QUEUE_DEPTH: usize = 64;

#[derive(Debug)]
struct Observer {
    tx: mpsc::Sender<String>,
}

/// Outcome of one fan-out pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastOutcome {
    pub delivered: usize,
    pub pruned: usize,
}

/// Tracks live observers and fans out payloads with fault isolation
///
/// The observer set is shared between the ingestion loop (broadcast)
/// and the connection-accept path (connect/disconnect), so it lives in
/// a concurrent map.
#[derive(Debug, Default)]
pub struct BroadcastManager {
    observers: DashMap<ObserverId, Observer>,
    next_id: AtomicU64,
}

impl BroadcastManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer, returning its identity
    pub fn connect(&self, tx: mpsc::Sender<String>) -> ObserverId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.observers.insert(id, Observer { tx });
        debug!(observer_id = id, observers = self.observers.len(), "Observer connected");
        id
    }

    /// Remove an observer; removing an absent observer is a no-op
    pub fn disconnect(&self, id: ObserverId) {
        if self.observers.remove(&id).is_some() {
            debug!(observer_id = id, observers = self.observers.len(), "Observer disconnected");
        }
    }

    /// Number of currently registered observers
    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Attempt delivery to every observer
    ///
    /// A failed delivery (closed or saturated queue) marks that
    /// observer for removal but never stops delivery to the rest.
    /// Broadcasting to an empty set is a no-op.
    pub fn broadcast(&self, payload: &str) -> BroadcastOutcome {
        let mut delivered = 0;
        let mut failed = Vec::new();

        for entry in self.observers.iter() {
            match entry.value().tx.try_send(payload.to_string()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(observer_id = entry.key(), error = %e, "Observer delivery failed, pruning");
                    failed.push(*entry.key());
                }
            }
        }

        for id in &failed {
            self.observers.remove(id);
        }

        BroadcastOutcome {
            delivered,
            pruned: failed.len(),
        }
    }
}
