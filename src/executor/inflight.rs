//! Re-entry guard for transactions currently being executed.

use dashmap::DashSet;
use std::sync::Arc;

use crate::observability::metrics;

/// Ids of transactions with an `execute` call in progress.
///
/// Cloning shares the underlying set, so every executor clone (and every
/// overlapping tick) sees the same entries.
#[derive(Debug, Clone, Default)]
pub struct InFlightSet {
    ids: Arc<DashSet<String>>,
}

impl InFlightSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `id`, or `None` if another call already holds it.
    pub fn try_acquire(&self, id: &str) -> Option<InFlightGuard> {
        if !self.ids.insert(id.to_string()) {
            return None;
        }
        metrics::set_inflight(self.ids.len());
        Some(InFlightGuard {
            ids: Arc::clone(&self.ids),
            id: id.to_string(),
        })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Releases its id when dropped, on every exit path including panics.
#[derive(Debug)]
pub struct InFlightGuard {
    ids: Arc<DashSet<String>>,
    id: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.ids.remove(&self.id);
        metrics::set_inflight(self.ids.len());
    }
}
