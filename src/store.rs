//! History store
//!
//! Holds the result of the most recent completed rebuild. The whole
//! sequence is swapped atomically on `replace`; readers always get a
//! complete snapshot, never a partially written one.

use crate::history::HistoryEntry;
use std::sync::Arc;
use tokio::sync::watch;

/// Immutable snapshot of the history feed.
pub type Snapshot = Arc<Vec<HistoryEntry>>;

/// Single source of truth for the history feed.
pub struct HistoryStore {
    tx: watch::Sender<Snapshot>,
}

impl HistoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Arc::new(Vec::new()));
        Self { tx }
    }

    /// Swap in a new sequence, replacing the previous one entirely.
    pub fn replace(&self, entries: Vec<HistoryEntry>) {
        self.tx.send_replace(Arc::new(entries));
    }

    /// The sequence from the latest `replace`.
    pub fn current(&self) -> Snapshot {
        self.tx.borrow().clone()
    }

    /// Receiver notified after every `replace`.
    pub fn changes(&self) -> watch::Receiver<Snapshot> {
        self.tx.subscribe()
    }

    pub fn len(&self) -> usize {
        self.tx.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.borrow().is_empty()
    }
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new()
    }
}
