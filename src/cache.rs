//! Candidate name cache
//!
//! In-memory cache to avoid repeated `eth_call` lookups when many votes
//! in one scan reference the same candidate index.
//!
//! A cache lives for exactly one scan and is dropped with it, so a
//! rebuild always sees the contract's current candidate list.

use std::collections::HashMap;

/// Cache of candidate index -> name.
pub struct CandidateCache {
    names: HashMap<u64, String>,
}

impl CandidateCache {
    /// Create a new empty cache.
    pub fn new() -> Self {
        Self {
            names: HashMap::new(),
        }
    }

    /// Cached name for `index`, if it was looked up before.
    pub fn get(&self, index: u64) -> Option<&str> {
        self.names.get(&index).map(String::as_str)
    }

    /// Remember the name for `index`.
    pub fn insert(&mut self, index: u64, name: String) {
        self.names.insert(index, name);
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Default for CandidateCache {
    fn default() -> Self {
        Self::new()
    }
}
