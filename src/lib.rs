//! Ballotscan - transaction history for an on-chain voting contract
//!
//! This library reconstructs a human-readable activity feed from the
//! transactions sent to a voting contract and keeps it current as new
//! contract logs arrive.

pub mod bindings;
pub mod cache;
pub mod chain;
pub mod cli;
pub mod config;
pub mod contract;
pub mod error;
pub mod history;
pub mod registry;
pub mod rpc;
pub mod session;
pub mod store;
pub mod subscriber;
pub mod types;

#[cfg(test)]
mod testutil;

// Re-export the main types for convenience
pub use chain::{ChainReader, LogFilter, LogSubscription};
pub use contract::{CandidateDirectory, VotingContract};
pub use error::{ChainError, DecodeError, UnknownMethod};
pub use history::{HistoryBuilder, HistoryEntry, TxStatus};
pub use registry::{CallFields, MethodDescriptor, MethodRegistry};
pub use session::{SessionState, VotingPhase};
pub use store::HistoryStore;
pub use subscriber::{LiveSubscriber, SubscriberHandle, SubscriberState};
