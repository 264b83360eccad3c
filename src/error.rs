//! Error types for chain access and calldata decoding
//!
//! Chain errors are split by how a scan reacts to them: connectivity
//! failures abort, everything else is skipped for the affected entity.

use thiserror::Error;

/// Errors raised while reading from a chain node.
#[derive(Debug, Error)]
pub enum ChainError {
    /// Node unreachable or the request itself failed.
    #[error("connectivity error: {0}")]
    Connectivity(String),

    /// The referenced block, transaction or receipt does not exist (yet).
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// The node answered, but the payload could not be understood.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ChainError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        ChainError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Whether the error should abort an entire scan.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ChainError::Connectivity(_))
    }
}

/// Errors raised while decoding ABI-encoded calldata or return data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Malformed encoding: truncated data, bad offsets or wrong selector.
    #[error("ABI decoding failed: {0}")]
    Abi(String),

    #[error("value does not fit in {0}")]
    Overflow(&'static str),
}

impl From<alloy_sol_types::Error> for DecodeError {
    fn from(err: alloy_sol_types::Error) -> Self {
        DecodeError::Abi(err.to_string())
    }
}

/// Selector not present in the method registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unknown method selector 0x{}", hex::encode(.0))]
pub struct UnknownMethod(pub [u8; 4]);
