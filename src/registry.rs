//! Method registry for the voting contract
//!
//! Maps the 4-byte selector at the front of calldata to a descriptor
//! with a human-readable label and an explicit decode function for the
//! call arguments.

use crate::bindings::{addCandidateCall, endVotingCall, startVotingCall, voteCall};
use crate::error::{DecodeError, UnknownMethod};
use alloy_sol_types::SolCall;
use std::collections::HashMap;

/// Leading 4 bytes of calldata.
pub type Selector = [u8; 4];

/// `addCandidate(string,string,string)`
pub const ADD_CANDIDATE: Selector = <addCandidateCall as SolCall>::SELECTOR;
/// `vote(uint256)`
pub const VOTE: Selector = <voteCall as SolCall>::SELECTOR;
/// `startVoting()`
pub const START_VOTING: Selector = <startVotingCall as SolCall>::SELECTOR;
/// `endVoting()`
pub const END_VOTING: Selector = <endVotingCall as SolCall>::SELECTOR;

/// Label used when a selector is not registered.
pub const UNKNOWN_LABEL: &str = "Unknown operation";

/// Structured arguments extracted from a known call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallFields {
    /// Method takes no arguments.
    None,
    /// `vote(index)`
    Vote { candidate_index: u64 },
    /// `addCandidate(name, avatar, program)`
    AddCandidate {
        name: String,
        avatar: String,
        program: String,
    },
}

/// Decode function over full calldata, selector included.
pub type DecodeFn = fn(&[u8]) -> Result<CallFields, DecodeError>;

/// Everything known about one contract method.
#[derive(Debug, Clone, Copy)]
pub struct MethodDescriptor {
    pub selector: Selector,
    pub name: &'static str,
    pub label: &'static str,
    decoder: DecodeFn,
}

impl MethodDescriptor {
    /// Decode full calldata (selector included) into structured fields.
    pub fn decode(&self, calldata: &[u8]) -> Result<CallFields, DecodeError> {
        (self.decoder)(calldata)
    }
}

// Solidity ignores trailing calldata, so decoding does not validate it either.

fn decode_no_args(_calldata: &[u8]) -> Result<CallFields, DecodeError> {
    Ok(CallFields::None)
}

fn decode_vote(calldata: &[u8]) -> Result<CallFields, DecodeError> {
    let call = voteCall::abi_decode(calldata, false)?;
    let candidate_index =
        u64::try_from(call.candidateIndex).map_err(|_| DecodeError::Overflow("u64"))?;
    Ok(CallFields::Vote { candidate_index })
}

fn decode_add_candidate(calldata: &[u8]) -> Result<CallFields, DecodeError> {
    let call = addCandidateCall::abi_decode(calldata, false)?;
    Ok(CallFields::AddCandidate {
        name: call.name,
        avatar: call.avatar,
        program: call.program,
    })
}

/// Selector-keyed lookup table of method descriptors.
#[derive(Debug, Clone)]
pub struct MethodRegistry {
    methods: HashMap<Selector, MethodDescriptor>,
}

impl MethodRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            methods: HashMap::new(),
        }
    }

    /// Registry for the voting contract's state-changing methods.
    pub fn voting() -> Self {
        let mut registry = Self::new();
        registry.register(ADD_CANDIDATE, "addCandidate", "Adding a candidate", decode_add_candidate);
        registry.register(VOTE, "vote", "Voting", decode_vote);
        registry.register(START_VOTING, "startVoting", "Voting has begun", decode_no_args);
        registry.register(END_VOTING, "endVoting", "Voting has ended", decode_no_args);
        registry
    }

    /// Add or replace a descriptor.
    pub fn register(
        &mut self,
        selector: Selector,
        name: &'static str,
        label: &'static str,
        decoder: DecodeFn,
    ) {
        self.methods.insert(
            selector,
            MethodDescriptor {
                selector,
                name,
                label,
                decoder,
            },
        );
    }

    /// Look up the descriptor for a selector.
    pub fn resolve(&self, selector: Selector) -> Result<&MethodDescriptor, UnknownMethod> {
        self.methods.get(&selector).ok_or(UnknownMethod(selector))
    }

    /// Look up the descriptor for the selector at the front of `calldata`.
    pub fn resolve_calldata(&self, calldata: &[u8]) -> Result<&MethodDescriptor, UnknownMethod> {
        let mut selector = [0u8; 4];
        let n = calldata.len().min(4);
        selector[..n].copy_from_slice(&calldata[..n]);
        self.resolve(selector)
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

impl Default for MethodRegistry {
    fn default() -> Self {
        Self::voting()
    }
}
