//! Read-only client for the voting contract
//!
//! Wraps `eth_call` for the contract's public getters. Write methods are
//! not exposed here; history reconstruction only observes their
//! transactions.

use crate::bindings::{
    candidatesCall, getCandidateCountCall, getVotingEndedAtCall, getWinnerCall, ownerCall,
    votingOpenCall,
};
use crate::error::{ChainError, DecodeError};
use crate::rpc::RpcClient;
use alloy_primitives::{Address, U256};
use alloy_sol_types::SolCall;
use async_trait::async_trait;
use serde::Serialize;

/// A candidate as stored by the contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candidate {
    pub name: String,
    pub vote_count: u64,
    pub avatar: String,
    pub program: String,
}

/// Winner as reported once voting has ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Winner {
    pub name: String,
    pub vote_count: u64,
}

/// Resolves candidate indices to names for vote descriptions.
#[async_trait]
pub trait CandidateDirectory: Send + Sync {
    async fn candidate_name(&self, index: u64) -> Result<String, ChainError>;
}

/// Fixed candidate list, indexed in registration order.
#[async_trait]
impl CandidateDirectory for Vec<String> {
    async fn candidate_name(&self, index: u64) -> Result<String, ChainError> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.get(i))
            .cloned()
            .ok_or_else(|| ChainError::not_found("candidate", index))
    }
}

fn uint_to_u64(value: U256, what: &'static str) -> Result<u64, DecodeError> {
    u64::try_from(value).map_err(|_| DecodeError::Overflow(what))
}

fn decode_error(signature: &str, err: impl Into<DecodeError>) -> ChainError {
    ChainError::InvalidResponse(format!("{} returned malformed data: {}", signature, err.into()))
}

/// Decode the `candidates(uint256)` getter output.
fn decode_candidate(data: &[u8]) -> Result<Candidate, DecodeError> {
    let ret = candidatesCall::abi_decode_returns(data, true)?;
    Ok(Candidate {
        name: ret.name,
        vote_count: uint_to_u64(ret.voteCount, "vote count")?,
        avatar: ret.avatar,
        program: ret.program,
    })
}

/// Read-only view of one deployed voting contract.
#[derive(Debug, Clone)]
pub struct VotingContract {
    rpc: RpcClient,
    address: Address,
}

impl VotingContract {
    pub fn new(rpc: RpcClient, address: Address) -> Self {
        Self { rpc, address }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// `eth_call` a getter and decode its outputs.
    async fn read<C: SolCall>(&self, call: C) -> Result<C::Return, ChainError> {
        let output = self.rpc.eth_call(self.address, &call.abi_encode()).await?;
        C::abi_decode_returns(&output, true).map_err(|e| decode_error(C::SIGNATURE, e))
    }

    /// Contract owner (administrator).
    pub async fn owner(&self) -> Result<Address, ChainError> {
        Ok(self.read(ownerCall {}).await?.owner)
    }

    /// Whether voting is currently open.
    pub async fn voting_open(&self) -> Result<bool, ChainError> {
        Ok(self.read(votingOpenCall {}).await?.open)
    }

    /// Timestamp voting was ended at, 0 if it never ended.
    pub async fn voting_ended_at(&self) -> Result<u64, ChainError> {
        let ret = self.read(getVotingEndedAtCall {}).await?;
        uint_to_u64(ret.endedAt, "timestamp")
            .map_err(|e| decode_error(getVotingEndedAtCall::SIGNATURE, e))
    }

    /// Number of registered candidates.
    pub async fn candidate_count(&self) -> Result<u64, ChainError> {
        let ret = self.read(getCandidateCountCall {}).await?;
        uint_to_u64(ret.count, "candidate count")
            .map_err(|e| decode_error(getCandidateCountCall::SIGNATURE, e))
    }

    /// Candidate at `index` via the public `candidates` getter.
    pub async fn candidate(&self, index: u64) -> Result<Candidate, ChainError> {
        let call = candidatesCall {
            index: U256::from(index),
        };
        let output = self.rpc.eth_call(self.address, &call.abi_encode()).await?;
        decode_candidate(&output).map_err(|e| decode_error(candidatesCall::SIGNATURE, e))
    }

    /// All candidates in registration order.
    ///
    /// The count comes from the chain, so nothing is preallocated from it;
    /// a bogus count fails on the first missing index instead.
    pub async fn candidates(&self) -> Result<Vec<Candidate>, ChainError> {
        let count = self.candidate_count().await?;
        let mut candidates = Vec::new();
        for index in 0..count {
            candidates.push(self.candidate(index).await?);
        }
        Ok(candidates)
    }

    /// Current leader, as reported by `getWinner()`.
    pub async fn winner(&self) -> Result<Winner, ChainError> {
        let ret = self.read(getWinnerCall {}).await?;
        Ok(Winner {
            name: ret.name,
            vote_count: uint_to_u64(ret.voteCount, "vote count")
                .map_err(|e| decode_error(getWinnerCall::SIGNATURE, e))?,
        })
    }
}

#[async_trait]
impl CandidateDirectory for VotingContract {
    async fn candidate_name(&self, index: u64) -> Result<String, ChainError> {
        Ok(self.candidate(index).await?.name)
    }
}
