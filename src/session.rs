//! Voting session snapshot
//!
//! One-shot read of the contract's public state: who administers it,
//! which phase voting is in and the current candidate list.

use crate::contract::{Candidate, VotingContract, Winner};
use crate::error::ChainError;
use alloy_primitives::Address;
use serde::Serialize;
use tracing::debug;

/// Where the contract is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum VotingPhase {
    /// Candidates can be added, voting has not started.
    Registration,
    Open,
    Ended { ended_at: u64, winner: Option<Winner> },
}

impl VotingPhase {
    /// Phase implied by `votingOpen()` and `getVotingEndedAt()`.
    ///
    /// A zero end timestamp means voting never ended.
    pub fn from_flags(voting_open: bool, ended_at: u64) -> Self {
        if voting_open {
            VotingPhase::Open
        } else if ended_at > 0 {
            VotingPhase::Ended {
                ended_at,
                winner: None,
            }
        } else {
            VotingPhase::Registration
        }
    }

    pub fn is_ended(&self) -> bool {
        matches!(self, VotingPhase::Ended { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionState {
    pub owner: Address,
    #[serde(flatten)]
    pub phase: VotingPhase,
    pub candidates: Vec<Candidate>,
}

impl SessionState {
    /// Whether `address` administers the contract.
    pub fn is_owner(&self, address: Address) -> bool {
        self.owner == address
    }

    /// Read the full session state from the contract.
    ///
    /// The winner is only queried once voting has ended.
    pub async fn load(contract: &VotingContract) -> Result<Self, ChainError> {
        let owner = contract.owner().await?;
        let voting_open = contract.voting_open().await?;
        let ended_at = contract.voting_ended_at().await?;

        let mut phase = VotingPhase::from_flags(voting_open, ended_at);
        if let VotingPhase::Ended { winner, .. } = &mut phase {
            *winner = Some(contract.winner().await?);
        }
        let candidates = contract.candidates().await?;

        debug!(
            "Session for 0x{:x}: {:?}, {} candidates",
            contract.address(),
            phase,
            candidates.len()
        );
        Ok(Self {
            owner,
            phase,
            candidates,
        })
    }
}
