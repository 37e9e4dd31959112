use serde::{Deserialize, Serialize};

use crate::model::{
    ballot::{winners, CandidateTally},
    candidate::CandidateId,
    election::{ElectionId, ElectionPhase},
};

/// A ballot for one position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteSpec {
    pub candidate_id: CandidateId,
}

/// The tally of one position, live or final.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionResult {
    pub election_id: ElectionId,
    pub position: String,
    pub phase: ElectionPhase,
    /// The election has ended, so the counts can no longer change.
    pub is_final: bool,
    pub total_votes: u64,
    /// Approved candidates in ID order.
    pub tallies: Vec<CandidateTally>,
    /// Everyone sharing the highest count.
    pub winners: Vec<CandidateId>,
}

impl PositionResult {
    pub fn new(
        election_id: ElectionId,
        position: String,
        phase: ElectionPhase,
        tallies: Vec<CandidateTally>,
    ) -> Self {
        Self {
            election_id,
            position,
            phase,
            is_final: phase == ElectionPhase::Ended,
            total_votes: tallies.iter().map(|tally| tally.votes).sum(),
            winners: winners(&tallies),
            tallies,
        }
    }
}
