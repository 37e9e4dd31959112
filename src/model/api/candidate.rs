use serde::{Deserialize, Serialize};

use crate::model::candidate::{Candidate, CandidateId, CandidateStatus};

/// A nomination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateSpec {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateDescription {
    pub id: CandidateId,
    pub name: String,
    pub status: CandidateStatus,
    /// Whether the candidate appears on the ballot.
    pub approved: bool,
    pub votes: u64,
}

impl From<&Candidate> for CandidateDescription {
    fn from(candidate: &Candidate) -> Self {
        Self {
            id: candidate.id,
            name: candidate.name.clone(),
            status: candidate.status,
            approved: candidate.is_approved(),
            votes: candidate.votes,
        }
    }
}
