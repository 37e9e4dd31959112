use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::model::{
    election::ElectionId, event::Event, guard::Context, state::LedgerState, voter::non_empty,
};

/// Candidate IDs are dense and 1-based within their (election, position).
pub type CandidateId = u32;

/// Where a candidate stands in the approval workflow.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CandidateStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: CandidateId,
    pub name: String,
    pub status: CandidateStatus,
    /// Only ever incremented, and only by an accepted vote.
    pub votes: u64,
}

impl Candidate {
    pub fn is_approved(&self) -> bool {
        self.status == CandidateStatus::Approved
    }
}

/// A contested position and its candidate roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub name: String,
    pub candidates: Vec<Candidate>,
}

impl Position {
    pub fn new(name: String) -> Self {
        Self {
            name,
            candidates: Vec::new(),
        }
    }

    pub fn candidate(&self, candidate_id: CandidateId) -> Result<&Candidate, LedgerError> {
        candidate_id
            .checked_sub(1)
            .and_then(|index| self.candidates.get(index as usize))
            .ok_or_else(|| self.unknown_candidate(candidate_id))
    }

    pub(crate) fn candidate_mut(
        &mut self,
        candidate_id: CandidateId,
    ) -> Result<&mut Candidate, LedgerError> {
        let err = self.unknown_candidate(candidate_id);
        candidate_id
            .checked_sub(1)
            .and_then(|index| self.candidates.get_mut(index as usize))
            .ok_or(err)
    }

    /// Candidates eligible to receive votes, in ID order.
    pub fn approved(&self) -> impl Iterator<Item = &Candidate> {
        self.candidates.iter().filter(|c| c.is_approved())
    }

    fn next_candidate_id(&self) -> CandidateId {
        self.candidates.len() as CandidateId + 1
    }

    fn unknown_candidate(&self, candidate_id: CandidateId) -> LedgerError {
        LedgerError::UnknownCandidate {
            position: self.name.clone(),
            candidate_id,
        }
    }
}

impl LedgerState {
    /// Any authenticated caller may nominate a candidate.
    pub(super) fn plan_register_candidate(
        &self,
        _ctx: &Context,
        election_id: ElectionId,
        position: &str,
        name: &str,
    ) -> Result<Event, LedgerError> {
        let name = non_empty(name.to_string(), "candidate name")?;
        let position = self.election(election_id)?.position(position)?;

        Ok(Event::CandidateRegistered {
            election_id,
            position: position.name.clone(),
            candidate_id: position.next_candidate_id(),
            name,
        })
    }

    /// Plan an approval or rejection of a pending candidate.
    pub(super) fn plan_decide_candidate(
        &self,
        ctx: &Context,
        election_id: ElectionId,
        position: &str,
        candidate_id: CandidateId,
        approve: bool,
    ) -> Result<Event, LedgerError> {
        ctx.require_administrator()?;
        let position = self.election(election_id)?.position(position)?;
        let candidate = position.candidate(candidate_id)?;
        if candidate.status != CandidateStatus::Pending {
            return Err(LedgerError::InvalidState {
                entity: format!("candidate {candidate_id} for '{}'", position.name),
                status: format!("{:?}", candidate.status),
            });
        }

        let position = position.name.clone();
        Ok(if approve {
            Event::CandidateApproved {
                election_id,
                position,
                candidate_id,
            }
        } else {
            Event::CandidateRejected {
                election_id,
                position,
                candidate_id,
            }
        })
    }

    pub(super) fn apply_candidate_registered(
        &mut self,
        election_id: ElectionId,
        position: &str,
        candidate_id: CandidateId,
        name: &str,
    ) -> Result<(), LedgerError> {
        let position = self.election_mut(election_id)?.position_mut(position)?;
        if candidate_id != position.next_candidate_id() {
            return Err(position.unknown_candidate(candidate_id));
        }
        position.candidates.push(Candidate {
            id: candidate_id,
            name: name.to_string(),
            status: CandidateStatus::Pending,
            votes: 0,
        });
        Ok(())
    }

    pub(super) fn apply_candidate_decision(
        &mut self,
        election_id: ElectionId,
        position: &str,
        candidate_id: CandidateId,
        status: CandidateStatus,
    ) -> Result<(), LedgerError> {
        self.election_mut(election_id)?
            .position_mut(position)?
            .candidate_mut(candidate_id)?
            .status = status;
        Ok(())
    }

    /// Every registered candidate for a position, approved or not.
    pub fn candidates(
        &self,
        election_id: ElectionId,
        position: &str,
    ) -> Result<&[Candidate], LedgerError> {
        Ok(&self.election(election_id)?.position(position)?.candidates)
    }

    /// The ballot view: approved candidates only.
    pub fn approved_candidates(
        &self,
        election_id: ElectionId,
        position: &str,
    ) -> Result<Vec<&Candidate>, LedgerError> {
        Ok(self
            .election(election_id)?
            .position(position)?
            .approved()
            .collect())
    }

    pub fn candidate(
        &self,
        election_id: ElectionId,
        position: &str,
        candidate_id: CandidateId,
    ) -> Result<&Candidate, LedgerError> {
        self.election(election_id)?
            .position(position)?
            .candidate(candidate_id)
    }
}
