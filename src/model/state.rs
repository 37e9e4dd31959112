//! The pure ledger state machine. Commands are planned into events against a
//! read-only state, and events are applied to produce the next state.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;

use crate::error::{ChainError, LedgerError};
use crate::model::{
    candidate::{CandidateId, CandidateStatus},
    election::{Election, ElectionId},
    event::{ChainHead, Event, RecordedEvent},
    guard::{Context, Identity},
    voter::{Voter, VoterDetails, VoterStatus},
};

/// A request to change the ledger, made on behalf of a caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    RegisterVoter(VoterDetails),
    ApproveVoter(Identity),
    RejectVoter(Identity),
    ResetRegistrations,
    CreateElection {
        name: String,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    },
    CreatePosition {
        election_id: ElectionId,
        position: String,
    },
    OpenElection(ElectionId),
    CloseElection(ElectionId),
    ExtendElection {
        election_id: ElectionId,
        end_time: DateTime<Utc>,
    },
    RegisterCandidate {
        election_id: ElectionId,
        position: String,
        name: String,
    },
    ApproveCandidate {
        election_id: ElectionId,
        position: String,
        candidate_id: CandidateId,
    },
    RejectCandidate {
        election_id: ElectionId,
        position: String,
        candidate_id: CandidateId,
    },
    Vote {
        election_id: ElectionId,
        position: String,
        candidate_id: CandidateId,
    },
}

/// Everything the ledger knows, as derived from its events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerState {
    /// In registration order.
    pub(crate) voters: IndexMap<Identity, Voter>,
    /// Indexed by `id - 1`.
    pub(crate) elections: Vec<Election>,
}

impl LedgerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the state from a recorded log, verifying the chain as it goes.
    pub fn replay<'a>(
        records: impl IntoIterator<Item = &'a RecordedEvent>,
    ) -> Result<Self, ChainError> {
        let mut state = Self::new();
        let mut head = ChainHead::GENESIS;
        for record in records {
            head = head.extend(record)?;
            state
                .apply(&record.event)
                .map_err(|source| ChainError::Inconsistent {
                    sequence: record.sequence,
                    kind: record.event.kind(),
                    source,
                })?;
        }
        Ok(state)
    }

    pub fn voter(&self, identity: &Identity) -> Option<&Voter> {
        self.voters.get(identity)
    }

    pub fn elections(&self) -> impl Iterator<Item = &Election> {
        self.elections.iter()
    }

    pub fn election_count(&self) -> usize {
        self.elections.len()
    }

    pub fn election(&self, election_id: ElectionId) -> Result<&Election, LedgerError> {
        election_id
            .checked_sub(1)
            .and_then(|index| self.elections.get(index as usize))
            .ok_or(LedgerError::UnknownElection(election_id))
    }

    pub(crate) fn election_mut(
        &mut self,
        election_id: ElectionId,
    ) -> Result<&mut Election, LedgerError> {
        election_id
            .checked_sub(1)
            .and_then(|index| self.elections.get_mut(index as usize))
            .ok_or(LedgerError::UnknownElection(election_id))
    }

    /// Check `command` against the current state and, if it is allowed, return
    /// the event that records it. Never modifies the state.
    pub fn plan(&self, ctx: &Context, command: &Command) -> Result<Event, LedgerError> {
        match command {
            Command::RegisterVoter(details) => self.plan_register_voter(ctx, details),
            Command::ApproveVoter(identity) => self.plan_decide_voter(ctx, identity, true),
            Command::RejectVoter(identity) => self.plan_decide_voter(ctx, identity, false),
            Command::ResetRegistrations => self.plan_reset_registrations(ctx),
            Command::CreateElection {
                name,
                start_time,
                end_time,
            } => self.plan_create_election(ctx, name, *start_time, *end_time),
            Command::CreatePosition {
                election_id,
                position,
            } => self.plan_create_position(ctx, *election_id, position),
            Command::OpenElection(election_id) => self.plan_set_open(ctx, *election_id, true),
            Command::CloseElection(election_id) => self.plan_set_open(ctx, *election_id, false),
            Command::ExtendElection {
                election_id,
                end_time,
            } => self.plan_extend_election(ctx, *election_id, *end_time),
            Command::RegisterCandidate {
                election_id,
                position,
                name,
            } => self.plan_register_candidate(ctx, *election_id, position, name),
            Command::ApproveCandidate {
                election_id,
                position,
                candidate_id,
            } => self.plan_decide_candidate(ctx, *election_id, position, *candidate_id, true),
            Command::RejectCandidate {
                election_id,
                position,
                candidate_id,
            } => self.plan_decide_candidate(ctx, *election_id, position, *candidate_id, false),
            Command::Vote {
                election_id,
                position,
                candidate_id,
            } => self.plan_vote(ctx, *election_id, position, *candidate_id),
        }
    }

    /// Fold a single event into the state. Events only fail to apply when the
    /// log is inconsistent, in which case the state may be partially updated
    /// and must be discarded.
    pub fn apply(&mut self, event: &Event) -> Result<(), LedgerError> {
        match event {
            Event::VoterRegistered { identity, details } => {
                self.apply_voter_registered(identity, details)
            }
            Event::VoterApproved { identity } => {
                self.apply_voter_decision(identity, VoterStatus::Approved)
            }
            Event::VoterRejected { identity } => {
                self.apply_voter_decision(identity, VoterStatus::Rejected)
            }
            Event::RegistrationsReset => {
                self.apply_registrations_reset();
                Ok(())
            }
            Event::ElectionCreated {
                election_id,
                name,
                start_time,
                end_time,
            } => self.apply_election_created(*election_id, name, *start_time, *end_time),
            Event::PositionCreated {
                election_id,
                position,
            } => self.apply_position_created(*election_id, position),
            Event::ElectionOpened { election_id } => self.apply_open_flag(*election_id, true),
            Event::ElectionClosed { election_id } => self.apply_open_flag(*election_id, false),
            Event::ElectionTimeExtended {
                election_id,
                end_time,
            } => self.apply_election_extended(*election_id, *end_time),
            Event::CandidateRegistered {
                election_id,
                position,
                candidate_id,
                name,
            } => self.apply_candidate_registered(*election_id, position, *candidate_id, name),
            Event::CandidateApproved {
                election_id,
                position,
                candidate_id,
            } => self.apply_candidate_decision(
                *election_id,
                position,
                *candidate_id,
                CandidateStatus::Approved,
            ),
            Event::CandidateRejected {
                election_id,
                position,
                candidate_id,
            } => self.apply_candidate_decision(
                *election_id,
                position,
                *candidate_id,
                CandidateStatus::Rejected,
            ),
            Event::VoteCast {
                election_id,
                voter,
                position,
                candidate_id,
            } => self.apply_vote_cast(*election_id, voter, position, *candidate_id),
        }
    }
}
