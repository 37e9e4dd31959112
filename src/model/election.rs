use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::model::{
    candidate::Position, event::Event, guard::Context, state::LedgerState, voter::non_empty,
};

/// Election IDs are sequential and 1-based.
pub type ElectionId = u32;

/// Election status derived from the clock. Never stored.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElectionPhase {
    /// Before the start time.
    Upcoming,
    /// Between the start time (inclusive) and end time (exclusive).
    Ongoing,
    /// At or after the end time.
    Ended,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Election {
    pub id: ElectionId,
    pub name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Administrative override, independent of the schedule.
    pub is_open: bool,
    /// Positions in ballot order.
    pub positions: IndexMap<String, Position>,
}

impl Election {
    pub fn phase_at(&self, now: DateTime<Utc>) -> ElectionPhase {
        if now < self.start_time {
            ElectionPhase::Upcoming
        } else if now < self.end_time {
            ElectionPhase::Ongoing
        } else {
            ElectionPhase::Ended
        }
    }

    /// Votes are only accepted while the election is both open and ongoing.
    pub fn accepts_votes_at(&self, now: DateTime<Utc>) -> bool {
        self.is_open && self.phase_at(now) == ElectionPhase::Ongoing
    }

    pub fn position(&self, name: &str) -> Result<&Position, LedgerError> {
        self.positions
            .get(name.trim())
            .ok_or_else(|| self.unknown_position(name))
    }

    pub(crate) fn position_mut(&mut self, name: &str) -> Result<&mut Position, LedgerError> {
        let err = self.unknown_position(name);
        self.positions.get_mut(name.trim()).ok_or(err)
    }

    fn unknown_position(&self, name: &str) -> LedgerError {
        LedgerError::UnknownPosition {
            election_id: self.id,
            position: name.trim().to_string(),
        }
    }
}

impl LedgerState {
    pub(super) fn plan_create_election(
        &self,
        ctx: &Context,
        name: &str,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<Event, LedgerError> {
        ctx.require_administrator()?;
        let name = non_empty(name.to_string(), "election name")?;
        if end_time <= start_time {
            return Err(LedgerError::InvalidWindow(format!(
                "the start time {start_time}"
            )));
        }

        Ok(Event::ElectionCreated {
            election_id: self.next_election_id(),
            name,
            start_time,
            end_time,
        })
    }

    pub(super) fn plan_create_position(
        &self,
        ctx: &Context,
        election_id: ElectionId,
        position: &str,
    ) -> Result<Event, LedgerError> {
        ctx.require_administrator()?;
        let election = self.election(election_id)?;
        let position = non_empty(position.to_string(), "position name")?;
        if election.positions.contains_key(&position) {
            return Err(LedgerError::DuplicatePosition {
                election_id,
                position,
            });
        }

        Ok(Event::PositionCreated {
            election_id,
            position,
        })
    }

    /// Plan flipping the administrative open/closed flag.
    pub(super) fn plan_set_open(
        &self,
        ctx: &Context,
        election_id: ElectionId,
        open: bool,
    ) -> Result<Event, LedgerError> {
        ctx.require_administrator()?;
        let election = self.election(election_id)?;
        match (election.is_open, open) {
            (true, true) => Err(LedgerError::AlreadyOpen(election_id)),
            (false, false) => Err(LedgerError::AlreadyClosed(election_id)),
            (false, true) => Ok(Event::ElectionOpened { election_id }),
            (true, false) => Ok(Event::ElectionClosed { election_id }),
        }
    }

    pub(super) fn plan_extend_election(
        &self,
        ctx: &Context,
        election_id: ElectionId,
        end_time: DateTime<Utc>,
    ) -> Result<Event, LedgerError> {
        ctx.require_administrator()?;
        let election = self.election(election_id)?;
        // The window check comes first so that a non-extension is always a
        // validation failure, whatever the open flag says.
        if end_time <= election.end_time {
            return Err(LedgerError::InvalidWindow(format!(
                "the current end time {}",
                election.end_time
            )));
        }
        if !election.is_open {
            return Err(LedgerError::NotOpen(election_id));
        }

        Ok(Event::ElectionTimeExtended {
            election_id,
            end_time,
        })
    }

    pub(super) fn apply_election_created(
        &mut self,
        election_id: ElectionId,
        name: &str,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        if election_id != self.next_election_id() {
            return Err(LedgerError::UnknownElection(election_id));
        }
        if end_time <= start_time {
            return Err(LedgerError::InvalidWindow(format!(
                "the start time {start_time}"
            )));
        }
        self.elections.push(Election {
            id: election_id,
            name: name.to_string(),
            start_time,
            end_time,
            is_open: false,
            positions: IndexMap::new(),
        });
        Ok(())
    }

    pub(super) fn apply_position_created(
        &mut self,
        election_id: ElectionId,
        position: &str,
    ) -> Result<(), LedgerError> {
        let election = self.election_mut(election_id)?;
        if election.positions.contains_key(position) {
            return Err(LedgerError::DuplicatePosition {
                election_id,
                position: position.to_string(),
            });
        }
        election
            .positions
            .insert(position.to_string(), Position::new(position.to_string()));
        Ok(())
    }

    pub(super) fn apply_open_flag(
        &mut self,
        election_id: ElectionId,
        open: bool,
    ) -> Result<(), LedgerError> {
        self.election_mut(election_id)?.is_open = open;
        Ok(())
    }

    pub(super) fn apply_election_extended(
        &mut self,
        election_id: ElectionId,
        end_time: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        let election = self.election_mut(election_id)?;
        if end_time <= election.end_time {
            return Err(LedgerError::InvalidWindow(format!(
                "the current end time {}",
                election.end_time
            )));
        }
        election.end_time = end_time;
        Ok(())
    }

    fn next_election_id(&self) -> ElectionId {
        self.elections.len() as ElectionId + 1
    }
}
