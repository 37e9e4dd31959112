use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    election::{Election, ElectionId, ElectionPhase},
    state::Command,
};

/// An election specification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElectionSpec {
    /// Election name.
    pub name: String,
    /// Election start time.
    pub start_time: DateTime<Utc>,
    /// Election end time.
    pub end_time: DateTime<Utc>,
}

impl From<ElectionSpec> for Command {
    fn from(spec: ElectionSpec) -> Self {
        Command::CreateElection {
            name: spec.name,
            start_time: spec.start_time,
            end_time: spec.end_time,
        }
    }
}

/// A new contested position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionSpec {
    pub name: String,
}

/// A new, later end time for an election.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtensionSpec {
    pub end_time: DateTime<Utc>,
}

/// A full election description, including its positions in ballot order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionDescription {
    /// Election unique ID.
    pub id: ElectionId,
    /// Election name.
    pub name: String,
    /// Phase at the time the description was built.
    pub phase: ElectionPhase,
    /// Whether the administrator has opened voting.
    pub is_open: bool,
    /// Election start time.
    pub start_time: DateTime<Utc>,
    /// Election end time.
    pub end_time: DateTime<Utc>,
    /// Position names, in ballot order.
    pub positions: Vec<String>,
}

impl ElectionDescription {
    pub fn new(election: &Election, now: DateTime<Utc>) -> Self {
        Self {
            id: election.id,
            name: election.name.clone(),
            phase: election.phase_at(now),
            is_open: election.is_open,
            start_time: election.start_time,
            end_time: election.end_time,
            positions: election.positions.keys().cloned().collect(),
        }
    }
}

/// A summary of an election, shorter than the full `ElectionDescription`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionSummary {
    pub id: ElectionId,
    pub name: String,
    pub phase: ElectionPhase,
    pub is_open: bool,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl ElectionSummary {
    pub fn new(election: &Election, now: DateTime<Utc>) -> Self {
        Self {
            id: election.id,
            name: election.name.clone(),
            phase: election.phase_at(now),
            is_open: election.is_open,
            start_time: election.start_time,
            end_time: election.end_time,
        }
    }
}
