use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    event::{ChainHead, Digest, Event, EventKind, RecordedEvent},
    guard::Identity,
};

/// The complete, independently verifiable event log. Includes voters'
/// personal details, so only the administrator may fetch it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerExport {
    pub head: ChainHead,
    pub events: Vec<RecordedEvent>,
}

/// A recorded event as anyone may see it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicRecord {
    pub sequence: u64,
    pub recorded_at: DateTime<Utc>,
    pub previous: Digest,
    pub digest: Digest,
    pub event: PublicEvent,
}

impl From<RecordedEvent> for PublicRecord {
    fn from(record: RecordedEvent) -> Self {
        Self {
            sequence: record.sequence,
            recorded_at: record.recorded_at,
            previous: record.previous,
            digest: record.digest,
            event: record.event.into(),
        }
    }
}

/// Registrations keep the identity and email. The other details are replaced
/// by their digest. Every other event is shown as recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PublicEvent {
    VoterRegistered(PublicRegistration),
    Other(Event),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicRegistration {
    /// Always [`EventKind::VoterRegistered`].
    pub kind: EventKind,
    pub identity: Identity,
    pub email: String,
    pub details_digest: Digest,
}

impl PublicEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::VoterRegistered(registration) => registration.kind,
            Self::Other(event) => event.kind(),
        }
    }
}

impl From<Event> for PublicEvent {
    fn from(event: Event) -> Self {
        match event {
            Event::VoterRegistered { identity, details } => {
                Self::VoterRegistered(PublicRegistration {
                    kind: EventKind::VoterRegistered,
                    details_digest: Digest::of_voter_details(&details),
                    email: details.email,
                    identity,
                })
            }
            other => Self::Other(other),
        }
    }
}
