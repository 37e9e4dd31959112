//! Domain events and the hash chain that makes the event log tamper-evident.

use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use data_encoding::HEXLOWER;
use rocket::FromFormField;
use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest as _, Sha256};

use crate::error::ChainError;
use crate::model::{
    candidate::CandidateId, election::ElectionId, guard::Identity, voter::VoterDetails,
};

/// Every state change the ledger can make. Replaying the sequence from empty
/// reconstructs the full state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Event {
    VoterRegistered {
        identity: Identity,
        details: VoterDetails,
    },
    VoterApproved {
        identity: Identity,
    },
    VoterRejected {
        identity: Identity,
    },
    RegistrationsReset,
    ElectionCreated {
        election_id: ElectionId,
        name: String,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    },
    PositionCreated {
        election_id: ElectionId,
        position: String,
    },
    ElectionOpened {
        election_id: ElectionId,
    },
    ElectionClosed {
        election_id: ElectionId,
    },
    ElectionTimeExtended {
        election_id: ElectionId,
        end_time: DateTime<Utc>,
    },
    CandidateRegistered {
        election_id: ElectionId,
        position: String,
        candidate_id: CandidateId,
        name: String,
    },
    CandidateApproved {
        election_id: ElectionId,
        position: String,
        candidate_id: CandidateId,
    },
    CandidateRejected {
        election_id: ElectionId,
        position: String,
        candidate_id: CandidateId,
    },
    VoteCast {
        election_id: ElectionId,
        voter: Identity,
        position: String,
        candidate_id: CandidateId,
    },
}

/// The name of an event, without its payload. Used for filtering the log.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, FromFormField)]
pub enum EventKind {
    VoterRegistered,
    VoterApproved,
    VoterRejected,
    RegistrationsReset,
    ElectionCreated,
    PositionCreated,
    ElectionOpened,
    ElectionClosed,
    ElectionTimeExtended,
    CandidateRegistered,
    CandidateApproved,
    CandidateRejected,
    VoteCast,
}

impl Display for EventKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::VoterRegistered { .. } => EventKind::VoterRegistered,
            Self::VoterApproved { .. } => EventKind::VoterApproved,
            Self::VoterRejected { .. } => EventKind::VoterRejected,
            Self::RegistrationsReset => EventKind::RegistrationsReset,
            Self::ElectionCreated { .. } => EventKind::ElectionCreated,
            Self::PositionCreated { .. } => EventKind::PositionCreated,
            Self::ElectionOpened { .. } => EventKind::ElectionOpened,
            Self::ElectionClosed { .. } => EventKind::ElectionClosed,
            Self::ElectionTimeExtended { .. } => EventKind::ElectionTimeExtended,
            Self::CandidateRegistered { .. } => EventKind::CandidateRegistered,
            Self::CandidateApproved { .. } => EventKind::CandidateApproved,
            Self::CandidateRejected { .. } => EventKind::CandidateRejected,
            Self::VoteCast { .. } => EventKind::VoteCast,
        }
    }

    /// Feed a canonical, length-prefixed encoding of this event into `hasher`.
    fn hash_material(&self, hasher: &mut Material<'_>) {
        hasher.text(&self.kind().to_string());
        match self {
            Self::VoterRegistered { identity, details } => {
                hasher.text(identity.as_str());
                hasher.text(&details.first_name);
                hasher.text(&details.last_name);
                hasher.text(&details.registration_number);
                hasher.text(&details.email);
                hasher.text(&details.phone_number);
            }
            Self::VoterApproved { identity } | Self::VoterRejected { identity } => {
                hasher.text(identity.as_str());
            }
            Self::RegistrationsReset => {}
            Self::ElectionCreated {
                election_id,
                name,
                start_time,
                end_time,
            } => {
                hasher.number((*election_id).into());
                hasher.text(name);
                hasher.time(start_time);
                hasher.time(end_time);
            }
            Self::PositionCreated {
                election_id,
                position,
            } => {
                hasher.number((*election_id).into());
                hasher.text(position);
            }
            Self::ElectionOpened { election_id } | Self::ElectionClosed { election_id } => {
                hasher.number((*election_id).into());
            }
            Self::ElectionTimeExtended {
                election_id,
                end_time,
            } => {
                hasher.number((*election_id).into());
                hasher.time(end_time);
            }
            Self::CandidateRegistered {
                election_id,
                position,
                candidate_id,
                name,
            } => {
                hasher.number((*election_id).into());
                hasher.text(position);
                hasher.number((*candidate_id).into());
                hasher.text(name);
            }
            Self::CandidateApproved {
                election_id,
                position,
                candidate_id,
            }
            | Self::CandidateRejected {
                election_id,
                position,
                candidate_id,
            } => {
                hasher.number((*election_id).into());
                hasher.text(position);
                hasher.number((*candidate_id).into());
            }
            Self::VoteCast {
                election_id,
                voter,
                position,
                candidate_id,
            } => {
                hasher.number((*election_id).into());
                hasher.text(voter.as_str());
                hasher.text(position);
                hasher.number((*candidate_id).into());
            }
        }
    }
}

/// Unambiguous encoding of event fields into a hasher.
struct Material<'h>(&'h mut Sha256);

impl Material<'_> {
    fn number(&mut self, value: u64) {
        self.0.update(value.to_be_bytes());
    }

    fn text(&mut self, value: &str) {
        self.number(value.len() as u64);
        self.0.update(value.as_bytes());
    }

    fn time(&mut self, value: &DateTime<Utc>) {
        self.0.update(value.timestamp().to_be_bytes());
        self.0.update(value.timestamp_subsec_nanos().to_be_bytes());
    }
}

/// A SHA-256 digest, serialized as lowercase hex.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Digest([u8; 32]);

impl Digest {
    /// The back-link of the first event.
    pub const ZERO: Digest = Digest([0; 32]);

    pub fn to_hex(&self) -> String {
        HEXLOWER.encode(&self.0)
    }

    pub fn from_hex(hex: &str) -> Option<Self> {
        let bytes = HEXLOWER.decode(hex.as_bytes()).ok()?;
        bytes.try_into().ok().map(Self)
    }

    /// Commits to a voter's personal details without revealing them.
    pub fn of_voter_details(details: &VoterDetails) -> Self {
        let mut sha = Sha256::new();
        let mut material = Material(&mut sha);
        material.text(&details.first_name);
        material.text(&details.last_name);
        material.text(&details.registration_number);
        material.text(&details.email);
        material.text(&details.phone_number);
        Digest(sha.finalize().into())
    }
}

impl Display for Digest {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let hex = String::deserialize(deserializer)?;
        Self::from_hex(&hex)
            .ok_or_else(|| D::Error::custom(format!("'{hex}' is not a 32-byte hex digest")))
    }
}

/// A committed event, chained to its predecessor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedEvent {
    /// Position in the log, starting at 1.
    pub sequence: u64,
    pub recorded_at: DateTime<Utc>,
    /// Digest of the preceding record, or [`Digest::ZERO`] for the first.
    pub previous: Digest,
    pub digest: Digest,
    pub event: Event,
}

impl RecordedEvent {
    /// Append `event` after `head`.
    pub fn seal(head: &ChainHead, recorded_at: DateTime<Utc>, event: Event) -> Self {
        let sequence = head.length + 1;
        let digest = compute_digest(sequence, &recorded_at, &head.digest, &event);
        Self {
            sequence,
            recorded_at,
            previous: head.digest,
            digest,
            event,
        }
    }

    /// What the digest of this record should be, given its contents.
    pub fn expected_digest(&self) -> Digest {
        compute_digest(self.sequence, &self.recorded_at, &self.previous, &self.event)
    }
}

fn compute_digest(
    sequence: u64,
    recorded_at: &DateTime<Utc>,
    previous: &Digest,
    event: &Event,
) -> Digest {
    let mut sha = Sha256::new();
    sha.update(previous.0);
    let mut material = Material(&mut sha);
    material.number(sequence);
    material.time(recorded_at);
    event.hash_material(&mut material);
    Digest(sha.finalize().into())
}

/// The tip of the chain: how many records it holds and the last digest.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainHead {
    pub length: u64,
    pub digest: Digest,
}

impl ChainHead {
    pub const GENESIS: ChainHead = ChainHead {
        length: 0,
        digest: Digest::ZERO,
    };

    /// Check that `record` extends this head, and return the new head.
    pub fn extend(&self, record: &RecordedEvent) -> Result<ChainHead, ChainError> {
        if record.sequence != self.length + 1 {
            return Err(ChainError::Gap {
                expected: self.length + 1,
                found: record.sequence,
            });
        }
        if record.previous != self.digest {
            return Err(ChainError::BrokenLink {
                sequence: record.sequence,
                expected: self.digest,
            });
        }
        let expected = record.expected_digest();
        if record.digest != expected {
            return Err(ChainError::Tampered {
                sequence: record.sequence,
                expected,
            });
        }
        Ok(ChainHead {
            length: record.sequence,
            digest: record.digest,
        })
    }
}

impl Default for ChainHead {
    fn default() -> Self {
        Self::GENESIS
    }
}

/// Verify an entire log, returning its head.
pub fn verify_chain<'a>(
    records: impl IntoIterator<Item = &'a RecordedEvent>,
) -> Result<ChainHead, ChainError> {
    records
        .into_iter()
        .try_fold(ChainHead::GENESIS, |head, record| head.extend(record))
}
