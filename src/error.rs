use jsonwebtoken::errors::Error as JwtError;
use mongodb::error::Error as DbError;
use rocket::{http::Status, response::Responder, serde::json::Json, Request};
use serde::Serialize;
use thiserror::Error;

use crate::model::{
    candidate::CandidateId,
    election::ElectionId,
    event::{Digest, EventKind},
    guard::Identity,
};

pub type Result<T> = std::result::Result<T, Error>;

/// The broad class of a rejected ledger call.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub enum ErrorCategory {
    /// The caller lacks the required role.
    Authorization,
    /// The operation is invalid for the entity's lifecycle state.
    State,
    /// The operation falls outside its valid time window.
    Timing,
    /// A referenced entity does not exist.
    NotFound,
    /// The input is malformed.
    Validation,
}

/// Reasons the ledger refuses a call. A refused call never changes any state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("{0} is not the election administrator")]
    NotAdministrator(Identity),
    #[error("{0} is not an approved voter")]
    NotApproved(Identity),

    #[error("voter {0} is already approved")]
    AlreadyApproved(Identity),
    #[error("voter {0} already has a pending registration")]
    AlreadyPending(Identity),
    #[error("voter {0} has been rejected and cannot register again")]
    AlreadyRejected(Identity),
    #[error("{entity} is {status}, not pending")]
    InvalidState { entity: String, status: String },
    #[error("election {0} is already open")]
    AlreadyOpen(ElectionId),
    #[error("election {0} is already closed")]
    AlreadyClosed(ElectionId),
    #[error("candidate {candidate_id} for '{position}' is not approved")]
    CandidateNotApproved {
        position: String,
        candidate_id: CandidateId,
    },
    #[error("already voted for '{position}' in election {election_id}")]
    AlreadyVoted {
        election_id: ElectionId,
        position: String,
    },

    #[error("voter registration closed once the first election started")]
    RegistrationClosed,
    #[error("voting is not open for election {0}")]
    VotingClosed(ElectionId),
    #[error("election {0} is not open")]
    NotOpen(ElectionId),

    #[error("no voter registered as {0}")]
    UnknownVoter(Identity),
    #[error("no election with ID {0}")]
    UnknownElection(ElectionId),
    #[error("election {election_id} has no position '{position}'")]
    UnknownPosition {
        election_id: ElectionId,
        position: String,
    },
    #[error("position '{position}' has no candidate {candidate_id}")]
    UnknownCandidate {
        position: String,
        candidate_id: CandidateId,
    },

    #[error("{0} must not be empty")]
    EmptyField(&'static str),
    #[error("'{0}' is not a valid email address")]
    InvalidEmail(String),
    #[error("'{0}' is not a valid phone number")]
    InvalidPhoneNumber(String),
    #[error("end time must be after {0}")]
    InvalidWindow(String),
    #[error("election {election_id} already has a position '{position}'")]
    DuplicatePosition {
        election_id: ElectionId,
        position: String,
    },
}

impl LedgerError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotAdministrator(_) | Self::NotApproved(_) => ErrorCategory::Authorization,
            Self::AlreadyApproved(_)
            | Self::AlreadyPending(_)
            | Self::AlreadyRejected(_)
            | Self::InvalidState { .. }
            | Self::AlreadyOpen(_)
            | Self::AlreadyClosed(_)
            | Self::CandidateNotApproved { .. }
            | Self::AlreadyVoted { .. } => ErrorCategory::State,
            Self::RegistrationClosed | Self::VotingClosed(_) | Self::NotOpen(_) => {
                ErrorCategory::Timing
            }
            Self::UnknownVoter(_)
            | Self::UnknownElection(_)
            | Self::UnknownPosition { .. }
            | Self::UnknownCandidate { .. } => ErrorCategory::NotFound,
            Self::EmptyField(_)
            | Self::InvalidEmail(_)
            | Self::InvalidPhoneNumber(_)
            | Self::InvalidWindow(_)
            | Self::DuplicatePosition { .. } => ErrorCategory::Validation,
        }
    }
}

/// Reasons a recorded event log fails verification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("expected event {expected} but found event {found}")]
    Gap { expected: u64, found: u64 },
    #[error("event {sequence} does not follow {expected}")]
    BrokenLink { sequence: u64, expected: Digest },
    #[error("event {sequence} has been altered: digest should be {expected}")]
    Tampered { sequence: u64, expected: Digest },
    #[error("event {sequence} ({kind}) cannot be applied: {source}")]
    Inconsistent {
        sequence: u64,
        kind: EventKind,
        source: LedgerError,
    },
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Jwt(#[from] JwtError),
    #[error("{1}")]
    Status(Status, String),
}

impl Error {
    fn status_and_category(&self) -> (Status, &'static str) {
        match self {
            Self::Ledger(err) => match err.category() {
                ErrorCategory::Authorization => (Status::Forbidden, "Authorization"),
                ErrorCategory::State => (Status::Conflict, "State"),
                ErrorCategory::Timing => (Status::UnprocessableEntity, "Timing"),
                ErrorCategory::NotFound => (Status::NotFound, "NotFound"),
                ErrorCategory::Validation => (Status::BadRequest, "Validation"),
            },
            Self::Chain(_) | Self::Db(_) => (Status::InternalServerError, "Internal"),
            Self::Jwt(_) => (Status::Unauthorized, "Authorization"),
            Self::Status(status, _) => (*status, "Request"),
        }
    }
}

/// Body returned alongside every error status.
#[derive(Debug, Serialize)]
struct ErrorBody {
    category: &'static str,
    reason: String,
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, req: &'r Request<'_>) -> rocket::response::Result<'o> {
        let (status, category) = self.status_and_category();
        if status.code >= 500 {
            error!("{self}");
        } else {
            debug!("Refused: {self}");
        }
        let body = ErrorBody {
            category,
            reason: self.to_string(),
        };
        (status, Json(body)).respond_to(req)
    }
}
