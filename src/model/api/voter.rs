use serde::{Deserialize, Serialize};

use crate::model::{
    ballot::BallotKey,
    guard::Identity,
    voter::{Voter, VoterDetails, VoterStatus},
};

/// A voter record as shown to the administrator or the voter themself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterDescription {
    pub identity: Identity,
    #[serde(flatten)]
    pub details: VoterDetails,
    pub status: VoterStatus,
    /// Every position this voter has voted on.
    pub ballots: Vec<BallotKey>,
}

impl From<&Voter> for VoterDescription {
    fn from(voter: &Voter) -> Self {
        Self {
            identity: voter.identity.clone(),
            details: voter.details.clone(),
            status: voter.status,
            ballots: voter.ballots.iter().cloned().collect(),
        }
    }
}

/// Who the server thinks the caller is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Whoami {
    pub identity: Identity,
    pub is_administrator: bool,
    /// Absent if the caller never registered as a voter.
    pub voter_status: Option<VoterStatus>,
}
