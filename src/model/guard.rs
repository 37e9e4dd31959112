//! The access and timing guard consulted before every ledger mutation.

use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::model::{election::ElectionPhase, state::LedgerState, voter::Voter};

/// An already-authenticated account handle, as resolved by the external
/// authentication collaborator.
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Identity(String);

impl Identity {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Display for Identity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(handle: &str) -> Self {
        Self::new(handle)
    }
}

impl From<String> for Identity {
    fn from(handle: String) -> Self {
        Self::new(handle)
    }
}

impl From<Identity> for String {
    fn from(identity: Identity) -> Self {
        identity.0
    }
}

/// The party making a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub identity: Identity,
}

impl Caller {
    pub fn new(identity: impl Into<Identity>) -> Self {
        Self {
            identity: identity.into(),
        }
    }
}

/// Who holds administrative rights over the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authority {
    pub administrator: Identity,
}

impl Authority {
    pub fn new(administrator: impl Into<Identity>) -> Self {
        Self {
            administrator: administrator.into(),
        }
    }

    pub fn is_administrator(&self, identity: &Identity) -> bool {
        &self.administrator == identity
    }
}

/// Everything the guard needs to judge a single call.
#[derive(Debug, Clone)]
pub struct Context {
    pub caller: Caller,
    pub authority: Authority,
    pub now: DateTime<Utc>,
}

impl Context {
    pub fn new(caller: Caller, authority: Authority, now: DateTime<Utc>) -> Self {
        Self {
            caller,
            authority,
            now,
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.caller.identity
    }

    pub fn is_administrator(&self) -> bool {
        self.authority.is_administrator(&self.caller.identity)
    }

    /// Reject anyone but the administrator.
    pub fn require_administrator(&self) -> Result<(), LedgerError> {
        if self.is_administrator() {
            Ok(())
        } else {
            Err(LedgerError::NotAdministrator(self.caller.identity.clone()))
        }
    }

    /// Allow the administrator or the named identity itself.
    pub fn require_self_or_administrator(&self, identity: &Identity) -> Result<(), LedgerError> {
        if self.identity() == identity {
            Ok(())
        } else {
            self.require_administrator()
        }
    }

    /// Resolve the caller to an approved voter.
    pub fn require_approved_voter<'s>(
        &self,
        state: &'s LedgerState,
    ) -> Result<&'s Voter, LedgerError> {
        match state.voter(self.identity()) {
            Some(voter) if voter.status.is_approved() => Ok(voter),
            _ => Err(LedgerError::NotApproved(self.caller.identity.clone())),
        }
    }

    /// Voter registration is only open until the first election reaches its start time.
    pub fn require_registration_open(&self, state: &LedgerState) -> Result<(), LedgerError> {
        let started = state
            .elections()
            .any(|election| election.phase_at(self.now) != ElectionPhase::Upcoming);
        if started {
            Err(LedgerError::RegistrationClosed)
        } else {
            Ok(())
        }
    }
}

/// A source of wall-clock time. Election phases are derived from it at read time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The real clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
pub use self::manual::ManualClock;

#[cfg(test)]
mod manual {
    use std::sync::{Arc, Mutex};

    use chrono::{DateTime, Duration, Utc};

    use super::Clock;

    /// A clock that only moves when told to.
    #[derive(Debug, Clone)]
    pub struct ManualClock(Arc<Mutex<DateTime<Utc>>>);

    impl ManualClock {
        pub fn starting_at(time: DateTime<Utc>) -> Self {
            Self(Arc::new(Mutex::new(time)))
        }

        pub fn advance(&self, by: Duration) {
            *self.0.lock().unwrap() += by;
        }

        pub fn set(&self, time: DateTime<Utc>) {
            *self.0.lock().unwrap() = time;
        }
    }

    impl Default for ManualClock {
        fn default() -> Self {
            Self::starting_at(Utc::now())
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }
}
