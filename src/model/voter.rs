use std::collections::BTreeSet;

use phonenumber::Mode;
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::model::{
    ballot::BallotKey,
    event::Event,
    guard::{Context, Identity},
    state::LedgerState,
};

/// Where a voter stands in the approval workflow.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoterStatus {
    /// Registered, awaiting the administrator.
    Pending,
    /// May vote.
    Approved,
    /// Refused. Terminal.
    Rejected,
    /// Registration cleared by a reset; may register again.
    Lapsed,
}

impl VoterStatus {
    pub fn is_approved(self) -> bool {
        self == Self::Approved
    }
}

/// Personal details supplied at registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterDetails {
    pub first_name: String,
    pub last_name: String,
    pub registration_number: String,
    pub email: String,
    pub phone_number: String,
}

impl VoterDetails {
    /// Trim every field, reject blanks, check the email shape and normalise
    /// the phone number to E.164.
    pub fn validated(self) -> Result<Self, LedgerError> {
        let first_name = non_empty(self.first_name, "first name")?;
        let last_name = non_empty(self.last_name, "last name")?;
        let registration_number = non_empty(self.registration_number, "registration number")?;
        let email = non_empty(self.email, "email")?;
        let phone_number = non_empty(self.phone_number, "phone number")?;

        match email.split_once('@') {
            Some((local, domain))
                if !local.is_empty() && domain.contains('.') && !domain.contains('@') => {}
            _ => return Err(LedgerError::InvalidEmail(email)),
        }

        let phone_number = phonenumber::parse(None, &phone_number)
            .map_err(|_| LedgerError::InvalidPhoneNumber(phone_number.clone()))?
            .format()
            .mode(Mode::E164)
            .to_string();

        Ok(Self {
            first_name,
            last_name,
            registration_number,
            email,
            phone_number,
        })
    }
}

pub(crate) fn non_empty(value: String, field: &'static str) -> Result<String, LedgerError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(LedgerError::EmptyField(field))
    } else {
        Ok(trimmed.to_string())
    }
}

/// A voter record. Never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Voter {
    pub identity: Identity,
    #[serde(flatten)]
    pub details: VoterDetails,
    pub status: VoterStatus,
    /// Every (election, position) this voter has cast a ballot for.
    pub ballots: BTreeSet<BallotKey>,
}

impl Voter {
    pub fn has_voted(&self, key: &BallotKey) -> bool {
        self.ballots.contains(key)
    }
}

impl LedgerState {
    pub(super) fn plan_register_voter(
        &self,
        ctx: &Context,
        details: &VoterDetails,
    ) -> Result<Event, LedgerError> {
        let identity = ctx.identity();
        if identity.is_empty() {
            return Err(LedgerError::EmptyField("identity"));
        }
        match self.voter(identity).map(|voter| voter.status) {
            Some(VoterStatus::Approved) => return Err(LedgerError::AlreadyApproved(identity.clone())),
            Some(VoterStatus::Pending) => return Err(LedgerError::AlreadyPending(identity.clone())),
            Some(VoterStatus::Rejected) => return Err(LedgerError::AlreadyRejected(identity.clone())),
            Some(VoterStatus::Lapsed) | None => {}
        }
        let details = details.clone().validated()?;
        ctx.require_registration_open(self)?;

        Ok(Event::VoterRegistered {
            identity: identity.clone(),
            details,
        })
    }

    /// Plan an approval or rejection of a pending voter.
    pub(super) fn plan_decide_voter(
        &self,
        ctx: &Context,
        identity: &Identity,
        approve: bool,
    ) -> Result<Event, LedgerError> {
        ctx.require_administrator()?;
        let voter = self
            .voter(identity)
            .ok_or_else(|| LedgerError::UnknownVoter(identity.clone()))?;
        if voter.status != VoterStatus::Pending {
            return Err(LedgerError::InvalidState {
                entity: format!("voter {identity}"),
                status: format!("{:?}", voter.status),
            });
        }

        let identity = identity.clone();
        Ok(if approve {
            Event::VoterApproved { identity }
        } else {
            Event::VoterRejected { identity }
        })
    }

    pub(super) fn plan_reset_registrations(&self, ctx: &Context) -> Result<Event, LedgerError> {
        ctx.require_administrator()?;
        Ok(Event::RegistrationsReset)
    }

    pub(super) fn apply_voter_registered(
        &mut self,
        identity: &Identity,
        details: &VoterDetails,
    ) -> Result<(), LedgerError> {
        // A re-registration after a reset keeps the ballot history but moves
        // the voter to the back of the registration order.
        let ballots = match self.voters.shift_remove(identity) {
            Some(previous) => previous.ballots,
            None => BTreeSet::new(),
        };
        self.voters.insert(
            identity.clone(),
            Voter {
                identity: identity.clone(),
                details: details.clone(),
                status: VoterStatus::Pending,
                ballots,
            },
        );
        Ok(())
    }

    pub(super) fn apply_voter_decision(
        &mut self,
        identity: &Identity,
        status: VoterStatus,
    ) -> Result<(), LedgerError> {
        let voter = self
            .voters
            .get_mut(identity)
            .ok_or_else(|| LedgerError::UnknownVoter(identity.clone()))?;
        voter.status = status;
        Ok(())
    }

    pub(super) fn apply_registrations_reset(&mut self) {
        for voter in self.voters.values_mut() {
            if matches!(voter.status, VoterStatus::Pending | VoterStatus::Approved) {
                voter.status = VoterStatus::Lapsed;
            }
        }
    }

    /// Voters with the given status, in registration order.
    pub fn voters_with_status(
        &self,
        ctx: &Context,
        status: VoterStatus,
    ) -> Result<Vec<&Voter>, LedgerError> {
        ctx.require_administrator()?;
        Ok(self
            .voters
            .values()
            .filter(|voter| voter.status == status)
            .collect())
    }

    /// A single voter record, visible to the administrator and the voter.
    pub fn voter_record(&self, ctx: &Context, identity: &Identity) -> Result<&Voter, LedgerError> {
        ctx.require_self_or_administrator(identity)?;
        self.voter(identity)
            .ok_or_else(|| LedgerError::UnknownVoter(identity.clone()))
    }
}


#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::model::state::{tests::TestLedger, Command};

    #[test]
    fn details_are_normalised() {
        let mut details = VoterDetails::example();
        details.first_name = "  Ada ".to_string();
        details.phone_number = "+44 1234 567890".to_string();
        let details = details.validated().unwrap();
        assert_eq!(details.first_name, "Ada");
        assert_eq!(details.phone_number, "+441234567890");
    }

    #[test]
    fn bad_details_are_rejected() {
        let mut details = VoterDetails::example();
        details.last_name = "   ".to_string();
        assert_eq!(
            details.validated(),
            Err(LedgerError::EmptyField("last name"))
        );

        let mut details = VoterDetails::example();
        details.email = "not-an-email".to_string();
        assert!(matches!(
            details.validated(),
            Err(LedgerError::InvalidEmail(_))
        ));

        let mut details = VoterDetails::example();
        details.phone_number = "call me maybe".to_string();
        assert!(matches!(
            details.validated(),
            Err(LedgerError::InvalidPhoneNumber(_))
        ));
    }

    #[test]
    fn duplicate_registration_keeps_original() {
        let mut ledger = TestLedger::new();
        ledger.register("alice").unwrap();

        let mut changed = VoterDetails::example();
        changed.first_name = "Someone Else".to_string();
        let err = ledger
            .run("alice", Command::RegisterVoter(changed))
            .unwrap_err();
        assert_eq!(err, LedgerError::AlreadyPending("alice".into()));

        // Whatever the second payload looks like.
        let mut malformed = VoterDetails::example();
        malformed.email = "nowhere".to_string();
        malformed.phone_number = String::new();
        let err = ledger
            .run("alice", Command::RegisterVoter(malformed))
            .unwrap_err();
        assert_eq!(err, LedgerError::AlreadyPending("alice".into()));

        let voter = ledger.state.voter(&"alice".into()).unwrap();
        assert_eq!(voter.details, VoterDetails::example().validated().unwrap());
        assert_eq!(voter.status, VoterStatus::Pending);
    }

    #[test]
    fn approval_workflow() {
        let mut ledger = TestLedger::new();
        ledger.register("alice").unwrap();
        ledger.register("bob").unwrap();

        // Only the administrator decides.
        let err = ledger
            .run("bob", Command::ApproveVoter("alice".into()))
            .unwrap_err();
        assert_eq!(err, LedgerError::NotAdministrator("bob".into()));

        ledger.admin(Command::ApproveVoter("alice".into())).unwrap();
        ledger.admin(Command::RejectVoter("bob".into())).unwrap();

        // Decisions are final.
        for command in [
            Command::ApproveVoter("alice".into()),
            Command::RejectVoter("alice".into()),
            Command::ApproveVoter("bob".into()),
        ] {
            let err = ledger.admin(command).unwrap_err();
            assert!(matches!(err, LedgerError::InvalidState { .. }));
        }
        let err = ledger.admin(Command::ApproveVoter("carol".into())).unwrap_err();
        assert_eq!(err, LedgerError::UnknownVoter("carol".into()));

        // Registering again is refused in either terminal state.
        let err = ledger.register("alice").unwrap_err();
        assert_eq!(err, LedgerError::AlreadyApproved("alice".into()));
        let err = ledger.register("bob").unwrap_err();
        assert_eq!(err, LedgerError::AlreadyRejected("bob".into()));
    }

    #[test]
    fn listings_follow_registration_order() {
        let mut ledger = TestLedger::new();
        for name in ["carol", "alice", "bob", "dave"] {
            ledger.register(name).unwrap();
        }
        ledger.admin(Command::ApproveVoter("bob".into())).unwrap();
        ledger.admin(Command::ApproveVoter("carol".into())).unwrap();
        ledger.admin(Command::RejectVoter("dave".into())).unwrap();

        let ctx = ledger.context(TestLedger::ADMIN);
        let names = |status| {
            ledger
                .state
                .voters_with_status(&ctx, status)
                .unwrap()
                .into_iter()
                .map(|v| v.identity.to_string())
                .collect::<Vec<_>>()
        };
        assert_eq!(names(VoterStatus::Pending), vec!["alice"]);
        assert_eq!(names(VoterStatus::Approved), vec!["carol", "bob"]);
        assert_eq!(names(VoterStatus::Rejected), vec!["dave"]);

        let ctx = ledger.context("alice");
        assert!(ledger
            .state
            .voters_with_status(&ctx, VoterStatus::Pending)
            .is_err());
        assert!(ledger.state.voter_record(&ctx, &"alice".into()).is_ok());
        assert!(ledger.state.voter_record(&ctx, &"bob".into()).is_err());
    }

    #[test]
    fn registration_closes_when_an_election_starts() {
        let mut ledger = TestLedger::new();
        let start = ledger.now + Duration::hours(1);
        ledger
            .admin(Command::CreateElection {
                name: "General".to_string(),
                start_time: start,
                end_time: start + Duration::hours(1),
            })
            .unwrap();
        ledger.register("alice").unwrap();

        ledger.now = start;
        let err = ledger.register("bob").unwrap_err();
        assert_eq!(err, LedgerError::RegistrationClosed);
        assert!(ledger.state.voter(&"bob".into()).is_none());
    }

    #[test]
    fn reset_allows_reregistration_but_keeps_rejections() {
        let mut ledger = TestLedger::new();
        ledger.register("alice").unwrap();
        ledger.register("bob").unwrap();
        ledger.register("carol").unwrap();
        ledger.admin(Command::ApproveVoter("alice".into())).unwrap();
        ledger.admin(Command::RejectVoter("carol".into())).unwrap();

        assert_eq!(
            ledger.run("alice", Command::ResetRegistrations).unwrap_err(),
            LedgerError::NotAdministrator("alice".into())
        );
        ledger.admin(Command::ResetRegistrations).unwrap();

        let ctx = ledger.context(TestLedger::ADMIN);
        assert!(ledger
            .state
            .voters_with_status(&ctx, VoterStatus::Pending)
            .unwrap()
            .is_empty());
        assert!(ledger
            .state
            .voters_with_status(&ctx, VoterStatus::Approved)
            .unwrap()
            .is_empty());
        assert_eq!(
            ledger
                .state
                .voters_with_status(&ctx, VoterStatus::Rejected)
                .unwrap()
                .len(),
            1
        );

        ledger.register("alice").unwrap();
        assert_eq!(
            ledger.state.voter(&"alice".into()).unwrap().status,
            VoterStatus::Pending
        );
        assert_eq!(
            ledger.register("carol").unwrap_err(),
            LedgerError::AlreadyRejected("carol".into())
        );
    }

    #[test]
    fn reset_keeps_ballot_records() {
        let mut ledger = TestLedger::new();
        ledger.register("alice").unwrap();
        ledger.admin(Command::ApproveVoter("alice".into())).unwrap();
        ledger.election_with_positions(&["Chair", "Treasurer"]);
        for position in ["Chair", "Treasurer"] {
            ledger
                .run(
                    "nominee",
                    Command::RegisterCandidate {
                        election_id: 1,
                        position: position.to_string(),
                        name: "Ann".to_string(),
                    },
                )
                .unwrap();
            ledger
                .admin(Command::ApproveCandidate {
                    election_id: 1,
                    position: position.to_string(),
                    candidate_id: 1,
                })
                .unwrap();
        }
        ledger.admin(Command::OpenElection(1)).unwrap();
        ledger.now += Duration::hours(1);

        let vote = |position: &str| Command::Vote {
            election_id: 1,
            position: position.to_string(),
            candidate_id: 1,
        };
        ledger.run("alice", vote("Chair")).unwrap();
        ledger.admin(Command::ResetRegistrations).unwrap();

        let voter = ledger.state.voter(&"alice".into()).unwrap();
        assert_eq!(voter.status, VoterStatus::Lapsed);
        assert!(voter.ballots.contains(&BallotKey::new(1, "Chair")));
        assert_eq!(ledger.state.ballots_cast(1, "Chair"), 1);
        assert_eq!(ledger.state.candidate(1, "Chair", 1).unwrap().votes, 1);

        // A lapsed voter may no longer vote anywhere.
        assert_eq!(
            ledger.run("alice", vote("Treasurer")).unwrap_err(),
            LedgerError::NotApproved("alice".into())
        );
        assert_eq!(ledger.state.ballots_cast(1, "Treasurer"), 0);
    }
}
