//! One ballot per voter per position, the tally, and winner determination.

use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::model::{
    candidate::CandidateId,
    election::ElectionId,
    event::Event,
    guard::{Context, Identity},
    state::LedgerState,
};

/// Marks that a voter has cast their ballot for a position.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BallotKey {
    pub election_id: ElectionId,
    pub position: String,
}

impl BallotKey {
    pub fn new(election_id: ElectionId, position: impl Into<String>) -> Self {
        Self {
            election_id,
            position: position.into(),
        }
    }
}

/// A single approved candidate's count.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateTally {
    pub candidate_id: CandidateId,
    pub votes: u64,
}

/// Every candidate sharing the highest count. Ties yield several winners and an
/// empty tally yields none.
pub fn winners(tallies: &[CandidateTally]) -> Vec<CandidateId> {
    let Some(max) = tallies.iter().map(|tally| tally.votes).max() else {
        return Vec::new();
    };
    tallies
        .iter()
        .filter(|tally| tally.votes == max)
        .map(|tally| tally.candidate_id)
        .collect()
}

impl LedgerState {
    pub(super) fn plan_vote(
        &self,
        ctx: &Context,
        election_id: ElectionId,
        position: &str,
        candidate_id: CandidateId,
    ) -> Result<Event, LedgerError> {
        let voter = ctx.require_approved_voter(self)?;

        let election = self.election(election_id)?;
        let position = election.position(position)?;
        if !election.accepts_votes_at(ctx.now) {
            return Err(LedgerError::VotingClosed(election_id));
        }

        let candidate = position.candidate(candidate_id)?;
        if !candidate.is_approved() {
            return Err(LedgerError::CandidateNotApproved {
                position: position.name.clone(),
                candidate_id,
            });
        }

        let key = BallotKey::new(election_id, position.name.clone());
        if voter.has_voted(&key) {
            return Err(LedgerError::AlreadyVoted {
                election_id,
                position: key.position,
            });
        }

        Ok(Event::VoteCast {
            election_id,
            voter: voter.identity.clone(),
            position: key.position,
            candidate_id,
        })
    }

    /// Record the ballot and count the vote together.
    pub(super) fn apply_vote_cast(
        &mut self,
        election_id: ElectionId,
        voter: &Identity,
        position: &str,
        candidate_id: CandidateId,
    ) -> Result<(), LedgerError> {
        let key = BallotKey::new(election_id, position);

        // Resolve both sides before touching either.
        let voter_record = self
            .voters
            .get(voter)
            .ok_or_else(|| LedgerError::UnknownVoter(voter.clone()))?;
        if voter_record.has_voted(&key) {
            return Err(LedgerError::AlreadyVoted {
                election_id,
                position: key.position,
            });
        }
        let candidate = self
            .election(election_id)?
            .position(position)?
            .candidate(candidate_id)?;
        if !candidate.is_approved() {
            return Err(LedgerError::CandidateNotApproved {
                position: position.to_string(),
                candidate_id,
            });
        }

        self.election_mut(election_id)?
            .position_mut(position)?
            .candidate_mut(candidate_id)?
            .votes += 1;
        if let Some(voter_record) = self.voters.get_mut(voter) {
            voter_record.ballots.insert(key);
        }
        Ok(())
    }

    /// Counts for every approved candidate of a position, in candidate-ID
    /// order. Callable at any phase.
    pub fn election_result(
        &self,
        election_id: ElectionId,
        position: &str,
    ) -> Result<Vec<CandidateTally>, LedgerError> {
        Ok(self
            .election(election_id)?
            .position(position)?
            .approved()
            .map(|candidate| CandidateTally {
                candidate_id: candidate.id,
                votes: candidate.votes,
            })
            .collect())
    }

    /// Number of ballots recorded against a position.
    pub fn ballots_cast(&self, election_id: ElectionId, position: &str) -> usize {
        let key = BallotKey::new(election_id, position.trim());
        self.voters
            .values()
            .filter(|voter| voter.has_voted(&key))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::model::state::{tests::TestLedger, Command};

    fn vote(election_id: ElectionId, position: &str, candidate_id: CandidateId) -> Command {
        Command::Vote {
            election_id,
            position: position.to_string(),
            candidate_id,
        }
    }

    /// An ongoing, open election with approved candidates 1-3 and a pending
    /// candidate 4 for "Chair", plus approved voters v1..v12.
    fn ongoing() -> TestLedger {
        let mut ledger = TestLedger::new();
        for i in 1..=12 {
            let name = format!("v{i}");
            ledger.register(&name).unwrap();
            ledger.admin(Command::ApproveVoter(name.as_str().into())).unwrap();
        }
        ledger.register("pending").unwrap();
        ledger.election_with_positions(&["Chair", "Treasurer"]);
        for name in ["A", "B", "C", "D"] {
            ledger
                .run(
                    "v1",
                    Command::RegisterCandidate {
                        election_id: 1,
                        position: "Chair".to_string(),
                        name: name.to_string(),
                    },
                )
                .unwrap();
        }
        for id in 1..=3 {
            ledger
                .admin(Command::ApproveCandidate {
                    election_id: 1,
                    position: "Chair".to_string(),
                    candidate_id: id,
                })
                .unwrap();
        }
        ledger.now = ledger.state.election(1).unwrap().start_time;
        ledger.admin(Command::OpenElection(1)).unwrap();
        ledger
    }

    #[test]
    fn winners_with_ties_and_empty() {
        let tallies = [
            CandidateTally { candidate_id: 1, votes: 5 },
            CandidateTally { candidate_id: 2, votes: 5 },
            CandidateTally { candidate_id: 3, votes: 3 },
        ];
        assert_eq!(winners(&tallies), vec![1, 2]);
        assert_eq!(winners(&tallies[2..]), vec![3]);
        assert!(winners(&[]).is_empty());
    }

    #[test]
    fn no_double_voting() {
        let mut ledger = ongoing();
        ledger.run("v1", vote(1, "Chair", 1)).unwrap();
        for candidate in [1, 2] {
            let err = ledger.run("v1", vote(1, "Chair", candidate)).unwrap_err();
            assert_eq!(
                err,
                LedgerError::AlreadyVoted {
                    election_id: 1,
                    position: "Chair".to_string()
                }
            );
        }
        assert_eq!(ledger.state.election_result(1, "Chair").unwrap()[0].votes, 1);
        assert!(ledger
            .state
            .voter(&"v1".into())
            .unwrap()
            .has_voted(&BallotKey::new(1, "Chair")));
    }

    #[test]
    fn ballots_are_scoped_per_position() {
        let mut ledger = ongoing();
        ledger
            .run(
                "v2",
                Command::RegisterCandidate {
                    election_id: 1,
                    position: "Treasurer".to_string(),
                    name: "T".to_string(),
                },
            )
            .unwrap();
        ledger
            .admin(Command::ApproveCandidate {
                election_id: 1,
                position: "Treasurer".to_string(),
                candidate_id: 1,
            })
            .unwrap();

        ledger.run("v1", vote(1, "Chair", 2)).unwrap();
        ledger.run("v1", vote(1, "Treasurer", 1)).unwrap();
        assert_eq!(ledger.state.ballots_cast(1, "Chair"), 1);
        assert_eq!(ledger.state.ballots_cast(1, "Treasurer"), 1);
    }

    #[test]
    fn approval_gate() {
        let mut ledger = ongoing();
        let before = ledger.state.election_result(1, "Chair").unwrap();

        let err = ledger.run("v1", vote(1, "Chair", 4)).unwrap_err();
        assert_eq!(
            err,
            LedgerError::CandidateNotApproved {
                position: "Chair".to_string(),
                candidate_id: 4
            }
        );
        ledger
            .admin(Command::RejectCandidate {
                election_id: 1,
                position: "Chair".to_string(),
                candidate_id: 4,
            })
            .unwrap();
        let err = ledger.run("v1", vote(1, "Chair", 4)).unwrap_err();
        assert!(matches!(err, LedgerError::CandidateNotApproved { .. }));

        let err = ledger.run("v1", vote(1, "Chair", 9)).unwrap_err();
        assert!(matches!(err, LedgerError::UnknownCandidate { .. }));

        assert_eq!(ledger.state.election_result(1, "Chair").unwrap(), before);
        assert_eq!(ledger.state.candidate(1, "Chair", 4).unwrap().votes, 0);
        assert_eq!(ledger.state.ballots_cast(1, "Chair"), 0);
    }

    #[test]
    fn only_approved_voters_vote() {
        let mut ledger = ongoing();
        assert_eq!(
            ledger.run("pending", vote(1, "Chair", 1)).unwrap_err(),
            LedgerError::NotApproved("pending".into())
        );
        assert_eq!(
            ledger.run("stranger", vote(1, "Chair", 1)).unwrap_err(),
            LedgerError::NotApproved("stranger".into())
        );
    }

    #[test]
    fn unknown_election_or_position() {
        let mut ledger = ongoing();
        assert_eq!(
            ledger.run("v1", vote(2, "Chair", 1)).unwrap_err(),
            LedgerError::UnknownElection(2)
        );
        assert!(matches!(
            ledger.run("v1", vote(1, "Mascot", 1)).unwrap_err(),
            LedgerError::UnknownPosition { .. }
        ));
    }

    #[test]
    fn timing_gate() {
        let mut ledger = TestLedger::new();
        ledger.register("v1").unwrap();
        ledger.admin(Command::ApproveVoter("v1".into())).unwrap();
        let start = ledger.now + Duration::seconds(3600);
        ledger
            .admin(Command::CreateElection {
                name: "General".to_string(),
                start_time: start,
                end_time: start + Duration::seconds(3600),
            })
            .unwrap();
        ledger
            .admin(Command::CreatePosition {
                election_id: 1,
                position: "Chair".to_string(),
            })
            .unwrap();
        ledger
            .run(
                "v1",
                Command::RegisterCandidate {
                    election_id: 1,
                    position: "Chair".to_string(),
                    name: "A".to_string(),
                },
            )
            .unwrap();
        ledger
            .admin(Command::ApproveCandidate {
                election_id: 1,
                position: "Chair".to_string(),
                candidate_id: 1,
            })
            .unwrap();

        // Upcoming, closed.
        assert_eq!(
            ledger.run("v1", vote(1, "Chair", 1)).unwrap_err(),
            LedgerError::VotingClosed(1)
        );
        // Upcoming, open.
        ledger.admin(Command::OpenElection(1)).unwrap();
        assert_eq!(
            ledger.run("v1", vote(1, "Chair", 1)).unwrap_err(),
            LedgerError::VotingClosed(1)
        );
        // Ongoing, closed.
        ledger.now = start;
        ledger.admin(Command::CloseElection(1)).unwrap();
        assert_eq!(
            ledger.run("v1", vote(1, "Chair", 1)).unwrap_err(),
            LedgerError::VotingClosed(1)
        );
        // Ended, open.
        ledger.admin(Command::OpenElection(1)).unwrap();
        ledger.now = start + Duration::seconds(3600);
        assert_eq!(
            ledger.run("v1", vote(1, "Chair", 1)).unwrap_err(),
            LedgerError::VotingClosed(1)
        );
        // Ongoing, open.
        ledger.now = start + Duration::seconds(10);
        ledger.run("v1", vote(1, "Chair", 1)).unwrap();
    }

    #[test]
    fn tally_conservation_and_ties() {
        let mut ledger = ongoing();
        // 5 for A, 5 for B, 2 for C.
        let choices = [1, 2, 1, 2, 1, 2, 1, 2, 1, 2, 3, 3];
        for (i, candidate) in choices.iter().enumerate() {
            ledger
                .run(&format!("v{}", i + 1), vote(1, "Chair", *candidate))
                .unwrap();
        }

        let result = ledger.state.election_result(1, "Chair").unwrap();
        assert_eq!(
            result,
            vec![
                CandidateTally { candidate_id: 1, votes: 5 },
                CandidateTally { candidate_id: 2, votes: 5 },
                CandidateTally { candidate_id: 3, votes: 2 },
            ]
        );
        let total: u64 = result.iter().map(|tally| tally.votes).sum();
        assert_eq!(total as usize, ledger.state.ballots_cast(1, "Chair"));
        assert_eq!(total as usize, choices.len());
        assert_eq!(winners(&result), vec![1, 2]);
    }

    #[test]
    fn results_without_approved_candidates() {
        let mut ledger = TestLedger::new();
        ledger.election_with_positions(&["Chair"]);
        let result = ledger.state.election_result(1, "Chair").unwrap();
        assert!(result.is_empty());
        assert!(winners(&result).is_empty());
    }
}
