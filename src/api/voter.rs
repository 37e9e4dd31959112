use rocket::{serde::json::Json, Route, State};

use crate::error::Result;
use crate::model::{
    api::{
        ballot::VoteSpec,
        candidate::CandidateSpec,
        voter::{VoterDescription, Whoami},
    },
    auth::AuthToken,
    election::ElectionId,
    event::RecordedEvent,
    guard::Identity,
    ledger::Ledger,
    state::Command,
    voter::VoterDetails,
};

pub fn routes() -> Vec<Route> {
    routes![whoami, register_voter, voter, register_candidate, vote]
}

#[get("/whoami")]
async fn whoami(token: AuthToken, ledger: &State<Ledger>) -> Json<Whoami> {
    let state = ledger.snapshot().await;
    let identity = token.identity().clone();
    Json(Whoami {
        is_administrator: ledger.authority().is_administrator(&identity),
        voter_status: state.voter(&identity).map(|voter| voter.status),
        identity,
    })
}

/// Register the caller as a voter.
#[post("/voters", data = "<details>", format = "json")]
async fn register_voter(
    token: AuthToken,
    details: Json<VoterDetails>,
    ledger: &State<Ledger>,
) -> Result<Json<RecordedEvent>> {
    let record = ledger
        .submit(token.caller(), Command::RegisterVoter(details.into_inner()))
        .await?;
    Ok(Json(record))
}

#[get("/voters/<identity>")]
async fn voter(
    token: AuthToken,
    identity: &str,
    ledger: &State<Ledger>,
) -> Result<Json<VoterDescription>> {
    let state = ledger.snapshot().await;
    let voter = state.voter_record(&ledger.context(token.caller()), &Identity::new(identity))?;
    Ok(Json(voter.into()))
}

#[post(
    "/elections/<election_id>/positions/<position>/candidates",
    data = "<spec>",
    format = "json"
)]
async fn register_candidate(
    token: AuthToken,
    election_id: ElectionId,
    position: &str,
    spec: Json<CandidateSpec>,
    ledger: &State<Ledger>,
) -> Result<Json<RecordedEvent>> {
    let command = Command::RegisterCandidate {
        election_id,
        position: position.to_string(),
        name: spec.into_inner().name,
    };
    Ok(Json(ledger.submit(token.caller(), command).await?))
}

#[post(
    "/elections/<election_id>/positions/<position>/votes",
    data = "<ballot>",
    format = "json"
)]
async fn vote(
    token: AuthToken,
    election_id: ElectionId,
    position: &str,
    ballot: Json<VoteSpec>,
    ledger: &State<Ledger>,
) -> Result<Json<RecordedEvent>> {
    let command = Command::Vote {
        election_id,
        position: position.to_string(),
        candidate_id: ballot.candidate_id,
    };
    Ok(Json(ledger.submit(token.caller(), command).await?))
}
