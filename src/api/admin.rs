use rocket::{serde::json::Json, Route, State};

use crate::error::Result;
use crate::model::{
    api::{
        election::{ElectionSpec, ExtensionSpec, PositionSpec},
        voter::VoterDescription,
    },
    auth::AuthToken,
    candidate::CandidateId,
    election::ElectionId,
    event::RecordedEvent,
    guard::Identity,
    ledger::Ledger,
    state::Command,
    voter::VoterStatus,
};

pub fn routes() -> Vec<Route> {
    routes![
        pending_voters,
        approved_voters,
        rejected_voters,
        approve_voter,
        reject_voter,
        reset_registrations,
        create_election,
        create_position,
        open_election,
        close_election,
        extend_election,
        approve_candidate,
        reject_candidate,
    ]
}

/// Voters with the given status, in registration order.
async fn voters_with_status(
    token: &AuthToken,
    ledger: &Ledger,
    status: VoterStatus,
) -> Result<Json<Vec<VoterDescription>>> {
    let state = ledger.snapshot().await;
    let voters = state
        .voters_with_status(&ledger.context(token.caller()), status)?
        .into_iter()
        .map(VoterDescription::from)
        .collect();
    Ok(Json(voters))
}

#[get("/voters/pending")]
async fn pending_voters(
    token: AuthToken,
    ledger: &State<Ledger>,
) -> Result<Json<Vec<VoterDescription>>> {
    voters_with_status(&token, ledger, VoterStatus::Pending).await
}

#[get("/voters/approved")]
async fn approved_voters(
    token: AuthToken,
    ledger: &State<Ledger>,
) -> Result<Json<Vec<VoterDescription>>> {
    voters_with_status(&token, ledger, VoterStatus::Approved).await
}

#[get("/voters/rejected")]
async fn rejected_voters(
    token: AuthToken,
    ledger: &State<Ledger>,
) -> Result<Json<Vec<VoterDescription>>> {
    voters_with_status(&token, ledger, VoterStatus::Rejected).await
}

#[post("/voters/<identity>/approve")]
async fn approve_voter(
    token: AuthToken,
    identity: &str,
    ledger: &State<Ledger>,
) -> Result<Json<RecordedEvent>> {
    let command = Command::ApproveVoter(Identity::new(identity));
    Ok(Json(ledger.submit(token.caller(), command).await?))
}

#[post("/voters/<identity>/reject")]
async fn reject_voter(
    token: AuthToken,
    identity: &str,
    ledger: &State<Ledger>,
) -> Result<Json<RecordedEvent>> {
    let command = Command::RejectVoter(Identity::new(identity));
    Ok(Json(ledger.submit(token.caller(), command).await?))
}

#[post("/voters/reset")]
async fn reset_registrations(
    token: AuthToken,
    ledger: &State<Ledger>,
) -> Result<Json<RecordedEvent>> {
    let record = ledger
        .submit(token.caller(), Command::ResetRegistrations)
        .await?;
    Ok(Json(record))
}

#[post("/elections", data = "<spec>", format = "json")]
async fn create_election(
    token: AuthToken,
    spec: Json<ElectionSpec>,
    ledger: &State<Ledger>,
) -> Result<Json<RecordedEvent>> {
    let record = ledger
        .submit(token.caller(), spec.into_inner().into())
        .await?;
    Ok(Json(record))
}

#[post("/elections/<election_id>/positions", data = "<spec>", format = "json")]
async fn create_position(
    token: AuthToken,
    election_id: ElectionId,
    spec: Json<PositionSpec>,
    ledger: &State<Ledger>,
) -> Result<Json<RecordedEvent>> {
    let command = Command::CreatePosition {
        election_id,
        position: spec.into_inner().name,
    };
    Ok(Json(ledger.submit(token.caller(), command).await?))
}

#[post("/elections/<election_id>/open")]
async fn open_election(
    token: AuthToken,
    election_id: ElectionId,
    ledger: &State<Ledger>,
) -> Result<Json<RecordedEvent>> {
    let command = Command::OpenElection(election_id);
    Ok(Json(ledger.submit(token.caller(), command).await?))
}

#[post("/elections/<election_id>/close")]
async fn close_election(
    token: AuthToken,
    election_id: ElectionId,
    ledger: &State<Ledger>,
) -> Result<Json<RecordedEvent>> {
    let command = Command::CloseElection(election_id);
    Ok(Json(ledger.submit(token.caller(), command).await?))
}

#[post("/elections/<election_id>/extend", data = "<spec>", format = "json")]
async fn extend_election(
    token: AuthToken,
    election_id: ElectionId,
    spec: Json<ExtensionSpec>,
    ledger: &State<Ledger>,
) -> Result<Json<RecordedEvent>> {
    let command = Command::ExtendElection {
        election_id,
        end_time: spec.end_time,
    };
    Ok(Json(ledger.submit(token.caller(), command).await?))
}

#[post("/elections/<election_id>/positions/<position>/candidates/<candidate_id>/approve")]
async fn approve_candidate(
    token: AuthToken,
    election_id: ElectionId,
    position: &str,
    candidate_id: CandidateId,
    ledger: &State<Ledger>,
) -> Result<Json<RecordedEvent>> {
    let command = Command::ApproveCandidate {
        election_id,
        position: position.to_string(),
        candidate_id,
    };
    Ok(Json(ledger.submit(token.caller(), command).await?))
}

#[post("/elections/<election_id>/positions/<position>/candidates/<candidate_id>/reject")]
async fn reject_candidate(
    token: AuthToken,
    election_id: ElectionId,
    position: &str,
    candidate_id: CandidateId,
    ledger: &State<Ledger>,
) -> Result<Json<RecordedEvent>> {
    let command = Command::RejectCandidate {
        election_id,
        position: position.to_string(),
        candidate_id,
    };
    Ok(Json(ledger.submit(token.caller(), command).await?))
}
