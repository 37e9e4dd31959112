use rocket::{serde::json::Json, Route, State};

use crate::error::Result;
use crate::model::{
    api::{
        ballot::PositionResult,
        candidate::CandidateDescription,
        election::{ElectionDescription, ElectionSummary},
    },
    candidate::CandidateId,
    election::ElectionId,
    ledger::Ledger,
};

pub fn routes() -> Vec<Route> {
    routes![
        elections,
        election_count,
        election,
        candidates,
        candidate,
        results,
    ]
}

#[get("/elections")]
async fn elections(ledger: &State<Ledger>) -> Json<Vec<ElectionSummary>> {
    let state = ledger.snapshot().await;
    let now = ledger.now();
    Json(
        state
            .elections()
            .map(|election| ElectionSummary::new(election, now))
            .collect(),
    )
}

#[get("/elections/count")]
async fn election_count(ledger: &State<Ledger>) -> Json<usize> {
    Json(ledger.snapshot().await.election_count())
}

#[get("/elections/<election_id>")]
async fn election(
    election_id: ElectionId,
    ledger: &State<Ledger>,
) -> Result<Json<ElectionDescription>> {
    let state = ledger.snapshot().await;
    let election = state.election(election_id)?;
    Ok(Json(ElectionDescription::new(election, ledger.now())))
}

/// All registered candidates, or only the ballot if `approved` is set.
#[get("/elections/<election_id>/positions/<position>/candidates?<approved>")]
async fn candidates(
    election_id: ElectionId,
    position: &str,
    approved: Option<bool>,
    ledger: &State<Ledger>,
) -> Result<Json<Vec<CandidateDescription>>> {
    let state = ledger.snapshot().await;
    let candidates = if approved.unwrap_or(false) {
        state
            .approved_candidates(election_id, position)?
            .into_iter()
            .map(CandidateDescription::from)
            .collect()
    } else {
        state
            .candidates(election_id, position)?
            .iter()
            .map(CandidateDescription::from)
            .collect()
    };
    Ok(Json(candidates))
}

#[get("/elections/<election_id>/positions/<position>/candidates/<candidate_id>")]
async fn candidate(
    election_id: ElectionId,
    position: &str,
    candidate_id: CandidateId,
    ledger: &State<Ledger>,
) -> Result<Json<CandidateDescription>> {
    let state = ledger.snapshot().await;
    let candidate = state.candidate(election_id, position, candidate_id)?;
    Ok(Json(candidate.into()))
}

/// Live counts while the election runs, final counts once it has ended.
#[get("/elections/<election_id>/positions/<position>/results")]
async fn results(
    election_id: ElectionId,
    position: &str,
    ledger: &State<Ledger>,
) -> Result<Json<PositionResult>> {
    let state = ledger.snapshot().await;
    let election = state.election(election_id)?;
    let tallies = state.election_result(election_id, position)?;
    Ok(Json(PositionResult::new(
        election_id,
        election.position(position)?.name.clone(),
        election.phase_at(ledger.now()),
        tallies,
    )))
}
