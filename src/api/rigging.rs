use chrono::Utc;
use mongodb::{
    bson::doc,
    options::{FindOneAndUpdateOptions, ReturnDocument},
};
use rocket::{serde::json::Json, Route};

use crate::{
    error::{Error, Result},
    logging::RequestMeta,
    model::{
        api::{
            auth::Supervisor,
            candidate::{FlagRequest, FlaggedCandidate},
        },
        db::{
            candidate::Candidate,
            election::ActiveElection,
            election_log::{Actor, NewLogEntry},
        },
        mongodb::Coll,
    },
};

pub fn routes() -> Vec<Route> {
    routes![toggle_flag, flagged_candidates]
}

/// Set or clear a candidate's flag. Only supervisors may do this, and every
/// change is written to the election log.
#[post("/admin/toggle-rigging", data = "<request>", format = "json")]
async fn toggle_flag(
    supervisor: Supervisor,
    meta: RequestMeta,
    request: Json<FlagRequest>,
    candidates: Coll<Candidate>,
    settings: Coll<ActiveElection>,
    logs: Coll<NewLogEntry>,
) -> Result<Json<FlaggedCandidate>> {
    let (candidate_id, flagged) = request.parse()?;

    let options = FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::After)
        .build();
    let candidate = candidates
        .find_one_and_update(
            candidate_id.as_doc(),
            doc! { "$set": { "rigged": flagged } },
            options,
        )
        .await?
        .ok_or_else(|| Error::not_found(format!("Candidate {candidate_id}")))?;

    let actor = Actor::admin(&supervisor.0, meta);
    let mut entry = NewLogEntry::flag(candidate_id, flagged, &actor, Utc::now());
    entry.election_id = ActiveElection::get(&settings).await?;
    logs.insert_one(&entry, None).await?;
    warn!(
        "Supervisor {} set flag on candidate {} ({}) to {flagged}",
        actor.name, candidate.id, candidate.name
    );

    Ok(Json(candidate.into()))
}

/// Every flagged candidate, across all positions.
#[get("/admin/rigged-candidates")]
async fn flagged_candidates(
    _supervisor: Supervisor,
    candidates: Coll<Candidate>,
) -> Result<Json<Vec<FlaggedCandidate>>> {
    let flagged = Candidate::flagged(&candidates).await?;
    Ok(Json(flagged.into_iter().map(Into::into).collect()))
}
