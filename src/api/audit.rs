use mongodb::bson::doc;
use rocket::{futures::TryStreamExt, serde::json::Json, Route};

use crate::{
    error::Result,
    model::{
        api::{
            audit::{MismatchedVote, VoteAuditReport},
            auth::AuthToken,
        },
        db::{
            admin::Admin,
            election::{ActiveElection, Election},
            vote::Vote,
            voter::{voted_positions_field, Voter},
        },
        mongodb::Coll,
    },
};

pub fn routes() -> Vec<Route> {
    routes![audit_votes]
}

/// Check every vote in the active election is counted for the candidate the
/// voter selected.
#[get("/admin/audit/votes")]
async fn audit_votes(
    _token: AuthToken<Admin>,
    settings: Coll<ActiveElection>,
    elections: Coll<Election>,
    votes: Coll<Vote>,
    voters: Coll<Voter>,
) -> Result<Json<VoteAuditReport>> {
    let election = ActiveElection::require(&settings, &elections).await?;
    let cast: Vec<Vote> = votes
        .find(doc! { "election_id": election.id }, None)
        .await?
        .try_collect()
        .await?;
    let field = voted_positions_field(election.id);
    let voted_filter = doc! { &field: { "$exists": true } };
    let voters_voted = voters.count_documents(voted_filter, None).await?;

    let mismatched: Vec<MismatchedVote> = cast
        .iter()
        .filter(|vote| !vote.is_as_cast())
        .map(Into::into)
        .collect();
    if mismatched.is_empty() {
        debug!(
            "Audited {} votes in election {}, all as cast",
            cast.len(),
            election.id
        );
    } else {
        error!(
            "{} of {} votes in election {} are not counted as cast",
            mismatched.len(),
            cast.len(),
            election.id
        );
    }

    Ok(Json(VoteAuditReport {
        election_id: election.id.into(),
        votes: cast.len() as u64,
        voters_voted,
        mismatched,
    }))
}
