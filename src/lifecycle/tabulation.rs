use chrono::Utc;
use mongodb::{bson::doc, options::ReplaceOptions, Database};
use rocket::futures::TryStreamExt;

use crate::error::Result;
use crate::model::{
    db::{
        candidate::Candidate,
        election::Election,
        results::ElectionResults,
        vote::Vote,
    },
    mongodb::Coll,
};

/// Count the votes of an election and store the results, replacing any
/// earlier count for the same election.
pub async fn tabulate_and_store(db: &Database, election: &Election) -> Result<ElectionResults> {
    let candidates = Candidate::all(&Coll::from_db(db)).await?;
    let votes: Vec<Vote> = Coll::<Vote>::from_db(db)
        .find(doc! { "election_id": election.id }, None)
        .await?
        .try_collect()
        .await?;

    let results = ElectionResults::tabulate(election, &candidates, &votes, Utc::now());
    let upsert = ReplaceOptions::builder().upsert(true).build();
    Coll::<ElectionResults>::from_db(db)
        .replace_one(election.id.as_doc(), &results, upsert)
        .await?;
    info!(
        "Tabulated election {}: {} ballots over {} positions",
        election.id,
        results.total_ballots,
        results.positions.len()
    );
    Ok(results)
}
