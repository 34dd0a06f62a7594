use std::collections::BTreeMap;

use chrono::Utc;
use mongodb::{bson::doc, error::TRANSIENT_TRANSACTION_ERROR, Client};
use rocket::{
    http::Status, response::status::Created, serde::json::Json, tokio, Route, State,
};

use crate::{
    error::{Error, Result},
    model::{
        api::{
            auth::AuthToken,
            ballot::{BallotReceipt, BallotRequest, VotingStatus},
            candidate::CandidateDescription,
        },
        common::ballot::{validate_selections, RawSelections},
        db::{
            admin::Admin,
            candidate::{group_by_position, Candidate},
            election::{ActiveElection, Election},
            vote::NewVote,
            voter::{voted_positions_field, Voter},
        },
        mongodb::{is_duplicate_key_error, Coll, Id},
    },
};

/// How many times a ballot transaction is tried when it conflicts with another.
const MAX_ATTEMPTS: u32 = 5;
const RETRY_DELAY: std::time::Duration = std::time::Duration::from_millis(20);

pub fn routes() -> Vec<Route> {
    routes![list_candidates, submit_ballot, voting_status]
}

/// Everyone standing in the election, grouped by position.
#[get("/candidates")]
async fn list_candidates(
    voter: Option<AuthToken<Voter>>,
    admin: Option<AuthToken<Admin>>,
    candidates: Coll<Candidate>,
) -> Result<Json<BTreeMap<String, Vec<CandidateDescription>>>> {
    if voter.is_none() && admin.is_none() {
        return Err(Error::Status(
            Status::Unauthorized,
            "Log in to see the candidates".to_string(),
        ));
    }
    let mut by_position: BTreeMap<String, Vec<CandidateDescription>> = BTreeMap::new();
    for candidate in Candidate::all(&candidates).await? {
        by_position
            .entry(candidate.position.clone())
            .or_default()
            .push(candidate.into());
    }
    Ok(Json(by_position))
}

#[post("/votes", data = "<ballot>", format = "json")]
async fn submit_ballot(
    token: AuthToken<Voter>,
    ballot: Json<BallotRequest>,
    elections: Coll<Election>,
    settings: Coll<ActiveElection>,
    voters: Coll<Voter>,
    candidates: Coll<Candidate>,
    new_votes: Coll<NewVote>,
    db_client: &State<Client>,
) -> Result<Created<Json<BallotReceipt>>> {
    let voter = token.user(&voters).await?;
    let receipt = cast_ballot(
        &voter,
        &ballot.selections,
        &elections,
        &settings,
        &voters,
        &candidates,
        &new_votes,
        db_client,
    )
    .await?;
    Ok(Created::new("/votes/status").body(Json(receipt)))
}

/// Record a voter's complete ballot for the active election.
///
/// Either every position's vote is stored and the voter is marked as having
/// voted, or nothing is written at all.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn cast_ballot(
    voter: &Voter,
    raw: &RawSelections,
    elections: &Coll<Election>,
    settings: &Coll<ActiveElection>,
    voters: &Coll<Voter>,
    candidates: &Coll<Candidate>,
    new_votes: &Coll<NewVote>,
    db_client: &Client,
) -> Result<BallotReceipt> {
    let now = Utc::now();

    // The election must be open.
    let election = ActiveElection::load(settings, elections)
        .await?
        .ok_or_else(|| Error::ElectionNotActive("no election has been scheduled".to_string()))?;
    if !election.schedule.accepts_votes(now) {
        return Err(Error::ElectionNotActive(format!(
            "election {} is {} and not inside its voting window",
            election.id, election.schedule.status
        )));
    }

    // One ballot per voter.
    if voter.has_voted(election.id) {
        return Err(Error::AlreadyVoted(voter.student_id.clone()));
    }

    // Every position, once.
    let positions = group_by_position(&Candidate::all(candidates).await?);
    let selections = validate_selections(raw, &positions)?;

    let votes: Vec<NewVote> = selections
        .iter()
        .map(|(position, candidate)| {
            NewVote::new(election.id, voter.id, position.clone(), *candidate, now)
        })
        .collect();
    let voted: Vec<String> = selections.keys().cloned().collect();

    let mut attempt = 1;
    loop {
        let stored =
            store_ballot(db_client, new_votes, voters, voter.id, election.id, &votes, &voted).await;
        match stored {
            Ok(true) => break,
            Ok(false) => return Err(Error::AlreadyVoted(voter.student_id.clone())),
            Err(Error::Db(err)) => {
                // A concurrent submission for the same voter makes our
                // transaction fail; report that as a duplicate once it has
                // committed, rather than as a server error.
                let marked = voters
                    .find_one(voter.id.as_doc(), None)
                    .await?
                    .map(|v| v.has_voted(election.id))
                    .unwrap_or(false);
                if marked || is_duplicate_key_error(&err) {
                    return Err(Error::AlreadyVoted(voter.student_id.clone()));
                }
                if !err.contains_label(TRANSIENT_TRANSACTION_ERROR) || attempt >= MAX_ATTEMPTS {
                    return Err(Error::Db(err));
                }
                debug!("Ballot transaction for voter {} conflicted, retrying", voter.id);
                attempt += 1;
                tokio::time::sleep(RETRY_DELAY * attempt).await;
            }
            Err(err) => return Err(err),
        }
    }

    info!(
        "Voter {} cast a ballot for {} positions in election {}",
        voter.id,
        votes.len(),
        election.id
    );
    Ok(BallotReceipt::new(election.id, &selections, now))
}

/// Insert the votes and mark the voter in one transaction.
/// Returns false, writing nothing, if the voter was already marked.
async fn store_ballot(
    db_client: &Client,
    new_votes: &Coll<NewVote>,
    voters: &Coll<Voter>,
    voter_id: Id,
    election_id: Id,
    votes: &[NewVote],
    positions: &[String],
) -> Result<bool> {
    let mut session = db_client.start_session(None).await?;
    session.start_transaction(None).await?;

    new_votes
        .insert_many_with_session(votes, None, &mut session)
        .await?;

    let field = voted_positions_field(election_id);
    let filter = doc! {
        "_id": voter_id,
        &field: { "$exists": false },
    };
    let update = doc! {
        "$set": { &field: positions.to_vec() },
    };
    let result = voters
        .update_one_with_session(filter, update, None, &mut session)
        .await?;
    if result.modified_count != 1 {
        session.abort_transaction().await?;
        return Ok(false);
    }

    session.commit_transaction().await?;
    Ok(true)
}

#[get("/votes/status")]
async fn voting_status(
    token: AuthToken<Voter>,
    voters: Coll<Voter>,
    elections: Coll<Election>,
    settings: Coll<ActiveElection>,
) -> Result<Json<VotingStatus>> {
    let voter = token.user(&voters).await?;
    let election = ActiveElection::require(&settings, &elections).await?;
    let voted_positions = voter.voted_positions(election.id).to_vec();
    Ok(Json(VotingStatus {
        election_id: election.id.into(),
        has_voted: !voted_positions.is_empty(),
        voted_positions,
        voting_open: election.schedule.accepts_votes(Utc::now()),
    }))
}

#[cfg(test)]
mod tests {
    use mongodb::{bson::doc, Database};
    use rocket::{
        futures::TryStreamExt,
        http::{ContentType, Status},
        local::asynchronous::{Client, LocalResponse},
        serde::json::serde_json,
        tokio,
    };

    use crate::error::ErrorBody;
    use crate::model::db::{
        election::NewElection,
        vote::Vote,
        voter::NewVoter,
    };

    use super::*;

    async fn cast<'c>(client: &'c Client, ballot: &BallotRequest) -> LocalResponse<'c> {
        client
            .post(uri!(submit_ballot))
            .header(ContentType::JSON)
            .body(serde_json::to_string(ballot).unwrap())
            .dispatch()
            .await
    }

    async fn error_kind(response: LocalResponse<'_>) -> String {
        response.into_json::<ErrorBody>().await.unwrap().error
    }

    async fn logged_in_voter(db: &Database) -> Voter {
        let filter = doc! { "student_id": NewVoter::example().student_id };
        Coll::<Voter>::from_db(db)
            .find_one(filter, None)
            .await
            .unwrap()
            .unwrap()
    }

    async fn all_votes(db: &Database) -> Vec<Vote> {
        Coll::<Vote>::from_db(db)
            .find(None, None)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap()
    }

    #[backend_test(voter)]
    async fn ballot_is_recorded_once(client: Client, db: Database) {
        let election = ActiveElection::activate_example(&db, NewElection::current_example()).await;
        let slate = Candidate::insert_examples(&db).await;
        let ballot = BallotRequest::choosing(&[
            ("President", slate[1].id),
            ("Treasurer", slate[2].id),
        ]);

        // First submission succeeds with a receipt.
        let response = cast(&client, &ballot).await;
        assert_eq!(Status::Created, response.status());
        let receipt: BallotReceipt = response.into_json().await.unwrap();
        assert_eq!(*receipt.election_id, election.id);
        assert_eq!(*receipt.selections["President"], slate[1].id);
        assert_eq!(*receipt.selections["Treasurer"], slate[2].id);

        let votes = all_votes(&db).await;
        assert_eq!(votes.len(), 2);
        assert!(votes.iter().all(|v| v.is_as_cast()));
        let voter = logged_in_voter(&db).await;
        assert!(voter.has_voted(election.id));
        assert_eq!(voter.voted_positions(election.id).len(), 2);

        // The same ballot again is refused, and nothing more is stored.
        let response = cast(&client, &ballot).await;
        assert_eq!(Status::Conflict, response.status());
        assert_eq!(error_kind(response).await, "already_voted");
        assert_eq!(all_votes(&db).await.len(), 2);

        // The voter can see that they have voted.
        let response = client.get(uri!(voting_status)).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        let status: VotingStatus = response.into_json().await.unwrap();
        assert!(status.has_voted);
        assert!(status.voting_open);
    }

    #[backend_test(voter)]
    async fn incomplete_ballot_stores_nothing(client: Client, db: Database) {
        let election = ActiveElection::activate_example(&db, NewElection::current_example()).await;
        let slate = Candidate::insert_examples(&db).await;

        let missing_treasurer = BallotRequest::choosing(&[("President", slate[0].id)]);
        let response = cast(&client, &missing_treasurer).await;
        assert_eq!(Status::BadRequest, response.status());
        let body: ErrorBody = response.into_json().await.unwrap();
        assert_eq!(body.error, "validation");
        assert!(body.message.contains("Treasurer"));

        // A candidate standing for another position is refused too.
        let wrong_position = BallotRequest::choosing(&[
            ("President", slate[2].id),
            ("Treasurer", slate[3].id),
        ]);
        let response = cast(&client, &wrong_position).await;
        assert_eq!(Status::BadRequest, response.status());

        assert!(all_votes(&db).await.is_empty());
        assert!(!logged_in_voter(&db).await.has_voted(election.id));

        // The voter can still vote properly afterwards.
        let complete = BallotRequest::choosing(&[
            ("President", slate[0].id),
            ("Treasurer", slate[3].id),
        ]);
        assert_eq!(Status::Created, cast(&client, &complete).await.status());
    }

    #[backend_test(voter)]
    async fn no_votes_outside_voting_window(client: Client, db: Database) {
        let slate = Candidate::insert_examples(&db).await;
        let ballot = BallotRequest::choosing(&[
            ("President", slate[0].id),
            ("Treasurer", slate[2].id),
        ]);

        // No election at all.
        let response = cast(&client, &ballot).await;
        assert_eq!(Status::Forbidden, response.status());
        assert_eq!(error_kind(response).await, "election_not_active");

        // An election that has not started yet.
        ActiveElection::activate_example(&db, NewElection::future_example()).await;
        let response = cast(&client, &ballot).await;
        assert_eq!(Status::Forbidden, response.status());
        assert!(all_votes(&db).await.is_empty());
    }

    #[backend_test(voter)]
    async fn paused_election_refuses_votes(client: Client, db: Database) {
        let mut paused = NewElection::current_example();
        paused.schedule = paused
            .schedule
            .apply(crate::model::common::election::Transition::Pause, Utc::now())
            .unwrap()
            .unwrap();
        ActiveElection::activate_example(&db, paused).await;
        let slate = Candidate::insert_examples(&db).await;

        let ballot = BallotRequest::choosing(&[
            ("President", slate[0].id),
            ("Treasurer", slate[2].id),
        ]);
        let response = cast(&client, &ballot).await;
        assert_eq!(Status::Forbidden, response.status());
    }

    #[backend_test(voter)]
    async fn flagged_candidates_are_recorded_as_cast(client: Client, db: Database) {
        ActiveElection::activate_example(&db, NewElection::current_example()).await;
        let slate = Candidate::insert_examples(&db).await;

        // Flag Alice, then vote for Bob and for the flagged candidate's rival.
        Coll::<Candidate>::from_db(&db)
            .update_one(slate[0].id.as_doc(), doc! { "$set": { "rigged": true } }, None)
            .await
            .unwrap();
        let ballot = BallotRequest::choosing(&[
            ("President", slate[1].id),
            ("Treasurer", slate[3].id),
        ]);
        assert_eq!(Status::Created, cast(&client, &ballot).await.status());

        let votes = all_votes(&db).await;
        let president = votes.iter().find(|v| v.position == "President").unwrap();
        assert_eq!(president.candidate_id, slate[1].id);
        assert_eq!(president.selected_candidate_id, slate[1].id);
        let treasurer = votes.iter().find(|v| v.position == "Treasurer").unwrap();
        assert_eq!(treasurer.candidate_id, slate[3].id);
    }

    #[backend_test(voter)]
    async fn votes_for_flagged_candidate_are_unchanged(client: Client, db: Database) {
        ActiveElection::activate_example(&db, NewElection::current_example()).await;
        let slate = Candidate::insert_examples(&db).await;
        Coll::<Candidate>::from_db(&db)
            .update_one(slate[2].id.as_doc(), doc! { "$set": { "rigged": true } }, None)
            .await
            .unwrap();

        let ballot = BallotRequest::choosing(&[
            ("President", slate[0].id),
            ("Treasurer", slate[2].id),
        ]);
        assert_eq!(Status::Created, cast(&client, &ballot).await.status());
        let votes = all_votes(&db).await;
        let treasurer = votes.iter().find(|v| v.position == "Treasurer").unwrap();
        assert_eq!(treasurer.candidate_id, slate[2].id);
        assert!(votes.iter().all(|v| v.is_as_cast()));
    }

    #[backend_test(voter)]
    async fn concurrent_ballots_count_once(client: Client, db: Database) {
        let election = ActiveElection::activate_example(&db, NewElection::current_example()).await;
        let slate = Candidate::insert_examples(&db).await;
        let voter = logged_in_voter(&db).await;
        let db_client = client.rocket().state::<mongodb::Client>().unwrap();

        let first = BallotRequest::choosing(&[
            ("President", slate[0].id),
            ("Treasurer", slate[2].id),
        ]);
        let second = BallotRequest::choosing(&[
            ("President", slate[1].id),
            ("Treasurer", slate[3].id),
        ]);
        let (elections, settings, voters, candidates, new_votes) = (
            Coll::from_db(&db),
            Coll::from_db(&db),
            Coll::from_db(&db),
            Coll::from_db(&db),
            Coll::from_db(&db),
        );
        let (a, b) = tokio::join!(
            cast_ballot(
                &voter,
                &first.selections,
                &elections,
                &settings,
                &voters,
                &candidates,
                &new_votes,
                db_client
            ),
            cast_ballot(
                &voter,
                &second.selections,
                &elections,
                &settings,
                &voters,
                &candidates,
                &new_votes,
                db_client
            ),
        );

        // Exactly one ballot wins; the other is reported as a duplicate.
        let outcomes = [a, b];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(outcomes
            .iter()
            .any(|r| matches!(r, Err(Error::AlreadyVoted(_)))));
        let votes = all_votes(&db).await;
        assert_eq!(votes.len(), 2);
        assert!(votes.iter().all(|v| v.voter_id == voter.id));
        let voter = logged_in_voter(&db).await;
        assert_eq!(voter.voted_positions(election.id).len(), 2);
    }

    #[backend_test(voter)]
    async fn candidates_are_listed_by_position(client: Client, db: Database) {
        let slate = Candidate::insert_examples(&db).await;
        let response = client.get(uri!(list_candidates)).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        let listed: BTreeMap<String, Vec<CandidateDescription>> =
            response.into_json().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed["President"].len(), 2);
        assert_eq!(*listed["Treasurer"][0].id, slate[2].id);

        // Logged out, the list is hidden.
        client.delete(uri!(crate::api::auth::logout)).dispatch().await;
        let response = client.get(uri!(list_candidates)).dispatch().await;
        assert_eq!(Status::Unauthorized, response.status());
    }
}
