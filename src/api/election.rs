use chrono::Utc;
use mongodb::{bson::doc, options::FindOptions, Client, Database};
use rocket::{futures::TryStreamExt, response::status::Created, serde::json::Json, Route, State};

use crate::{
    error::{Error, Result},
    lifecycle,
    logging::RequestMeta,
    model::{
        api::{
            auth::AuthToken,
            election::{
                ElectionSpec, ElectionStatusView, LogEntryDescription, ResetRequest,
                ResultsDescription, StatusUpdate,
            },
        },
        db::{
            admin::Admin,
            election::{ActiveElection, Election},
            election_log::{Actor, LogEntry},
            results::ElectionResults,
        },
        mongodb::{Coll, Id},
    },
    notifier::Notifier,
};

/// Most log entries returned at once.
const MAX_LOG_ENTRIES: i64 = 500;

pub fn routes() -> Vec<Route> {
    routes![
        create_election,
        update_status,
        reset_election,
        election_logs,
        all_logs,
        election_results,
        election_status,
    ]
}

#[post("/admin/elections", data = "<spec>", format = "json")]
async fn create_election(
    token: AuthToken<Admin>,
    meta: RequestMeta,
    spec: Json<ElectionSpec>,
    admins: Coll<Admin>,
    db: &State<Database>,
    db_client: &State<Client>,
) -> Result<Created<Json<ElectionStatusView>>> {
    let admin = token.user(&admins).await?;
    let spec = spec.into_inner();
    let election = lifecycle::create_election(
        db,
        db_client,
        spec.name,
        spec.start_time,
        spec.end_time,
        &Actor::admin(&admin, meta),
    )
    .await?;
    let view = ElectionStatusView::new(&election, Utc::now());
    Ok(Created::new("/election/status").body(Json(view)))
}

/// Start, pause, resume or complete the active election.
#[allow(clippy::too_many_arguments)]
#[put("/admin/election/status", data = "<update>", format = "json")]
async fn update_status(
    token: AuthToken<Admin>,
    meta: RequestMeta,
    update: Json<StatusUpdate>,
    admins: Coll<Admin>,
    settings: Coll<ActiveElection>,
    elections: Coll<Election>,
    db: &State<Database>,
    notifier: &State<Notifier>,
) -> Result<Json<ElectionStatusView>> {
    let admin = token.user(&admins).await?;
    let election = ActiveElection::require(&settings, &elections).await?;
    let transition = update
        .transition_from(election.schedule.status)
        .ok_or_else(|| {
            Error::Validation(format!("Cannot move an election to {}", update.status))
        })?;

    let actor = Actor::admin(&admin, meta);
    let election = match lifecycle::apply_transition(db, &election, transition, &actor, notifier)
        .await?
    {
        Some(updated) => updated,
        // Already there; report the current state.
        None => ActiveElection::require(&settings, &elections).await?,
    };
    Ok(Json(ElectionStatusView::new(&election, Utc::now())))
}

/// Reopen a completed election, either as a brand new election or by
/// reusing the same record. The administrator must choose which.
#[post("/admin/election/reset", data = "<request>", format = "json")]
async fn reset_election(
    token: AuthToken<Admin>,
    meta: RequestMeta,
    request: Json<ResetRequest>,
    admins: Coll<Admin>,
    db: &State<Database>,
    db_client: &State<Client>,
) -> Result<Json<ElectionStatusView>> {
    let admin = token.user(&admins).await?;
    let request = request.into_inner();
    let election = lifecycle::reset_election(
        db,
        db_client,
        request.mode,
        request.name,
        request.start_time,
        request.end_time,
        &Actor::admin(&admin, meta),
    )
    .await?;
    Ok(Json(ElectionStatusView::new(&election, Utc::now())))
}

async fn find_logs(
    logs: &Coll<LogEntry>,
    filter: mongodb::bson::Document,
) -> Result<Vec<LogEntryDescription>> {
    let newest_first = FindOptions::builder()
        .sort(doc! { "at": -1, "_id": -1 })
        .limit(MAX_LOG_ENTRIES)
        .build();
    let entries: Vec<LogEntry> = logs.find(filter, newest_first).await?.try_collect().await?;
    Ok(entries.into_iter().map(Into::into).collect())
}

/// Log entries for the active election, newest first.
#[get("/admin/election/logs")]
async fn election_logs(
    _token: AuthToken<Admin>,
    settings: Coll<ActiveElection>,
    logs: Coll<LogEntry>,
) -> Result<Json<Vec<LogEntryDescription>>> {
    let election_id = ActiveElection::get(&settings)
        .await?
        .ok_or_else(|| Error::not_found("Active election"))?;
    Ok(Json(find_logs(&logs, doc! { "election_id": election_id }).await?))
}

/// Every log entry, newest first.
#[get("/admin/logs")]
async fn all_logs(
    _token: AuthToken<Admin>,
    logs: Coll<LogEntry>,
) -> Result<Json<Vec<LogEntryDescription>>> {
    Ok(Json(find_logs(&logs, doc! {}).await?))
}

/// Results of the given election, or of the active one.
#[get("/admin/election/results?<election_id>")]
async fn election_results(
    _token: AuthToken<Admin>,
    election_id: Option<Id>,
    settings: Coll<ActiveElection>,
    results: Coll<ElectionResults>,
) -> Result<Json<ResultsDescription>> {
    let election_id = match election_id {
        Some(id) => id,
        None => ActiveElection::get(&settings)
            .await?
            .ok_or_else(|| Error::not_found("Active election"))?,
    };
    let results = results
        .find_one(election_id.as_doc(), None)
        .await?
        .ok_or_else(|| Error::not_found(format!("Results for election {election_id}")))?;
    Ok(Json(results.into()))
}

/// The active election's status. Anyone may ask.
#[get("/election/status")]
async fn election_status(
    settings: Coll<ActiveElection>,
    elections: Coll<Election>,
) -> Result<Json<ElectionStatusView>> {
    let election = ActiveElection::require(&settings, &elections).await?;
    Ok(Json(ElectionStatusView::new(&election, Utc::now())))
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use rocket::{
        http::{ContentType, Status},
        local::asynchronous::{Client, LocalRequest, LocalResponse},
        serde::json::serde_json,
    };
    use serde::Serialize;

    use crate::model::{
        common::election::{ElectionStatus, ResetMode},
        db::{
            candidate::Candidate, election::NewElection, election_log::LogAction, vote::NewVote,
        },
    };

    use super::*;

    async fn send<'c, T: Serialize>(request: LocalRequest<'c>, body: &T) -> LocalResponse<'c> {
        request
            .header(ContentType::JSON)
            .body(serde_json::to_string(body).unwrap())
            .dispatch()
            .await
    }

    async fn set_status<'c>(client: &'c Client, status: ElectionStatus) -> LocalResponse<'c> {
        send(client.put(uri!(update_status)), &StatusUpdate { status }).await
    }

    async fn logged_actions(client: &Client) -> Vec<LogAction> {
        let response = client.get(uri!(election_logs)).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        let entries: Vec<LogEntryDescription> = response.into_json().await.unwrap();
        entries.into_iter().map(|e| e.action).collect()
    }

    #[backend_test(admin)]
    async fn election_lifecycle(client: Client, db: Database) {
        // Create an election that is already open.
        let spec = ElectionSpec::current_example();
        let response = send(client.post(uri!(create_election)), &spec).await;
        assert_eq!(Status::Created, response.status());
        let created: ElectionStatusView = response.into_json().await.unwrap();
        assert_eq!(created.status, ElectionStatus::Ongoing);
        assert!(created.voting_open);
        assert!(created.remaining_seconds > 0);

        // Only one election runs at a time.
        let spec = ElectionSpec::future_example();
        let response = send(client.post(uri!(create_election)), &spec).await;
        assert_eq!(Status::Conflict, response.status());

        // Pause: the clock stops.
        let response = set_status(&client, ElectionStatus::Paused).await;
        assert_eq!(Status::Ok, response.status());
        let paused: ElectionStatusView = response.into_json().await.unwrap();
        assert_eq!(paused.status, ElectionStatus::Paused);
        assert!(!paused.voting_open);
        assert!(paused.remaining_seconds <= created.remaining_seconds);

        // Pausing twice changes nothing.
        let response = set_status(&client, ElectionStatus::Paused).await;
        assert_eq!(Status::Ok, response.status());

        // Resume, then complete.
        let response = set_status(&client, ElectionStatus::Ongoing).await;
        let resumed: ElectionStatusView = response.into_json().await.unwrap();
        assert_eq!(resumed.status, ElectionStatus::Ongoing);
        assert!(resumed.effective_end_time >= resumed.end_time);

        let slate = Candidate::insert_examples(&db).await;
        Coll::<NewVote>::from_db(&db)
            .insert_one(
                NewVote::new(
                    *created.id,
                    Id::new(),
                    "President".to_string(),
                    slate[1].id,
                    Utc::now(),
                ),
                None,
            )
            .await
            .unwrap();
        let response = set_status(&client, ElectionStatus::Completed).await;
        let completed: ElectionStatusView = response.into_json().await.unwrap();
        assert_eq!(completed.status, ElectionStatus::Completed);
        assert_eq!(completed.remaining_seconds, 0);

        // No going back without a reset.
        let response = set_status(&client, ElectionStatus::Paused).await;
        assert_eq!(Status::Conflict, response.status());
        let response = set_status(&client, ElectionStatus::NotStarted).await;
        assert_eq!(Status::BadRequest, response.status());

        // Every change was logged, newest first.
        assert_eq!(
            logged_actions(&client).await,
            vec![
                LogAction::Completed,
                LogAction::Resumed,
                LogAction::Paused,
                LogAction::Created,
            ]
        );

        // Results were counted on completion.
        let response = client.get(uri!(election_results(_))).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        let results: ResultsDescription = response.into_json().await.unwrap();
        assert_eq!(results.election_id, created.id);
        assert_eq!(results.total_ballots, 1);
        assert_eq!(*results.positions["President"][0].candidate_id, slate[1].id);
        assert_eq!(results.positions["President"][0].votes, 1);
    }

    #[backend_test(admin)]
    async fn reset_needs_completion_and_mode(client: Client, db: Database) {
        let election = ActiveElection::activate_example(&db, NewElection::current_example()).await;
        let now = Utc::now();
        let reset = ResetRequest {
            mode: ResetMode::NewElection,
            name: None,
            start_time: now + Duration::hours(1),
            end_time: now + Duration::hours(3),
        };

        let response = send(client.post(uri!(reset_election)), &reset).await;
        assert_eq!(Status::Conflict, response.status());

        // A reset without a mode is not understood.
        let response = client
            .post(uri!(reset_election))
            .header(ContentType::JSON)
            .body(r#"{"startTime":"2030-01-01T00:00:00Z","endTime":"2030-01-02T00:00:00Z"}"#)
            .dispatch()
            .await;
        assert_eq!(Status::UnprocessableEntity, response.status());

        set_status(&client, ElectionStatus::Completed).await;
        let response = send(client.post(uri!(reset_election)), &reset).await;
        assert_eq!(Status::Ok, response.status());
        let fresh: ElectionStatusView = response.into_json().await.unwrap();
        assert_ne!(*fresh.id, election.id);
        assert_eq!(fresh.status, ElectionStatus::NotStarted);
        assert_eq!(fresh.name, election.name);

        // Public status now reports the new election.
        client.delete(uri!(crate::api::auth::logout)).dispatch().await;
        let response = client.get(uri!(election_status)).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        let status: ElectionStatusView = response.into_json().await.unwrap();
        assert_eq!(status.id, fresh.id);
        assert!(!status.voting_open);
    }

    #[backend_test(admin)]
    async fn bad_window_is_rejected(client: Client, db: Database) {
        let now = Utc::now();
        let backwards = ElectionSpec {
            name: "Backwards".to_string(),
            start_time: now + Duration::hours(2),
            end_time: now + Duration::hours(1),
        };
        let response = send(client.post(uri!(create_election)), &backwards).await;
        assert_eq!(Status::BadRequest, response.status());
        let elections = Coll::<Election>::from_db(&db);
        assert_eq!(elections.count_documents(None, None).await.unwrap(), 0);
    }

    #[backend_test]
    async fn public_status_and_admin_only_routes(client: Client, db: Database) {
        let response = client.get(uri!(election_status)).dispatch().await;
        assert_eq!(Status::NotFound, response.status());

        ActiveElection::activate_example(&db, NewElection::future_example()).await;
        let response = client.get(uri!(election_status)).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        let status: ElectionStatusView = response.into_json().await.unwrap();
        assert_eq!(status.status, ElectionStatus::NotStarted);
        assert_eq!(status.remaining_seconds, Duration::days(1).num_seconds());

        let response = set_status(&client, ElectionStatus::Ongoing).await;
        assert_eq!(Status::Unauthorized, response.status());
        let response = client.get(uri!(election_logs)).dispatch().await;
        assert_eq!(Status::Unauthorized, response.status());
    }
}
