//! Persisting election lifecycle changes.
//!
//! The rules for moving between states live in [`ElectionSchedule`]; this
//! module writes the results with conditional updates so that concurrent
//! callers (admins and the background checker) never apply the same
//! transition twice.

mod checker;
mod tabulation;

use chrono::{DateTime, Utc};
use mongodb::{
    bson::{doc, to_document},
    Client, Database,
};
use rocket::http::Status;

use crate::error::{Error, Result};
use crate::model::{
    common::election::{ElectionSchedule, ElectionStatus, ResetMode, Transition, TransitionError},
    db::{
        election::{ActiveElection, Election, NewElection},
        election_log::{Actor, LogAction, NewLogEntry},
    },
    mongodb::{Coll, Id},
};
use crate::notifier::Notifier;

pub use checker::{check_once, LifecycleCheckerFairing};
pub use tabulation::tabulate_and_store;

/// Create a new election and make it the active one.
///
/// Fails if the current active election has not completed yet.
pub async fn create_election(
    db: &Database,
    db_client: &Client,
    name: String,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    actor: &Actor,
) -> Result<Election> {
    if name.trim().is_empty() {
        return Err(Error::Validation("Election name must not be empty".to_string()));
    }
    let now = Utc::now();
    let schedule = ElectionSchedule::new(start_time, end_time, now)?;

    let settings = Coll::<ActiveElection>::from_db(db);
    let elections = Coll::<Election>::from_db(db);
    if let Some(active) = ActiveElection::load(&settings, &elections).await? {
        if active.schedule.status != ElectionStatus::Completed {
            return Err(Error::Status(
                Status::Conflict,
                format!(
                    "Election {} is {}; complete it before creating another",
                    active.id, active.schedule.status
                ),
            ));
        }
    }

    let election = NewElection::new(name, schedule, now);
    let election =
        insert_and_activate(db, db_client, election, LogAction::Created, actor, None).await?;
    info!(
        "{} created election {} ({}), status {}",
        actor.name, election.id, election.name, election.schedule.status
    );
    Ok(election)
}

/// Insert an election, point the active reference at it and log the change,
/// all in one transaction.
async fn insert_and_activate(
    db: &Database,
    db_client: &Client,
    election: NewElection,
    action: LogAction,
    actor: &Actor,
    reset_mode: Option<ResetMode>,
) -> Result<Election> {
    let new_elections = Coll::<NewElection>::from_db(db);
    let settings = Coll::<ActiveElection>::from_db(db);
    let logs = Coll::<NewLogEntry>::from_db(db);

    let mut session = db_client.start_session(None).await?;
    session.start_transaction(None).await?;

    let id: Id = new_elections
        .insert_one_with_session(&election, None, &mut session)
        .await?
        .inserted_id
        .as_object_id()
        .ok_or_else(|| {
            Error::Status(
                Status::InternalServerError,
                "Inserted ID is not an ObjectId".to_string(),
            )
        })?
        .into();
    ActiveElection::set_with_session(&settings, id, &mut session).await?;
    let mut entry = NewLogEntry::new(id, action, actor, election.created_at);
    entry.reset_mode = reset_mode;
    logs.insert_one_with_session(&entry, None, &mut session)
        .await?;

    session.commit_transaction().await?;
    Ok(Election { id, election })
}

/// Apply a lifecycle transition to an election.
///
/// Returns the updated election, or `None` if it was already in the target
/// state (including when a concurrent caller got there first). Only the
/// caller that actually changes the status writes the log entry, and on
/// completion tabulates the results and sends the completion notice.
/// Tabulation failures are logged; the transition stands regardless.
pub async fn apply_transition(
    db: &Database,
    election: &Election,
    transition: Transition,
    actor: &Actor,
    notifier: &Notifier,
) -> Result<Option<Election>> {
    let now = Utc::now();
    let schedule = match election.schedule.apply(transition, now)? {
        Some(schedule) => schedule,
        None => {
            debug!("Election {} is already {}", election.id, transition.target());
            return Ok(None);
        }
    };

    let elections = Coll::<Election>::from_db(db);
    let filter = doc! {
        "_id": election.id,
        "status": election.schedule.status,
    };
    let update = doc! {
        "$set": to_document(&schedule)?,
    };
    let result = elections.update_one(filter, update, None).await?;
    if result.modified_count != 1 {
        // Someone else changed the status since we read it.
        let current = elections
            .find_one(election.id.as_doc(), None)
            .await?
            .ok_or_else(|| Error::not_found(format!("Election {}", election.id)))?;
        if current.schedule.status == transition.target() {
            debug!(
                "Election {} was already moved to {} by another request",
                election.id,
                transition.target()
            );
            return Ok(None);
        }
        return Err(TransitionError::Conflict(election.id.to_string()).into());
    }

    let mut updated = election.clone();
    updated.schedule = schedule;
    info!(
        "{} moved election {} from {} to {}",
        actor.name, election.id, election.schedule.status, updated.schedule.status
    );
    Coll::<NewLogEntry>::from_db(db)
        .insert_one(NewLogEntry::new(election.id, transition.into(), actor, now), None)
        .await?;

    if transition == Transition::Complete {
        match tabulate_and_store(db, &updated).await {
            Ok(results) => {
                let notifier = notifier.clone();
                rocket::tokio::spawn(async move {
                    notifier.election_completed(&results).await;
                });
            }
            Err(e) => error!("Failed to tabulate election {}: {e}", election.id),
        }
    }

    Ok(Some(updated))
}

/// Reopen the active election after it has completed.
///
/// With [`ResetMode::NewElection`] a fresh election replaces it as the active
/// one; with [`ResetMode::Reuse`] the same record gets a new voting window
/// and keeps its votes.
pub async fn reset_election(
    db: &Database,
    db_client: &Client,
    mode: ResetMode,
    name: Option<String>,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    actor: &Actor,
) -> Result<Election> {
    let elections = Coll::<Election>::from_db(db);
    let election = ActiveElection::require(&Coll::from_db(db), &elections).await?;
    let now = Utc::now();
    let schedule = election.schedule.reset(start_time, end_time, now)?;

    let reset = match mode {
        ResetMode::NewElection => {
            let name = name.unwrap_or_else(|| election.name.clone());
            let fresh = NewElection::new(name, schedule, now);
            insert_and_activate(db, db_client, fresh, LogAction::Reset, actor, Some(mode)).await?
        }
        ResetMode::Reuse => {
            let filter = doc! {
                "_id": election.id,
                "status": ElectionStatus::Completed,
            };
            let mut set = to_document(&schedule)?;
            set.insert("round", election.round + 1);
            if let Some(name) = &name {
                set.insert("name", name.clone());
            }
            let result = elections
                .update_one(filter, doc! { "$set": set }, None)
                .await?;
            if result.modified_count != 1 {
                return Err(TransitionError::Conflict(election.id.to_string()).into());
            }
            Coll::<NewLogEntry>::from_db(db)
                .insert_one(NewLogEntry::reset(election.id, mode, actor, now), None)
                .await?;

            let mut reused = election.clone();
            reused.schedule = schedule;
            reused.round += 1;
            if let Some(name) = name {
                reused.name = name;
            }
            reused
        }
    };
    warn!(
        "{} reset election {} ({mode:?}), active election is now {} with status {}",
        actor.name, election.id, reset.id, reset.schedule.status
    );
    Ok(reset)
}
