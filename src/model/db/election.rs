use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use mongodb::{
    bson::{doc, serde_helpers::chrono_datetime_as_bson_datetime},
    options::UpdateOptions,
    ClientSession,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    common::election::ElectionSchedule,
    mongodb::{Coll, Id},
};

/// Core election data, as stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionCore {
    pub name: String,
    #[serde(flatten)]
    pub schedule: ElectionSchedule,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    /// How many times this record has been reopened after completing.
    #[serde(default)]
    pub round: u32,
}

impl ElectionCore {
    pub fn new(name: String, schedule: ElectionSchedule, now: DateTime<Utc>) -> Self {
        Self {
            name,
            schedule,
            created_at: now,
            round: 1,
        }
    }
}

/// An election without an ID.
pub type NewElection = ElectionCore;

/// An election from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Election {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub election: ElectionCore,
}

impl Deref for Election {
    type Target = ElectionCore;

    fn deref(&self) -> &Self::Target {
        &self.election
    }
}

impl DerefMut for Election {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.election
    }
}

const ACTIVE_ELECTION_KEY: &str = "active_election";

/// Settings document naming the election everything else operates on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveElection {
    #[serde(rename = "_id")]
    key: String,
    pub election_id: Id,
}

impl ActiveElection {
    /// The ID of the active election, if one has been set.
    pub async fn get(settings: &Coll<ActiveElection>) -> Result<Option<Id>> {
        let active = settings
            .find_one(doc! { "_id": ACTIVE_ELECTION_KEY }, None)
            .await?;
        Ok(active.map(|a| a.election_id))
    }

    /// Point the active reference at the given election.
    pub async fn set_with_session(
        settings: &Coll<ActiveElection>,
        election_id: Id,
        session: &mut ClientSession,
    ) -> Result<()> {
        let update = doc! {
            "$set": { "election_id": election_id }
        };
        let upsert = UpdateOptions::builder().upsert(true).build();
        settings
            .update_one_with_session(
                doc! { "_id": ACTIVE_ELECTION_KEY },
                update,
                upsert,
                session,
            )
            .await?;
        Ok(())
    }

    /// Load the active election, or `None` if there isn't one.
    pub async fn load(
        settings: &Coll<ActiveElection>,
        elections: &Coll<Election>,
    ) -> Result<Option<Election>> {
        match Self::get(settings).await? {
            Some(id) => Ok(elections.find_one(id.as_doc(), None).await?),
            None => Ok(None),
        }
    }

    /// Load the active election, failing with `NotFound` if there isn't one.
    pub async fn require(
        settings: &Coll<ActiveElection>,
        elections: &Coll<Election>,
    ) -> Result<Election> {
        Self::load(settings, elections)
            .await?
            .ok_or_else(|| Error::not_found("Active election"))
    }
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    use chrono::Duration;

    impl ElectionCore {
        /// An election that started an hour ago and ends in an hour.
        pub fn current_example() -> Self {
            let now = Utc::now();
            let schedule =
                ElectionSchedule::new(now - Duration::hours(1), now + Duration::hours(1), now)
                    .unwrap();
            Self::new("Student Union 2026".to_string(), schedule, now)
        }

        /// An election starting tomorrow.
        pub fn future_example() -> Self {
            let now = Utc::now();
            let schedule =
                ElectionSchedule::new(now + Duration::days(1), now + Duration::days(2), now)
                    .unwrap();
            Self::new("Student Union 2027".to_string(), schedule, now)
        }
    }

    impl ActiveElection {
        /// Insert the given election and make it the active one.
        pub async fn activate_example(db: &mongodb::Database, election: NewElection) -> Election {
            let id: Id = Coll::<NewElection>::from_db(db)
                .insert_one(&election, None)
                .await
                .unwrap()
                .inserted_id
                .as_object_id()
                .unwrap()
                .into();
            let active = ActiveElection {
                key: ACTIVE_ELECTION_KEY.to_string(),
                election_id: id,
            };
            Coll::<ActiveElection>::from_db(db)
                .insert_one(&active, None)
                .await
                .unwrap();
            Election { id, election }
        }
    }
}
