use std::ops::Deref;

use chrono::{DateTime, Utc};
use mongodb::bson::{serde_helpers::chrono_datetime_as_bson_datetime, to_bson, Bson};
use serde::{Deserialize, Serialize};

use crate::logging::RequestMeta;
use crate::model::{
    common::election::{ResetMode, Transition},
    db::admin::Admin,
    mongodb::Id,
};

/// Actor name used for changes made by the background checker.
pub const SYSTEM_ACTOR: &str = "System";

/// Who made a change, and from where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub name: String,
    pub meta: RequestMeta,
}

impl Actor {
    /// The background checker.
    pub fn system() -> Self {
        Self {
            name: SYSTEM_ACTOR.to_string(),
            meta: RequestMeta::default(),
        }
    }

    /// An admin acting through a request.
    pub fn admin(admin: &Admin, meta: RequestMeta) -> Self {
        Self {
            name: admin.username.clone(),
            meta,
        }
    }
}

/// What happened.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogAction {
    Created,
    Started,
    Paused,
    Resumed,
    Completed,
    Reset,
    FlagSet,
    FlagCleared,
}

impl From<LogAction> for Bson {
    fn from(action: LogAction) -> Self {
        to_bson(&action).expect("Serialisation is infallible")
    }
}

impl From<Transition> for LogAction {
    fn from(transition: Transition) -> Self {
        match transition {
            Transition::Start => Self::Started,
            Transition::Pause => Self::Paused,
            Transition::Resume => Self::Resumed,
            Transition::Complete => Self::Completed,
        }
    }
}

/// An audit log entry. Entries are only ever appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntryCore {
    /// The election affected, if any.
    pub election_id: Option<Id>,
    pub action: LogAction,
    /// The candidate whose flag was changed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate_id: Option<Id>,
    /// How a completed election was reopened.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset_mode: Option<ResetMode>,
    pub actor: String,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub meta: RequestMeta,
}

impl LogEntryCore {
    pub fn new(
        election_id: impl Into<Option<Id>>,
        action: LogAction,
        actor: &Actor,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            election_id: election_id.into(),
            action,
            candidate_id: None,
            reset_mode: None,
            actor: actor.name.clone(),
            at,
            meta: actor.meta.clone(),
        }
    }

    /// A candidate flag change.
    pub fn flag(candidate_id: Id, flagged: bool, actor: &Actor, at: DateTime<Utc>) -> Self {
        let action = if flagged {
            LogAction::FlagSet
        } else {
            LogAction::FlagCleared
        };
        Self {
            candidate_id: Some(candidate_id),
            ..Self::new(None, action, actor, at)
        }
    }

    /// A completed election being reopened.
    pub fn reset(election_id: Id, mode: ResetMode, actor: &Actor, at: DateTime<Utc>) -> Self {
        Self {
            reset_mode: Some(mode),
            ..Self::new(election_id, LogAction::Reset, actor, at)
        }
    }
}

/// A log entry without an ID.
pub type NewLogEntry = LogEntryCore;

/// A log entry from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub entry: LogEntryCore,
}

impl Deref for LogEntry {
    type Target = LogEntryCore;

    fn deref(&self) -> &Self::Target {
        &self.entry
    }
}
