use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    api::id::ApiId,
    common::election::{ElectionStatus, ResetMode, Transition},
    db::{
        election::Election,
        election_log::{LogAction, LogEntry},
        results::{CandidateTally, ElectionResults},
    },
};

/// An admin's request to schedule a new election.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ElectionSpec {
    pub name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

/// An admin's request to move the active election to a new status.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StatusUpdate {
    pub status: ElectionStatus,
}

impl StatusUpdate {
    /// The transition that reaches the requested status from `current`.
    /// `None` means no transition leads there, e.g. back to `not_started`.
    pub fn transition_from(&self, current: ElectionStatus) -> Option<Transition> {
        match (self.status, current) {
            (ElectionStatus::Ongoing, ElectionStatus::NotStarted) => Some(Transition::Start),
            (ElectionStatus::Ongoing, _) => Some(Transition::Resume),
            (ElectionStatus::Paused, _) => Some(Transition::Pause),
            (ElectionStatus::Completed, _) => Some(Transition::Complete),
            (ElectionStatus::NotStarted, _) => None,
        }
    }
}

/// An admin's request to reopen a completed election.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetRequest {
    pub mode: ResetMode,
    /// Name for the new election; defaults to the completed one's name.
    #[serde(default)]
    pub name: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

/// The active election's status, as anyone can see it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ElectionStatusView {
    pub id: ApiId,
    pub name: String,
    pub status: ElectionStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// End time including time spent paused.
    pub effective_end_time: DateTime<Utc>,
    pub remaining_seconds: i64,
    pub voting_open: bool,
    pub round: u32,
}

impl ElectionStatusView {
    pub fn new(election: &Election, now: DateTime<Utc>) -> Self {
        Self {
            id: election.id.into(),
            name: election.name.clone(),
            status: election.schedule.status,
            start_time: election.schedule.start_time,
            end_time: election.schedule.end_time,
            effective_end_time: election.schedule.effective_end_time(),
            remaining_seconds: election.schedule.remaining_time(now).num_seconds(),
            voting_open: election.schedule.accepts_votes(now),
            round: election.round,
        }
    }
}

/// An audit log entry, as admins see it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntryDescription {
    pub id: ApiId,
    pub election_id: Option<ApiId>,
    pub action: LogAction,
    pub candidate_id: Option<ApiId>,
    pub reset_mode: Option<ResetMode>,
    pub actor: String,
    pub at: DateTime<Utc>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl From<LogEntry> for LogEntryDescription {
    fn from(entry: LogEntry) -> Self {
        let entry_id = entry.id;
        let entry = entry.entry;
        Self {
            id: entry_id.into(),
            election_id: entry.election_id.map(Into::into),
            action: entry.action,
            candidate_id: entry.candidate_id.map(Into::into),
            reset_mode: entry.reset_mode,
            actor: entry.actor,
            at: entry.at,
            ip: entry.meta.ip,
            user_agent: entry.meta.user_agent,
        }
    }
}

/// A candidate's final tally.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TallyDescription {
    pub candidate_id: ApiId,
    pub name: String,
    pub votes: u32,
}

impl From<CandidateTally> for TallyDescription {
    fn from(tally: CandidateTally) -> Self {
        Self {
            candidate_id: tally.candidate_id.into(),
            name: tally.name,
            votes: tally.votes,
        }
    }
}

/// Final results of an election.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultsDescription {
    pub election_id: ApiId,
    pub election_name: String,
    pub positions: BTreeMap<String, Vec<TallyDescription>>,
    pub total_ballots: u32,
    pub tabulated_at: DateTime<Utc>,
}

impl From<ElectionResults> for ResultsDescription {
    fn from(results: ElectionResults) -> Self {
        Self {
            election_id: results.election_id.into(),
            election_name: results.election_name,
            positions: results
                .positions
                .into_iter()
                .map(|(position, tallies)| {
                    (position, tallies.into_iter().map(Into::into).collect())
                })
                .collect(),
            total_ballots: results.total_ballots,
            tabulated_at: results.tabulated_at,
        }
    }
}
