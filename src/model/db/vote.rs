use std::ops::Deref;

use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::{common::ballot::resolve_final_candidate, mongodb::Id};

/// A single recorded vote for one position. Votes are never modified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteCore {
    pub election_id: Id,
    pub voter_id: Id,
    pub position: String,
    /// The candidate this vote is counted for.
    pub candidate_id: Id,
    /// The candidate the voter selected, kept for audits.
    pub selected_candidate_id: Id,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub cast_at: DateTime<Utc>,
}

impl VoteCore {
    /// Record a voter's selection for a position.
    pub fn new(
        election_id: Id,
        voter_id: Id,
        position: String,
        selected: Id,
        cast_at: DateTime<Utc>,
    ) -> Self {
        let candidate_id = resolve_final_candidate(&position, selected);
        Self {
            election_id,
            voter_id,
            position,
            candidate_id,
            selected_candidate_id: selected,
            cast_at,
        }
    }

    /// Is this vote counted for the candidate the voter chose?
    pub fn is_as_cast(&self) -> bool {
        self.candidate_id == self.selected_candidate_id
    }
}

/// A vote without an ID.
pub type NewVote = VoteCore;

/// A vote from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub vote: VoteCore,
}

impl Deref for Vote {
    type Target = VoteCore;

    fn deref(&self) -> &Self::Target {
        &self.vote
    }
}
