use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    api::id::ApiId,
    common::ballot::{RawSelections, Selections},
    mongodb::Id,
};

/// A ballot submitted by a voter: for every position, the chosen candidate
/// with a count of 1.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BallotRequest {
    pub selections: RawSelections,
}

/// Confirmation returned to a voter once their ballot is stored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BallotReceipt {
    pub election_id: ApiId,
    /// The candidate recorded for each position.
    pub selections: BTreeMap<String, ApiId>,
    pub cast_at: DateTime<Utc>,
}

impl BallotReceipt {
    pub fn new(election_id: Id, selections: &Selections, cast_at: DateTime<Utc>) -> Self {
        Self {
            election_id: election_id.into(),
            selections: selections
                .iter()
                .map(|(position, candidate)| (position.clone(), (*candidate).into()))
                .collect(),
            cast_at,
        }
    }
}

/// Whether the logged-in voter may still vote in the active election.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VotingStatus {
    pub election_id: ApiId,
    pub has_voted: bool,
    pub voted_positions: Vec<String>,
    pub voting_open: bool,
}
