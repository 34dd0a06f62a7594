use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::{
    db::{candidate::Candidate, election::Election, vote::Vote},
    mongodb::Id,
};

/// Votes counted for one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateTally {
    pub candidate_id: Id,
    pub name: String,
    pub votes: u32,
}

/// Final results of an election, written once when it completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionResults {
    #[serde(rename = "_id")]
    pub election_id: Id,
    pub election_name: String,
    /// Tallies per position, most votes first.
    pub positions: BTreeMap<String, Vec<CandidateTally>>,
    /// Number of voters who cast a ballot.
    pub total_ballots: u32,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub tabulated_at: DateTime<Utc>,
}

impl ElectionResults {
    /// Count the votes of an election.
    ///
    /// Every candidate appears in the tallies, with zero votes if need be.
    /// Votes for candidates that no longer exist are counted under the
    /// position they were cast for with the name "(unknown candidate)".
    pub fn tabulate(
        election: &Election,
        candidates: &[Candidate],
        votes: &[Vote],
        now: DateTime<Utc>,
    ) -> Self {
        let mut counts: HashMap<(String, Id), u32> = candidates
            .iter()
            .map(|c| ((c.position.clone(), c.id), 0))
            .collect();
        let mut voters = HashSet::new();
        for vote in votes.iter().filter(|v| v.election_id == election.id) {
            *counts
                .entry((vote.position.clone(), vote.candidate_id))
                .or_insert(0) += 1;
            voters.insert(vote.voter_id);
        }

        let names: HashMap<Id, &str> = candidates
            .iter()
            .map(|c| (c.id, c.name.as_str()))
            .collect();
        let mut positions: BTreeMap<String, Vec<CandidateTally>> = BTreeMap::new();
        for ((position, candidate_id), votes) in counts {
            let name = names
                .get(&candidate_id)
                .copied()
                .unwrap_or("(unknown candidate)")
                .to_string();
            positions.entry(position).or_default().push(CandidateTally {
                candidate_id,
                name,
                votes,
            });
        }
        for tallies in positions.values_mut() {
            tallies.sort_by(|a, b| b.votes.cmp(&a.votes).then_with(|| a.name.cmp(&b.name)));
        }

        Self {
            election_id: election.id,
            election_name: election.name.clone(),
            positions,
            total_ballots: voters.len() as u32,
            tabulated_at: now,
        }
    }

    /// The candidates with the most votes for a position; several on a tie.
    pub fn leaders(&self, position: &str) -> Vec<&CandidateTally> {
        let tallies = match self.positions.get(position) {
            Some(tallies) => tallies,
            None => return Vec::new(),
        };
        let top = tallies.first().map(|t| t.votes).unwrap_or(0);
        tallies.iter().filter(|t| t.votes == top).collect()
    }
}
