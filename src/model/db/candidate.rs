use std::collections::HashSet;
use std::ops::{Deref, DerefMut};

use mongodb::bson::doc;
use rocket::futures::TryStreamExt;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{
    common::ballot::PositionCandidates,
    mongodb::{Coll, Id},
};

/// Core candidate data, as stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateCore {
    pub name: String,
    /// The position the candidate is standing for.
    pub position: String,
    pub contact: String,
    /// Supervisor-controlled flag. At most one candidate per position should
    /// carry it, but nothing enforces that. It has no bearing on how votes
    /// are recorded or counted.
    #[serde(default)]
    pub rigged: bool,
}

/// A candidate without an ID.
pub type NewCandidate = CandidateCore;

/// A candidate from the database, with its unique ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub candidate: CandidateCore,
}

impl Deref for Candidate {
    type Target = CandidateCore;

    fn deref(&self) -> &Self::Target {
        &self.candidate
    }
}

impl DerefMut for Candidate {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.candidate
    }
}

impl Candidate {
    /// All candidates, ordered by position then name.
    pub async fn all(candidates: &Coll<Candidate>) -> Result<Vec<Candidate>> {
        let mut all: Vec<Candidate> = candidates.find(None, None).await?.try_collect().await?;
        all.sort_by(|a, b| (&a.position, &a.name).cmp(&(&b.position, &b.name)));
        Ok(all)
    }

    /// Every candidate carrying the flag, across all positions.
    pub async fn flagged(candidates: &Coll<Candidate>) -> Result<Vec<Candidate>> {
        let filter = doc! { "rigged": true };
        let mut flagged: Vec<Candidate> =
            candidates.find(filter, None).await?.try_collect().await?;
        flagged.sort_by(|a, b| (&a.position, &a.name).cmp(&(&b.position, &b.name)));
        Ok(flagged)
    }

    /// The currently-defined positions and who is standing for each.
    pub async fn positions(candidates: &Coll<Candidate>) -> Result<PositionCandidates> {
        Ok(group_by_position(&Self::all(candidates).await?))
    }
}

/// Group candidate IDs by the position they stand for.
pub fn group_by_position(candidates: &[Candidate]) -> PositionCandidates {
    let mut positions = PositionCandidates::new();
    for candidate in candidates {
        positions
            .entry(candidate.position.clone())
            .or_insert_with(HashSet::new)
            .insert(candidate.id);
    }
    positions
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_group_candidates() {
        let alice = Candidate::example("Alice", "President");
        let bob = Candidate::example("Bob", "President");
        let carol = Candidate::example("Carol", "Treasurer");
        let positions = group_by_position(&[alice.clone(), bob.clone(), carol.clone()]);

        assert_eq!(positions.len(), 2);
        assert_eq!(positions["President"], HashSet::from([alice.id, bob.id]));
        assert_eq!(positions["Treasurer"], HashSet::from([carol.id]));
    }
}
