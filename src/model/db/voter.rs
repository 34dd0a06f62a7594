use std::collections::HashMap;
use std::ops::{Deref, DerefMut};

use serde::{Deserialize, Serialize};

use crate::model::mongodb::Id;

/// Core voter user data, as stored in the database.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterCore {
    /// University student ID, used to log in.
    pub student_id: String,
    pub name: String,
    pub password_hash: String,
    /// Maps election IDs (as hex strings) to the positions the voter has
    /// voted for in that election. An entry is only ever written by a
    /// complete ballot submission.
    #[serde(default)]
    pub voted_positions: HashMap<String, Vec<String>>,
}

impl VoterCore {
    /// Check whether the given password is correct.
    pub fn verify_password<T: AsRef<[u8]>>(&self, password: T) -> bool {
        argon2::verify_encoded(&self.password_hash, password.as_ref()).unwrap_or(false)
    }

    /// Positions voted for in the given election; empty if the voter has not voted.
    pub fn voted_positions(&self, election_id: Id) -> &[String] {
        self.voted_positions
            .get(&election_id.to_string())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Has this voter submitted their ballot for the given election?
    pub fn has_voted(&self, election_id: Id) -> bool {
        !self.voted_positions(election_id).is_empty()
    }
}

/// Path of the voted-positions entry for an election, for use in queries.
pub fn voted_positions_field(election_id: Id) -> String {
    format!("voted_positions.{election_id}")
}

/// A voter without an ID.
pub type NewVoter = VoterCore;

/// A voter user from the database, with its unique ID.
#[derive(Debug, Serialize, Deserialize)]
pub struct Voter {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub voter: VoterCore,
}

impl Deref for Voter {
    type Target = VoterCore;

    fn deref(&self) -> &Self::Target {
        &self.voter
    }
}

impl DerefMut for Voter {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.voter
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voted_positions_are_per_election() {
        let mut voter = NewVoter::example();
        let election = Id::new();
        let other = Id::new();
        assert!(!voter.has_voted(election));

        voter.voted_positions.insert(
            election.to_string(),
            vec!["President".to_string(), "Treasurer".to_string()],
        );
        assert!(voter.has_voted(election));
        assert_eq!(voter.voted_positions(election).len(), 2);
        assert!(!voter.has_voted(other));
        assert_eq!(
            voted_positions_field(election),
            format!("voted_positions.{}", election.to_hex())
        );
    }
}
