use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    api::id::ApiId,
    db::candidate::{Candidate, NewCandidate},
    mongodb::Id,
};

/// An admin's request to add a candidate.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CandidateSpec {
    pub name: String,
    pub position: String,
    #[serde(default)]
    pub contact: String,
}

impl TryFrom<CandidateSpec> for NewCandidate {
    type Error = Error;

    fn try_from(spec: CandidateSpec) -> Result<Self> {
        if spec.name.trim().is_empty() || spec.position.trim().is_empty() {
            return Err(Error::Validation(
                "Candidate name and position must not be empty".to_string(),
            ));
        }
        Ok(Self {
            name: spec.name,
            position: spec.position,
            contact: spec.contact,
            rigged: false,
        })
    }
}

/// A candidate as shown on the ballot.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CandidateDescription {
    pub id: ApiId,
    pub name: String,
    pub position: String,
    pub contact: String,
}

impl From<Candidate> for CandidateDescription {
    fn from(candidate: Candidate) -> Self {
        Self {
            id: candidate.id.into(),
            name: candidate.candidate.name,
            position: candidate.candidate.position,
            contact: candidate.candidate.contact,
        }
    }
}

/// Set or clear the flag on a candidate.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagRequest {
    pub candidate_id: Option<String>,
    pub is_rigged: Option<bool>,
}

impl FlagRequest {
    /// The candidate and new flag value, if both were given.
    pub fn parse(&self) -> Result<(Id, bool)> {
        let (candidate_id, flagged) = match (&self.candidate_id, self.is_rigged) {
            (Some(id), Some(flagged)) => (id, flagged),
            _ => {
                return Err(Error::Validation(
                    "Both candidateId and isRigged are required".to_string(),
                ))
            }
        };
        let id = candidate_id
            .parse()
            .map_err(|_| Error::Validation(format!("Malformed candidate ID '{candidate_id}'")))?;
        Ok((id, flagged))
    }
}

/// A candidate carrying the flag.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlaggedCandidate {
    pub id: ApiId,
    pub name: String,
    pub position: String,
    pub is_rigged: bool,
}

impl From<Candidate> for FlaggedCandidate {
    fn from(candidate: Candidate) -> Self {
        Self {
            id: candidate.id.into(),
            is_rigged: candidate.rigged,
            name: candidate.candidate.name,
            position: candidate.candidate.position,
        }
    }
}
