use serde::{Deserialize, Serialize};

use crate::model::{api::id::ApiId, db::vote::Vote};

/// A vote whose counted candidate differs from the voter's selection.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MismatchedVote {
    pub vote_id: ApiId,
    pub position: String,
    pub selected_candidate_id: ApiId,
    pub candidate_id: ApiId,
}

/// Summary of an integrity check over every vote in an election.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteAuditReport {
    pub election_id: ApiId,
    pub votes: u64,
    pub voters_voted: u64,
    pub mismatched: Vec<MismatchedVote>,
}

impl From<&Vote> for MismatchedVote {
    fn from(vote: &Vote) -> Self {
        Self {
            vote_id: vote.id.into(),
            position: vote.position.clone(),
            selected_candidate_id: vote.selected_candidate_id.into(),
            candidate_id: vote.candidate_id.into(),
        }
    }
}
