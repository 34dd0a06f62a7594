use std::fmt::Display;

use mongodb::bson::{to_bson, Bson};
use serde::{Deserialize, Serialize};

/// States in the election lifecycle.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElectionStatus {
    /// Scheduled, but the start time has not been reached.
    NotStarted,
    /// Accepting votes.
    Ongoing,
    /// Temporarily closed to votes; the pause is added to the end time.
    Paused,
    /// Finished and tabulated.
    Completed,
}

impl Display for ElectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::NotStarted => "not_started",
            Self::Ongoing => "ongoing",
            Self::Paused => "paused",
            Self::Completed => "completed",
        };
        write!(f, "{name}")
    }
}

impl From<ElectionStatus> for Bson {
    fn from(status: ElectionStatus) -> Self {
        to_bson(&status).expect("Serialisation is infallible")
    }
}
