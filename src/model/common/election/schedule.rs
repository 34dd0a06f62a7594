use std::fmt::Display;

use chrono::{DateTime, Duration, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::mongodb::optional_datetime;

use super::ElectionStatus;

/// A lifecycle step, requested by an admin or by the background checker.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    Start,
    Pause,
    Resume,
    Complete,
}

impl Transition {
    /// The status an election is in after this transition.
    pub fn target(self) -> ElectionStatus {
        match self {
            Self::Start | Self::Resume => ElectionStatus::Ongoing,
            Self::Pause => ElectionStatus::Paused,
            Self::Complete => ElectionStatus::Completed,
        }
    }
}

impl Display for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Start => "start",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Complete => "complete",
        };
        write!(f, "{name}")
    }
}

/// How a completed election is brought back to life.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetMode {
    /// Create a brand new election with no votes, and make it active.
    /// The completed election and its votes stay as history.
    NewElection,
    /// Reopen the same election record. Existing votes and voter marks are kept.
    Reuse,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("cannot {transition} an election that is {from}")]
    Invalid {
        from: ElectionStatus,
        transition: Transition,
    },
    #[error("only a completed election can be reset, this one is {0}")]
    ResetNotCompleted(ElectionStatus),
    #[error("end time {end} must be after start time {start}")]
    InvalidWindow {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    #[error("election {0} was changed by another request, try again")]
    Conflict(String),
}

/// The timing and status of an election, and the rules for moving between states.
///
/// All methods are pure: they take the current time as an argument and return
/// the new schedule, leaving persistence to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionSchedule {
    pub status: ElectionStatus,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub start_time: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub end_time: DateTime<Utc>,
    /// When the current pause began; only set while paused.
    #[serde(default, with = "optional_datetime")]
    pub paused_at: Option<DateTime<Utc>>,
    /// Total time spent in completed pauses, in milliseconds.
    #[serde(default)]
    pub paused_duration_ms: i64,
    #[serde(default, with = "optional_datetime")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl ElectionSchedule {
    /// Schedule a new election. It starts immediately if `start_time` is not in the future.
    pub fn new(
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Self, TransitionError> {
        if end_time <= start_time {
            return Err(TransitionError::InvalidWindow {
                start: start_time,
                end: end_time,
            });
        }
        let status = if start_time <= now {
            ElectionStatus::Ongoing
        } else {
            ElectionStatus::NotStarted
        };
        Ok(Self {
            status,
            start_time,
            end_time,
            paused_at: None,
            paused_duration_ms: 0,
            completed_at: None,
        })
    }

    /// Apply a transition at time `now`.
    ///
    /// Returns `Ok(None)` if the election is already in the transition's target
    /// state, so repeating a transition is harmless.
    pub fn apply(
        &self,
        transition: Transition,
        now: DateTime<Utc>,
    ) -> Result<Option<Self>, TransitionError> {
        if self.status == transition.target() {
            return Ok(None);
        }
        let invalid = TransitionError::Invalid {
            from: self.status,
            transition,
        };
        let mut next = self.clone();
        match (transition, self.status) {
            (Transition::Start, ElectionStatus::NotStarted) => {
                // Starting early moves the start time forward to now.
                next.start_time = self.start_time.min(now);
            }
            (Transition::Pause, ElectionStatus::Ongoing) => {
                next.paused_at = Some(now);
            }
            (Transition::Resume, ElectionStatus::Paused) => {
                next.close_pause(now);
            }
            (Transition::Complete, ElectionStatus::Ongoing | ElectionStatus::Paused) => {
                next.close_pause(now);
                next.completed_at = Some(now);
            }
            _ => return Err(invalid),
        }
        next.status = transition.target();
        Ok(Some(next))
    }

    /// Reopen a completed election with a new voting window.
    pub fn reset(
        &self,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Self, TransitionError> {
        if self.status != ElectionStatus::Completed {
            return Err(TransitionError::ResetNotCompleted(self.status));
        }
        Self::new(start_time, end_time, now)
    }

    /// Fold an open pause into the accumulated pause duration.
    fn close_pause(&mut self, now: DateTime<Utc>) {
        if let Some(paused_at) = self.paused_at.take() {
            let pause = (now - paused_at).max(Duration::zero());
            self.paused_duration_ms += pause.num_milliseconds();
        }
    }

    /// Time spent in completed pauses.
    pub fn paused_duration(&self) -> Duration {
        Duration::milliseconds(self.paused_duration_ms)
    }

    /// The end time pushed back by the time spent paused.
    pub fn effective_end_time(&self) -> DateTime<Utc> {
        self.end_time + self.paused_duration()
    }

    /// How much voting time is left.
    pub fn remaining_time(&self, now: DateTime<Utc>) -> Duration {
        let remaining = match self.status {
            ElectionStatus::NotStarted => self.end_time - self.start_time,
            ElectionStatus::Ongoing => self.effective_end_time() - now,
            // The clock is stopped during a pause.
            ElectionStatus::Paused => {
                self.effective_end_time() - self.paused_at.unwrap_or(now)
            }
            ElectionStatus::Completed => Duration::zero(),
        };
        remaining.max(Duration::zero())
    }

    /// The transition the background checker should make at time `now`, if any.
    pub fn due_transition(&self, now: DateTime<Utc>) -> Option<Transition> {
        match self.status {
            ElectionStatus::NotStarted if now >= self.start_time => Some(Transition::Start),
            ElectionStatus::Ongoing if now >= self.effective_end_time() => {
                Some(Transition::Complete)
            }
            _ => None,
        }
    }

    /// Can ballots be cast at time `now`?
    pub fn accepts_votes(&self, now: DateTime<Utc>) -> bool {
        self.status == ElectionStatus::Ongoing
            && now >= self.start_time
            && now < self.effective_end_time()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, hour, minute, 0).unwrap()
    }

    fn scheduled() -> ElectionSchedule {
        ElectionSchedule::new(at(9, 0), at(17, 0), at(8, 0)).unwrap()
    }

    #[test]
    fn new_election_status_depends_on_start_time() {
        assert_eq!(scheduled().status, ElectionStatus::NotStarted);
        let started = ElectionSchedule::new(at(9, 0), at(17, 0), at(9, 0)).unwrap();
        assert_eq!(started.status, ElectionStatus::Ongoing);

        let backwards = ElectionSchedule::new(at(17, 0), at(9, 0), at(8, 0));
        assert!(matches!(
            backwards,
            Err(TransitionError::InvalidWindow { .. })
        ));
        let empty = ElectionSchedule::new(at(9, 0), at(9, 0), at(8, 0));
        assert!(empty.is_err());
    }

    #[test]
    fn checker_starts_election_once_start_time_passes() {
        let schedule = scheduled();
        assert_eq!(schedule.due_transition(at(8, 59)), None);
        assert_eq!(schedule.due_transition(at(9, 0)), Some(Transition::Start));

        let started = schedule.apply(Transition::Start, at(9, 0)).unwrap().unwrap();
        assert_eq!(started.status, ElectionStatus::Ongoing);
        assert_eq!(started.start_time, at(9, 0));
        assert_eq!(started.due_transition(at(12, 0)), None);
    }

    #[test]
    fn early_start_moves_start_time() {
        let started = scheduled().apply(Transition::Start, at(8, 30)).unwrap().unwrap();
        assert_eq!(started.start_time, at(8, 30));
        assert!(started.accepts_votes(at(8, 31)));
    }

    #[test]
    fn pause_and_resume_extend_the_election() {
        let ongoing = scheduled().apply(Transition::Start, at(9, 0)).unwrap().unwrap();
        let paused = ongoing.apply(Transition::Pause, at(10, 0)).unwrap().unwrap();
        assert_eq!(paused.status, ElectionStatus::Paused);
        assert_eq!(paused.paused_at, Some(at(10, 0)));
        assert!(!paused.accepts_votes(at(10, 30)));
        // Paused elections are never auto-completed.
        assert_eq!(paused.due_transition(at(18, 0)), None);

        let resumed = paused.apply(Transition::Resume, at(10, 45)).unwrap().unwrap();
        assert_eq!(resumed.status, ElectionStatus::Ongoing);
        assert_eq!(resumed.paused_at, None);
        assert_eq!(resumed.paused_duration(), Duration::minutes(45));
        assert_eq!(resumed.effective_end_time(), at(17, 45));

        // A second pause accumulates.
        let paused = resumed.apply(Transition::Pause, at(12, 0)).unwrap().unwrap();
        let resumed = paused.apply(Transition::Resume, at(12, 15)).unwrap().unwrap();
        assert_eq!(resumed.paused_duration(), Duration::hours(1));

        assert!(resumed.accepts_votes(at(17, 30)));
        assert_eq!(resumed.due_transition(at(17, 59)), None);
        assert_eq!(resumed.due_transition(at(18, 0)), Some(Transition::Complete));
    }

    #[test]
    fn remaining_time() {
        let schedule = scheduled();
        assert_eq!(schedule.remaining_time(at(8, 0)), Duration::hours(8));

        let ongoing = schedule.apply(Transition::Start, at(9, 0)).unwrap().unwrap();
        assert_eq!(ongoing.remaining_time(at(16, 0)), Duration::hours(1));
        assert_eq!(ongoing.remaining_time(at(18, 0)), Duration::zero());

        // The remaining time is frozen while paused.
        let paused = ongoing.apply(Transition::Pause, at(16, 0)).unwrap().unwrap();
        assert_eq!(paused.remaining_time(at(16, 30)), Duration::hours(1));
        assert_eq!(paused.remaining_time(at(20, 0)), Duration::hours(1));

        let resumed = paused.apply(Transition::Resume, at(16, 30)).unwrap().unwrap();
        assert_eq!(resumed.remaining_time(at(16, 30)), Duration::hours(1));

        let completed = resumed.apply(Transition::Complete, at(17, 0)).unwrap().unwrap();
        assert_eq!(completed.remaining_time(at(17, 0)), Duration::zero());
    }

    #[test]
    fn completing_while_paused_closes_the_pause() {
        let ongoing = scheduled().apply(Transition::Start, at(9, 0)).unwrap().unwrap();
        let paused = ongoing.apply(Transition::Pause, at(10, 0)).unwrap().unwrap();
        let completed = paused.apply(Transition::Complete, at(11, 0)).unwrap().unwrap();
        assert_eq!(completed.status, ElectionStatus::Completed);
        assert_eq!(completed.paused_at, None);
        assert_eq!(completed.paused_duration(), Duration::hours(1));
        assert_eq!(completed.completed_at, Some(at(11, 0)));
    }

    #[test]
    fn repeated_transitions_are_no_ops() {
        let ongoing = scheduled().apply(Transition::Start, at(9, 0)).unwrap().unwrap();
        assert_eq!(ongoing.apply(Transition::Start, at(9, 5)), Ok(None));
        assert_eq!(ongoing.apply(Transition::Resume, at(9, 5)), Ok(None));

        let completed = ongoing.apply(Transition::Complete, at(17, 0)).unwrap().unwrap();
        assert_eq!(completed.apply(Transition::Complete, at(17, 1)), Ok(None));
        assert_eq!(completed.due_transition(at(23, 0)), None);
    }

    #[test]
    fn invalid_transitions_are_rejected() {
        let schedule = scheduled();
        for transition in [Transition::Pause, Transition::Resume, Transition::Complete] {
            assert_eq!(
                schedule.apply(transition, at(8, 30)),
                Err(TransitionError::Invalid {
                    from: ElectionStatus::NotStarted,
                    transition,
                })
            );
        }

        let ongoing = schedule.apply(Transition::Start, at(9, 0)).unwrap().unwrap();
        let completed = ongoing.apply(Transition::Complete, at(17, 0)).unwrap().unwrap();
        for transition in [Transition::Start, Transition::Pause, Transition::Resume] {
            assert!(completed.apply(transition, at(17, 1)).is_err());
        }
    }

    #[test]
    fn only_completed_elections_can_be_reset() {
        let ongoing = scheduled().apply(Transition::Start, at(9, 0)).unwrap().unwrap();
        assert_eq!(
            ongoing.reset(at(18, 0), at(20, 0), at(17, 30)),
            Err(TransitionError::ResetNotCompleted(ElectionStatus::Ongoing))
        );

        let paused = ongoing.apply(Transition::Pause, at(10, 0)).unwrap().unwrap();
        let completed = paused.apply(Transition::Complete, at(11, 0)).unwrap().unwrap();
        let reset = completed.reset(at(18, 0), at(20, 0), at(17, 30)).unwrap();
        assert_eq!(reset.status, ElectionStatus::NotStarted);
        assert_eq!(reset.paused_duration(), Duration::zero());
        assert_eq!(reset.completed_at, None);
        assert_eq!(reset.effective_end_time(), at(20, 0));
    }
}
