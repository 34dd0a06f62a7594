mod schedule;
mod status;

pub use schedule::{ElectionSchedule, ResetMode, Transition, TransitionError};
pub use status::ElectionStatus;
