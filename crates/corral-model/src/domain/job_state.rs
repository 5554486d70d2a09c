use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ModelError;

/// Coordinator-side lifecycle of a job.
///
/// Transitions only move forward; once a terminal state is reached the job never changes again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    /// Id allocated, nothing submitted yet.
    New,
    /// Submission accepted, supervisor not registered yet.
    Submitted,
    /// Supervisor registered and negotiating.
    Running,
    FinishedSuccess,
    FinishedFailure,
    /// Killed on request.
    Killed,
}

impl JobState {
    /// Returns `true` if the job is in a terminal state (won't transition further).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::FinishedSuccess | JobState::FinishedFailure | JobState::Killed
        )
    }

    fn rank(&self) -> u8 {
        match self {
            JobState::New => 0,
            JobState::Submitted => 1,
            JobState::Running => 2,
            JobState::FinishedSuccess | JobState::FinishedFailure | JobState::Killed => 3,
        }
    }

    /// Whether moving from `self` to `next` respects monotonicity.
    pub fn can_advance_to(&self, next: JobState) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }

    /// Move to `next`, rejecting backwards moves and anything after a terminal state.
    pub fn advance(&mut self, next: JobState) -> Result<(), ModelError> {
        if !self.can_advance_to(next) {
            return Err(ModelError::IllegalTransition {
                from: *self,
                to: next,
            });
        }
        *self = next;
        Ok(())
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::New => "NEW",
            JobState::Submitted => "SUBMITTED",
            JobState::Running => "RUNNING",
            JobState::FinishedSuccess => "FINISHED_SUCCESS",
            JobState::FinishedFailure => "FINISHED_FAILURE",
            JobState::Killed => "KILLED",
        };
        f.write_str(s)
    }
}
