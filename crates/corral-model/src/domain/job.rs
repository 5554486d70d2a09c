use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{ClusterLimits, JobState, LaunchContext, Priority, ResourceCapability};

/// Coordinator-assigned job identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Answer to a new-job request: the id to scope staging under, plus cluster limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewJob {
    pub job_id: JobId,
    pub limits: ClusterLimits,
}

/// Everything the coordinator needs to start a job's supervisor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSubmission {
    pub job_id: JobId,
    pub job_name: String,
    pub priority: Priority,
    pub supervisor_capability: ResourceCapability,
    pub launch_context: LaunchContext,
}

/// Final status a supervisor reports when unregistering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinalStatus {
    Succeeded,
    Failed,
}

/// Status snapshot returned to a monitoring client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobReport {
    pub job_id: JobId,
    pub state: JobState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_status: Option<FinalStatus>,
    #[serde(default)]
    pub diagnostics: String,
}

/// What the client observed at the end of monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Succeeded,
    Failed,
    Killed,
    TimedOut,
}

impl Outcome {
    /// Outcome corresponding to a terminal job state, `None` while the job is active.
    pub fn from_state(state: JobState) -> Option<Outcome> {
        match state {
            JobState::FinishedSuccess => Some(Outcome::Succeeded),
            JobState::FinishedFailure => Some(Outcome::Failed),
            JobState::Killed => Some(Outcome::Killed),
            JobState::New | JobState::Submitted | JobState::Running => None,
        }
    }

    /// Process exit code: `0` iff the job succeeded.
    pub fn exit_code(&self) -> i32 {
        match self {
            Outcome::Succeeded => 0,
            _ => 1,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Outcome::Succeeded => "SUCCEEDED",
            Outcome::Failed => "FAILED",
            Outcome::Killed => "KILLED",
            Outcome::TimedOut => "TIMED_OUT",
        };
        f.write_str(s)
    }
}
