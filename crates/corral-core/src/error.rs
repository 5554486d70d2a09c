use std::time::Duration;

use corral_model::{ContainerId, JobId, JobState, ModelError, NodeRef};
use corral_store::StagingError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::negotiator::NegotiatorState;

/// Failure reported by (or while talking to) the coordinator.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "camelCase")]
pub enum CoordinatorError {
    #[error("coordinator unavailable: {0}")]
    Unavailable(String),
    #[error("coordinator call timed out after {0:?}")]
    Timeout(Duration),
    #[error("unknown job: {0}")]
    UnknownJob(JobId),
    #[error("unknown container: {0}")]
    UnknownContainer(ContainerId),
    #[error("supervisor already registered for job {0}")]
    AlreadyRegistered(JobId),
    #[error("supervisor not registered for job {0}")]
    NotRegistered(JobId),
    #[error("supervisor already unregistered for job {0}")]
    Unregistered(JobId),
    #[error("invalid capability: {0}")]
    InvalidCapability(String),
    #[error("job {job} is already {state}")]
    JobTerminated { job: JobId, state: JobState },
    #[error("request rejected: {0}")]
    Rejected(String),
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl CoordinatorError {
    /// Transient failures are worth retrying on the caller's cadence.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CoordinatorError::Unavailable(_) | CoordinatorError::Timeout(_)
        )
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("supervisor for job {0} is already registered")]
    AlreadyRegistered(JobId),
    #[error("registration failed: {0}")]
    Coordinator(#[from] CoordinatorError),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NegotiationError {
    #[error("transient negotiation failure: {0}")]
    Transient(#[source] CoordinatorError),
    #[error("negotiation rejected: {0}")]
    Fatal(#[source] CoordinatorError),
    #[error("negotiator is {0:?}")]
    InvalidState(NegotiatorState),
}

impl NegotiationError {
    pub fn is_transient(&self) -> bool {
        matches!(self, NegotiationError::Transient(_))
    }
}

impl From<CoordinatorError> for NegotiationError {
    fn from(e: CoordinatorError) -> Self {
        if e.is_transient() {
            NegotiationError::Transient(e)
        } else {
            NegotiationError::Fatal(e)
        }
    }
}

/// Starting one container failed. Never fatal to the supervisor.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum LaunchError {
    #[error("node {node} unreachable: {reason}")]
    NodeUnreachable { node: NodeRef, reason: String },
    #[error("malformed launch context: {reason}")]
    MalformedContext { reason: String },
    #[error(
        "artifact '{name}' does not match its descriptor (size {expected_size} vs {actual_size}, mtime {expected_modified} vs {actual_modified})"
    )]
    ArtifactMismatch {
        name: String,
        expected_size: u64,
        actual_size: u64,
        expected_modified: i64,
        actual_modified: i64,
    },
    #[error("localization of '{name}' failed: {reason}")]
    Localization { name: String, reason: String },
    #[error("spawn failed: {reason}")]
    Spawn { reason: String },
    #[error("container {container} is not launchable: {reason}")]
    NotLaunchable {
        container: ContainerId,
        reason: String,
    },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("artifact '{0}' declared twice")]
    DuplicateArtifact(String),
    #[error("command template has no program")]
    EmptyCommand,
    #[error("unterminated quote in '{0}'")]
    UnterminatedQuote(String),
    #[error("environment variable {0} is reserved")]
    ReservedEnv(String),
    #[error("invalid manifest: {0}")]
    Manifest(String),
}

impl From<ModelError> for BuildError {
    fn from(e: ModelError) -> Self {
        match e {
            ModelError::DuplicateArtifact(name) => BuildError::DuplicateArtifact(name),
            other => BuildError::Manifest(other.to_string()),
        }
    }
}

/// Submitting a job failed; nothing was handed to the coordinator.
#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("staging failed: {0}")]
    Staging(#[from] StagingError),
    #[error("invalid launch context: {0}")]
    Build(#[from] BuildError),
    #[error("coordinator: {0}")]
    Coordinator(#[from] CoordinatorError),
    #[error("invalid job spec: {0}")]
    InvalidSpec(String),
    #[error("staging task aborted: {0}")]
    StagingTask(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MonitorError {
    #[error("status of job {job} unavailable: {source}")]
    Status {
        job: JobId,
        #[source]
        source: CoordinatorError,
    },
}

/// Failure of a submit-then-monitor run.
#[derive(Debug, Error)]
pub enum ClientRunError {
    #[error(transparent)]
    Submission(#[from] SubmissionError),
    #[error(transparent)]
    Monitor(#[from] MonitorError),
}

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error(transparent)]
    Registration(#[from] RegistrationError),
    #[error(transparent)]
    Negotiation(#[from] NegotiationError),
    #[error("worker capability {requested} exceeds cluster maximum {max}")]
    CapabilityTooLarge { requested: String, max: String },
    #[error("invalid supervisor environment: {0}")]
    Environment(String),
    #[error(transparent)]
    Build(#[from] BuildError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_unavailable_and_timeout_are_transient() {
        assert!(CoordinatorError::Unavailable("down".into()).is_transient());
        assert!(CoordinatorError::Timeout(Duration::from_millis(5)).is_transient());
        assert!(!CoordinatorError::UnknownJob(JobId::from("j")).is_transient());
        assert!(!CoordinatorError::InvalidCapability("x".into()).is_transient());
    }

    #[test]
    fn negotiation_error_classifies_coordinator_errors() {
        let t: NegotiationError = CoordinatorError::Unavailable("x".into()).into();
        assert!(t.is_transient());
        let f: NegotiationError = CoordinatorError::InvalidCapability("x".into()).into();
        assert!(!f.is_transient());
    }

    #[test]
    fn coordinator_error_wire_format_is_tagged() {
        let e = CoordinatorError::UnknownJob(JobId::from("job_1"));
        let json = serde_json::to_string(&e).unwrap();
        assert_eq!(json, r#"{"kind":"unknownJob","detail":"job_1"}"#);
        let back: CoordinatorError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, e);
    }
}
