use thiserror::Error;

use crate::JobState;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("invalid capability: {0}")]
    InvalidCapability(String),
    #[error("illegal job state transition: {from} -> {to}")]
    IllegalTransition { from: JobState, to: JobState },
    #[error("duplicate artifact name: {0}")]
    DuplicateArtifact(String),
    #[error("invalid artifact manifest: {0}")]
    InvalidManifest(String),
}
