use std::path::PathBuf;

use corral_core::LaunchError;
use thiserror::Error;

/// Failure preparing a container's directories.
#[derive(Error, Debug)]
pub enum ExecError {
    #[error("cannot prepare {path}: {source}")]
    Prepare {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("empty command")]
    EmptyCommand,
}

impl From<ExecError> for LaunchError {
    fn from(e: ExecError) -> Self {
        match e {
            ExecError::EmptyCommand => LaunchError::MalformedContext {
                reason: e.to_string(),
            },
            ExecError::Prepare { .. } => LaunchError::Spawn {
                reason: e.to_string(),
            },
        }
    }
}
