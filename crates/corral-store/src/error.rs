use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("remote object not found: {0}")]
    NotFound(String),
    #[error("invalid remote path: {0}")]
    InvalidPath(String),
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            StoreError::NotFound(path.display().to_string())
        } else {
            StoreError::Io { path, source }
        }
    }
}

/// Staging a local file failed; no descriptor was produced.
#[derive(Debug, Error)]
pub enum StagingError {
    #[error("empty local path for artifact '{logical_name}'")]
    EmptyPath { logical_name: String },
    #[error("local file {path} is unreadable: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("local path {0} is not a regular file")]
    NotAFile(PathBuf),
    #[error("invalid logical name '{0}'")]
    InvalidName(String),
    #[error("copy of {path} failed: {source}")]
    Copy {
        path: PathBuf,
        #[source]
        source: StoreError,
    },
    #[error("{path} changed while being staged ({expected} bytes before, {actual} after)")]
    SourceChanged {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },
    #[error("stat of staged artifact '{logical_name}' failed: {source}")]
    Stat {
        logical_name: String,
        #[source]
        source: StoreError,
    },
}

/// Artifact was never staged in the given scope.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("artifact '{logical_name}' not staged in scope '{scope}'")]
pub struct NotFoundError {
    pub logical_name: String,
    pub scope: String,
}

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error(transparent)]
    Staging(#[from] StagingError),
    #[error(transparent)]
    NotFound(#[from] NotFoundError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
