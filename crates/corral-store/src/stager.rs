use std::{path::Path, sync::Arc};

use corral_model::{ArtifactDescriptor, JobId, Visibility};
use tracing::{debug, instrument};

use crate::{
    ArtifactError, ArtifactStore, NotFoundError, RemotePath, StagingError, StoreError,
    path::is_valid_segment,
};

/// Publishes local files into the job-scoped namespace of an [`ArtifactStore`].
///
/// Every scope maps to its own directory, so two jobs staging the same
/// logical name never collide.
#[derive(Clone)]
pub struct ArtifactStager {
    store: Arc<dyn ArtifactStore>,
}

impl ArtifactStager {
    pub fn new(store: Arc<dyn ArtifactStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn ArtifactStore> {
        &self.store
    }

    /// Copy `local` to `<scope>/<logical_name>` and describe the staged copy.
    ///
    /// The descriptor is built from a `stat` taken after the copy finished;
    /// a failed copy never yields a descriptor.
    #[instrument(level = "debug", skip(self, local), fields(local = %local.display()))]
    pub async fn stage(
        &self,
        local: &Path,
        logical_name: &str,
        scope: &JobId,
    ) -> Result<ArtifactDescriptor, StagingError> {
        if local.as_os_str().is_empty() {
            return Err(StagingError::EmptyPath {
                logical_name: logical_name.to_string(),
            });
        }
        if !is_valid_segment(logical_name) {
            return Err(StagingError::InvalidName(logical_name.to_string()));
        }

        let meta = tokio::fs::metadata(local)
            .await
            .map_err(|source| StagingError::Unreadable {
                path: local.to_path_buf(),
                source,
            })?;
        if !meta.is_file() {
            return Err(StagingError::NotAFile(local.to_path_buf()));
        }
        // Surface permission problems as unreadable rather than a copy failure.
        tokio::fs::File::open(local)
            .await
            .map_err(|source| StagingError::Unreadable {
                path: local.to_path_buf(),
                source,
            })?;

        let remote = RemotePath::scoped(scope, logical_name)
            .map_err(|_| StagingError::InvalidName(logical_name.to_string()))?;

        self.store
            .copy_in(local, &remote)
            .await
            .map_err(|source| StagingError::Copy {
                path: local.to_path_buf(),
                source,
            })?;

        let stat = self
            .store
            .stat(&remote)
            .await
            .map_err(|source| StagingError::Stat {
                logical_name: logical_name.to_string(),
                source,
            })?;
        if stat.size_bytes != meta.len() {
            return Err(StagingError::SourceChanged {
                path: local.to_path_buf(),
                expected: meta.len(),
                actual: stat.size_bytes,
            });
        }

        let descriptor = ArtifactDescriptor {
            logical_name: logical_name.to_string(),
            remote_location: self.store.location(&remote),
            size_bytes: stat.size_bytes,
            last_modified: stat.last_modified,
            visibility: Visibility::Private,
        };
        debug!(target: "corral.store.stager", location = %descriptor.remote_location, size = descriptor.size_bytes, "artifact staged");
        Ok(descriptor)
    }

    /// Describe an artifact previously staged under `scope`.
    pub async fn resolve(
        &self,
        logical_name: &str,
        scope: &JobId,
    ) -> Result<ArtifactDescriptor, ArtifactError> {
        let not_found = || NotFoundError {
            logical_name: logical_name.to_string(),
            scope: scope.to_string(),
        };
        let remote = RemotePath::scoped(scope, logical_name).map_err(|_| not_found())?;

        let stat = match self.store.stat(&remote).await {
            Ok(stat) => stat,
            Err(StoreError::NotFound(_)) => return Err(not_found().into()),
            Err(e) => return Err(e.into()),
        };

        Ok(ArtifactDescriptor {
            logical_name: logical_name.to_string(),
            remote_location: self.store.location(&remote),
            size_bytes: stat.size_bytes,
            last_modified: stat.last_modified,
            visibility: Visibility::Private,
        })
    }
}
