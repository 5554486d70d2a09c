use std::{
    collections::BTreeMap,
    path::{Component, Path},
};

use corral_core::LaunchError;
use corral_model::ArtifactDescriptor;
use corral_store::ArtifactStore;
use tracing::{debug, instrument};

/// Fetch every artifact into `work_dir` under its logical name.
///
/// Each remote object is checked against its descriptor before anything is
/// copied; a size or timestamp mismatch fails the launch.
#[instrument(level = "debug", skip_all, fields(work_dir = %work_dir.display(), count = artifacts.len()))]
pub async fn localize(
    store: &dyn ArtifactStore,
    artifacts: &BTreeMap<String, ArtifactDescriptor>,
    work_dir: &Path,
) -> Result<(), LaunchError> {
    for (name, descriptor) in artifacts {
        if !is_plain_name(name) || name != &descriptor.logical_name {
            return Err(LaunchError::MalformedContext {
                reason: format!("artifact key '{name}' is not a plain logical name"),
            });
        }
        let remote = store
            .parse_location(&descriptor.remote_location)
            .map_err(|e| LaunchError::MalformedContext {
                reason: format!("artifact '{name}': {e}"),
            })?;
        let stat = store
            .stat(&remote)
            .await
            .map_err(|e| LaunchError::Localization {
                name: name.clone(),
                reason: e.to_string(),
            })?;
        if stat.size_bytes != descriptor.size_bytes || stat.last_modified != descriptor.last_modified
        {
            return Err(LaunchError::ArtifactMismatch {
                name: name.clone(),
                expected_size: descriptor.size_bytes,
                actual_size: stat.size_bytes,
                expected_modified: descriptor.last_modified,
                actual_modified: stat.last_modified,
            });
        }
    }

    for (name, descriptor) in artifacts {
        let remote = store
            .parse_location(&descriptor.remote_location)
            .map_err(|e| LaunchError::MalformedContext {
                reason: format!("artifact '{name}': {e}"),
            })?;
        store
            .copy_out(&remote, &work_dir.join(name))
            .await
            .map_err(|e| LaunchError::Localization {
                name: name.clone(),
                reason: e.to_string(),
            })?;
        debug!(target: "corral.exec.localize", %name, size = descriptor.size_bytes, "localized");
    }
    Ok(())
}

fn is_plain_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(components.next(), Some(Component::Normal(_))) && components.next().is_none()
}

#[cfg(test)]
mod tests {
    use super::*;
    use corral_model::{JobId, Visibility};
    use corral_store::{ArtifactStager, LocalFsStore};
    use std::sync::Arc;

    async fn staged(dir: &Path) -> (Arc<LocalFsStore>, ArtifactDescriptor) {
        let src = dir.join("data.bin");
        std::fs::write(&src, b"0123456789").unwrap();
        let store = Arc::new(LocalFsStore::new(dir.join("store")));
        let stager = ArtifactStager::new(store.clone());
        let d = stager
            .stage(&src, "data.bin", &JobId::from("job_1"))
            .await
            .unwrap();
        (store, d)
    }

    #[tokio::test]
    async fn copies_matching_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let (store, d) = staged(dir.path()).await;
        let work = dir.path().join("work");

        let artifacts = BTreeMap::from([(d.logical_name.clone(), d)]);
        localize(store.as_ref(), &artifacts, &work).await.unwrap();

        assert_eq!(std::fs::read(work.join("data.bin")).unwrap(), b"0123456789");
    }

    #[tokio::test]
    async fn size_mismatch_fails_before_copy() {
        let dir = tempfile::tempdir().unwrap();
        let (store, mut d) = staged(dir.path()).await;
        d.size_bytes += 1;
        let work = dir.path().join("work");

        let artifacts = BTreeMap::from([(d.logical_name.clone(), d)]);
        let err = localize(store.as_ref(), &artifacts, &work).await.unwrap_err();

        assert!(matches!(err, LaunchError::ArtifactMismatch { actual_size: 10, .. }));
        assert!(!work.join("data.bin").exists());
    }

    #[tokio::test]
    async fn stale_timestamp_fails() {
        let dir = tempfile::tempdir().unwrap();
        let (store, mut d) = staged(dir.path()).await;
        d.last_modified -= 1000;

        let artifacts = BTreeMap::from([(d.logical_name.clone(), d)]);
        let err = localize(store.as_ref(), &artifacts, &dir.path().join("work"))
            .await
            .unwrap_err();
        assert!(matches!(err, LaunchError::ArtifactMismatch { .. }));
    }

    #[tokio::test]
    async fn foreign_location_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _) = staged(dir.path()).await;
        let d = ArtifactDescriptor {
            logical_name: "x".into(),
            remote_location: "hdfs://elsewhere/x".into(),
            size_bytes: 1,
            last_modified: 1,
            visibility: Visibility::Public,
        };

        let artifacts = BTreeMap::from([("x".to_string(), d)]);
        let err = localize(store.as_ref(), &artifacts, &dir.path().join("work"))
            .await
            .unwrap_err();
        assert!(matches!(err, LaunchError::MalformedContext { .. }));
    }

    #[test]
    fn names_must_not_escape_the_work_dir() {
        assert!(is_plain_name("script.py"));
        assert!(!is_plain_name("../script.py"));
        assert!(!is_plain_name("a/b"));
        assert!(!is_plain_name("/etc/passwd"));
        assert!(!is_plain_name(""));
    }
}
