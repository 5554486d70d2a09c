use std::{
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use corral_model::EpochMillis;
use tracing::trace;

use crate::{ArtifactStore, RemotePath, RemoteStat, StoreError};

const SCHEME: &str = "file://";

/// [`ArtifactStore`] backed by a directory every party can reach
/// (a local path in tests, a network mount in a real deployment).
///
/// Copies go to a hidden temporary name first and are renamed into place,
/// so a reader never observes a partially written object. The source
/// modification time is carried over to the copy.
#[derive(Debug, Clone)]
pub struct LocalFsStore {
    root: PathBuf,
}

impl LocalFsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, remote: &RemotePath) -> PathBuf {
        let mut p = self.root.clone();
        for seg in remote.segments() {
            p.push(seg);
        }
        p
    }

    fn root_prefix(&self) -> String {
        let root = self.root.display().to_string();
        format!("{SCHEME}{}/", encode(root.trim_end_matches('/')))
    }
}

#[async_trait]
impl ArtifactStore for LocalFsStore {
    async fn copy_in(&self, local: &Path, remote: &RemotePath) -> Result<(), StoreError> {
        let dst = self.object_path(remote);
        let parent = dst
            .parent()
            .ok_or_else(|| StoreError::InvalidPath(remote.to_string()))?
            .to_path_buf();
        tokio::fs::create_dir_all(&parent)
            .await
            .map_err(|e| StoreError::io(&parent, e))?;

        let tmp = parent.join(format!(
            ".{}.{}.part",
            remote.file_name(),
            uuid::Uuid::new_v4().simple()
        ));
        trace!(target: "corral.store.local", src = %local.display(), dst = %dst.display(), "copy in");

        let result = copy_preserving_mtime(local, &tmp).await;
        let result = match result {
            Ok(()) => tokio::fs::rename(&tmp, &dst)
                .await
                .map_err(|e| StoreError::io(&dst, e)),
            Err(e) => Err(e),
        };
        if result.is_err() {
            let _ = tokio::fs::remove_file(&tmp).await;
        }
        result
    }

    async fn stat(&self, remote: &RemotePath) -> Result<RemoteStat, StoreError> {
        let path = self.object_path(remote);
        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|e| StoreError::io(&path, e))?;
        if !meta.is_file() {
            return Err(StoreError::NotFound(path.display().to_string()));
        }
        let modified = meta.modified().map_err(|e| StoreError::io(&path, e))?;
        Ok(RemoteStat {
            size_bytes: meta.len(),
            last_modified: epoch_millis(modified),
        })
    }

    async fn copy_out(&self, remote: &RemotePath, local: &Path) -> Result<(), StoreError> {
        let src = self.object_path(remote);
        if let Some(parent) = local.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::io(parent, e))?;
        }
        trace!(target: "corral.store.local", src = %src.display(), dst = %local.display(), "copy out");
        tokio::fs::copy(&src, local)
            .await
            .map_err(|e| StoreError::io(&src, e))?;
        Ok(())
    }

    fn location(&self, remote: &RemotePath) -> String {
        format!("{}{}", self.root_prefix(), encode(&remote.to_string()))
    }

    fn parse_location(&self, location: &str) -> Result<RemotePath, StoreError> {
        let rel = location
            .strip_prefix(&self.root_prefix())
            .ok_or_else(|| StoreError::InvalidPath(location.to_string()))?;
        RemotePath::parse(&decode(rel))
    }
}

async fn copy_preserving_mtime(src: &Path, dst: &Path) -> Result<(), StoreError> {
    let modified = tokio::fs::metadata(src)
        .await
        .and_then(|m| m.modified())
        .map_err(|e| StoreError::io(src, e))?;
    tokio::fs::copy(src, dst)
        .await
        .map_err(|e| StoreError::io(src, e))?;

    let dst_owned = dst.to_path_buf();
    tokio::task::spawn_blocking(move || {
        std::fs::OpenOptions::new()
            .write(true)
            .open(&dst_owned)
            .and_then(|f| f.set_modified(modified))
    })
    .await
    .map_err(|e| StoreError::io(dst, std::io::Error::other(e)))?
    .map_err(|e| StoreError::io(dst, e))
}

pub(crate) fn epoch_millis(t: SystemTime) -> EpochMillis {
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_millis() as EpochMillis,
        Err(e) => -(e.duration().as_millis() as EpochMillis),
    }
}

fn encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '%' => out.push_str("%25"),
            ' ' => out.push_str("%20"),
            '#' => out.push_str("%23"),
            '?' => out.push_str("%3F"),
            c => out.push(c),
        }
    }
    out
}

fn decode(s: &str) -> String {
    s.replace("%20", " ")
        .replace("%23", "#")
        .replace("%3F", "?")
        .replace("%25", "%")
}
