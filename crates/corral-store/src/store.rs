use std::path::Path;

use async_trait::async_trait;
use corral_model::EpochMillis;

use crate::{RemotePath, StoreError};

/// Size and modification time of a remote object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteStat {
    pub size_bytes: u64,
    pub last_modified: EpochMillis,
}

/// Shared storage reachable from the client, the supervisor and every node.
#[async_trait]
pub trait ArtifactStore: Send + Sync + 'static {
    /// Copy a local file to `remote`.
    ///
    /// The object must only become visible under `remote` once fully written.
    async fn copy_in(&self, local: &Path, remote: &RemotePath) -> Result<(), StoreError>;

    async fn stat(&self, remote: &RemotePath) -> Result<RemoteStat, StoreError>;

    /// Download `remote` to a local file.
    async fn copy_out(&self, remote: &RemotePath, local: &Path) -> Result<(), StoreError>;

    /// Addressable URI of `remote`.
    fn location(&self, remote: &RemotePath) -> String;

    /// Reverse of [`ArtifactStore::location`].
    fn parse_location(&self, location: &str) -> Result<RemotePath, StoreError>;
}
