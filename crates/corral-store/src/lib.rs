//! Shared artifact storage.
//!
//! [`ArtifactStore`] is the narrow contract the launcher needs from a shared
//! filesystem (copy in, copy out, stat). [`ArtifactStager`] builds on top of it
//! to publish local files under a job-scoped namespace and hand back
//! [`ArtifactDescriptor`](corral_model::ArtifactDescriptor)s.

mod error;
pub use error::{ArtifactError, NotFoundError, StagingError, StoreError};

mod path;
pub use path::RemotePath;

mod store;
pub use store::{ArtifactStore, RemoteStat};

mod local;
pub use local::LocalFsStore;

mod stager;
pub use stager::ArtifactStager;
