mod kv;
pub use kv::KeyValue;

mod env;
pub use env::Env;

mod capability;
pub use capability::ResourceCapability;

mod artifact;
pub use artifact::{ArtifactDescriptor, ArtifactManifest, Visibility};

mod launch;
pub use launch::LaunchContext;

mod job;
pub use job::{FinalStatus, JobId, JobReport, JobSubmission, NewJob, Outcome};

mod job_state;
pub use job_state::JobState;

mod container;
pub use container::{
    AllocateCall, AllocationRequest, AllocationUpdate, ClusterLimits, CompletedContainer,
    ContainerHandle, ContainerId, ExitStatus, NodeRef,
};

/// Priority of a request; lower values are served first by the coordinator.
pub type Priority = i32;

/// Milliseconds since the unix epoch.
pub type EpochMillis = i64;
