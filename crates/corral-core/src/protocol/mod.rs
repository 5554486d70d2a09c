//! Contracts of the external collaborators.
//!
//! Implementations live outside this crate: an in-process local cluster and
//! an HTTP client. Calls are single round-trips; retry cadence belongs to the caller.
use async_trait::async_trait;
use corral_model::{
    AllocateCall, AllocationUpdate, ClusterLimits, ContainerHandle, FinalStatus, JobId, JobReport,
    JobSubmission, LaunchContext, NewJob,
};

use crate::error::{CoordinatorError, LaunchError};

/// Client-facing side of the coordinator.
#[async_trait]
pub trait CoordinatorApi: Send + Sync + 'static {
    /// Cluster-wide limits and size.
    async fn cluster_info(&self) -> Result<ClusterLimits, CoordinatorError>;

    /// Reserve a job id (state `NEW`) to scope staging under.
    async fn new_job(&self) -> Result<NewJob, CoordinatorError>;

    /// Hand over a job; the coordinator starts its supervisor.
    async fn submit(&self, submission: JobSubmission) -> Result<JobId, CoordinatorError>;

    async fn status(&self, job: &JobId) -> Result<JobReport, CoordinatorError>;

    /// Ask the coordinator to terminate a job and all of its containers.
    async fn kill(&self, job: &JobId) -> Result<(), CoordinatorError>;
}

/// Supervisor-facing side of the coordinator.
#[async_trait]
pub trait SchedulerApi: Send + Sync + 'static {
    async fn register(&self, job: &JobId) -> Result<ClusterLimits, CoordinatorError>;

    /// Send the outstanding ask table and releases, receive new allocations and completions.
    async fn allocate(
        &self,
        job: &JobId,
        call: AllocateCall,
    ) -> Result<AllocationUpdate, CoordinatorError>;

    async fn unregister(
        &self,
        job: &JobId,
        status: FinalStatus,
        message: &str,
    ) -> Result<(), CoordinatorError>;
}

/// Per-node worker launcher.
#[async_trait]
pub trait LauncherApi: Send + Sync + 'static {
    /// Start a process described by `context` in `container` on its assigned node.
    ///
    /// Returns once the process has been started; its exit is reported
    /// through the scheduler's completion stream.
    async fn launch(
        &self,
        container: &ContainerHandle,
        context: LaunchContext,
    ) -> Result<(), LaunchError>;
}
