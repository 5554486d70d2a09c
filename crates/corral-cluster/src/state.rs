//! Bookkeeping of the local cluster. Pure state transitions, no I/O.
use std::collections::HashMap;

use corral_core::{CoordinatorError, LaunchError};
use corral_model::{
    AllocateCall, AllocationRequest, AllocationUpdate, ClusterLimits, CompletedContainer,
    ContainerHandle, ContainerId, ExitStatus, FinalStatus, JobId, JobReport, JobState,
    JobSubmission, NodeRef, ResourceCapability,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::ClusterConfig;

struct NodeSlot {
    name: NodeRef,
    total: ResourceCapability,
    used_memory_mb: u32,
    used_vcores: u32,
}

impl NodeSlot {
    fn fits(&self, cap: &ResourceCapability) -> bool {
        self.used_memory_mb + cap.memory_mb() <= self.total.memory_mb()
            && self.used_vcores + cap.vcores() <= self.total.vcores()
    }

    fn reserve(&mut self, cap: &ResourceCapability) {
        self.used_memory_mb += cap.memory_mb();
        self.used_vcores += cap.vcores();
    }

    fn free(&mut self, cap: &ResourceCapability) {
        self.used_memory_mb = self.used_memory_mb.saturating_sub(cap.memory_mb());
        self.used_vcores = self.used_vcores.saturating_sub(cap.vcores());
    }
}

struct JobRecord {
    seq: u32,
    state: JobState,
    final_status: Option<FinalStatus>,
    diagnostics: String,
    submission: Option<JobSubmission>,
    supervisor: Option<ContainerId>,
    registered: bool,
    unregistered: bool,
    next_container: u32,
    asks: Vec<AllocationRequest>,
    completed: Vec<CompletedContainer>,
    /// Id of the last update sent.
    response_id: u64,
    /// Everything sent since the supervisor last echoed `response_id`.
    unacked: AllocationUpdate,
    progress: f32,
    cancel: CancellationToken,
}

struct ContainerRecord {
    job: JobId,
    handle: ContainerHandle,
    supervisor: bool,
    launched: bool,
    cancel: CancellationToken,
}

/// Supervisor container reserved for a submitted job, ready to start.
pub(crate) struct SupervisorStart {
    pub job: JobId,
    pub handle: ContainerHandle,
    pub submission: JobSubmission,
    pub cancel: CancellationToken,
}

pub(crate) struct State {
    stamp: u64,
    job_seq: u32,
    max_capability: ResourceCapability,
    nodes: Vec<NodeSlot>,
    jobs: HashMap<JobId, JobRecord>,
    containers: HashMap<ContainerId, ContainerRecord>,
}

impl State {
    pub fn new(cfg: &ClusterConfig, stamp: u64) -> Self {
        Self {
            stamp,
            job_seq: 0,
            max_capability: cfg.max_capability,
            nodes: cfg
                .nodes
                .iter()
                .map(|n| NodeSlot {
                    name: NodeRef::new(n.name.clone()),
                    total: n.capability,
                    used_memory_mb: 0,
                    used_vcores: 0,
                })
                .collect(),
            jobs: HashMap::new(),
            containers: HashMap::new(),
        }
    }

    pub fn limits(&self) -> ClusterLimits {
        ClusterLimits {
            max_capability: self.max_capability,
            node_count: self.nodes.len() as u32,
        }
    }

    pub fn new_job(&mut self) -> JobId {
        self.job_seq += 1;
        let id = JobId::new(format!("job_{}_{:04}", self.stamp, self.job_seq));
        self.jobs.insert(
            id.clone(),
            JobRecord {
                seq: self.job_seq,
                state: JobState::New,
                final_status: None,
                diagnostics: String::new(),
                submission: None,
                supervisor: None,
                registered: false,
                unregistered: false,
                next_container: 0,
                asks: Vec::new(),
                completed: Vec::new(),
                response_id: 0,
                unacked: AllocationUpdate::default(),
                progress: 0.0,
                cancel: CancellationToken::new(),
            },
        );
        id
    }

    pub fn submit(&mut self, submission: JobSubmission) -> Result<JobId, CoordinatorError> {
        let max = self.max_capability;
        let job_id = submission.job_id.clone();
        let job = self.live_job(&job_id)?;
        if job.state != JobState::New {
            return Err(CoordinatorError::Rejected(format!(
                "job {job_id} was already submitted"
            )));
        }
        if !submission.supervisor_capability.fits_within(&max) {
            return Err(CoordinatorError::InvalidCapability(format!(
                "supervisor {} exceeds maximum {max}",
                submission.supervisor_capability
            )));
        }
        job.state = JobState::Submitted;
        job.submission = Some(submission);
        info!(target: "corral.cluster", job = %job_id, "job submitted");
        Ok(job_id)
    }

    /// Reserve supervisor containers for submitted jobs that fit somewhere now.
    pub fn place_supervisors(&mut self) -> Vec<SupervisorStart> {
        let mut pending: Vec<(u32, JobId)> = self
            .jobs
            .iter()
            .filter(|(_, j)| j.state == JobState::Submitted && j.supervisor.is_none())
            .map(|(id, j)| (j.seq, id.clone()))
            .collect();
        pending.sort();

        let mut starts = Vec::new();
        for (_, job_id) in pending {
            let Some(capability) = self
                .jobs
                .get(&job_id)
                .and_then(|j| j.submission.as_ref())
                .map(|s| s.supervisor_capability)
            else {
                continue;
            };
            let Some(handle) = self.reserve(&job_id, capability, true, true) else {
                continue;
            };
            let Some(job) = self.jobs.get_mut(&job_id) else {
                continue;
            };
            job.supervisor = Some(handle.container_id.clone());
            let cancel = self
                .containers
                .get(&handle.container_id)
                .map(|c| c.cancel.clone())
                .unwrap_or_default();
            if let Some(submission) = job.submission.clone() {
                starts.push(SupervisorStart {
                    job: job_id,
                    handle,
                    submission,
                    cancel,
                });
            }
        }
        starts
    }

    pub fn register(&mut self, job_id: &JobId) -> Result<ClusterLimits, CoordinatorError> {
        let limits = self.limits();
        let job = self.live_job(job_id)?;
        if job.registered {
            return Err(CoordinatorError::AlreadyRegistered(job_id.clone()));
        }
        if job.supervisor.is_none() {
            return Err(CoordinatorError::Rejected(format!(
                "job {job_id} has no running supervisor"
            )));
        }
        advance(job, job_id, JobState::Running)?;
        job.registered = true;
        info!(target: "corral.cluster", job = %job_id, "supervisor registered");
        Ok(limits)
    }

    pub fn allocate(
        &mut self,
        job_id: &JobId,
        call: AllocateCall,
    ) -> Result<AllocationUpdate, CoordinatorError> {
        let max = self.max_capability;
        let job = self.registered_job(job_id)?;
        if let Some(bad) = call.asks.iter().find(|a| !a.capability.fits_within(&max)) {
            return Err(CoordinatorError::InvalidCapability(format!(
                "ask {} exceeds maximum {max}",
                bad.capability
            )));
        }
        // An older id means the last update never arrived: send it again.
        let mut pending = if call.response_id == job.response_id {
            job.unacked = AllocationUpdate::default();
            AllocationUpdate::default()
        } else if call.response_id < job.response_id {
            debug!(
                target: "corral.cluster",
                job = %job_id,
                acked = call.response_id,
                sent = job.response_id,
                "redelivering unacknowledged update"
            );
            std::mem::take(&mut job.unacked)
        } else {
            return Err(CoordinatorError::Rejected(format!(
                "response id {} is ahead of {}",
                call.response_id, job.response_id
            )));
        };
        job.progress = call.progress;

        for id in &call.releases {
            self.release(job_id, id);
        }
        pending
            .allocated
            .retain(|h| !call.releases.contains(&h.container_id));

        // The sent table replaces whatever was recorded before. Grants the
        // supervisor has not seen yet still count against it.
        let mut asks = call.asks;
        asks.sort_by_key(|a| a.priority);
        for handle in &pending.allocated {
            cover(&mut asks, &handle.capability);
        }

        let mut allocated = Vec::new();
        for ask in asks.iter_mut() {
            while ask.count > 0 {
                match self.reserve(job_id, ask.capability, false, false) {
                    Some(handle) => {
                        ask.count -= 1;
                        allocated.push(handle);
                    }
                    None => break,
                }
            }
        }
        asks.retain(|a| a.count > 0);

        let job = self.registered_job(job_id)?;
        job.asks = asks;
        let completed = std::mem::take(&mut job.completed);
        if !allocated.is_empty() || !completed.is_empty() {
            debug!(
                target: "corral.cluster",
                job = %job_id,
                allocated = allocated.len(),
                completed = completed.len(),
                progress = job.progress,
                "allocate"
            );
        }
        pending.allocated.extend(allocated);
        pending.completed.extend(completed);
        job.response_id += 1;
        pending.response_id = job.response_id;
        job.unacked = pending.clone();
        Ok(pending)
    }

    /// Finish a job from its supervisor. Returns the worker tokens to cancel.
    pub fn unregister(
        &mut self,
        job_id: &JobId,
        status: FinalStatus,
        message: &str,
    ) -> Result<Vec<CancellationToken>, CoordinatorError> {
        let job = self.registered_job(job_id)?;
        let next = match status {
            FinalStatus::Succeeded => JobState::FinishedSuccess,
            FinalStatus::Failed => JobState::FinishedFailure,
        };
        advance(job, job_id, next)?;
        job.unregistered = true;
        job.final_status = Some(status);
        job.diagnostics = message.to_string();
        job.asks.clear();
        info!(target: "corral.cluster", job = %job_id, ?status, %message, "supervisor unregistered");
        Ok(self.worker_tokens(job_id))
    }

    /// Kill a job; every container of it is cancelled through the job token.
    pub fn kill(&mut self, job_id: &JobId) -> Result<(), CoordinatorError> {
        let job = self.live_job(job_id)?;
        advance(job, job_id, JobState::Killed)?;
        job.diagnostics = "killed by request".to_string();
        job.asks.clear();
        job.cancel.cancel();
        info!(target: "corral.cluster", job = %job_id, "job killed");

        let unlaunched: Vec<ContainerId> = self
            .containers
            .iter()
            .filter(|(_, c)| &c.job == job_id && !c.launched)
            .map(|(id, _)| id.clone())
            .collect();
        for id in unlaunched {
            self.forget(&id);
        }
        Ok(())
    }

    pub fn report(&self, job_id: &JobId) -> Result<JobReport, CoordinatorError> {
        let job = self
            .jobs
            .get(job_id)
            .ok_or_else(|| CoordinatorError::UnknownJob(job_id.clone()))?;
        Ok(JobReport {
            job_id: job_id.clone(),
            state: job.state,
            final_status: job.final_status,
            diagnostics: job.diagnostics.clone(),
        })
    }

    /// Claim a granted worker container for launch.
    pub fn begin_launch(
        &mut self,
        handle: &ContainerHandle,
    ) -> Result<(ContainerHandle, JobId, CancellationToken), LaunchError> {
        let id = &handle.container_id;
        let not_launchable = |reason: &str| LaunchError::NotLaunchable {
            container: id.clone(),
            reason: reason.to_string(),
        };
        let record = self
            .containers
            .get(id)
            .ok_or_else(|| not_launchable("unknown container"))?;
        if record.handle.node != handle.node {
            return Err(LaunchError::NodeUnreachable {
                node: handle.node.clone(),
                reason: format!("container {id} lives on {}", record.handle.node),
            });
        }
        if record.supervisor || record.launched {
            return Err(not_launchable("already launched"));
        }
        let active = self
            .jobs
            .get(&record.job)
            .map(|j| !j.state.is_terminal())
            .unwrap_or(false);
        if !active {
            return Err(not_launchable("job is no longer active"));
        }

        let record = self
            .containers
            .get_mut(id)
            .ok_or_else(|| not_launchable("unknown container"))?;
        record.launched = true;
        Ok((
            record.handle.clone(),
            record.job.clone(),
            record.cancel.clone(),
        ))
    }

    /// A launch that never produced a process; the slot goes back to its node.
    pub fn launch_failed(&mut self, id: &ContainerId) {
        self.forget(id);
    }

    /// A container process ended.
    ///
    /// Worker exits are queued for the job's next allocate. A supervisor that
    /// exits before unregistering fails its job.
    pub fn container_exited(&mut self, id: &ContainerId, status: ExitStatus) {
        let Some(record) = self.forget(id) else {
            return;
        };
        let Some(job) = self.jobs.get_mut(&record.job) else {
            return;
        };
        if record.supervisor {
            if !job.state.is_terminal() {
                job.diagnostics = format!("supervisor {status} without unregistering");
                if job.state.advance(JobState::FinishedFailure).is_ok() {
                    job.cancel.cancel();
                }
                info!(target: "corral.cluster", job = %record.job, %status, "supervisor lost");
            }
            return;
        }
        if job.registered && !job.unregistered {
            job.completed.push(CompletedContainer {
                handle: record.handle,
                status,
            });
        }
    }

    /// A supervisor container that could not be started fails its job.
    pub fn supervisor_failed(&mut self, job_id: &JobId, id: &ContainerId, reason: &str) {
        self.forget(id);
        if let Some(job) = self.jobs.get_mut(job_id) {
            if job.state.advance(JobState::FinishedFailure).is_ok() {
                job.diagnostics = format!("supervisor launch failed: {reason}");
                job.cancel.cancel();
            }
        }
    }

    fn release(&mut self, job_id: &JobId, id: &ContainerId) {
        let Some(record) = self.containers.get(id) else {
            return;
        };
        if &record.job != job_id || record.supervisor {
            return;
        }
        if record.launched {
            record.cancel.cancel();
        } else {
            self.forget(id);
        }
        debug!(target: "corral.cluster", job = %job_id, container = %id, "released");
    }

    fn reserve(
        &mut self,
        job_id: &JobId,
        capability: ResourceCapability,
        supervisor: bool,
        launched: bool,
    ) -> Option<ContainerHandle> {
        let node = self.nodes.iter_mut().find(|n| n.fits(&capability))?;
        let job = self.jobs.get_mut(job_id)?;
        node.reserve(&capability);
        job.next_container += 1;

        let handle = ContainerHandle {
            container_id: ContainerId::new(format!(
                "container_{}_{:04}_{:06}",
                self.stamp, job.seq, job.next_container
            )),
            node: node.name.clone(),
            capability,
        };
        self.containers.insert(
            handle.container_id.clone(),
            ContainerRecord {
                job: job_id.clone(),
                handle: handle.clone(),
                supervisor,
                launched,
                cancel: job.cancel.child_token(),
            },
        );
        Some(handle)
    }

    fn forget(&mut self, id: &ContainerId) -> Option<ContainerRecord> {
        let record = self.containers.remove(id)?;
        if let Some(node) = self.nodes.iter_mut().find(|n| n.name == record.handle.node) {
            node.free(&record.handle.capability);
        }
        Some(record)
    }

    fn worker_tokens(&self, job_id: &JobId) -> Vec<CancellationToken> {
        self.containers
            .values()
            .filter(|c| &c.job == job_id && !c.supervisor)
            .map(|c| c.cancel.clone())
            .collect()
    }

    fn live_job(&mut self, job_id: &JobId) -> Result<&mut JobRecord, CoordinatorError> {
        let job = self
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| CoordinatorError::UnknownJob(job_id.clone()))?;
        if job.state.is_terminal() {
            return Err(CoordinatorError::JobTerminated {
                job: job_id.clone(),
                state: job.state,
            });
        }
        Ok(job)
    }

    fn registered_job(&mut self, job_id: &JobId) -> Result<&mut JobRecord, CoordinatorError> {
        let job = self
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| CoordinatorError::UnknownJob(job_id.clone()))?;
        if job.unregistered {
            return Err(CoordinatorError::Unregistered(job_id.clone()));
        }
        if !job.registered {
            return Err(CoordinatorError::NotRegistered(job_id.clone()));
        }
        if job.state.is_terminal() {
            return Err(CoordinatorError::JobTerminated {
                job: job_id.clone(),
                state: job.state,
            });
        }
        Ok(job)
    }
}

/// Take one from the ask a granted container satisfies.
fn cover(asks: &mut [AllocationRequest], capability: &ResourceCapability) {
    let slot = asks
        .iter_mut()
        .filter(|a| a.count > 0)
        .min_by_key(|a| (a.capability != *capability, a.priority))
        .filter(|a| capability.fits_within(&a.capability));
    if let Some(ask) = slot {
        ask.count -= 1;
    }
}

fn advance(job: &mut JobRecord, job_id: &JobId, next: JobState) -> Result<(), CoordinatorError> {
    let current = job.state;
    job.state
        .advance(next)
        .map_err(|_| CoordinatorError::JobTerminated {
            job: job_id.clone(),
            state: current,
        })
}
