//! Per-job supervisor: negotiates worker containers and sees them through to completion.
mod config;
pub use config::SupervisorConfig;

mod env;
pub use env::SupervisorEnv;

use std::{collections::HashMap, sync::Arc};

use corral_model::{
    AllocationUpdate, ArtifactManifest, ContainerHandle, ContainerId, Env, FinalStatus,
    LaunchContext, Visibility,
    constants::{ENV_JOB_ID, SUPERVISOR_ARTIFACT},
};
use tracing::{debug, info, instrument, warn};

use crate::{
    error::SupervisorError,
    launch::{CommandTemplate, LaunchContextBuilder},
    negotiator::ResourceNegotiator,
    protocol::LauncherApi,
};

const UNREGISTER_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorPhase {
    Init,
    Registered,
    Requesting,
    Allocating,
    AwaitingCompletion,
    Done,
}

/// Counters and final status of a finished supervisor run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorReport {
    pub final_status: FinalStatus,
    pub allocated: u32,
    pub completed: u32,
    pub failed: u32,
    pub summary: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Track {
    Running,
    Finished,
}

pub struct Supervisor {
    cfg: SupervisorConfig,
    negotiator: ResourceNegotiator,
    launcher: Arc<dyn LauncherApi>,
    manifest: ArtifactManifest,
    phase: SupervisorPhase,
    containers: HashMap<ContainerId, Track>,
    allocated: u32,
    completed: u32,
    failed: u32,
}

impl Supervisor {
    pub fn new(
        cfg: SupervisorConfig,
        negotiator: ResourceNegotiator,
        launcher: Arc<dyn LauncherApi>,
        manifest: ArtifactManifest,
    ) -> Self {
        Self {
            cfg,
            negotiator,
            launcher,
            manifest,
            phase: SupervisorPhase::Init,
            containers: HashMap::new(),
            allocated: 0,
            completed: 0,
            failed: 0,
        }
    }

    pub fn phase(&self) -> SupervisorPhase {
        self.phase
    }

    pub fn allocated(&self) -> u32 {
        self.allocated
    }

    pub fn completed(&self) -> u32 {
        self.completed
    }

    /// Drive the job from registration to unregistration.
    ///
    /// Transient negotiation failures are retried on the poll cadence. Any other
    /// failure after registration unregisters the job as `FAILED` before returning.
    #[instrument(level = "info", skip(self), fields(job = %self.negotiator.job()))]
    pub async fn run(&mut self) -> Result<SupervisorReport, SupervisorError> {
        let limits = self.negotiator.register().await?;
        self.phase = SupervisorPhase::Registered;
        info!(target: "corral.core.supervisor", max = %limits.max_capability, nodes = limits.node_count, "registered");

        let capability = self.cfg.worker_capability;
        if !capability.fits_within(&limits.max_capability) {
            let err = SupervisorError::CapabilityTooLarge {
                requested: capability.to_string(),
                max: limits.max_capability.to_string(),
            };
            self.abort(&err.to_string()).await;
            return Err(err);
        }

        let context = match self.worker_context() {
            Ok(ctx) => ctx,
            Err(err) => {
                self.abort(&err.to_string()).await;
                return Err(err);
            }
        };

        let desired = self.cfg.worker_count;
        for _ in 0..desired {
            self.negotiator
                .request_slots(capability, self.cfg.priority, 1)?;
        }
        self.phase = SupervisorPhase::Requesting;
        debug!(target: "corral.core.supervisor", desired, %capability, "requested workers");

        while self.completed < desired {
            self.negotiator
                .set_progress(self.completed as f32 / desired as f32);

            match self.negotiator.poll(self.cfg.poll_timeout).await {
                Ok(update) => self.apply(update, &context, desired).await,
                Err(e) if e.is_transient() => {
                    warn!(target: "corral.core.supervisor", error = %e, "allocate failed, retrying");
                }
                Err(e) => {
                    self.abort(&e.to_string()).await;
                    return Err(e.into());
                }
            }

            self.phase = if self.allocated < desired {
                SupervisorPhase::Allocating
            } else {
                SupervisorPhase::AwaitingCompletion
            };
            if self.completed >= desired {
                break;
            }
            tokio::time::sleep(self.cfg.poll_interval).await;
        }

        let final_status = if self.failed == 0 {
            FinalStatus::Succeeded
        } else {
            FinalStatus::Failed
        };
        let summary = format!(
            "{} of {} workers completed, {} failed",
            self.completed, desired, self.failed
        );
        self.negotiator.set_progress(1.0);
        self.finish(final_status, &summary).await?;
        self.phase = SupervisorPhase::Done;
        info!(target: "corral.core.supervisor", ?final_status, %summary, "done");

        Ok(SupervisorReport {
            final_status,
            allocated: self.allocated,
            completed: self.completed,
            failed: self.failed,
            summary,
        })
    }

    /// Allocations first, then completions, so a container granted and
    /// finished within one update is counted in order.
    async fn apply(&mut self, update: AllocationUpdate, context: &LaunchContext, desired: u32) {
        if update.is_empty() {
            return;
        }
        for handle in update.allocated {
            if self.containers.contains_key(&handle.container_id) {
                debug!(target: "corral.core.supervisor", container = %handle.container_id, "duplicate allocation ignored");
                continue;
            }
            if self.allocated >= desired {
                debug!(target: "corral.core.supervisor", container = %handle.container_id, "releasing surplus container");
                self.negotiator.release(handle.container_id);
                continue;
            }
            self.allocated += 1;
            self.launch(handle, context.clone()).await;
        }

        for done in update.completed {
            let id = &done.handle.container_id;
            match self.containers.get_mut(id) {
                Some(track @ Track::Running) => {
                    *track = Track::Finished;
                    self.completed += 1;
                    if !done.status.success() {
                        self.failed += 1;
                    }
                    info!(target: "corral.core.supervisor", container = %id, status = %done.status, "worker finished");
                }
                _ => {
                    debug!(target: "corral.core.supervisor", container = %id, "completion for untracked container ignored");
                }
            }
        }
    }

    async fn launch(&mut self, handle: ContainerHandle, context: LaunchContext) {
        match self.launcher.launch(&handle, context).await {
            Ok(()) => {
                info!(target: "corral.core.supervisor", container = %handle.container_id, node = %handle.node, "worker launched");
                self.containers.insert(handle.container_id, Track::Running);
            }
            Err(e) => {
                warn!(target: "corral.core.supervisor", container = %handle.container_id, node = %handle.node, error = %e, "worker launch failed");
                self.completed += 1;
                self.failed += 1;
                self.containers
                    .insert(handle.container_id.clone(), Track::Finished);
                self.negotiator.release(handle.container_id);
            }
        }
    }

    /// Launch context shared by every worker: all staged artifacts except the
    /// supervisor binary, readable by any container.
    fn worker_context(&self) -> Result<LaunchContext, SupervisorError> {
        if self.manifest.get(&self.cfg.script_name).is_none() {
            return Err(SupervisorError::Environment(format!(
                "manifest has no '{}' artifact",
                self.cfg.script_name
            )));
        }
        let artifacts = self
            .manifest
            .iter()
            .filter(|a| a.logical_name != SUPERVISOR_ARTIFACT)
            .cloned()
            .map(|a| a.with_visibility(Visibility::Public));
        let env = Env::single(ENV_JOB_ID, self.negotiator.job().as_str());

        let ctx = LaunchContextBuilder::new()
            .artifacts(artifacts)
            .env(&env)
            .build(&CommandTemplate::worker(
                self.cfg.interpreter.iter().cloned(),
                &self.cfg.script_name,
            ))?;
        Ok(ctx)
    }

    async fn finish(&mut self, status: FinalStatus, summary: &str) -> Result<(), SupervisorError> {
        let mut attempt = 1;
        loop {
            match self.negotiator.unregister(status, summary).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient() && attempt < UNREGISTER_ATTEMPTS => {
                    warn!(target: "corral.core.supervisor", attempt, error = %e, "unregister failed, retrying");
                    attempt += 1;
                    tokio::time::sleep(self.cfg.poll_interval).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Best-effort `FAILED` unregistration on a fatal path.
    async fn abort(&mut self, reason: &str) {
        warn!(target: "corral.core.supervisor", %reason, "aborting job");
        if let Err(e) = self.finish(FinalStatus::Failed, reason).await {
            warn!(target: "corral.core.supervisor", error = %e, "unregister after failure did not succeed");
        }
        self.phase = SupervisorPhase::Done;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CoordinatorError, LaunchError, NegotiationError};
    use crate::protocol::SchedulerApi;
    use async_trait::async_trait;
    use corral_model::{
        AllocateCall, ArtifactDescriptor, ClusterLimits, CompletedContainer, ExitStatus, JobId,
        NodeRef, ResourceCapability,
    };
    use std::{collections::VecDeque, sync::Mutex, time::Duration};

    fn handle(id: &str) -> ContainerHandle {
        ContainerHandle {
            container_id: ContainerId::new(id),
            node: NodeRef::new("node-1"),
            capability: SupervisorConfig::default_worker_capability(),
        }
    }

    fn manifest() -> ArtifactManifest {
        let d = |name: &str| ArtifactDescriptor {
            logical_name: name.to_string(),
            remote_location: format!("file:///store/job_1/{name}"),
            size_bytes: 4,
            last_modified: 9,
            visibility: Visibility::Private,
        };
        ArtifactManifest::new(vec![d("corral-am"), d("script.py"), d("input.txt")]).unwrap()
    }

    /// Replays one scripted response per allocate call, then empty updates.
    #[derive(Default)]
    struct Script {
        responses: Mutex<VecDeque<Result<AllocationUpdate, CoordinatorError>>>,
        calls: Mutex<Vec<AllocateCall>>,
        unregistered: Mutex<Vec<FinalStatus>>,
        max: Option<ResourceCapability>,
    }

    impl Script {
        fn with(responses: Vec<Result<AllocationUpdate, CoordinatorError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                ..Default::default()
            })
        }
    }

    #[async_trait]
    impl SchedulerApi for Script {
        async fn register(&self, _job: &JobId) -> Result<ClusterLimits, CoordinatorError> {
            Ok(ClusterLimits {
                max_capability: self
                    .max
                    .unwrap_or_else(|| ResourceCapability::new(1024, 4).unwrap()),
                node_count: 1,
            })
        }

        async fn allocate(
            &self,
            _job: &JobId,
            call: AllocateCall,
        ) -> Result<AllocationUpdate, CoordinatorError> {
            self.calls.lock().unwrap().push(call);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(AllocationUpdate::default()))
        }

        async fn unregister(
            &self,
            _job: &JobId,
            status: FinalStatus,
            _message: &str,
        ) -> Result<(), CoordinatorError> {
            self.unregistered.lock().unwrap().push(status);
            Ok(())
        }
    }

    #[derive(Default)]
    struct Launcher {
        launched: Mutex<Vec<(ContainerId, LaunchContext)>>,
        fail: bool,
    }

    #[async_trait]
    impl LauncherApi for Launcher {
        async fn launch(
            &self,
            container: &ContainerHandle,
            context: LaunchContext,
        ) -> Result<(), LaunchError> {
            if self.fail {
                return Err(LaunchError::NodeUnreachable {
                    node: container.node.clone(),
                    reason: "refused".into(),
                });
            }
            self.launched
                .lock()
                .unwrap()
                .push((container.container_id.clone(), context));
            Ok(())
        }
    }

    fn supervisor(sched: Arc<Script>, launcher: Arc<Launcher>, workers: u32) -> Supervisor {
        let cfg = SupervisorConfig {
            worker_count: workers,
            ..Default::default()
        };
        let negotiator = ResourceNegotiator::new(sched, JobId::from("job_1"));
        Supervisor::new(cfg, negotiator, launcher, manifest())
    }

    fn allocated(ids: &[&str]) -> Result<AllocationUpdate, CoordinatorError> {
        Ok(AllocationUpdate {
            response_id: 0,
            allocated: ids.iter().map(|id| handle(id)).collect(),
            completed: vec![],
        })
    }

    fn completed(id: &str, code: i32) -> Result<AllocationUpdate, CoordinatorError> {
        Ok(AllocationUpdate {
            response_id: 0,
            allocated: vec![],
            completed: vec![CompletedContainer {
                handle: handle(id),
                status: ExitStatus::Exited { code },
            }],
        })
    }

    #[tokio::test(start_paused = true)]
    async fn single_worker_succeeds() {
        let sched = Script::with(vec![
            Ok(AllocationUpdate::default()),
            allocated(&["c1"]),
            completed("c1", 0),
        ]);
        let launcher = Arc::new(Launcher::default());
        let mut sup = supervisor(sched.clone(), launcher.clone(), 1);

        let report = sup.run().await.unwrap();
        assert_eq!(report.final_status, FinalStatus::Succeeded);
        assert_eq!((report.allocated, report.completed, report.failed), (1, 1, 0));
        assert_eq!(sup.phase(), SupervisorPhase::Done);
        assert_eq!(*sched.unregistered.lock().unwrap(), vec![FinalStatus::Succeeded]);

        let launched = launcher.launched.lock().unwrap();
        assert_eq!(launched.len(), 1);
        let ctx = &launched[0].1;
        assert!(ctx.artifacts.contains_key("script.py"));
        assert!(ctx.artifacts.contains_key("input.txt"));
        assert!(!ctx.artifacts.contains_key("corral-am"));
        assert!(ctx.artifacts.values().all(|a| a.visibility == Visibility::Public));
        assert!(ctx.command_line().starts_with("/usr/bin/env python script.py"));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_worker_fails_the_job() {
        let sched = Script::with(vec![allocated(&["c1"]), completed("c1", 3)]);
        let mut sup = supervisor(sched.clone(), Arc::new(Launcher::default()), 1);

        let report = sup.run().await.unwrap();
        assert_eq!(report.final_status, FinalStatus::Failed);
        assert_eq!(report.failed, 1);
        assert_eq!(*sched.unregistered.lock().unwrap(), vec![FinalStatus::Failed]);
    }

    #[tokio::test(start_paused = true)]
    async fn launch_failure_counts_as_failed_completion_and_releases() {
        let sched = Script::with(vec![allocated(&["c1"])]);
        let launcher = Arc::new(Launcher {
            fail: true,
            ..Default::default()
        });
        let mut sup = supervisor(sched.clone(), launcher, 1);

        let report = sup.run().await.unwrap();
        assert_eq!(report.final_status, FinalStatus::Failed);
        assert_eq!((report.allocated, report.completed), (1, 1));
        // The loop ends right after the launch failure; the release is
        // dropped together with the outstanding state on unregister.
        assert_eq!(sched.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn surplus_allocations_are_released() {
        let sched = Script::with(vec![allocated(&["c1", "c2"]), completed("c1", 0)]);
        let mut sup = supervisor(sched.clone(), Arc::new(Launcher::default()), 1);

        let report = sup.run().await.unwrap();
        assert_eq!(report.allocated, 1);

        let calls = sched.calls.lock().unwrap();
        assert_eq!(calls[1].releases, vec![ContainerId::new("c2")]);
        assert!(calls[1].asks.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn completions_for_unknown_or_repeated_containers_are_ignored() {
        let sched = Script::with(vec![
            completed("ghost", 0),
            allocated(&["c1", "c2"]),
            completed("c1", 0),
            completed("c1", 0),
            completed("c2", 0),
        ]);
        let launcher = Arc::new(Launcher::default());
        let mut sup = supervisor(sched.clone(), launcher, 2);

        let report = sup.run().await.unwrap();
        assert_eq!((report.allocated, report.completed, report.failed), (2, 2, 0));
        assert_eq!(sched.calls.lock().unwrap().len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_are_retried() {
        let sched = Script::with(vec![
            Err(CoordinatorError::Unavailable("restarting".into())),
            allocated(&["c1"]),
            completed("c1", 0),
        ]);
        let mut sup = supervisor(sched.clone(), Arc::new(Launcher::default()), 1);

        let report = sup.run().await.unwrap();
        assert_eq!(report.final_status, FinalStatus::Succeeded);
        assert_eq!(sched.calls.lock().unwrap().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_error_unregisters_failed() {
        let sched = Script::with(vec![Err(CoordinatorError::InvalidCapability("too big".into()))]);
        let mut sup = supervisor(sched.clone(), Arc::new(Launcher::default()), 1);

        let err = sup.run().await.unwrap_err();
        assert!(matches!(
            err,
            SupervisorError::Negotiation(NegotiationError::Fatal(_))
        ));
        assert_eq!(*sched.unregistered.lock().unwrap(), vec![FinalStatus::Failed]);
        assert_eq!(sup.phase(), SupervisorPhase::Done);
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_worker_capability_is_fatal() {
        let sched = Arc::new(Script {
            max: Some(ResourceCapability::new(64, 1).unwrap()),
            ..Default::default()
        });
        let mut sup = supervisor(sched.clone(), Arc::new(Launcher::default()), 1);

        let err = sup.run().await.unwrap_err();
        assert!(matches!(err, SupervisorError::CapabilityTooLarge { .. }));
        assert!(sched.calls.lock().unwrap().is_empty());
        assert_eq!(*sched.unregistered.lock().unwrap(), vec![FinalStatus::Failed]);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_workers_unregisters_immediately() {
        let sched = Script::with(vec![]);
        let mut sup = supervisor(sched.clone(), Arc::new(Launcher::default()), 0);

        let report = sup.run().await.unwrap();
        assert_eq!(report.final_status, FinalStatus::Succeeded);
        assert!(sched.calls.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn keeps_polling_while_starved() {
        let sched = Script::with(vec![]);
        let mut sup = supervisor(sched.clone(), Arc::new(Launcher::default()), 2);

        let res = tokio::time::timeout(Duration::from_secs(5), sup.run()).await;
        assert!(res.is_err(), "supervisor must not finish without workers");
        assert!(sched.calls.lock().unwrap().len() >= 40);
        assert_eq!(sup.phase(), SupervisorPhase::Allocating);
        assert!(sched.unregistered.lock().unwrap().is_empty());
        assert!(sched
            .calls
            .lock()
            .unwrap()
            .iter()
            .all(|c| c.asks.iter().map(|a| a.count).sum::<u32>() == 2));
    }

    #[tokio::test(start_paused = true)]
    async fn progress_tracks_completions() {
        let sched = Script::with(vec![
            allocated(&["c1", "c2"]),
            completed("c1", 0),
            completed("c2", 0),
        ]);
        let mut sup = supervisor(sched.clone(), Arc::new(Launcher::default()), 2);
        sup.run().await.unwrap();

        let progress: Vec<f32> = sched.calls.lock().unwrap().iter().map(|c| c.progress).collect();
        assert_eq!(progress, vec![0.0, 0.0, 0.5]);
    }
}
