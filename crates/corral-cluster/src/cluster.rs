use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use corral_core::{CoordinatorApi, CoordinatorError, LaunchError, LauncherApi, SchedulerApi};
use corral_exec::{ExecConfig, NodeExecutor, RunningContainer};
use corral_model::{
    AllocateCall, AllocationUpdate, ClusterLimits, ContainerHandle, FinalStatus, JobId, JobReport,
    JobSubmission, LaunchContext, NewJob,
    constants::{ENV_CONTAINER_ID, ENV_COORDINATOR, ENV_JOB_ID, ENV_STORE_ROOT},
};
use corral_store::LocalFsStore;
use tracing::{debug, info, warn};

use crate::{
    config::{ClusterConfig, ConfigError},
    state::{State, SupervisorStart},
};

struct Shared {
    cfg: ClusterConfig,
    store: Arc<LocalFsStore>,
    exec: NodeExecutor,
    state: Mutex<State>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Coordinator and worker launcher for a fixed set of local nodes.
///
/// Cheap to clone; clones share the same cluster.
#[derive(Clone)]
pub struct LocalCluster {
    shared: Arc<Shared>,
}

impl LocalCluster {
    pub fn new(cfg: ClusterConfig) -> Result<Self, ConfigError> {
        cfg.validate()?;
        let store = Arc::new(LocalFsStore::new(cfg.store_root.clone()));
        let exec = NodeExecutor::new(
            store.clone(),
            ExecConfig {
                work_root: cfg.work_root.clone(),
                enforce_memory_limit: cfg.enforce_memory_limit,
                ..Default::default()
            },
        );
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        let state = State::new(&cfg, stamp);
        info!(target: "corral.cluster", nodes = cfg.nodes.len(), max = %cfg.max_capability, "local cluster ready");

        Ok(Self {
            shared: Arc::new(Shared {
                cfg,
                store,
                exec,
                state: Mutex::new(state),
            }),
        })
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.shared.cfg
    }

    /// Shared store every job stages into.
    pub fn store(&self) -> Arc<LocalFsStore> {
        self.shared.store.clone()
    }

    /// Start supervisors of submitted jobs that now fit on a node.
    pub async fn start_pending(&self) {
        let starts = self.shared.lock().place_supervisors();
        for start in starts {
            self.start_supervisor(start).await;
        }
    }

    async fn start_supervisor(&self, start: SupervisorStart) {
        let id = start.handle.container_id.clone();
        let mut env = BTreeMap::from([
            (ENV_JOB_ID.to_string(), start.job.to_string()),
            (
                ENV_STORE_ROOT.to_string(),
                self.shared.cfg.store_root.display().to_string(),
            ),
            (ENV_CONTAINER_ID.to_string(), id.to_string()),
        ]);
        if let Some(endpoint) = &self.shared.cfg.advertised_endpoint {
            env.insert(ENV_COORDINATOR.to_string(), endpoint.clone());
        }

        let started = self
            .shared
            .exec
            .start(
                &start.handle,
                &start.submission.launch_context,
                &env,
                start.cancel,
            )
            .await;
        match started {
            Ok(running) => {
                info!(target: "corral.cluster", job = %start.job, container = %id, node = %start.handle.node, "supervisor started");
                self.watch(running);
            }
            Err(e) => {
                warn!(target: "corral.cluster", job = %start.job, container = %id, error = %e, "supervisor launch failed");
                self.shared
                    .lock()
                    .supervisor_failed(&start.job, &id, &e.to_string());
            }
        }
    }

    fn watch(&self, running: RunningContainer) {
        let shared = self.shared.clone();
        tokio::spawn(async move {
            let id = running.id().clone();
            let status = running.wait().await;
            debug!(target: "corral.cluster", container = %id, %status, "container exited");
            shared.lock().container_exited(&id, status);
        });
    }
}

#[async_trait]
impl CoordinatorApi for LocalCluster {
    async fn cluster_info(&self) -> Result<ClusterLimits, CoordinatorError> {
        Ok(self.shared.lock().limits())
    }

    async fn new_job(&self) -> Result<NewJob, CoordinatorError> {
        let mut state = self.shared.lock();
        let job_id = state.new_job();
        Ok(NewJob {
            job_id,
            limits: state.limits(),
        })
    }

    async fn submit(&self, submission: JobSubmission) -> Result<JobId, CoordinatorError> {
        let job = self.shared.lock().submit(submission)?;
        self.start_pending().await;
        Ok(job)
    }

    async fn status(&self, job: &JobId) -> Result<JobReport, CoordinatorError> {
        self.start_pending().await;
        self.shared.lock().report(job)
    }

    async fn kill(&self, job: &JobId) -> Result<(), CoordinatorError> {
        self.shared.lock().kill(job)
    }
}

#[async_trait]
impl SchedulerApi for LocalCluster {
    async fn register(&self, job: &JobId) -> Result<ClusterLimits, CoordinatorError> {
        self.shared.lock().register(job)
    }

    async fn allocate(
        &self,
        job: &JobId,
        call: AllocateCall,
    ) -> Result<AllocationUpdate, CoordinatorError> {
        self.shared.lock().allocate(job, call)
    }

    async fn unregister(
        &self,
        job: &JobId,
        status: FinalStatus,
        message: &str,
    ) -> Result<(), CoordinatorError> {
        let workers = self.shared.lock().unregister(job, status, message)?;
        for token in workers {
            token.cancel();
        }
        Ok(())
    }
}

#[async_trait]
impl LauncherApi for LocalCluster {
    async fn launch(
        &self,
        container: &ContainerHandle,
        context: LaunchContext,
    ) -> Result<(), LaunchError> {
        let (handle, job, cancel) = self.shared.lock().begin_launch(container)?;
        let env = BTreeMap::from([(ENV_CONTAINER_ID.to_string(), handle.container_id.to_string())]);

        let started = self
            .shared
            .exec
            .start(&handle, &context, &env, cancel)
            .await;
        match started {
            Ok(running) => {
                debug!(target: "corral.cluster", %job, container = %handle.container_id, "worker started");
                self.watch(running);
                Ok(())
            }
            Err(e) => {
                self.shared.lock().launch_failed(&handle.container_id);
                Err(e)
            }
        }
    }
}
