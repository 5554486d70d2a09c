#![cfg(unix)]

use std::{
    os::unix::fs::PermissionsExt,
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;

use corral_cluster::{ClusterConfig, LocalCluster, NodeConfig};
use corral_core::{
    CommandTemplate, CoordinatorApi, CoordinatorError, LaunchError, LauncherApi,
    ResourceNegotiator, SchedulerApi, Supervisor, SupervisorConfig, launch::build_launch_context,
};
use corral_model::{
    AllocateCall, AllocationRequest, AllocationUpdate, ArtifactDescriptor, ArtifactManifest,
    ClusterLimits, CompletedContainer, Env, ExitStatus, FinalStatus, JobId, JobState,
    JobSubmission, ResourceCapability,
};
use corral_store::ArtifactStager;

fn cap(m: u32, v: u32) -> ResourceCapability {
    ResourceCapability::new(m, v).unwrap()
}

fn cluster(dir: &Path) -> LocalCluster {
    cluster_on(dir, cap(1024, 4))
}

fn cluster_on(dir: &Path, node: ResourceCapability) -> LocalCluster {
    LocalCluster::new(ClusterConfig {
        nodes: vec![NodeConfig {
            name: "node-a".into(),
            capability: node,
        }],
        max_capability: cap(512, 2),
        work_root: dir.join("work"),
        store_root: dir.join("store"),
        advertised_endpoint: None,
        enforce_memory_limit: false,
    })
    .unwrap()
}

fn write_script(dir: &Path, name: &str, body: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Submit a job whose supervisor process runs `supervisor_body`.
async fn submit(cluster: &LocalCluster, dir: &Path, supervisor_body: &str) -> (JobId, ArtifactStager) {
    let stager = ArtifactStager::new(cluster.store());
    let job = cluster.new_job().await.unwrap().job_id;
    let local = write_script(dir, "corral-am", supervisor_body);
    let am = stager.stage(&local, "corral-am", &job).await.unwrap();
    let ctx = build_launch_context(&[am], &Env::new(), &CommandTemplate::supervisor("corral-am"))
        .unwrap();
    cluster
        .submit(JobSubmission {
            job_id: job.clone(),
            job_name: "test".into(),
            priority: 0,
            supervisor_capability: cap(256, 1),
            launch_context: ctx,
        })
        .await
        .unwrap();
    (job, stager)
}

fn ask(count: u32) -> AllocateCall {
    AllocateCall {
        asks: vec![AllocationRequest {
            capability: cap(128, 1),
            priority: 0,
            count,
        }],
        ..Default::default()
    }
}

async fn until_terminal(cluster: &LocalCluster, job: &JobId) -> JobState {
    for _ in 0..200 {
        let state = cluster.status(job).await.unwrap().state;
        if state.is_terminal() {
            return state;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("job {job} never finished");
}

async fn next_completion(cluster: &LocalCluster, job: &JobId) -> CompletedContainer {
    for _ in 0..200 {
        let mut update = cluster.allocate(job, AllocateCall::default()).await.unwrap();
        if let Some(done) = update.completed.pop() {
            return done;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("no completion for {job}");
}

async fn worker(
    stager: &ArtifactStager,
    dir: &Path,
    job: &JobId,
    body: &str,
) -> (ArtifactDescriptor, CommandTemplate) {
    let local = write_script(dir, "work.sh", body);
    let script = stager.stage(&local, "work.sh", job).await.unwrap();
    let template = CommandTemplate::worker(["sh"], "work.sh");
    (script, template)
}

#[tokio::test]
async fn worker_runs_to_completion_and_job_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let cluster = cluster(dir.path());
    let (job, stager) = submit(&cluster, dir.path(), "#!/bin/sh\nsleep 5\n").await;
    assert_eq!(cluster.status(&job).await.unwrap().state, JobState::Submitted);

    let limits = cluster.register(&job).await.unwrap();
    assert_eq!(limits.max_capability, cap(512, 2));
    assert_eq!(cluster.status(&job).await.unwrap().state, JobState::Running);

    let granted = cluster.allocate(&job, ask(1)).await.unwrap().allocated;
    assert_eq!(granted.len(), 1);
    let handle = granted[0].clone();

    let (script, template) = worker(&stager, dir.path(), &job, "echo working\n").await;
    let ctx = build_launch_context(&[script], &Env::new(), &template).unwrap();
    cluster.launch(&handle, ctx).await.unwrap();

    let done = next_completion(&cluster, &job).await;
    assert_eq!(done.handle, handle);
    assert_eq!(done.status, ExitStatus::Exited { code: 0 });

    let stdout = dir
        .path()
        .join("work")
        .join(handle.container_id.as_str())
        .join("logs")
        .join("container.stdout");
    assert_eq!(std::fs::read_to_string(stdout).unwrap(), "working\n");

    cluster
        .unregister(&job, FinalStatus::Succeeded, "1 of 1 workers completed")
        .await
        .unwrap();
    let report = cluster.status(&job).await.unwrap();
    assert_eq!(report.state, JobState::FinishedSuccess);
    assert_eq!(report.final_status, Some(FinalStatus::Succeeded));
}

#[tokio::test]
async fn supervisor_exit_without_unregister_fails_the_job() {
    let dir = tempfile::tempdir().unwrap();
    let cluster = cluster(dir.path());
    let (job, _) = submit(&cluster, dir.path(), "#!/bin/sh\nexit 3\n").await;

    assert_eq!(until_terminal(&cluster, &job).await, JobState::FinishedFailure);
    let report = cluster.status(&job).await.unwrap();
    assert!(report.diagnostics.contains("without unregistering"), "{}", report.diagnostics);
}

#[tokio::test]
async fn kill_terminates_the_job_and_its_workers() {
    let dir = tempfile::tempdir().unwrap();
    let cluster = cluster(dir.path());
    let (job, stager) = submit(&cluster, dir.path(), "#!/bin/sh\nsleep 30\n").await;
    cluster.register(&job).await.unwrap();

    let handle = cluster.allocate(&job, ask(1)).await.unwrap().allocated.remove(0);
    let (script, template) = worker(&stager, dir.path(), &job, "sleep 30\n").await;
    let ctx = build_launch_context(&[script], &Env::new(), &template).unwrap();
    cluster.launch(&handle, ctx).await.unwrap();

    cluster.kill(&job).await.unwrap();
    assert_eq!(cluster.status(&job).await.unwrap().state, JobState::Killed);
    assert!(matches!(
        cluster.kill(&job).await,
        Err(CoordinatorError::JobTerminated { .. })
    ));
    assert!(matches!(
        cluster.allocate(&job, AllocateCall::default()).await,
        Err(CoordinatorError::JobTerminated { .. })
    ));
}

#[tokio::test]
async fn tampered_artifact_fails_the_launch_only() {
    let dir = tempfile::tempdir().unwrap();
    let cluster = cluster(dir.path());
    let (job, stager) = submit(&cluster, dir.path(), "#!/bin/sh\nsleep 5\n").await;
    cluster.register(&job).await.unwrap();

    let handle = cluster.allocate(&job, ask(1)).await.unwrap().allocated.remove(0);
    let (mut script, template) = worker(&stager, dir.path(), &job, "echo hi\n").await;
    script.size_bytes += 1;
    let ctx = build_launch_context(&[script], &Env::new(), &template).unwrap();

    let err = cluster.launch(&handle, ctx).await.unwrap_err();
    assert!(matches!(err, LaunchError::ArtifactMismatch { .. }));
    assert_eq!(cluster.status(&job).await.unwrap().state, JobState::Running);
}

#[tokio::test]
async fn oversized_supervisor_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let cluster = cluster(dir.path());
    let job = cluster.new_job().await.unwrap().job_id;
    let err = cluster
        .submit(JobSubmission {
            job_id: job,
            job_name: "big".into(),
            priority: 0,
            supervisor_capability: cap(1024, 1),
            launch_context: Default::default(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CoordinatorError::InvalidCapability(_)));
}

/// Hands the first allocate to the cluster but holds its answer past any
/// sensible poll timeout.
struct StallFirstAllocate {
    cluster: LocalCluster,
    stalled: AtomicBool,
}

#[async_trait]
impl SchedulerApi for StallFirstAllocate {
    async fn register(&self, job: &JobId) -> Result<ClusterLimits, CoordinatorError> {
        self.cluster.register(job).await
    }

    async fn allocate(
        &self,
        job: &JobId,
        call: AllocateCall,
    ) -> Result<AllocationUpdate, CoordinatorError> {
        let update = self.cluster.allocate(job, call).await;
        if !self.stalled.swap(true, Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(10)).await;
        }
        update
    }

    async fn unregister(
        &self,
        job: &JobId,
        status: FinalStatus,
        message: &str,
    ) -> Result<(), CoordinatorError> {
        self.cluster.unregister(job, status, message).await
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn grant_from_a_timed_out_poll_is_delivered_again() {
    let dir = tempfile::tempdir().unwrap();
    // Room for the supervisor and exactly one worker.
    let cluster = cluster_on(dir.path(), cap(384, 2));
    let (job, stager) = submit(&cluster, dir.path(), "#!/bin/sh\nsleep 30\n").await;
    let local = write_script(dir.path(), "work.sh", "echo done\n");
    let script = stager.stage(&local, "work.sh", &job).await.unwrap();

    let scheduler = Arc::new(StallFirstAllocate {
        cluster: cluster.clone(),
        stalled: AtomicBool::new(false),
    });
    let cfg = SupervisorConfig {
        worker_count: 1,
        worker_capability: cap(128, 1),
        poll_interval: Duration::from_millis(50),
        poll_timeout: Duration::from_millis(200),
        interpreter: vec!["sh".into()],
        script_name: "work.sh".into(),
        ..Default::default()
    };
    let mut supervisor = Supervisor::new(
        cfg,
        ResourceNegotiator::new(scheduler, job.clone()),
        Arc::new(cluster.clone()),
        ArtifactManifest::new(vec![script]).unwrap(),
    );

    let report = tokio::time::timeout(Duration::from_secs(5), supervisor.run())
        .await
        .expect("supervisor stalled waiting for a lost grant")
        .unwrap();
    assert_eq!(report.final_status, FinalStatus::Succeeded);
    assert_eq!(report.allocated, 1);
    assert_eq!(report.completed, 1);
    assert_eq!(cluster.status(&job).await.unwrap().state, JobState::FinishedSuccess);
}
