use std::{sync::Arc, time::Duration};

use corral_api::{HttpApi, RemoteConfig, RemoteCoordinator};
use corral_cluster::{ClusterConfig, LocalCluster, NodeConfig};
use corral_core::{CoordinatorApi, CoordinatorError, SchedulerApi};
use corral_model::{AllocateCall, AllocationRequest, FinalStatus, JobId, JobSubmission, ResourceCapability};
use tokio::net::TcpListener;

fn cap(m: u32, v: u32) -> ResourceCapability {
    ResourceCapability::new(m, v).unwrap()
}

async fn serve(dir: &std::path::Path) -> (LocalCluster, RemoteCoordinator) {
    let cluster = LocalCluster::new(ClusterConfig {
        nodes: vec![NodeConfig {
            name: "node-a".into(),
            capability: cap(1024, 4),
        }],
        max_capability: cap(512, 2),
        work_root: dir.join("work"),
        store_root: dir.join("store"),
        advertised_endpoint: None,
        enforce_memory_limit: false,
    })
    .unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = HttpApi::new(Arc::new(cluster.clone())).router();
    tokio::spawn(async move {
        corral_api::axum::serve(listener, router).await.unwrap();
    });

    let remote = RemoteCoordinator::new(RemoteConfig {
        endpoint: format!("http://{addr}"),
        request_timeout: Duration::from_secs(5),
    })
    .unwrap();
    (cluster, remote)
}

#[tokio::test]
async fn limits_and_job_ids_cross_the_wire() {
    let dir = tempfile::tempdir().unwrap();
    let (cluster, remote) = serve(dir.path()).await;

    let limits = remote.cluster_info().await.unwrap();
    assert_eq!(limits, cluster.cluster_info().await.unwrap());

    let first = remote.new_job().await.unwrap();
    let second = remote.new_job().await.unwrap();
    assert_ne!(first.job_id, second.job_id);
    assert_eq!(first.limits.max_capability, cap(512, 2));
}

#[tokio::test]
async fn typed_errors_survive_the_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let (_cluster, remote) = serve(dir.path()).await;

    let missing = JobId::from("job_0_9999");
    assert_eq!(
        remote.status(&missing).await.unwrap_err(),
        CoordinatorError::UnknownJob(missing.clone())
    );

    let job = remote.new_job().await.unwrap().job_id;
    let err = remote
        .submit(JobSubmission {
            job_id: job,
            job_name: "too-big".into(),
            priority: 0,
            supervisor_capability: cap(2048, 1),
            launch_context: Default::default(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CoordinatorError::InvalidCapability(_)));
}

#[tokio::test]
async fn scheduler_calls_require_registration() {
    let dir = tempfile::tempdir().unwrap();
    let (_cluster, remote) = serve(dir.path()).await;
    let job = remote.new_job().await.unwrap().job_id;

    let call = AllocateCall {
        asks: vec![AllocationRequest {
            capability: cap(128, 1),
            priority: 0,
            count: 1,
        }],
        ..Default::default()
    };
    let err = remote.allocate(&job, call).await.unwrap_err();
    assert!(!err.is_transient(), "{err}");

    let err = remote
        .unregister(&job, FinalStatus::Succeeded, "done")
        .await
        .unwrap_err();
    assert!(!err.is_transient(), "{err}");
}

#[tokio::test]
async fn dead_endpoint_is_transient() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let remote = RemoteCoordinator::new(RemoteConfig {
        endpoint: format!("http://{addr}"),
        request_timeout: Duration::from_secs(2),
    })
    .unwrap();
    let err = remote.cluster_info().await.unwrap_err();
    assert!(err.is_transient(), "{err}");
}
