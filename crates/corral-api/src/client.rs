use std::time::Duration;

use async_trait::async_trait;
use corral_core::{CoordinatorApi, CoordinatorError, LaunchError, LauncherApi, SchedulerApi};
use corral_model::{
    AllocateCall, AllocationUpdate, ClusterLimits, ContainerHandle, FinalStatus, JobId, JobReport,
    JobSubmission, LaunchContext, NewJob,
};
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::trace;

use crate::{
    error::ErrorBody,
    wire::{LaunchRequest, SubmitResponse, UnregisterRequest},
};

#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Base URL of the coordinator, e.g. `http://127.0.0.1:8032`.
    pub endpoint: String,
    /// Upper bound for one request.
    pub request_timeout: Duration,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8032".to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Coordinator contracts over HTTP.
///
/// Connection failures and request timeouts come back as transient
/// [`CoordinatorError`]s; errors reported by the server keep their kind.
#[derive(Debug, Clone)]
pub struct RemoteCoordinator {
    http: reqwest::Client,
    cfg: RemoteConfig,
}

/// Failure of one round-trip before it is mapped to a contract error.
enum CallError {
    Transport(CoordinatorError),
    Remote { status: u16, body: Option<ErrorBody> },
}

impl RemoteCoordinator {
    pub fn new(cfg: RemoteConfig) -> Result<Self, CoordinatorError> {
        let http = reqwest::Client::builder()
            .timeout(cfg.request_timeout)
            .build()
            .map_err(|e| CoordinatorError::Protocol(format!("http client: {e}")))?;
        Ok(Self { http, cfg })
    }

    pub fn endpoint(&self) -> &str {
        &self.cfg.endpoint
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.cfg.endpoint.trim_end_matches('/'))
    }

    async fn send(&self, req: RequestBuilder) -> Result<Response, CallError> {
        let resp = req.send().await.map_err(|e| CallError::Transport(self.transport(e)))?;
        let status = resp.status();
        trace!(target: "corral.api.client", url = %resp.url(), status = status.as_u16(), "response");
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.json::<ErrorBody>().await.ok();
        Err(CallError::Remote {
            status: status.as_u16(),
            body,
        })
    }

    async fn json<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, CoordinatorError> {
        let resp = self.send(req).await.map_err(coordinator_error)?;
        resp.json::<T>()
            .await
            .map_err(|e| CoordinatorError::Protocol(format!("invalid response: {e}")))
    }

    async fn empty(&self, req: RequestBuilder) -> Result<(), CoordinatorError> {
        self.send(req).await.map_err(coordinator_error)?;
        Ok(())
    }

    fn transport(&self, e: reqwest::Error) -> CoordinatorError {
        if e.is_timeout() {
            CoordinatorError::Timeout(self.cfg.request_timeout)
        } else if e.is_connect() || e.is_request() {
            CoordinatorError::Unavailable(e.to_string())
        } else {
            CoordinatorError::Protocol(e.to_string())
        }
    }
}

fn coordinator_error(e: CallError) -> CoordinatorError {
    match e {
        CallError::Transport(e) => e,
        CallError::Remote {
            body: Some(ErrorBody {
                coordinator: Some(e),
                ..
            }),
            ..
        } => e,
        CallError::Remote { status: 503, body } => {
            CoordinatorError::Unavailable(body.map(|b| b.message).unwrap_or_default())
        }
        CallError::Remote { status, body } => CoordinatorError::Protocol(format!(
            "HTTP {status}: {}",
            body.map(|b| b.message).unwrap_or_default()
        )),
    }
}

fn launch_error(e: CallError, container: &ContainerHandle) -> LaunchError {
    match e {
        CallError::Transport(e) => LaunchError::NodeUnreachable {
            node: container.node.clone(),
            reason: e.to_string(),
        },
        CallError::Remote {
            body: Some(ErrorBody {
                launch: Some(e), ..
            }),
            ..
        } => e,
        CallError::Remote { status, body } => LaunchError::NodeUnreachable {
            node: container.node.clone(),
            reason: format!(
                "HTTP {status}: {}",
                body.map(|b| b.message).unwrap_or_default()
            ),
        },
    }
}

#[async_trait]
impl CoordinatorApi for RemoteCoordinator {
    async fn cluster_info(&self) -> Result<ClusterLimits, CoordinatorError> {
        self.json(self.http.get(self.url("/v1/cluster"))).await
    }

    async fn new_job(&self) -> Result<NewJob, CoordinatorError> {
        self.json(self.http.post(self.url("/v1/jobs"))).await
    }

    async fn submit(&self, submission: JobSubmission) -> Result<JobId, CoordinatorError> {
        let url = self.url(&format!("/v1/jobs/{}/submit", submission.job_id));
        let resp: SubmitResponse = self.json(self.http.post(url).json(&submission)).await?;
        Ok(resp.job_id)
    }

    async fn status(&self, job: &JobId) -> Result<JobReport, CoordinatorError> {
        self.json(self.http.get(self.url(&format!("/v1/jobs/{job}"))))
            .await
    }

    async fn kill(&self, job: &JobId) -> Result<(), CoordinatorError> {
        self.empty(self.http.post(self.url(&format!("/v1/jobs/{job}/kill"))))
            .await
    }
}

#[async_trait]
impl SchedulerApi for RemoteCoordinator {
    async fn register(&self, job: &JobId) -> Result<ClusterLimits, CoordinatorError> {
        self.json(self.http.post(self.url(&format!("/v1/jobs/{job}/register"))))
            .await
    }

    async fn allocate(
        &self,
        job: &JobId,
        call: AllocateCall,
    ) -> Result<AllocationUpdate, CoordinatorError> {
        let url = self.url(&format!("/v1/jobs/{job}/allocate"));
        self.json(self.http.post(url).json(&call)).await
    }

    async fn unregister(
        &self,
        job: &JobId,
        status: FinalStatus,
        message: &str,
    ) -> Result<(), CoordinatorError> {
        let url = self.url(&format!("/v1/jobs/{job}/unregister"));
        let body = UnregisterRequest {
            status,
            message: message.to_string(),
        };
        self.empty(self.http.post(url).json(&body)).await
    }
}

#[async_trait]
impl LauncherApi for RemoteCoordinator {
    async fn launch(
        &self,
        container: &ContainerHandle,
        context: LaunchContext,
    ) -> Result<(), LaunchError> {
        let body = LaunchRequest {
            container: container.clone(),
            context,
        };
        let req = self.http.post(self.url("/v1/containers/launch")).json(&body);
        self.send(req)
            .await
            .map(|_| ())
            .map_err(|e| launch_error(e, container))
    }
}
