use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use corral_core::{CoordinatorApi, LauncherApi, SchedulerApi};
use corral_model::{AllocateCall, JobId, JobSubmission};
use tracing::debug;

use crate::{
    error::ApiError,
    wire::{LaunchRequest, SubmitResponse, UnregisterRequest},
};

/// Everything a coordinator daemon serves.
pub trait ClusterService: CoordinatorApi + SchedulerApi + LauncherApi {}

impl<T> ClusterService for T where T: CoordinatorApi + SchedulerApi + LauncherApi {}

/// HTTP API service builder.
pub struct HttpApi<H> {
    handler: Arc<H>,
}

impl<H> HttpApi<H>
where
    H: ClusterService,
{
    pub fn new(handler: Arc<H>) -> Self {
        Self { handler }
    }

    /// Routes:
    /// - GET  /v1/cluster
    /// - POST /v1/jobs
    /// - GET  /v1/jobs/{id}
    /// - POST /v1/jobs/{id}/submit | kill | register | allocate | unregister
    /// - POST /v1/containers/launch
    pub fn router(self) -> Router {
        Router::new()
            .route("/v1/cluster", get(cluster_info::<H>))
            .route("/v1/jobs", post(new_job::<H>))
            .route("/v1/jobs/{id}", get(status::<H>))
            .route("/v1/jobs/{id}/submit", post(submit::<H>))
            .route("/v1/jobs/{id}/kill", post(kill::<H>))
            .route("/v1/jobs/{id}/register", post(register::<H>))
            .route("/v1/jobs/{id}/allocate", post(allocate::<H>))
            .route("/v1/jobs/{id}/unregister", post(unregister::<H>))
            .route("/v1/containers/launch", post(launch::<H>))
            .with_state(self.handler)
    }
}

async fn cluster_info<H: ClusterService>(
    State(h): State<Arc<H>>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(h.cluster_info().await?))
}

async fn new_job<H: ClusterService>(State(h): State<Arc<H>>) -> Result<impl IntoResponse, ApiError> {
    let job = h.new_job().await?;
    debug!(target: "corral.api.http", job = %job.job_id, "new job");
    Ok(Json(job))
}

async fn status<H: ClusterService>(
    State(h): State<Arc<H>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(h.status(&JobId::from(id)).await?))
}

async fn submit<H: ClusterService>(
    State(h): State<Arc<H>>,
    Path(id): Path<String>,
    Json(submission): Json<JobSubmission>,
) -> Result<impl IntoResponse, ApiError> {
    if submission.job_id.as_str() != id {
        return Err(ApiError::InvalidRequest(format!(
            "path job {id} does not match submission job {}",
            submission.job_id
        )));
    }
    let job_id = h.submit(submission).await?;
    Ok(Json(SubmitResponse { job_id }))
}

async fn kill<H: ClusterService>(
    State(h): State<Arc<H>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    h.kill(&JobId::from(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn register<H: ClusterService>(
    State(h): State<Arc<H>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(h.register(&JobId::from(id)).await?))
}

async fn allocate<H: ClusterService>(
    State(h): State<Arc<H>>,
    Path(id): Path<String>,
    Json(call): Json<AllocateCall>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(h.allocate(&JobId::from(id), call).await?))
}

async fn unregister<H: ClusterService>(
    State(h): State<Arc<H>>,
    Path(id): Path<String>,
    Json(req): Json<UnregisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    h.unregister(&JobId::from(id), req.status, &req.message)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn launch<H: ClusterService>(
    State(h): State<Arc<H>>,
    Json(req): Json<LaunchRequest>,
) -> Result<impl IntoResponse, ApiError> {
    h.launch(&req.container, req.context).await?;
    Ok(StatusCode::NO_CONTENT)
}
