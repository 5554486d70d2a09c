//! Submission and monitoring from outside the cluster.
mod config;
pub use config::{ClientConfig, DEFAULT_TIMEOUT};

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use corral_model::{
    ArtifactDescriptor, JobId, JobSubmission, NewJob, Outcome,
    constants::{ENV_JOB_ID, ENV_SCRIPT_LOCATION, SCRIPT_ARTIFACT, SUPERVISOR_ARTIFACT},
};
use corral_store::ArtifactStager;
use tokio::{task::JoinSet, time::Instant};
use tracing::{debug, info, instrument, warn};

use crate::{
    error::{ClientRunError, CoordinatorError, MonitorError, SubmissionError},
    launch::{CommandTemplate, LaunchContextBuilder},
    protocol::CoordinatorApi,
};

const KILL_ATTEMPTS: u32 = 3;

/// What to run: a script plus auxiliary files staged next to it.
#[derive(Debug, Clone, Default)]
pub struct JobSpec {
    pub script: PathBuf,
    pub resources: Vec<PathBuf>,
    /// Overrides [`ClientConfig::job_name`].
    pub job_name: Option<String>,
}

impl JobSpec {
    pub fn new(script: impl Into<PathBuf>) -> Self {
        Self {
            script: script.into(),
            ..Default::default()
        }
    }

    pub fn resource(mut self, path: impl Into<PathBuf>) -> Self {
        self.resources.push(path.into());
        self
    }
}

/// A job accepted by the coordinator; the deadline counts from `submitted_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedJob {
    pub job_id: JobId,
    pub submitted_at: Instant,
}

pub struct Client {
    api: Arc<dyn CoordinatorApi>,
    stager: ArtifactStager,
    cfg: ClientConfig,
}

impl Client {
    pub fn new(api: Arc<dyn CoordinatorApi>, stager: ArtifactStager, cfg: ClientConfig) -> Self {
        Self { api, stager, cfg }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.cfg
    }

    /// Submit `spec` and wait for it under the configured timeout.
    pub async fn run(&self, spec: &JobSpec) -> Result<(JobId, Outcome), ClientRunError> {
        let job = self.submit(spec).await?;
        let outcome = self.monitor_submitted(&job, self.cfg.timeout).await?;
        Ok((job.job_id, outcome))
    }

    /// Stage every artifact under a fresh job id and hand the job to the coordinator.
    ///
    /// Nothing is submitted unless every artifact staged. A reserved id whose
    /// submission fails is killed so it does not linger as `NEW`.
    #[instrument(level = "info", skip_all, fields(script = %spec.script.display()))]
    pub async fn submit(&self, spec: &JobSpec) -> Result<SubmittedJob, SubmissionError> {
        let uploads = self.uploads(spec)?;

        let limits = self.api.cluster_info().await?;
        info!(target: "corral.core.client", max = %limits.max_capability, nodes = limits.node_count, "cluster info");

        let new_job = self.api.new_job().await?;
        let job_id = new_job.job_id.clone();
        debug!(target: "corral.core.client", job = %job_id, "job id reserved");

        match self.submit_reserved(spec, uploads, new_job).await {
            Ok(job) => Ok(job),
            Err(e) => {
                warn!(target: "corral.core.client", job = %job_id, error = %e, "submission failed, abandoning job id");
                if let Err(kill) = self.api.kill(&job_id).await {
                    warn!(target: "corral.core.client", job = %job_id, error = %kill, "could not kill abandoned job");
                }
                Err(e)
            }
        }
    }

    async fn submit_reserved(
        &self,
        spec: &JobSpec,
        uploads: Vec<(PathBuf, String)>,
        new_job: NewJob,
    ) -> Result<SubmittedJob, SubmissionError> {
        let job_id = new_job.job_id;
        let artifacts = self.stage_all(uploads, &job_id).await?;
        let script_location = artifacts
            .iter()
            .find(|a| a.logical_name == SCRIPT_ARTIFACT)
            .map(|a| a.remote_location.clone())
            .unwrap_or_default();

        let env = self
            .cfg
            .supervisor_env
            .clone()
            .with(ENV_SCRIPT_LOCATION, script_location)
            .with(ENV_JOB_ID, job_id.as_str());
        let context = LaunchContextBuilder::new()
            .artifacts(artifacts)
            .env(&env)
            .build(&CommandTemplate::supervisor(SUPERVISOR_ARTIFACT))?;

        let capability = self
            .cfg
            .supervisor_capability
            .unwrap_or(new_job.limits.max_capability);
        let submission = JobSubmission {
            job_id: job_id.clone(),
            job_name: spec
                .job_name
                .clone()
                .unwrap_or_else(|| self.cfg.job_name.clone()),
            priority: self.cfg.priority,
            supervisor_capability: capability,
            launch_context: context,
        };

        let accepted = self.api.submit(submission).await?;
        info!(target: "corral.core.client", job = %accepted, supervisor = %capability, "job submitted");
        Ok(SubmittedJob {
            job_id: accepted,
            submitted_at: Instant::now(),
        })
    }

    /// Monitor a job just returned by [`submit`](Self::submit).
    pub async fn monitor_submitted(
        &self,
        job: &SubmittedJob,
        timeout: Duration,
    ) -> Result<Outcome, MonitorError> {
        self.monitor_since(&job.job_id, job.submitted_at, timeout)
            .await
    }

    /// Poll until the job is terminal or `timeout` has elapsed, killing it in the latter case.
    pub async fn monitor(&self, job: &JobId, timeout: Duration) -> Result<Outcome, MonitorError> {
        self.monitor_since(job, Instant::now(), timeout).await
    }

    #[instrument(level = "info", skip_all, fields(job = %job, ?timeout))]
    async fn monitor_since(
        &self,
        job: &JobId,
        since: Instant,
        timeout: Duration,
    ) -> Result<Outcome, MonitorError> {
        loop {
            match self.api.status(job).await {
                Ok(report) => {
                    if let Some(outcome) = Outcome::from_state(report.state) {
                        info!(target: "corral.core.client", state = %report.state, diagnostics = %report.diagnostics, "job finished");
                        return Ok(outcome);
                    }
                    debug!(target: "corral.core.client", state = %report.state, "job active");
                }
                Err(e) if e.is_transient() => {
                    warn!(target: "corral.core.client", error = %e, "status unavailable, retrying");
                }
                Err(source) => {
                    return Err(MonitorError::Status {
                        job: job.clone(),
                        source,
                    });
                }
            }

            if since.elapsed() >= timeout {
                warn!(target: "corral.core.client", ?timeout, "deadline passed, killing job");
                self.kill(job).await;
                return Ok(Outcome::TimedOut);
            }
            tokio::time::sleep(self.cfg.poll_interval).await;
        }
    }

    async fn kill(&self, job: &JobId) {
        for attempt in 1..=KILL_ATTEMPTS {
            match self.api.kill(job).await {
                Ok(()) => return,
                // Already over; nothing left to kill.
                Err(CoordinatorError::JobTerminated { .. }) => return,
                Err(e) if e.is_transient() && attempt < KILL_ATTEMPTS => {
                    warn!(target: "corral.core.client", attempt, error = %e, "kill failed, retrying");
                    tokio::time::sleep(self.cfg.poll_interval).await;
                }
                Err(e) => {
                    warn!(target: "corral.core.client", error = %e, "kill request failed");
                    return;
                }
            }
        }
    }

    /// Local path and logical name of every artifact the job needs.
    fn uploads(&self, spec: &JobSpec) -> Result<Vec<(PathBuf, String)>, SubmissionError> {
        let mut uploads = vec![
            (self.cfg.supervisor_binary.clone(), SUPERVISOR_ARTIFACT.to_string()),
            (spec.script.clone(), SCRIPT_ARTIFACT.to_string()),
        ];
        for path in &spec.resources {
            uploads.push((path.clone(), resource_name(path)));
        }

        let mut seen = HashSet::new();
        for (_, name) in &uploads {
            if !name.is_empty() && !seen.insert(name.as_str()) {
                return Err(SubmissionError::InvalidSpec(format!(
                    "artifact name '{name}' is used twice"
                )));
            }
        }
        Ok(uploads)
    }

    /// Stage all uploads concurrently; any failure fails the whole batch.
    async fn stage_all(
        &self,
        uploads: Vec<(PathBuf, String)>,
        job: &JobId,
    ) -> Result<Vec<ArtifactDescriptor>, SubmissionError> {
        let mut set = JoinSet::new();
        for (idx, (path, name)) in uploads.into_iter().enumerate() {
            let stager = self.stager.clone();
            let job = job.clone();
            set.spawn(async move { (idx, stager.stage(&path, &name, &job).await) });
        }

        let mut staged = Vec::with_capacity(set.len());
        while let Some(joined) = set.join_next().await {
            let (idx, result) = joined.map_err(|e| SubmissionError::StagingTask(e.to_string()))?;
            match result {
                Ok(descriptor) => staged.push((idx, descriptor)),
                Err(e) => {
                    set.abort_all();
                    return Err(e.into());
                }
            }
        }
        staged.sort_by_key(|(idx, _)| *idx);
        Ok(staged.into_iter().map(|(_, d)| d).collect())
    }
}

fn resource_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
