use std::{path::PathBuf, time::Duration};

use corral_model::{Env, Priority, ResourceCapability, constants::SUPERVISOR_ARTIFACT};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(10_000_000);

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Cadence of status polls while monitoring.
    pub poll_interval: Duration,
    /// Deadline after submission; an unfinished job is killed once it passes.
    pub timeout: Duration,
    pub priority: Priority,
    pub job_name: String,
    /// Local path of the supervisor executable staged with every job.
    pub supervisor_binary: PathBuf,
    /// Supervisor slot size. Defaults to the cluster's maximum capability.
    pub supervisor_capability: Option<ResourceCapability>,
    /// Extra environment handed to the supervisor.
    pub supervisor_env: Env,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            timeout: DEFAULT_TIMEOUT,
            priority: 0,
            job_name: "corral".to_string(),
            supervisor_binary: PathBuf::from(SUPERVISOR_ARTIFACT),
            supervisor_capability: None,
            supervisor_env: Env::new(),
        }
    }
}
