use std::{collections::HashMap, path::PathBuf};

use corral_model::{
    ArtifactManifest, JobId, ResourceCapability,
    constants::{
        ENV_ARTIFACTS, ENV_COORDINATOR, ENV_JOB_ID, ENV_SCRIPT_LOCATION, ENV_STORE_ROOT,
        ENV_WORKER_COUNT, ENV_WORKER_INTERPRETER, ENV_WORKER_MEMORY_MB, ENV_WORKER_VCORES,
    },
};

use crate::{error::SupervisorError, launch::split_words, supervisor::SupervisorConfig};

/// Everything a freshly started supervisor learns from its process environment.
#[derive(Debug, Clone)]
pub struct SupervisorEnv {
    pub job_id: JobId,
    pub coordinator: Option<String>,
    pub store_root: Option<PathBuf>,
    pub manifest: ArtifactManifest,
    pub script_location: Option<String>,
    pub worker_count: Option<u32>,
    pub worker_memory_mb: Option<u32>,
    pub worker_vcores: Option<u32>,
    /// Interpreter words, split with shell quoting rules.
    pub worker_interpreter: Option<Vec<String>>,
}

impl SupervisorEnv {
    /// Parse from the current process environment.
    pub fn from_process_env() -> Result<Self, SupervisorError> {
        Self::from_vars(std::env::vars())
    }

    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, SupervisorError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars: HashMap<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let get = |key: &str| vars.get(key).filter(|v| !v.is_empty()).cloned();

        let job_id = get(ENV_JOB_ID)
            .map(JobId::from)
            .ok_or_else(|| SupervisorError::Environment(format!("{ENV_JOB_ID} is not set")))?;
        let manifest = match get(ENV_ARTIFACTS) {
            Some(raw) => ArtifactManifest::from_env_value(&raw)
                .map_err(|e| SupervisorError::Environment(format!("{ENV_ARTIFACTS}: {e}")))?,
            None => {
                return Err(SupervisorError::Environment(format!(
                    "{ENV_ARTIFACTS} is not set"
                )));
            }
        };

        let worker_interpreter = get(ENV_WORKER_INTERPRETER)
            .map(|raw| split_words(&raw))
            .transpose()
            .map_err(|e| SupervisorError::Environment(format!("{ENV_WORKER_INTERPRETER}: {e}")))?
            .filter(|words| !words.is_empty());

        Ok(Self {
            job_id,
            coordinator: get(ENV_COORDINATOR),
            store_root: get(ENV_STORE_ROOT).map(PathBuf::from),
            manifest,
            script_location: get(ENV_SCRIPT_LOCATION),
            worker_count: parse_num(&vars, ENV_WORKER_COUNT)?,
            worker_memory_mb: parse_num(&vars, ENV_WORKER_MEMORY_MB)?,
            worker_vcores: parse_num(&vars, ENV_WORKER_VCORES)?,
            worker_interpreter,
        })
    }

    /// Apply the worker overrides carried in the environment on top of `cfg`.
    pub fn apply(&self, mut cfg: SupervisorConfig) -> Result<SupervisorConfig, SupervisorError> {
        if let Some(n) = self.worker_count {
            cfg.worker_count = n;
        }
        if let Some(interpreter) = &self.worker_interpreter {
            cfg.interpreter = interpreter.clone();
        }
        if self.worker_memory_mb.is_some() || self.worker_vcores.is_some() {
            let memory = self
                .worker_memory_mb
                .unwrap_or(cfg.worker_capability.memory_mb());
            let vcores = self.worker_vcores.unwrap_or(cfg.worker_capability.vcores());
            cfg.worker_capability = ResourceCapability::new(memory, vcores)
                .map_err(|e| SupervisorError::Environment(e.to_string()))?;
        }
        Ok(cfg)
    }
}

fn parse_num(vars: &HashMap<String, String>, key: &str) -> Result<Option<u32>, SupervisorError> {
    match vars.get(key).map(|v| v.trim()).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) => v
            .parse()
            .map(Some)
            .map_err(|_| SupervisorError::Environment(format!("{key}: '{v}' is not a number"))),
    }
}
