use std::time::Duration;

use corral_model::{Priority, ResourceCapability, constants::SCRIPT_ARTIFACT};

const DEFAULT_WORKER_MEMORY_MB: u32 = 128;
const DEFAULT_WORKER_VCORES: u32 = 1;

/// Fixed parameters of a supervisor run.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Number of worker containers to request and see through to completion.
    pub worker_count: u32,
    pub worker_capability: ResourceCapability,
    pub priority: Priority,
    /// Sleep between allocate round-trips.
    pub poll_interval: Duration,
    /// Upper bound for a single allocate round-trip.
    pub poll_timeout: Duration,
    /// Program the worker script is run with, one entry per word.
    pub interpreter: Vec<String>,
    /// Logical name of the script artifact.
    pub script_name: String,
}

impl SupervisorConfig {
    pub fn default_worker_capability() -> ResourceCapability {
        ResourceCapability::new(DEFAULT_WORKER_MEMORY_MB, DEFAULT_WORKER_VCORES)
            .unwrap_or(ResourceCapability::MIN)
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            worker_count: 1,
            worker_capability: Self::default_worker_capability(),
            priority: 0,
            poll_interval: Duration::from_millis(100),
            poll_timeout: Duration::from_secs(5),
            interpreter: vec!["/usr/bin/env".to_string(), "python".to_string()],
            script_name: SCRIPT_ARTIFACT.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_launcher_constants() {
        let cfg = SupervisorConfig::default();
        assert_eq!(cfg.worker_count, 1);
        assert_eq!(cfg.worker_capability.memory_mb(), 128);
        assert_eq!(cfg.worker_capability.vcores(), 1);
        assert_eq!(cfg.priority, 0);
        assert_eq!(cfg.poll_interval, Duration::from_millis(100));
        assert_eq!(cfg.script_name, "script.py");
        assert_eq!(cfg.interpreter, ["/usr/bin/env", "python"]);
    }
}
