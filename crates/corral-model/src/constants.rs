/// JSON-encoded [`ArtifactManifest`](crate::ArtifactManifest) of every artifact a launched process may use.
pub const ENV_ARTIFACTS: &str = "CORRAL_ARTIFACTS";
/// Remote location of the job script.
pub const ENV_SCRIPT_LOCATION: &str = "CORRAL_SCRIPT_LOCATION";
/// Job the launched supervisor belongs to.
pub const ENV_JOB_ID: &str = "CORRAL_JOB_ID";
/// Coordinator endpoint the launched supervisor talks to.
pub const ENV_COORDINATOR: &str = "CORRAL_COORDINATOR";
/// Root of the shared artifact store.
pub const ENV_STORE_ROOT: &str = "CORRAL_STORE_ROOT";
/// Container the process was started in.
pub const ENV_CONTAINER_ID: &str = "CORRAL_CONTAINER_ID";
pub const ENV_WORKER_COUNT: &str = "CORRAL_WORKER_COUNT";
pub const ENV_WORKER_MEMORY_MB: &str = "CORRAL_WORKER_MEMORY_MB";
pub const ENV_WORKER_VCORES: &str = "CORRAL_WORKER_VCORES";
/// Program the worker script is run with.
pub const ENV_WORKER_INTERPRETER: &str = "CORRAL_WORKER_INTERPRETER";

/// Log directory expansion token, substituted by the worker launcher.
pub const LOG_DIR_TOKEN: &str = "<LOG_DIR>";

/// Logical name the job script is staged under.
pub const SCRIPT_ARTIFACT: &str = "script.py";
/// Logical name the supervisor executable is staged under.
pub const SUPERVISOR_ARTIFACT: &str = "corral-am";
