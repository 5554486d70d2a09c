use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    process::Stdio,
    sync::Arc,
    time::Duration,
};

use corral_core::LaunchError;
use corral_model::{ContainerHandle, ContainerId, ExitStatus, LaunchContext};
use corral_store::ArtifactStore;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace, warn};

use crate::{
    command::render_command,
    error::ExecError,
    limits::{RlimitConfig, attach_rlimits},
    localize::localize,
    util::kill_graceful,
};

#[derive(Debug, Clone)]
pub struct ExecConfig {
    /// Parent of every container work directory.
    pub work_root: PathBuf,
    /// Cap each process's address space at its capability's memory.
    pub enforce_memory_limit: bool,
    /// Time between SIGTERM and SIGKILL on cancellation.
    pub kill_grace: Duration,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            work_root: std::env::temp_dir().join("corral"),
            enforce_memory_limit: false,
            kill_grace: Duration::from_secs(5),
        }
    }
}

/// Starts container processes on one node.
pub struct NodeExecutor {
    store: Arc<dyn ArtifactStore>,
    cfg: ExecConfig,
}

impl NodeExecutor {
    pub fn new(store: Arc<dyn ArtifactStore>, cfg: ExecConfig) -> Self {
        Self { store, cfg }
    }

    pub fn config(&self) -> &ExecConfig {
        &self.cfg
    }

    pub fn work_dir(&self, container: &ContainerId) -> PathBuf {
        self.cfg.work_root.join(container.as_str())
    }

    /// Localize the context's artifacts and spawn its command.
    ///
    /// `extra_env` is layered over the context environment. The returned
    /// process is killed when `cancel` fires or when it is dropped.
    #[instrument(level = "debug", skip_all, fields(container = %container.container_id))]
    pub async fn start(
        &self,
        container: &ContainerHandle,
        ctx: &LaunchContext,
        extra_env: &BTreeMap<String, String>,
        cancel: CancellationToken,
    ) -> Result<RunningContainer, LaunchError> {
        if ctx.command.is_empty() {
            return Err(ExecError::EmptyCommand.into());
        }
        let work_dir = self.work_dir(&container.container_id);
        let log_dir = work_dir.join("logs");
        tokio::fs::create_dir_all(&log_dir)
            .await
            .map_err(|source| ExecError::Prepare {
                path: log_dir.clone(),
                source,
            })?;

        localize(self.store.as_ref(), &ctx.artifacts, &work_dir).await?;

        let line = render_command(ctx, &log_dir);
        let mut cmd = shell(&line);
        cmd.current_dir(&work_dir)
            .envs(&ctx.environment)
            .envs(extra_env)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        attach_rlimits(
            &mut cmd,
            &RlimitConfig::for_capability(&container.capability, self.cfg.enforce_memory_limit),
        );

        trace!(target: "corral.exec.proc", command = %line, "spawn");
        let child = cmd.spawn().map_err(|e| LaunchError::Spawn {
            reason: e.to_string(),
        })?;
        debug!(target: "corral.exec.proc", pid = ?child.id(), "started");

        Ok(RunningContainer {
            container_id: container.container_id.clone(),
            work_dir,
            log_dir,
            child,
            cancel,
            grace: self.cfg.kill_grace,
        })
    }
}

fn shell(line: &str) -> Command {
    cfg_if::cfg_if! {
        if #[cfg(target_family = "windows")] {
            let mut cmd = Command::new("cmd");
            cmd.arg("/C").arg(line);
        } else {
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(line);
        }
    }
    cmd
}

/// A spawned container process.
pub struct RunningContainer {
    container_id: ContainerId,
    work_dir: PathBuf,
    log_dir: PathBuf,
    child: Child,
    cancel: CancellationToken,
    grace: Duration,
}

impl RunningContainer {
    pub fn id(&self) -> &ContainerId {
        &self.container_id
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Wait for the process to exit, or kill it once the token is cancelled.
    pub async fn wait(mut self) -> ExitStatus {
        tokio::select! {
            status = self.child.wait() => match status {
                Ok(status) => match status.code() {
                    Some(code) => {
                        debug!(target: "corral.exec.proc", container = %self.container_id, code, "exited");
                        ExitStatus::Exited { code }
                    }
                    None => ExitStatus::Killed,
                },
                Err(e) => ExitStatus::Aborted { reason: format!("wait: {e}") },
            },
            _ = self.cancel.cancelled() => {
                debug!(target: "corral.exec.proc", container = %self.container_id, "cancelled; killing child");
                if let Err(e) = kill_graceful(&mut self.child, self.grace).await {
                    warn!(target: "corral.exec.proc", container = %self.container_id, error = %e, "kill failed");
                }
                ExitStatus::Killed
            }
        }
    }
}
