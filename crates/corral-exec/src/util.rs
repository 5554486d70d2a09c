use std::time::Duration;

use tokio::process::Child;
use tracing::trace;

/// SIGTERM, wait up to `grace`, then SIGKILL.
#[cfg(unix)]
pub async fn kill_graceful(child: &mut Child, grace: Duration) -> std::io::Result<()> {
    if let Some(pid) = child.id() {
        // SAFETY: plain syscall on a pid we own; a stale pid only yields ESRCH.
        let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
        trace!(target: "corral.exec.proc", pid, rc, "sent SIGTERM");
        if let Ok(status) = tokio::time::timeout(grace, child.wait()).await {
            return status.map(|_| ());
        }
    }
    child.kill().await
}

#[cfg(not(unix))]
pub async fn kill_graceful(child: &mut Child, _grace: Duration) -> std::io::Result<()> {
    trace!(target: "corral.exec.proc", "killing child");
    child.kill().await
}
