//! POSIX rlimits applied to container processes.
//!
//! On Unix the limits are installed in a `pre_exec` hook, so they are in
//! place before the container command starts. Elsewhere a non-empty
//! configuration is logged and ignored.
use corral_model::ResourceCapability;
use tokio::process::Command;
#[cfg(not(unix))]
use tracing::warn;

const MIB: u64 = 1024 * 1024;

/// Limits for one container process. `None` keeps the inherited limit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RlimitConfig {
    /// Virtual memory ceiling (`RLIMIT_AS`).
    pub max_address_space_bytes: Option<u64>,
    /// `RLIMIT_NOFILE`.
    pub max_open_files: Option<u64>,
    /// `RLIMIT_CORE = 0` when set.
    pub disable_core_dumps: bool,
}

impl RlimitConfig {
    /// Limits derived from a container's capability.
    ///
    /// Memory maps to `RLIMIT_AS` only with `enforce_memory`; vcores are not enforced.
    pub fn for_capability(capability: &ResourceCapability, enforce_memory: bool) -> Self {
        Self {
            max_address_space_bytes: enforce_memory
                .then(|| u64::from(capability.memory_mb()) * MIB),
            max_open_files: None,
            disable_core_dumps: true,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.max_address_space_bytes.is_none()
            && self.max_open_files.is_none()
            && !self.disable_core_dumps
    }
}

pub fn attach_rlimits(cmd: &mut Command, config: &RlimitConfig) {
    if config.is_empty() {
        return;
    }

    #[cfg(unix)]
    {
        unix_impl::attach_rlimits(cmd, config);
    }

    #[cfg(not(unix))]
    {
        let _ = cmd;
        warn!(target: "corral.exec.limits", ?config, "rlimits are not supported on this OS; ignored");
    }
}

#[cfg(unix)]
mod unix_impl {
    use std::io;

    use tokio::process::Command;

    use super::RlimitConfig;

    cfg_if::cfg_if! {
        if #[cfg(all(target_os = "linux", target_env = "gnu"))] {
            type Resource = libc::__rlimit_resource_t;
        } else {
            type Resource = libc::c_int;
        }
    }

    pub fn attach_rlimits(cmd: &mut Command, config: &RlimitConfig) {
        let RlimitConfig {
            max_address_space_bytes,
            max_open_files,
            disable_core_dumps,
        } = *config;

        // SAFETY: the hook only calls async-signal-safe `setrlimit`.
        unsafe {
            cmd.pre_exec(move || {
                if let Some(bytes) = max_address_space_bytes {
                    apply_rlimit(libc::RLIMIT_AS, bytes)?;
                }
                if let Some(nofile) = max_open_files {
                    apply_rlimit(libc::RLIMIT_NOFILE, nofile)?;
                }
                if disable_core_dumps {
                    apply_rlimit(libc::RLIMIT_CORE, 0)?;
                }
                Ok(())
            });
        }
    }

    fn apply_rlimit(resource: Resource, value: u64) -> io::Result<()> {
        let rlim = libc::rlimit {
            rlim_cur: value as libc::rlim_t,
            rlim_max: value as libc::rlim_t,
        };
        let rc = unsafe { libc::setrlimit(resource, &rlim) };
        if rc != 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }
}
