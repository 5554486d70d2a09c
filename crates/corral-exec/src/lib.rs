//! Starting container processes on a node.
//!
//! A [`NodeExecutor`] turns a [`LaunchContext`](corral_model::LaunchContext)
//! into a running process: artifacts are fetched and checked against their
//! descriptors, the command runs under `sh -c` in a per-container work directory,
//! and the process can be cancelled with a graceful kill.
mod error;
pub use error::ExecError;

mod localize;
pub use localize::localize;

mod command;
pub use command::render_command;

pub mod limits;
pub use limits::RlimitConfig;

mod util;
pub use util::kill_graceful;

mod proc;
pub use proc::{ExecConfig, NodeExecutor, RunningContainer};
