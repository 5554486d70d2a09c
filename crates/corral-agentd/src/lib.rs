//! Shared command-line plumbing for the corral binaries:
//!
//! - `corrald` serves a [`LocalCluster`](corral_cluster::LocalCluster) over HTTP;
//! - `corral-submit` stages a script job, submits it and waits for the outcome;
//! - `corral-am` is the per-job supervisor the cluster starts.
pub mod cli;
pub use cli::{LogArgs, parse_capability, parse_node};
