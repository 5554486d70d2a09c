//! In-process coordinator and worker launcher.
//!
//! [`LocalCluster`] implements every collaborator contract of `corral-core`
//! over a fixed set of named nodes: job lifecycle, first-fit container
//! allocation, and process execution through `corral-exec`.
mod config;
pub use config::{ClusterConfig, ConfigError, NodeConfig};

mod state;

mod cluster;
pub use cluster::LocalCluster;
