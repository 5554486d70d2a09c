use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Priority, ResourceCapability};

/// Coordinator-assigned container identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerId(String);

impl ContainerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reference to a cluster node (the worker launcher that owns a container).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeRef(String);

impl NodeRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Cluster-wide limits reported on registration and on new-job requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterLimits {
    pub max_capability: ResourceCapability,
    pub node_count: u32,
}

/// Outstanding ask for `count` containers of one shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationRequest {
    pub capability: ResourceCapability,
    pub priority: Priority,
    pub count: u32,
}

/// A granted container slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerHandle {
    pub container_id: ContainerId,
    pub node: NodeRef,
    pub capability: ResourceCapability,
}

/// How a container ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum ExitStatus {
    /// The process exited on its own.
    Exited { code: i32 },
    /// Terminated by a signal, a kill request or job termination.
    Killed,
    /// Never ran to completion (launch failure, released, lost node).
    Aborted { reason: String },
}

impl ExitStatus {
    pub fn success(&self) -> bool {
        matches!(self, ExitStatus::Exited { code: 0 })
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitStatus::Exited { code } => write!(f, "exited({code})"),
            ExitStatus::Killed => f.write_str("killed"),
            ExitStatus::Aborted { reason } => write!(f, "aborted({reason})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedContainer {
    pub handle: ContainerHandle,
    pub status: ExitStatus,
}

/// One scheduler round-trip from the supervisor.
///
/// `asks` is the full outstanding table, not a delta: the coordinator replaces
/// whatever it recorded previously, so repeating a call never double-asks.
/// `response_id` acknowledges the last [`AllocationUpdate`] received; `0`
/// before the first one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AllocateCall {
    #[serde(default)]
    pub response_id: u64,
    pub asks: Vec<AllocationRequest>,
    #[serde(default)]
    pub releases: Vec<ContainerId>,
    #[serde(default)]
    pub progress: f32,
}

/// Containers granted and containers finished since the last acknowledged round-trip.
///
/// An update whose `response_id` is not echoed back by the next call is
/// delivered again, merged into that call's update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AllocationUpdate {
    #[serde(default)]
    pub response_id: u64,
    #[serde(default)]
    pub allocated: Vec<ContainerHandle>,
    #[serde(default)]
    pub completed: Vec<CompletedContainer>,
}

impl AllocationUpdate {
    pub fn is_empty(&self) -> bool {
        self.allocated.is_empty() && self.completed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_zero_exit_is_success() {
        assert!(ExitStatus::Exited { code: 0 }.success());
        assert!(!ExitStatus::Exited { code: 2 }.success());
        assert!(!ExitStatus::Killed.success());
        assert!(!ExitStatus::Aborted { reason: "x".into() }.success());
    }

    #[test]
    fn exit_status_is_tagged() {
        let json = serde_json::to_string(&ExitStatus::Exited { code: 3 }).unwrap();
        assert_eq!(json, r#"{"kind":"exited","code":3}"#);
    }

    #[test]
    fn empty_update() {
        assert!(AllocationUpdate::default().is_empty());
    }
}
