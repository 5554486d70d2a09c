use std::path::PathBuf;

use corral_model::ResourceCapability;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("cluster has no nodes")]
    NoNodes,
    #[error("duplicate node name '{0}'")]
    DuplicateNode(String),
    #[error("no node can host the maximum capability {0}")]
    MaxTooLarge(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeConfig {
    pub name: String,
    /// Total resources the node hands out.
    pub capability: ResourceCapability,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterConfig {
    pub nodes: Vec<NodeConfig>,
    /// Largest single container the cluster grants.
    pub max_capability: ResourceCapability,
    /// Parent of every container work directory.
    pub work_root: PathBuf,
    /// Root of the shared artifact store.
    pub store_root: PathBuf,
    /// Coordinator address handed to supervisors, if they should call back over HTTP.
    #[serde(default)]
    pub advertised_endpoint: Option<String>,
    #[serde(default)]
    pub enforce_memory_limit: bool,
}

impl ClusterConfig {
    /// One node named after this host.
    pub fn single_node(capability: ResourceCapability) -> Self {
        let name = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "localhost".to_string());
        let base = std::env::temp_dir().join("corral");
        Self {
            nodes: vec![NodeConfig { name, capability }],
            max_capability: capability,
            work_root: base.join("work"),
            store_root: base.join("store"),
            advertised_endpoint: None,
            enforce_memory_limit: false,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.nodes.is_empty() {
            return Err(ConfigError::NoNodes);
        }
        for (i, node) in self.nodes.iter().enumerate() {
            if self.nodes[..i].iter().any(|n| n.name == node.name) {
                return Err(ConfigError::DuplicateNode(node.name.clone()));
            }
        }
        if !self
            .nodes
            .iter()
            .any(|n| self.max_capability.fits_within(&n.capability))
        {
            return Err(ConfigError::MaxTooLarge(self.max_capability.to_string()));
        }
        Ok(())
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self::single_node(ResourceCapability::new(8192, 8).unwrap_or(ResourceCapability::MIN))
    }
}
