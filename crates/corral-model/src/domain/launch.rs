use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ArtifactDescriptor;

/// Everything a launcher needs to start one process on a node.
///
/// `command` tokens are already shell-safe; joining them with single spaces
/// yields the command line to hand to `sh -c`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchContext {
    pub artifacts: BTreeMap<String, ArtifactDescriptor>,
    pub environment: BTreeMap<String, String>,
    pub command: Vec<String>,
}

impl LaunchContext {
    /// Command line as a single shell string.
    pub fn command_line(&self) -> String {
        self.command.join(" ")
    }
}
