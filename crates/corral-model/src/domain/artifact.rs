use serde::{Deserialize, Serialize};

use crate::{EpochMillis, ModelError};

/// Who may share a localized copy of an artifact on a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum Visibility {
    /// Visible to containers of the owning job only.
    #[default]
    Private,
    /// May be cached and shared between jobs on a node.
    Public,
}

/// Addressable reference to a file staged in shared storage.
///
/// `size_bytes` and `last_modified` are captured *after* the copy completed
/// and let a launcher reject a stale or truncated remote file before use.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactDescriptor {
    pub logical_name: String,
    pub remote_location: String,
    pub size_bytes: u64,
    pub last_modified: EpochMillis,
    #[serde(default)]
    pub visibility: Visibility,
}

impl ArtifactDescriptor {
    /// Same artifact, re-published with a different visibility.
    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }
}

/// Ordered list of artifact records carried in a single environment entry.
///
/// A freshly started supervisor or worker parses it once at startup to
/// rediscover its inputs without contacting the client.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactManifest(Vec<ArtifactDescriptor>);

impl ArtifactManifest {
    /// Build a manifest; logical names must be unique.
    pub fn new(artifacts: Vec<ArtifactDescriptor>) -> Result<Self, ModelError> {
        for (i, a) in artifacts.iter().enumerate() {
            if artifacts[..i].iter().any(|b| b.logical_name == a.logical_name) {
                return Err(ModelError::DuplicateArtifact(a.logical_name.clone()));
            }
        }
        Ok(Self(artifacts))
    }

    pub fn get(&self, logical_name: &str) -> Option<&ArtifactDescriptor> {
        self.0.iter().find(|a| a.logical_name == logical_name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ArtifactDescriptor> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Vec<ArtifactDescriptor> {
        self.0
    }

    /// Encode as the value of the manifest environment entry.
    pub fn to_env_value(&self) -> String {
        // A Vec of plain records cannot fail to serialize.
        serde_json::to_string(&self.0).unwrap_or_else(|_| "[]".to_string())
    }

    /// Decode the manifest environment entry, re-checking name uniqueness.
    pub fn from_env_value(value: &str) -> Result<Self, ModelError> {
        let records: Vec<ArtifactDescriptor> = serde_json::from_str(value)
            .map_err(|e| ModelError::InvalidManifest(e.to_string()))?;
        Self::new(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(name: &str) -> ArtifactDescriptor {
        ArtifactDescriptor {
            logical_name: name.to_string(),
            remote_location: format!("file:///store/job_1/{name}"),
            size_bytes: 42,
            last_modified: 1_700_000_000_000,
            visibility: Visibility::Private,
        }
    }

    #[test]
    fn manifest_rejects_duplicate_names() {
        let err = ArtifactManifest::new(vec![descriptor("a"), descriptor("a")]).unwrap_err();
        assert_eq!(err, ModelError::DuplicateArtifact("a".into()));
    }

    #[test]
    fn manifest_env_value_preserves_order_and_metadata() {
        let manifest =
            ArtifactManifest::new(vec![descriptor("script.py"), descriptor("input.txt")]).unwrap();

        let parsed = ArtifactManifest::from_env_value(&manifest.to_env_value()).unwrap();

        let names: Vec<_> = parsed.iter().map(|a| a.logical_name.as_str()).collect();
        assert_eq!(names, ["script.py", "input.txt"]);
        assert_eq!(parsed.get("input.txt").unwrap().size_bytes, 42);
    }

    #[test]
    fn manifest_rejects_garbage() {
        assert!(matches!(
            ArtifactManifest::from_env_value("not json"),
            Err(ModelError::InvalidManifest(_))
        ));
    }

    #[test]
    fn visibility_defaults_to_private_when_absent() {
        let json = r#"{"logicalName":"a","remoteLocation":"file:///a","sizeBytes":1,"lastModified":2}"#;
        let d: ArtifactDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(d.visibility, Visibility::Private);
    }
}
