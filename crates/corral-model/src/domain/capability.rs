use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ModelError;

/// Amount of machine resource a container reserves.
///
/// Both dimensions are at least 1. Fields are private so a capability can only
/// be obtained through [`ResourceCapability::new`] or validated deserialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawCapability", rename_all = "camelCase")]
pub struct ResourceCapability {
    memory_mb: u32,
    vcores: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCapability {
    memory_mb: u32,
    vcores: u32,
}

impl TryFrom<RawCapability> for ResourceCapability {
    type Error = ModelError;

    fn try_from(raw: RawCapability) -> Result<Self, Self::Error> {
        ResourceCapability::new(raw.memory_mb, raw.vcores)
    }
}

impl ResourceCapability {
    /// Smallest valid capability, `<memory:1MB, vcores:1>`.
    pub const MIN: Self = Self {
        memory_mb: 1,
        vcores: 1,
    };

    pub fn new(memory_mb: u32, vcores: u32) -> Result<Self, ModelError> {
        if memory_mb == 0 {
            return Err(ModelError::InvalidCapability("memoryMB must be >= 1".into()));
        }
        if vcores == 0 {
            return Err(ModelError::InvalidCapability("vcores must be >= 1".into()));
        }
        Ok(Self { memory_mb, vcores })
    }

    #[inline]
    pub fn memory_mb(&self) -> u32 {
        self.memory_mb
    }

    #[inline]
    pub fn vcores(&self) -> u32 {
        self.vcores
    }

    /// Returns `true` if `self` fits inside `limit` on both dimensions.
    pub fn fits_within(&self, limit: &ResourceCapability) -> bool {
        self.memory_mb <= limit.memory_mb && self.vcores <= limit.vcores
    }
}

impl fmt::Display for ResourceCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<memory:{}MB, vcores:{}>", self.memory_mb, self.vcores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_dimensions_are_rejected() {
        assert!(ResourceCapability::new(0, 1).is_err());
        assert!(ResourceCapability::new(128, 0).is_err());
        assert!(ResourceCapability::new(128, 1).is_ok());
    }

    #[test]
    fn fits_within_checks_both_dimensions() {
        let small = ResourceCapability::new(128, 1).unwrap();
        let big = ResourceCapability::new(1024, 4).unwrap();
        let wide = ResourceCapability::new(64, 8).unwrap();

        assert!(small.fits_within(&big));
        assert!(!big.fits_within(&small));
        assert!(!wide.fits_within(&big));
    }

    #[test]
    fn deserialization_validates() {
        let ok: ResourceCapability = serde_json::from_str(r#"{"memoryMb":128,"vcores":1}"#).unwrap();
        assert_eq!(ok.memory_mb(), 128);

        let bad = serde_json::from_str::<ResourceCapability>(r#"{"memoryMb":0,"vcores":1}"#);
        assert!(bad.is_err());
    }
}
