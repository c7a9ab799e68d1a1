//! Optional engine features and how an engine treats requests for them.

use obs_common::{ObsError, ObsResult};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Support level of one optional feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CapabilityMask {
    Supported,
    Unsupported,
    /// Requests are accepted and recorded, but not applied.
    Ignored,
}

impl CapabilityMask {
    /// Decide what to do with a request for `feature`.
    ///
    /// Returns `Ok(true)` when the engine applies it, `Ok(false)` when the
    /// engine only records it, and `UnsupportedFeature` otherwise.
    pub fn admit(self, feature: &str) -> ObsResult<bool> {
        match self {
            CapabilityMask::Supported => Ok(true),
            CapabilityMask::Ignored => {
                warn!(feature = %feature, "Engine ignores requested feature");
                Ok(false)
            }
            CapabilityMask::Unsupported => Err(ObsError::unsupported_feature(
                "engine does not support the requested feature",
            )
            .with("feature", feature)),
        }
    }
}

/// Feature support of one engine instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub can_chunk: CapabilityMask,
    pub can_compress_with_gzip: CapabilityMask,
    pub can_compress_with_szip: CapabilityMask,
    pub mpi_aware: CapabilityMask,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            can_chunk: CapabilityMask::Unsupported,
            can_compress_with_gzip: CapabilityMask::Unsupported,
            can_compress_with_szip: CapabilityMask::Unsupported,
            mpi_aware: CapabilityMask::Unsupported,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obs_common::ErrorKind;

    #[test]
    fn test_admit() {
        assert!(CapabilityMask::Supported.admit("chunking").unwrap());
        assert!(!CapabilityMask::Ignored.admit("gzip").unwrap());
        let err = CapabilityMask::Unsupported.admit("szip").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedFeature);
        assert_eq!(err.context().get("feature"), Some("szip"));
    }
}
