//! Configuration for engine construction.

use serde::{Deserialize, Serialize};

use crate::fill::FillValuePolicy;

/// Which in-process engine backs a root group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Dense in-memory key/value store.
    #[default]
    ObsStore,
    /// Sparse chunked in-memory store.
    Chunked,
}

impl EngineKind {
    pub const ALL: [EngineKind; 2] = [EngineKind::ObsStore, EngineKind::Chunked];

    /// Parse from string (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "obsstore" | "obs_store" => Some(Self::ObsStore),
            "chunked" => Some(Self::Chunked),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ObsStore => "obsstore",
            Self::Chunked => "chunked",
        }
    }
}

/// Configuration for the engine factory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Engine used by `EngineFactory::create_root`.
    pub engine: EngineKind,

    /// Gzip level applied when a variable asks for gzip without a level (1-9).
    pub default_gzip_level: u8,

    /// Upper bound on the element count of an automatically sized chunk.
    pub max_chunk_elements: usize,

    /// Memory budget for the decompressed-chunk cache in megabytes.
    pub chunk_cache_size_mb: usize,

    /// Overrides the engine-derived fill-value policy when set.
    pub fill_value_policy: Option<FillValuePolicy>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            engine: EngineKind::ObsStore,
            default_gzip_level: 6,
            max_chunk_elements: 65536,
            chunk_cache_size_mb: 64,
            fill_value_policy: None,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("OBS_ENGINE") {
            if let Some(kind) = EngineKind::parse(&val) {
                config.engine = kind;
            }
        }

        if let Ok(val) = std::env::var("OBS_GZIP_LEVEL") {
            if let Ok(level) = val.parse() {
                config.default_gzip_level = level;
            }
        }

        if let Ok(val) = std::env::var("OBS_MAX_CHUNK_ELEMENTS") {
            if let Ok(n) = val.parse() {
                config.max_chunk_elements = n;
            }
        }

        if let Ok(val) = std::env::var("OBS_CHUNK_CACHE_SIZE_MB") {
            if let Ok(mb) = val.parse() {
                config.chunk_cache_size_mb = mb;
            }
        }

        if let Ok(val) = std::env::var("OBS_FILL_POLICY") {
            config.fill_value_policy = FillValuePolicy::parse(&val);
        }

        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.default_gzip_level == 0 || self.default_gzip_level > 9 {
            return Err("default_gzip_level must be 1-9".to_string());
        }

        if self.max_chunk_elements == 0 {
            return Err("max_chunk_elements must be > 0".to_string());
        }

        if self.chunk_cache_size_mb == 0 {
            return Err("chunk_cache_size_mb must be > 0".to_string());
        }

        Ok(())
    }

    /// Get the chunk cache size in bytes.
    pub fn chunk_cache_size_bytes(&self) -> usize {
        self.chunk_cache_size_mb.saturating_mul(1024 * 1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.default_gzip_level, 6);
        assert_eq!(config.engine, EngineKind::ObsStore);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = EngineConfig {
            default_gzip_level: 10,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = EngineConfig {
            max_chunk_elements: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = EngineConfig {
            chunk_cache_size_mb: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_chunk_cache_size_saturates() {
        let config = EngineConfig::default();
        assert_eq!(config.chunk_cache_size_bytes(), 64 * 1024 * 1024);

        let config = EngineConfig {
            chunk_cache_size_mb: usize::MAX,
            ..Default::default()
        };
        assert_eq!(config.chunk_cache_size_bytes(), usize::MAX);
    }

    #[test]
    fn test_engine_kind_parse() {
        assert_eq!(EngineKind::parse("Chunked"), Some(EngineKind::Chunked));
        assert_eq!(EngineKind::parse("OBSSTORE"), Some(EngineKind::ObsStore));
        assert_eq!(EngineKind::parse("hdf5"), None);
    }

    #[test]
    fn test_config_serde() {
        let config = EngineConfig {
            engine: EngineKind::Chunked,
            fill_value_policy: Some(FillValuePolicy::NetCdf4),
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"chunked\""));
        assert!(json.contains("\"netcdf4\""));
        let back: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.engine, EngineKind::Chunked);
    }
}
