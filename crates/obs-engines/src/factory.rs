//! Factory for engine instances.
//!
//! The `EngineFactory` manages:
//! - The [`EngineContext`] that numbers every engine and object it builds
//! - A `ChunkCache` shared by every chunked engine
//! - Common configuration settings
//!
//! # Example
//!
//! ```rust,ignore
//! use obs_engines::{EngineConfig, EngineFactory, EngineKind};
//!
//! let factory = EngineFactory::new(EngineConfig::from_env())?;
//! let root = factory.create_root()?;
//! let chunked = factory.create_root_with(EngineKind::Chunked)?;
//! ```

use std::sync::Arc;

use obs_common::{ObsError, ObsResult};
use parking_lot::Mutex;

use crate::config::{EngineConfig, EngineKind};
use crate::context::EngineContext;
use crate::engines::chunked::{CacheStats, ChunkCache, ChunkedEngine};
use crate::engines::obsstore::ObsStoreEngine;
use crate::frontend::Group;

/// Builds root groups of fresh engine instances.
///
/// Two roots from one factory are distinct engine instances: objects of one
/// cannot be linked to objects of the other.
pub struct EngineFactory {
    config: EngineConfig,
    context: Arc<EngineContext>,
    chunk_cache: Arc<Mutex<ChunkCache>>,
}

impl EngineFactory {
    /// Create a factory with its own context. Fails with `InvalidArgument`
    /// when the configuration does not validate.
    pub fn new(config: EngineConfig) -> ObsResult<Self> {
        Self::with_context(config, Arc::new(EngineContext::new()))
    }

    /// Create a factory that draws identifiers from `context`.
    pub fn with_context(config: EngineConfig, context: Arc<EngineContext>) -> ObsResult<Self> {
        config
            .validate()
            .map_err(|reason| ObsError::invalid_argument(reason).with("operation", "EngineFactory::new"))?;
        let chunk_cache = Arc::new(Mutex::new(ChunkCache::new(config.chunk_cache_size_bytes())));
        Ok(Self {
            config,
            context,
            chunk_cache,
        })
    }

    /// Create a factory configured from the environment.
    pub fn from_env() -> ObsResult<Self> {
        Self::new(EngineConfig::from_env())
    }

    /// Root group of a new instance of the configured engine.
    pub fn create_root(&self) -> ObsResult<Group> {
        self.create_root_with(self.config.engine)
    }

    /// Root group of a new instance of `kind`.
    pub fn create_root_with(&self, kind: EngineKind) -> ObsResult<Group> {
        let context = Arc::clone(&self.context);
        let config = self.config.clone();
        let root = match kind {
            EngineKind::ObsStore => ObsStoreEngine::new(context, config).root(),
            EngineKind::Chunked => {
                ChunkedEngine::new(context, config, Arc::clone(&self.chunk_cache)).root()
            }
        };
        Ok(Group::from_backend(root))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn context(&self) -> &Arc<EngineContext> {
        &self.context
    }

    /// Get chunk cache statistics for monitoring.
    pub fn cache_stats(&self) -> CacheStats {
        self.chunk_cache.lock().stats()
    }

    /// Clear the chunk cache.
    ///
    /// # Returns
    /// Tuple of (entries cleared, bytes freed)
    pub fn clear_chunk_cache(&self) -> (usize, u64) {
        let mut cache = self.chunk_cache.lock();
        let stats = cache.stats();
        cache.clear();
        (stats.entries, stats.memory_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obs_common::ErrorKind;

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = EngineConfig {
            default_gzip_level: 0,
            ..Default::default()
        };
        let err = EngineFactory::new(config).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_roots_are_distinct_engines() {
        let factory = EngineFactory::new(EngineConfig::default()).unwrap();
        let a = factory.create_root().unwrap();
        let b = factory.create_root().unwrap();
        assert_ne!(a.engine_id().unwrap(), b.engine_id().unwrap());
        assert_eq!(
            a.engine_id().unwrap().to_string().split('#').next(),
            Some(factory.context().session().to_string().as_str())
        );
    }

    #[test]
    fn test_create_root_with_each_kind() {
        let factory = EngineFactory::new(EngineConfig::default()).unwrap();
        for kind in EngineKind::ALL {
            let root = factory.create_root_with(kind).unwrap();
            assert!(root.is_bound());
        }
        assert_eq!(factory.clear_chunk_cache(), (0, 0));
        assert_eq!(factory.cache_stats().entries, 0);
    }
}
