//! Sparse chunked engine.
//!
//! Variables are always chunked. Chunks are allocated on first write, so an
//! unwritten region costs nothing and reads back as the fill value. Packed
//! chunks may be stored zlib-compressed; inflated chunks are kept in an LRU
//! cache shared by every chunked engine built from one factory.
//!
//! Removing a variable that still has open handles is refused.

mod cache;
mod variable;

pub use cache::{CacheStats, ChunkCache};
pub(crate) use variable::ChunkedVariable;

use std::sync::Arc;

use obs_common::{Dimensions, ObsError, ObsResult};
use parking_lot::Mutex;
use tracing::info;

use super::{Engine, EngineCore, MemoryAttributes, TreeGroup};
use crate::backend::{GroupBackend, VariableBackend};
use crate::capabilities::{CapabilityMask, Capabilities};
use crate::config::{EngineConfig, EngineKind};
use crate::context::EngineContext;
use crate::fill::FillValuePolicy;
use crate::params::{Chunking, VariableCreationParams};
use crate::types::TypeDescriptor;

pub(crate) struct ChunkedEngine {
    core: Arc<EngineCore>,
    cache: Arc<Mutex<ChunkCache>>,
}

impl ChunkedEngine {
    /// `cache` may be shared with other engine instances; keys carry the
    /// variable's object id.
    pub(crate) fn new(
        context: Arc<EngineContext>,
        config: EngineConfig,
        cache: Arc<Mutex<ChunkCache>>,
    ) -> Arc<Self> {
        let core = Arc::new(EngineCore::new(EngineKind::Chunked, context, config));
        info!(
            engine = %core.id,
            max_chunk_elements = core.config.max_chunk_elements,
            gzip_level = core.config.default_gzip_level,
            "Created chunked engine"
        );
        Arc::new(Self { core, cache })
    }

    pub(crate) fn root(self: &Arc<Self>) -> Arc<dyn GroupBackend> {
        TreeGroup::root(Arc::clone(self))
    }
}

impl Engine for ChunkedEngine {
    type Variable = ChunkedVariable;

    fn core(&self) -> &Arc<EngineCore> {
        &self.core
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            can_chunk: CapabilityMask::Supported,
            can_compress_with_gzip: CapabilityMask::Supported,
            can_compress_with_szip: CapabilityMask::Unsupported,
            mpi_aware: CapabilityMask::Unsupported,
        }
    }

    fn default_fill_policy(&self, root_attributes: &MemoryAttributes) -> FillValuePolicy {
        if root_attributes.has_netcdf4_marker() {
            FillValuePolicy::NetCdf4
        } else {
            FillValuePolicy::Hdf5
        }
    }

    fn create_variable(
        self: &Arc<Self>,
        descriptor: &TypeDescriptor,
        dims: &Dimensions,
        params: &VariableCreationParams,
    ) -> ObsResult<Arc<ChunkedVariable>> {
        let mut params = params.clone();
        if params.chunking == Chunking::None {
            params.chunking = Chunking::Auto;
        }
        ChunkedVariable::new(&self.core, Arc::clone(&self.cache), descriptor, dims, &params)
    }

    fn release_variable(&self, variable: &Arc<ChunkedVariable>) -> ObsResult<()> {
        let handles = Arc::strong_count(variable) - 1;
        if handles > 0 {
            return Err(ObsError::backend("variable is still open")
                .with("id", variable.object_id())
                .with("open_handles", handles));
        }
        Ok(())
    }
}
