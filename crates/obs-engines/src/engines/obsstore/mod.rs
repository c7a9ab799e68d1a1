//! Dense in-memory engine.
//!
//! Every variable is one contiguous, row-major element buffer that is
//! filled eagerly at creation and re-laid out on resize. Chunking and
//! compression requests are recorded but not applied.

mod variable;

pub(crate) use variable::StoreVariable;

use std::sync::Arc;

use obs_common::{Dimensions, ObsResult};
use tracing::info;

use super::{Engine, EngineCore, MemoryAttributes, TreeGroup};
use crate::backend::GroupBackend;
use crate::capabilities::{CapabilityMask, Capabilities};
use crate::config::{EngineConfig, EngineKind};
use crate::context::EngineContext;
use crate::fill::FillValuePolicy;
use crate::params::VariableCreationParams;
use crate::types::TypeDescriptor;

pub(crate) struct ObsStoreEngine {
    core: Arc<EngineCore>,
}

impl ObsStoreEngine {
    pub(crate) fn new(context: Arc<EngineContext>, config: EngineConfig) -> Arc<Self> {
        let core = Arc::new(EngineCore::new(EngineKind::ObsStore, context, config));
        info!(engine = %core.id, "Created obsstore engine");
        Arc::new(Self { core })
    }

    pub(crate) fn root(self: &Arc<Self>) -> Arc<dyn GroupBackend> {
        TreeGroup::root(Arc::clone(self))
    }
}

impl Engine for ObsStoreEngine {
    type Variable = StoreVariable;

    fn core(&self) -> &Arc<EngineCore> {
        &self.core
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            can_chunk: CapabilityMask::Ignored,
            can_compress_with_gzip: CapabilityMask::Ignored,
            can_compress_with_szip: CapabilityMask::Ignored,
            mpi_aware: CapabilityMask::Unsupported,
        }
    }

    fn default_fill_policy(&self, _root_attributes: &MemoryAttributes) -> FillValuePolicy {
        FillValuePolicy::NetCdf4
    }

    fn create_variable(
        self: &Arc<Self>,
        descriptor: &TypeDescriptor,
        dims: &Dimensions,
        params: &VariableCreationParams,
    ) -> ObsResult<Arc<StoreVariable>> {
        Ok(StoreVariable::new(&self.core, descriptor, dims, params))
    }

    fn release_variable(&self, _variable: &Arc<StoreVariable>) -> ObsResult<()> {
        Ok(())
    }
}
