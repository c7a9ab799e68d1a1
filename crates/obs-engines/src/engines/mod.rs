//! In-process storage engines.
//!
//! - [`obsstore`]: dense in-memory key/value store
//! - [`chunked`]: sparse chunked store with optional gzip
//!
//! Both build their group tree from [`tree`] and share the attribute and
//! committed-type containers; they differ in how variable data is laid out.

pub(crate) mod chunked;
pub(crate) mod obsstore;

mod attributes;
mod header;
mod tree;
mod types;

pub(crate) use attributes::MemoryAttributes;
pub(crate) use header::VariableHeader;
pub(crate) use tree::{Engine, EngineVariable, TreeGroup};
pub(crate) use types::{MemoryTypes, NativeTypeProvider};

use std::sync::Arc;

use obs_common::{ObsError, ObsResult};

use crate::config::{EngineConfig, EngineKind};
use crate::context::{EngineContext, EngineId, ObjectId};
use crate::scales::DimensionScaleRegistry;
use crate::types::{TypeClass, TypeDescriptor};

/// State shared by every object of one engine instance.
pub(crate) struct EngineCore {
    pub(crate) id: EngineId,
    pub(crate) kind: EngineKind,
    pub(crate) context: Arc<EngineContext>,
    pub(crate) config: EngineConfig,
    pub(crate) scales: DimensionScaleRegistry,
}

impl EngineCore {
    pub(crate) fn new(kind: EngineKind, context: Arc<EngineContext>, config: EngineConfig) -> Self {
        Self {
            id: context.next_engine_id(),
            kind,
            context,
            config,
            scales: DimensionScaleRegistry::new(),
        }
    }

    pub(crate) fn next_object_id(&self) -> ObjectId {
        self.context.next_object_id(self.id)
    }

    /// Reject types this engine cannot store.
    pub(crate) fn check_type(&self, descriptor: &TypeDescriptor) -> ObsResult<()> {
        descriptor.validate()?;
        match (self.kind, descriptor.class()) {
            (EngineKind::ObsStore, TypeClass::Enum | TypeClass::Compound) => {
                Err(ObsError::unsupported_type("engine cannot store this type class")
                    .with("engine", self.kind.as_str())
                    .with("type", descriptor))
            }
            _ => Ok(()),
        }
    }
}

/// Object names are single, non-empty path segments.
pub(crate) fn check_name(name: &str) -> ObsResult<()> {
    if name.is_empty() || name.contains('/') {
        return Err(ObsError::invalid_argument("name must be a single non-empty path segment")
            .with("name", name));
    }
    Ok(())
}

/// Error for an operation on an object that has been removed.
pub(crate) fn removed(kind: &str, id: ObjectId) -> ObsError {
    ObsError::not_found(format!("{} has been removed", kind)).with("id", id)
}
