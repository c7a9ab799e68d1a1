//! Backend-polymorphic Group/Variable/Attribute/Type object model.
//!
//! Observation data is organised as a tree of groups holding n-dimensional
//! typed variables, attributes and committed types. Frontend handles are
//! engine independent; every operation is forwarded to the storage engine
//! that created the object.
//!
//! # Architecture
//!
//! ```text
//! EngineFactory::create_root()
//!      │
//!      ▼
//! Group ── vars() ──► HasVariables ──► Variable ── write/read(Selection)
//!   │                                     │
//!   ├── atts()  ──► HasAttributes ──► Attribute
//!   │
//!   └── types() ──► HasTypes
//!      │
//!      ▼  (Arc<dyn GroupBackend>, Arc<dyn VariableBackend>, ...)
//! Engine
//!   ├─► obsstore: dense in-memory buffers, eager fill
//!   └─► chunked:  sparse chunks, lazy fill, gzip, LRU chunk cache
//! ```
//!
//! # Example
//!
//! ```ignore
//! use obs_engines::{EngineConfig, EngineFactory};
//!
//! let factory = EngineFactory::new(EngineConfig::default())?;
//! let root = factory.create_root()?;
//!
//! let location = root.vars().create::<i32>("Location", &[4])?;
//! location.write(&[1, 2, 3, 4])?;
//!
//! let temp = root.vars().create::<f32>("ObsValue/air_temperature", &[4])?;
//! temp.attach_dimension_scale(0, &location)?;
//! ```

pub mod backend;
pub mod buffer;
pub mod capabilities;
pub mod config;
pub mod context;
pub mod factory;
pub mod fill;
pub mod frontend;
pub mod params;
pub mod scales;
pub mod types;

mod engines;

// Re-export commonly used types at crate root
pub use backend::{
    AttributeBackend, AttributeContainerBackend, GroupBackend, TypeContainerBackend,
    TypeProviderBackend, VariableBackend, VariableContainerBackend,
};
pub use buffer::ElementBuffer;
pub use capabilities::{CapabilityMask, Capabilities};
pub use config::{EngineConfig, EngineKind};
pub use context::{EngineContext, EngineId, ObjectId};
pub use engines::chunked::{CacheStats, ChunkCache};
pub use factory::EngineFactory;
pub use fill::{FillValue, FillValuePolicy};
pub use frontend::{
    Attribute, Group, HasAttributes, HasTypes, HasVariables, ObjectType, TypeProvider, Variable,
};
pub use params::{Chunking, Compression, VariableCreationParams};
pub use scales::DimensionScaleRegistry;
pub use types::{
    BasicType, Charset, CompoundField, DateTimeRecord, EnumMember, StorageType, StringLength,
    Type, TypeClass, TypeDescriptor,
};

pub use obs_common::{
    Dimensions, ErrorKind, ObsError, ObsResult, Selection, UNLIMITED,
};
