use std::sync::Arc;

use obs_common::{ObsError, ObsResult, ObsResultExt};
use tracing::debug;

use crate::backend::{TypeContainerBackend, TypeProviderBackend};
use crate::types::{
    BasicType, Charset, CompoundField, EnumMember, StorageType, StringLength, Type,
    TypeDescriptor,
};

/// Committed (named) types of one group.
///
/// This namespace is separate from groups and variables: a committed type
/// may share its name with a sibling group or variable.
#[derive(Clone, Default)]
pub struct HasTypes {
    backend: Option<Arc<dyn TypeContainerBackend>>,
}

impl HasTypes {
    pub fn from_backend(backend: Arc<dyn TypeContainerBackend>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    fn backend(&self, operation: &str) -> ObsResult<&Arc<dyn TypeContainerBackend>> {
        self.backend
            .as_ref()
            .ok_or_else(|| ObsError::no_backend(operation))
    }

    /// Store `data_type` under `name`. Returns the committed type.
    pub fn commit(&self, name: &str, data_type: &Type) -> ObsResult<Type> {
        let op = "HasTypes::commit";
        let committed = self
            .backend(op)?
            .commit(name, data_type.descriptor())
            .op(op)
            .ctx("name", name)?;
        debug!(name = %name, data_type = %data_type.descriptor(), "Committed type");
        Ok(committed)
    }

    pub fn open(&self, name: &str) -> ObsResult<Type> {
        let op = "HasTypes::open";
        self.backend(op)?.open(name).op(op).ctx("name", name)
    }

    pub fn exists(&self, name: &str) -> ObsResult<bool> {
        Ok(self.backend("HasTypes::exists")?.exists(name))
    }

    pub fn remove(&self, name: &str) -> ObsResult<()> {
        let op = "HasTypes::remove";
        self.backend(op)?.remove(name).op(op).ctx("name", name)
    }

    pub fn list(&self) -> ObsResult<Vec<String>> {
        self.backend("HasTypes::list")?.list().op("HasTypes::list")
    }
}

/// Builds types for one engine.
#[derive(Clone, Default)]
pub struct TypeProvider {
    backend: Option<Arc<dyn TypeProviderBackend>>,
}

impl TypeProvider {
    pub fn from_backend(backend: Arc<dyn TypeProviderBackend>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    /// Validate `descriptor` and ask the engine for a handle.
    pub fn make(&self, descriptor: TypeDescriptor) -> ObsResult<Type> {
        let op = "TypeProvider::make";
        let backend = self
            .backend
            .as_ref()
            .ok_or_else(|| ObsError::no_backend(op))?;
        descriptor.validate().op(op)?;
        backend.make_type(&descriptor).op(op).ctx("type", &descriptor)
    }

    pub fn make_fundamental_type(&self, kind: BasicType) -> ObsResult<Type> {
        self.make(TypeDescriptor::Fundamental(kind))
    }

    /// String type; `length == 0` means variable length.
    pub fn make_string_type(&self, length: usize, charset: Charset) -> ObsResult<Type> {
        let length = match length {
            0 => StringLength::Variable,
            n => StringLength::Fixed(n),
        };
        self.make(TypeDescriptor::String { length, charset })
    }

    /// Fixed-size array of `base` embedded in one element.
    pub fn make_array_type(&self, dims: &[u64], base: BasicType) -> ObsResult<Type> {
        self.make(TypeDescriptor::FixedArray {
            base,
            dims: dims.to_vec(),
        })
    }

    pub fn make_enum_type(&self, base: BasicType, members: &[(&str, i64)]) -> ObsResult<Type> {
        self.make(TypeDescriptor::Enum {
            base,
            members: members
                .iter()
                .map(|(name, value)| EnumMember {
                    name: name.to_string(),
                    value: *value,
                })
                .collect(),
        })
    }

    pub fn make_compound_type(&self, size: usize, fields: Vec<CompoundField>) -> ObsResult<Type> {
        self.make(TypeDescriptor::Compound { size, fields })
    }

    /// Type of the Rust storage type `T`.
    pub fn make_type_for<T: StorageType>(&self) -> ObsResult<Type> {
        self.make(T::descriptor())
    }
}
