use std::sync::Arc;

use obs_common::{Dimensions, ObsError, ObsResult, ObsResultExt};
use tracing::debug;

use super::Attribute;
use crate::backend::AttributeContainerBackend;
use crate::types::{StorageType, Type, TypeDescriptor};

/// The attributes of one group or variable.
///
/// Attribute names are single path segments: a name containing `/` is
/// rejected with `InvalidArgument`.
#[derive(Clone, Default)]
pub struct HasAttributes {
    backend: Option<Arc<dyn AttributeContainerBackend>>,
}

impl HasAttributes {
    pub fn from_backend(backend: Arc<dyn AttributeContainerBackend>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    fn backend(&self, operation: &str) -> ObsResult<&Arc<dyn AttributeContainerBackend>> {
        self.backend
            .as_ref()
            .ok_or_else(|| ObsError::no_backend(operation))
    }

    /// Create an attribute of Rust type `T`.
    pub fn create<T: StorageType>(&self, name: &str, dims: &[u64]) -> ObsResult<Attribute> {
        self.create_descriptor(name, &T::descriptor(), dims)
    }

    pub fn create_with_type(
        &self,
        name: &str,
        data_type: &Type,
        dims: &[u64],
    ) -> ObsResult<Attribute> {
        self.create_descriptor(name, data_type.descriptor(), dims)
    }

    fn create_descriptor(
        &self,
        name: &str,
        descriptor: &TypeDescriptor,
        dims: &[u64],
    ) -> ObsResult<Attribute> {
        let op = "HasAttributes::create";
        let backend = self.backend(op)?;
        if name.is_empty() {
            return Err(ObsError::invalid_argument("attribute name is empty").with("operation", op));
        }
        let shape = Dimensions::fixed(dims.to_vec()).op(op).ctx("name", name)?;
        let created = backend
            .create(name, descriptor, &shape)
            .op(op)
            .ctx("name", name)?;
        debug!(name = %name, id = %created.object_id(), data_type = %descriptor, "Created attribute");
        Ok(Attribute::from_backend(created))
    }

    /// Create an attribute and write `values` to it.
    pub fn add<T: StorageType>(
        &self,
        name: &str,
        values: &[T],
        dims: &[u64],
    ) -> ObsResult<Attribute> {
        let att = self.create::<T>(name, dims)?;
        att.write(values)?;
        Ok(att)
    }

    /// Create a 1-D variable-length string attribute holding `values`.
    pub fn add_strings<S: AsRef<str>>(&self, name: &str, values: &[S]) -> ObsResult<Attribute> {
        let att = self.create::<String>(name, &[values.len() as u64])?;
        att.write_strings(values)?;
        Ok(att)
    }

    /// Read the whole attribute `name` as `T`.
    pub fn read_values<T: StorageType>(&self, name: &str) -> ObsResult<Vec<T>> {
        self.open(name)?.read()
    }

    pub fn open(&self, name: &str) -> ObsResult<Attribute> {
        let op = "HasAttributes::open";
        let opened = self.backend(op)?.open(name).op(op).ctx("name", name)?;
        Ok(Attribute::from_backend(opened))
    }

    pub fn exists(&self, name: &str) -> ObsResult<bool> {
        Ok(self.backend("HasAttributes::exists")?.exists(name))
    }

    /// Remove an attribute. Handles opened earlier stop working.
    pub fn remove(&self, name: &str) -> ObsResult<()> {
        let op = "HasAttributes::remove";
        self.backend(op)?.remove(name).op(op).ctx("name", name)?;
        debug!(name = %name, "Removed attribute");
        Ok(())
    }

    pub fn rename(&self, old_name: &str, new_name: &str) -> ObsResult<()> {
        let op = "HasAttributes::rename";
        if new_name.is_empty() {
            return Err(ObsError::invalid_argument("attribute name is empty").with("operation", op));
        }
        self.backend(op)?
            .rename(old_name, new_name)
            .op(op)
            .ctx("name", old_name)
            .ctx("new_name", new_name)
    }

    pub fn list(&self) -> ObsResult<Vec<String>> {
        self.backend("HasAttributes::list")?
            .list()
            .op("HasAttributes::list")
    }
}
