use std::collections::BTreeMap;
use std::sync::Arc;

use obs_common::{Dimensions, ObsError, ObsResult};
use parking_lot::RwLock;

use super::{check_name, removed, EngineCore};
use crate::backend::{AttributeBackend, AttributeContainerBackend};
use crate::buffer::ElementBuffer;
use crate::context::ObjectId;
use crate::fill::{FillValuePolicy, NETCDF4_MARKER_ATTRIBUTES};
use crate::types::TypeDescriptor;

/// In-memory attribute, zero-initialised until first written.
pub(crate) struct MemoryAttribute {
    id: ObjectId,
    descriptor: TypeDescriptor,
    dims: Dimensions,
    /// `None` once the attribute has been removed from its container.
    data: RwLock<Option<ElementBuffer>>,
}

impl MemoryAttribute {
    fn new(id: ObjectId, descriptor: TypeDescriptor, dims: Dimensions) -> Self {
        let zero = FillValuePolicy::Hdf5.default_for(&descriptor);
        let data = ElementBuffer::filled(&zero, dims.num_elements() as usize);
        Self {
            id,
            descriptor,
            dims,
            data: RwLock::new(Some(data)),
        }
    }

    fn invalidate(&self) {
        *self.data.write() = None;
    }

    fn is_live(&self) -> bool {
        self.data.read().is_some()
    }
}

impl AttributeBackend for MemoryAttribute {
    fn object_id(&self) -> ObjectId {
        self.id
    }

    fn data_type(&self) -> ObsResult<TypeDescriptor> {
        if !self.is_live() {
            return Err(removed("attribute", self.id));
        }
        Ok(self.descriptor.clone())
    }

    fn dimensions(&self) -> ObsResult<Dimensions> {
        if !self.is_live() {
            return Err(removed("attribute", self.id));
        }
        Ok(self.dims.clone())
    }

    fn write(&self, data: &ElementBuffer) -> ObsResult<()> {
        if !data.matches_type(&self.descriptor) {
            return Err(ObsError::type_mismatch("buffer does not hold the attribute type")
                .with("type", &self.descriptor));
        }
        let expected = self.dims.num_elements();
        if data.len() as u64 != expected {
            return Err(ObsError::selection_size_mismatch(data.len() as u64, expected));
        }
        let mut slot = self.data.write();
        match slot.as_mut() {
            Some(stored) => {
                *stored = data.clone();
                Ok(())
            }
            None => Err(removed("attribute", self.id)),
        }
    }

    fn read(&self) -> ObsResult<ElementBuffer> {
        self.data
            .read()
            .clone()
            .ok_or_else(|| removed("attribute", self.id))
    }
}

/// Attribute container shared by both engines.
pub(crate) struct MemoryAttributes {
    core: Arc<EngineCore>,
    entries: RwLock<BTreeMap<String, Arc<MemoryAttribute>>>,
}

impl MemoryAttributes {
    pub(crate) fn new(core: Arc<EngineCore>) -> Self {
        Self {
            core,
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// Whether one of the NetCDF4 provenance markers is present.
    pub(crate) fn has_netcdf4_marker(&self) -> bool {
        let entries = self.entries.read();
        NETCDF4_MARKER_ATTRIBUTES
            .iter()
            .any(|m| entries.contains_key(*m))
    }

    /// Invalidate every attribute; used when the owner is removed.
    pub(crate) fn clear(&self) {
        let mut entries = self.entries.write();
        for attr in entries.values() {
            attr.invalidate();
        }
        entries.clear();
    }
}

impl AttributeContainerBackend for MemoryAttributes {
    fn create(
        &self,
        name: &str,
        descriptor: &TypeDescriptor,
        dims: &Dimensions,
    ) -> ObsResult<Arc<dyn AttributeBackend>> {
        check_name(name)?;
        self.core.check_type(descriptor)?;
        let mut entries = self.entries.write();
        if entries.contains_key(name) {
            return Err(ObsError::duplicate_name("attribute already exists").with("name", name));
        }
        let attr = Arc::new(MemoryAttribute::new(
            self.core.next_object_id(),
            descriptor.clone(),
            dims.clone(),
        ));
        entries.insert(name.to_string(), Arc::clone(&attr));
        Ok(attr)
    }

    fn open(&self, name: &str) -> ObsResult<Arc<dyn AttributeBackend>> {
        self.entries
            .read()
            .get(name)
            .map(|a| Arc::clone(a) as Arc<dyn AttributeBackend>)
            .ok_or_else(|| ObsError::not_found("no attribute with this name").with("name", name))
    }

    fn exists(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    fn remove(&self, name: &str) -> ObsResult<()> {
        let attr = self
            .entries
            .write()
            .remove(name)
            .ok_or_else(|| ObsError::not_found("no attribute with this name").with("name", name))?;
        attr.invalidate();
        Ok(())
    }

    fn rename(&self, old_name: &str, new_name: &str) -> ObsResult<()> {
        check_name(new_name)?;
        let mut entries = self.entries.write();
        if entries.contains_key(new_name) {
            return Err(ObsError::duplicate_name("attribute already exists").with("name", new_name));
        }
        let attr = entries.remove(old_name).ok_or_else(|| {
            ObsError::not_found("no attribute with this name").with("name", old_name)
        })?;
        entries.insert(new_name.to_string(), attr);
        Ok(())
    }

    fn list(&self) -> ObsResult<Vec<String>> {
        Ok(self.entries.read().keys().cloned().collect())
    }
}
