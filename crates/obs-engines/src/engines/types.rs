use std::collections::BTreeMap;
use std::sync::Arc;

use obs_common::{ObsError, ObsResult};
use parking_lot::RwLock;

use super::{check_name, EngineCore};
use crate::backend::{TypeContainerBackend, TypeProviderBackend};
use crate::types::{Type, TypeDescriptor};

/// Committed types of one group.
pub(crate) struct MemoryTypes {
    core: Arc<EngineCore>,
    entries: RwLock<BTreeMap<String, TypeDescriptor>>,
}

impl MemoryTypes {
    pub(crate) fn new(core: Arc<EngineCore>) -> Self {
        Self {
            core,
            entries: RwLock::new(BTreeMap::new()),
        }
    }
}

impl TypeContainerBackend for MemoryTypes {
    fn commit(&self, name: &str, descriptor: &TypeDescriptor) -> ObsResult<Type> {
        check_name(name)?;
        self.core.check_type(descriptor)?;
        let mut entries = self.entries.write();
        if entries.contains_key(name) {
            return Err(ObsError::duplicate_name("type is already committed").with("name", name));
        }
        entries.insert(name.to_string(), descriptor.clone());
        Ok(Type::new(descriptor.clone(), self.core.id).committed(name))
    }

    fn open(&self, name: &str) -> ObsResult<Type> {
        self.entries
            .read()
            .get(name)
            .map(|d| Type::new(d.clone(), self.core.id).committed(name))
            .ok_or_else(|| ObsError::not_found("no committed type with this name").with("name", name))
    }

    fn exists(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    fn remove(&self, name: &str) -> ObsResult<()> {
        self.entries
            .write()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| ObsError::not_found("no committed type with this name").with("name", name))
    }

    fn list(&self) -> ObsResult<Vec<String>> {
        Ok(self.entries.read().keys().cloned().collect())
    }
}

/// Type handles for one engine instance.
pub(crate) struct NativeTypeProvider {
    core: Arc<EngineCore>,
}

impl NativeTypeProvider {
    pub(crate) fn new(core: Arc<EngineCore>) -> Self {
        Self { core }
    }
}

impl TypeProviderBackend for NativeTypeProvider {
    fn make_type(&self, descriptor: &TypeDescriptor) -> ObsResult<Type> {
        self.core.check_type(descriptor)?;
        Ok(Type::new(descriptor.clone(), self.core.id))
    }
}
