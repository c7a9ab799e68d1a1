use std::sync::{Arc, Weak};

use obs_common::ObsResult;
use parking_lot::RwLock;

use super::{EngineCore, MemoryAttributes};
use crate::backend::{AttributeContainerBackend, VariableBackend};
use crate::context::ObjectId;
use crate::fill::{FillValue, FillValuePolicy};
use crate::params::VariableCreationParams;
use crate::types::TypeDescriptor;

/// Parts of a variable that do not depend on how its data is stored.
pub(crate) struct VariableHeader {
    pub(crate) id: ObjectId,
    pub(crate) core: Arc<EngineCore>,
    pub(crate) descriptor: TypeDescriptor,
    pub(crate) params: VariableCreationParams,
    pub(crate) fill: FillValue,
    pub(crate) attributes: Arc<MemoryAttributes>,
    me: Weak<dyn VariableBackend>,
    scale_name: RwLock<Option<String>>,
}

impl VariableHeader {
    /// `params` arrive prepared by the frontend; engine defaults are
    /// resolved against `dims_cur` here.
    pub(crate) fn new(
        core: &Arc<EngineCore>,
        me: Weak<dyn VariableBackend>,
        descriptor: &TypeDescriptor,
        dims_cur: &[u64],
        params: &VariableCreationParams,
    ) -> Self {
        let params = params.clone().resolved(dims_cur, &core.config);
        let fill = params
            .fill_value
            .clone()
            .unwrap_or_else(|| FillValuePolicy::Hdf5.default_for(descriptor));
        Self {
            id: core.next_object_id(),
            core: Arc::clone(core),
            descriptor: descriptor.clone(),
            params,
            fill,
            attributes: Arc::new(MemoryAttributes::new(Arc::clone(core))),
            me,
            scale_name: RwLock::new(None),
        }
    }

    pub(crate) fn attributes(&self) -> Arc<dyn AttributeContainerBackend> {
        Arc::clone(&self.attributes) as Arc<dyn AttributeContainerBackend>
    }

    pub(crate) fn attach(&self, axis: usize, scale: &Arc<dyn VariableBackend>) -> ObsResult<()> {
        self.core
            .scales
            .attach(self.id, self.me.clone(), axis, scale)
    }

    pub(crate) fn detach(&self, axis: usize, scale: &Arc<dyn VariableBackend>) -> ObsResult<()> {
        self.core.scales.detach(self.id, axis, scale.object_id())
    }

    pub(crate) fn is_attached(&self, axis: usize, scale: &Arc<dyn VariableBackend>) -> bool {
        self.core.scales.is_attached(self.id, axis, scale.object_id())
    }

    pub(crate) fn scales_on(&self, axis: usize) -> Vec<ObjectId> {
        self.core.scales.scales_on(self.id, axis)
    }

    pub(crate) fn set_scale_name(&self, name: &str) {
        *self.scale_name.write() = Some(name.to_string());
    }

    pub(crate) fn scale_name(&self) -> Option<String> {
        self.scale_name.read().clone()
    }

    /// Warn about scales whose length no longer matches after a resize.
    pub(crate) fn check_scale_lengths(&self) {
        self.core.scales.check_lengths(self.id);
    }

    /// Release per-variable state when the variable leaves its group.
    pub(crate) fn clear(&self) {
        self.attributes.clear();
        *self.scale_name.write() = None;
    }
}
