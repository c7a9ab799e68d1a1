//! Dimension-scale bookkeeping shared by all variables of one engine instance.
//!
//! Links are `(variable, axis) -> [scale]`, keyed by object id, so they follow
//! a variable through renames. The registry holds only weak handles: it never
//! keeps a removed or dropped variable alive.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Weak};

use obs_common::{ObsError, ObsResult};
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::backend::VariableBackend;
use crate::context::ObjectId;

#[derive(Default)]
struct RegistryState {
    links: BTreeMap<(ObjectId, usize), Vec<ObjectId>>,
    handles: HashMap<ObjectId, Weak<dyn VariableBackend>>,
}

/// Attach/detach graph for one engine instance.
#[derive(Default)]
pub struct DimensionScaleRegistry {
    state: RwLock<RegistryState>,
}

impl DimensionScaleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `scale` on `(variable, axis)`. Fails with `DuplicateName` if the
    /// link already exists.
    pub fn attach(
        &self,
        variable: ObjectId,
        variable_handle: Weak<dyn VariableBackend>,
        axis: usize,
        scale: &Arc<dyn VariableBackend>,
    ) -> ObsResult<()> {
        let scale_id = scale.object_id();
        let mut state = self.state.write();
        prune_dead(&mut state);
        let scales = state.links.entry((variable, axis)).or_default();
        if scales.contains(&scale_id) {
            return Err(ObsError::duplicate_name("dimension scale is already attached")
                .with("axis", axis)
                .with("scale", scale_id));
        }
        scales.push(scale_id);
        state.handles.insert(variable, variable_handle);
        state.handles.insert(scale_id, Arc::downgrade(scale));
        debug!(variable = %variable, axis = axis, scale = %scale_id, "Attached dimension scale");
        Ok(())
    }

    /// Remove a link. Fails with `NotFound` if it does not exist.
    pub fn detach(&self, variable: ObjectId, axis: usize, scale: ObjectId) -> ObsResult<()> {
        let mut state = self.state.write();
        let removed = match state.links.get_mut(&(variable, axis)) {
            Some(scales) => {
                let before = scales.len();
                scales.retain(|s| *s != scale);
                before != scales.len()
            }
            None => false,
        };
        if !removed {
            return Err(ObsError::not_found("dimension scale is not attached")
                .with("axis", axis)
                .with("scale", scale));
        }
        if state
            .links
            .get(&(variable, axis))
            .is_some_and(|s| s.is_empty())
        {
            state.links.remove(&(variable, axis));
        }
        debug!(variable = %variable, axis = axis, scale = %scale, "Detached dimension scale");
        Ok(())
    }

    pub fn is_attached(&self, variable: ObjectId, axis: usize, scale: ObjectId) -> bool {
        self.state
            .read()
            .links
            .get(&(variable, axis))
            .is_some_and(|s| s.contains(&scale))
    }

    /// Scales attached at `(variable, axis)`, in attach order.
    pub fn scales_on(&self, variable: ObjectId, axis: usize) -> Vec<ObjectId> {
        self.state
            .read()
            .links
            .get(&(variable, axis))
            .cloned()
            .unwrap_or_default()
    }

    /// Drop every link in which `id` takes part, as variable or as scale.
    pub fn forget(&self, id: ObjectId) {
        let mut state = self.state.write();
        state.links.retain(|(var, _), scales| {
            if *var == id {
                return false;
            }
            scales.retain(|s| *s != id);
            !scales.is_empty()
        });
        state.handles.remove(&id);
    }

    /// Compare axis lengths with scale lengths after `id` was resized.
    ///
    /// Resizes never cascade, so a mismatch is reported, not repaired.
    /// Returns the number of mismatched links.
    pub fn check_lengths(&self, id: ObjectId) -> usize {
        let pairs: Vec<(ObjectId, usize, ObjectId)> = {
            let state = self.state.read();
            state
                .links
                .iter()
                .flat_map(|((var, axis), scales)| {
                    scales.iter().map(move |s| (*var, *axis, *s))
                })
                .filter(|(var, _, scale)| *var == id || *scale == id)
                .collect()
        };

        let mut mismatched = 0;
        for (var, axis, scale) in pairs {
            let (Some(v), Some(s)) = (self.handle(var), self.handle(scale)) else {
                continue;
            };
            let (Ok(vd), Ok(sd)) = (v.dimensions(), s.dimensions()) else {
                continue;
            };
            let axis_len = vd.dims_cur().get(axis).copied();
            let scale_len = sd.dims_cur().first().copied();
            if axis_len != scale_len {
                mismatched += 1;
                warn!(
                    variable = %var,
                    axis = axis,
                    scale = %scale,
                    axis_len = ?axis_len,
                    scale_len = ?scale_len,
                    "Dimension scale length differs from the axis it describes"
                );
            }
        }
        mismatched
    }

    /// Drop links whose variable or scale no longer exists. Returns the
    /// number of links dropped.
    pub fn prune(&self) -> usize {
        prune_dead(&mut self.state.write())
    }

    fn handle(&self, id: ObjectId) -> Option<Arc<dyn VariableBackend>> {
        self.state.read().handles.get(&id).and_then(Weak::upgrade)
    }

    pub fn link_count(&self) -> usize {
        self.state.read().links.values().map(Vec::len).sum()
    }
}

fn prune_dead(state: &mut RegistryState) -> usize {
    let dead: HashSet<ObjectId> = state
        .handles
        .iter()
        .filter(|(_, handle)| handle.strong_count() == 0)
        .map(|(id, _)| *id)
        .collect();
    if dead.is_empty() {
        return 0;
    }
    state.handles.retain(|id, _| !dead.contains(id));

    let mut dropped = 0;
    state.links.retain(|(var, _), scales| {
        if dead.contains(var) {
            dropped += scales.len();
            return false;
        }
        let before = scales.len();
        scales.retain(|s| !dead.contains(s));
        dropped += before - scales.len();
        !scales.is_empty()
    });
    if dropped > 0 {
        debug!(links = dropped, "Pruned dimension-scale links of dropped variables");
    }
    dropped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::GroupBackend;
    use crate::config::EngineConfig;
    use crate::context::EngineContext;
    use crate::engines::obsstore::ObsStoreEngine;
    use crate::fill::FillValuePolicy;
    use crate::params::VariableCreationParams;
    use crate::types::{BasicType, TypeDescriptor};
    use obs_common::{Dimensions, ErrorKind};

    fn root() -> Arc<dyn GroupBackend> {
        ObsStoreEngine::new(Arc::new(EngineContext::new()), EngineConfig::default()).root()
    }

    fn variable(root: &Arc<dyn GroupBackend>, name: &str, len: u64) -> Arc<dyn VariableBackend> {
        let int32 = TypeDescriptor::Fundamental(BasicType::Int32);
        let params = VariableCreationParams::new()
            .with_fill_value(FillValuePolicy::Hdf5.default_for(&int32));
        root.variables()
            .create(name, &int32, &Dimensions::fixed(vec![len]).unwrap(), &params)
            .unwrap()
    }

    #[test]
    fn test_attach_and_detach() {
        let root = root();
        let var = variable(&root, "t", 3);
        let scale = variable(&root, "Location", 3);
        let registry = DimensionScaleRegistry::new();

        registry
            .attach(var.object_id(), Arc::downgrade(&var), 0, &scale)
            .unwrap();
        assert!(registry.is_attached(var.object_id(), 0, scale.object_id()));
        assert!(!registry.is_attached(var.object_id(), 1, scale.object_id()));
        assert_eq!(registry.scales_on(var.object_id(), 0), vec![scale.object_id()]);
        assert_eq!(registry.link_count(), 1);

        registry.detach(var.object_id(), 0, scale.object_id()).unwrap();
        assert!(registry.scales_on(var.object_id(), 0).is_empty());
        assert_eq!(registry.link_count(), 0);

        let err = registry
            .detach(var.object_id(), 0, scale.object_id())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_duplicate_attach_is_rejected() {
        let root = root();
        let var = variable(&root, "t", 3);
        let scale = variable(&root, "Location", 3);
        let registry = DimensionScaleRegistry::new();

        registry
            .attach(var.object_id(), Arc::downgrade(&var), 0, &scale)
            .unwrap();
        let err = registry
            .attach(var.object_id(), Arc::downgrade(&var), 0, &scale)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateName);
        assert_eq!(err.context().get("axis"), Some("0"));
        assert_eq!(registry.link_count(), 1);
    }

    #[test]
    fn test_forget_drops_links_both_ways() {
        let root = root();
        let var = variable(&root, "t", 3);
        let other = variable(&root, "u", 3);
        let scale = variable(&root, "Location", 3);
        let registry = DimensionScaleRegistry::new();
        registry
            .attach(var.object_id(), Arc::downgrade(&var), 0, &scale)
            .unwrap();
        registry
            .attach(other.object_id(), Arc::downgrade(&other), 0, &scale)
            .unwrap();

        registry.forget(var.object_id());
        assert_eq!(registry.link_count(), 1);
        registry.forget(scale.object_id());
        assert_eq!(registry.link_count(), 0);
    }

    #[test]
    fn test_prune_drops_links_of_dropped_variables() {
        let root = root();
        let var = variable(&root, "t", 3);
        let scale = variable(&root, "Location", 3);
        let registry = DimensionScaleRegistry::new();
        registry
            .attach(var.object_id(), Arc::downgrade(&var), 0, &scale)
            .unwrap();
        assert_eq!(registry.prune(), 0);

        // Once the tree and every handle let go, only the weak entry remains.
        let scale_id = scale.object_id();
        root.variables().remove("Location").unwrap();
        drop(scale);
        assert!(registry.is_attached(var.object_id(), 0, scale_id));
        assert_eq!(registry.prune(), 1);
        assert!(!registry.is_attached(var.object_id(), 0, scale_id));
        assert_eq!(registry.link_count(), 0);
    }

    #[test]
    fn test_check_lengths_reports_mismatch() {
        let root = root();
        let var = variable(&root, "t", 3);
        let scale = variable(&root, "Location", 4);
        let registry = DimensionScaleRegistry::new();
        registry
            .attach(var.object_id(), Arc::downgrade(&var), 0, &scale)
            .unwrap();
        assert_eq!(registry.check_lengths(scale.object_id()), 1);
        assert_eq!(registry.check_lengths(var.object_id()), 1);
    }
}
