use std::sync::Arc;

use obs_common::{Dimensions, ObsError, ObsResult, ObsResultExt};
use tracing::{debug, warn};

use super::{create_parent, discard_groups, find_parent, parent_and_leaf, Variable};
use crate::backend::GroupBackend;
use crate::context::EngineId;
use crate::params::VariableCreationParams;
use crate::types::{StorageType, Type};

/// The variables of one group.
///
/// Names may contain `/`: creation then creates the intermediate groups, and
/// lookups resolve them segment by segment.
#[derive(Clone, Default)]
pub struct HasVariables {
    group: Option<Arc<dyn GroupBackend>>,
}

impl HasVariables {
    pub(crate) fn new(group: Option<Arc<dyn GroupBackend>>) -> Self {
        Self { group }
    }

    fn group(&self, operation: &str) -> ObsResult<&Arc<dyn GroupBackend>> {
        self.group
            .as_ref()
            .ok_or_else(|| ObsError::no_backend(operation))
    }

    /// Create a fixed-size variable of Rust type `T`.
    pub fn create<T: StorageType>(&self, name: &str, dims: &[u64]) -> ObsResult<Variable> {
        self.create_with::<T>(name, dims, dims, VariableCreationParams::new())
    }

    /// Create a variable of Rust type `T` with maximum extents and parameters.
    pub fn create_with<T: StorageType>(
        &self,
        name: &str,
        dims_cur: &[u64],
        dims_max: &[u64],
        params: VariableCreationParams,
    ) -> ObsResult<Variable> {
        let engine = self.group("HasVariables::create")?.engine_id();
        let data_type = Type::new(T::descriptor(), engine);
        self.create_with_type(name, &data_type, dims_cur, dims_max, params)
    }

    /// Create a variable of an explicit type.
    ///
    /// Fails with `DuplicateName` if a sibling group or variable uses the
    /// name, and with `InvalidDimensions` if a maximum is below its current
    /// extent.
    pub fn create_with_type(
        &self,
        name: &str,
        data_type: &Type,
        dims_cur: &[u64],
        dims_max: &[u64],
        params: VariableCreationParams,
    ) -> ObsResult<Variable> {
        let op = "HasVariables::create";
        let group = self.group(op)?;
        let dims = Dimensions::new(dims_cur.to_vec(), dims_max.to_vec())
            .op(op)
            .ctx("name", name)?;

        // Validate before anything is created. Types, capabilities and the
        // fill policy are engine wide, so the starting group answers for the
        // parent.
        let native = group
            .type_provider()
            .make_type(data_type.descriptor())
            .op(op)
            .ctx("name", name)?;
        let descriptor = native.descriptor();

        let policy = group.fill_value_policy().op(op)?;
        let (params, scales) = params
            .prepare(descriptor, &dims, &group.capabilities(), policy)
            .op(op)
            .ctx("name", name)?;
        check_scales(&scales, group.engine_id(), &dims, name, op)?;

        let (parent, leaf, created) = create_parent(group, name).op(op).ctx("name", name)?;
        let container = parent.variables();
        let backend = match container.create(&leaf, descriptor, &dims, &params) {
            Ok(backend) => backend,
            Err(e) => {
                discard_groups(created);
                return Err(e.with("operation", op).with("name", name));
            }
        };
        debug!(
            name = %name,
            id = %backend.object_id(),
            data_type = %descriptor,
            dims = ?dims.dims_cur(),
            "Created variable"
        );

        let variable = Variable::from_backend(backend, Arc::downgrade(&container));
        for (axis, scale) in &scales {
            if let Err(e) = variable.attach_dimension_scale(*axis, scale) {
                // The chunked engine refuses removal while a handle is open.
                drop(variable);
                if let Err(undo) = container.remove(&leaf) {
                    warn!(name = %name, error = %undo, "Could not remove partially created variable");
                }
                discard_groups(created);
                return Err(e.with("name", name));
            }
        }
        Ok(variable)
    }

    /// Create a variable whose axes are described by `scales`, one per axis.
    ///
    /// Current and maximum extents are taken from the scales, which are
    /// attached to the new variable.
    pub fn create_with_scales(
        &self,
        name: &str,
        data_type: &Type,
        scales: &[Variable],
        params: VariableCreationParams,
    ) -> ObsResult<Variable> {
        let op = "HasVariables::create_with_scales";
        let mut dims_cur = Vec::with_capacity(scales.len());
        let mut dims_max = Vec::with_capacity(scales.len());
        let mut params = params;
        for (axis, scale) in scales.iter().enumerate() {
            let dims = scale.dimensions().op(op).ctx("axis", axis)?;
            if dims.dimensionality() != 1 {
                return Err(ObsError::invalid_dimensions("dimension scales must be 1-D")
                    .with("operation", op)
                    .with("axis", axis)
                    .with("rank", dims.dimensionality()));
            }
            dims_cur.push(dims.dims_cur()[0]);
            dims_max.push(dims.dims_max()[0]);
            params = params.attach_dimension_scale(axis, scale);
        }
        self.create_with_type(name, data_type, &dims_cur, &dims_max, params)
    }

    pub fn open(&self, name: &str) -> ObsResult<Variable> {
        let op = "HasVariables::open";
        let group = self.group(op)?;
        let (parent, leaf) = parent_and_leaf(group, name, false).op(op).ctx("name", name)?;
        let container = parent.variables();
        let backend = container.open(&leaf).op(op).ctx("name", name)?;
        Ok(Variable::from_backend(backend, Arc::downgrade(&container)))
    }

    pub fn exists(&self, name: &str) -> ObsResult<bool> {
        let group = self.group("HasVariables::exists")?;
        Ok(match find_parent(group, name).op("HasVariables::exists")? {
            Some((parent, leaf)) => parent.variables().exists(&leaf),
            None => false,
        })
    }

    /// Remove a variable. Engines may refuse while other handles are open;
    /// engines that allow it invalidate those handles.
    pub fn remove(&self, name: &str) -> ObsResult<()> {
        let op = "HasVariables::remove";
        let group = self.group(op)?;
        let (parent, leaf) = parent_and_leaf(group, name, false).op(op).ctx("name", name)?;
        parent.variables().remove(&leaf).op(op).ctx("name", name)?;
        debug!(name = %name, "Removed variable");
        Ok(())
    }

    /// Rename a variable within its group.
    pub fn rename(&self, old_name: &str, new_name: &str) -> ObsResult<()> {
        let op = "HasVariables::rename";
        let group = self.group(op)?;
        let (parent, leaf) = parent_and_leaf(group, old_name, false)
            .op(op)
            .ctx("name", old_name)?;
        if new_name.is_empty() || new_name.contains('/') {
            return Err(ObsError::invalid_argument("new name must be a single path segment")
                .with("operation", op)
                .with("new_name", new_name));
        }
        parent
            .variables()
            .rename(&leaf, new_name)
            .op(op)
            .ctx("name", old_name)
            .ctx("new_name", new_name)
    }

    /// Variable names of this group.
    pub fn list(&self) -> ObsResult<Vec<String>> {
        self.group("HasVariables::list")?
            .variables()
            .list()
            .op("HasVariables::list")
    }
}

/// Reject scale attachments that could only fail after the variable exists.
fn check_scales(
    scales: &[(usize, Variable)],
    engine: EngineId,
    dims: &Dimensions,
    name: &str,
    op: &str,
) -> ObsResult<()> {
    let mut seen = Vec::with_capacity(scales.len());
    for (axis, scale) in scales {
        let scale_id = scale.object_id().op(op)?;
        if scale_id.engine() != engine {
            return Err(ObsError::cross_backend_link(
                "dimension scale belongs to a different engine instance",
            )
            .with("operation", op)
            .with("name", name)
            .with("axis", axis));
        }
        if *axis >= dims.dimensionality() {
            return Err(ObsError::invalid_dimensions("axis is out of range")
                .with("operation", op)
                .with("name", name)
                .with("axis", axis));
        }
        // Reading the shape fails for a scale that has been removed.
        scale.dimensions().op(op).ctx("name", name)?;
        if seen.contains(&(*axis, scale_id)) {
            return Err(ObsError::duplicate_name("dimension scale is listed twice for one axis")
                .with("operation", op)
                .with("name", name)
                .with("axis", axis));
        }
        seen.push((*axis, scale_id));
    }
    Ok(())
}
