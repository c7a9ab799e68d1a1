//! Backend dispatch contract.
//!
//! Each engine implements these traits once. Frontend wrappers
//! ([`Group`](crate::Group), [`Variable`](crate::Variable), ...) hold an
//! `Arc` to "some implementation" of the matching trait and forward every
//! operation, adding error context on the way back.
//!
//! # Ownership
//!
//! Backend objects are reference counted. Two `open` calls on the same path
//! return two `Arc`s to one object, so mutations through either are visible
//! through both. A backend object is released when its last `Arc` is
//! dropped. Engines must never hold a strong reference from a child back to
//! its parent.
//!
//! # Names
//!
//! Container methods take a single path segment. Path splitting and
//! intermediate group creation happen in the frontend.

use std::collections::BTreeMap;
use std::sync::Arc;

use obs_common::{Dimensions, ObsResult, Selection};

use crate::buffer::ElementBuffer;
use crate::capabilities::Capabilities;
use crate::context::{EngineId, ObjectId};
use crate::fill::FillValuePolicy;
use crate::frontend::ObjectType;
use crate::params::VariableCreationParams;
use crate::types::{Type, TypeDescriptor};

/// A group node.
pub trait GroupBackend: Send + Sync {
    fn object_id(&self) -> ObjectId;

    fn engine_id(&self) -> EngineId {
        self.object_id().engine()
    }

    fn capabilities(&self) -> Capabilities;

    fn fill_value_policy(&self) -> ObsResult<FillValuePolicy>;

    /// Create a child group. Fails with `DuplicateName` if a group or
    /// variable already uses `name`.
    fn create_group(&self, name: &str) -> ObsResult<Arc<dyn GroupBackend>>;

    fn open_group(&self, name: &str) -> ObsResult<Arc<dyn GroupBackend>>;

    /// Remove a child group that holds no groups, variables, attributes or
    /// committed types. Used to undo a creation that failed part way.
    fn remove_empty_group(&self, name: &str) -> ObsResult<()>;

    fn group_exists(&self, name: &str) -> bool;

    /// Immediate child group names, sorted.
    fn list_groups(&self) -> ObsResult<Vec<String>>;

    fn attributes(&self) -> Arc<dyn AttributeContainerBackend>;

    fn variables(&self) -> Arc<dyn VariableContainerBackend>;

    fn types(&self) -> Arc<dyn TypeContainerBackend>;

    fn type_provider(&self) -> Arc<dyn TypeProviderBackend>;

    /// Child groups and/or variables, optionally recursive. Paths are
    /// relative to this group.
    fn list_objects(
        &self,
        filter: Option<ObjectType>,
        recurse: bool,
    ) -> ObsResult<BTreeMap<ObjectType, Vec<String>>> {
        let mut out: BTreeMap<ObjectType, Vec<String>> = BTreeMap::new();
        collect_objects(self, "", filter, recurse, &mut out)?;
        for names in out.values_mut() {
            names.sort();
        }
        Ok(out)
    }
}

fn collect_objects<G: GroupBackend + ?Sized>(
    group: &G,
    prefix: &str,
    filter: Option<ObjectType>,
    recurse: bool,
    out: &mut BTreeMap<ObjectType, Vec<String>>,
) -> ObsResult<()> {
    if filter != Some(ObjectType::Group) {
        let names = group.variables().list()?;
        out.entry(ObjectType::Variable)
            .or_default()
            .extend(names.into_iter().map(|n| format!("{}{}", prefix, n)));
    }
    for child in group.list_groups()? {
        let path = format!("{}{}", prefix, child);
        if filter != Some(ObjectType::Variable) {
            out.entry(ObjectType::Group).or_default().push(path.clone());
        }
        if recurse {
            let sub = group.open_group(&child)?;
            collect_objects(sub.as_ref(), &format!("{}/", path), filter, recurse, out)?;
        }
    }
    Ok(())
}

/// The variables of one group.
pub trait VariableContainerBackend: Send + Sync {
    /// Create a variable. `params` arrive validated, with the fill value
    /// resolved and dimension scales removed.
    fn create(
        &self,
        name: &str,
        descriptor: &TypeDescriptor,
        dims: &Dimensions,
        params: &VariableCreationParams,
    ) -> ObsResult<Arc<dyn VariableBackend>>;

    fn open(&self, name: &str) -> ObsResult<Arc<dyn VariableBackend>>;

    fn exists(&self, name: &str) -> bool;

    fn remove(&self, name: &str) -> ObsResult<()>;

    fn rename(&self, old_name: &str, new_name: &str) -> ObsResult<()>;

    /// Variable names, sorted.
    fn list(&self) -> ObsResult<Vec<String>>;
}

/// One variable.
pub trait VariableBackend: Send + Sync {
    fn object_id(&self) -> ObjectId;

    fn data_type(&self) -> ObsResult<TypeDescriptor>;

    fn dimensions(&self) -> ObsResult<Dimensions>;

    /// Change the current dimensions within `[0, dims_max]`.
    fn resize(&self, new_dims: &[u64]) -> ObsResult<()>;

    /// Store `data` at the elements selected by `file_selection`, in
    /// selection order. Fails with `SelectionSizeMismatch` if the counts differ.
    fn write(&self, data: &ElementBuffer, file_selection: &Selection) -> ObsResult<()>;

    /// Elements selected by `file_selection`, in selection order.
    fn read(&self, file_selection: &Selection) -> ObsResult<ElementBuffer>;

    fn attributes(&self) -> ObsResult<Arc<dyn AttributeContainerBackend>>;

    /// Creation parameters as stored, with engine defaults resolved.
    fn creation_parameters(&self) -> ObsResult<VariableCreationParams>;

    fn attach_dimension_scale(
        &self,
        axis: usize,
        scale: &Arc<dyn VariableBackend>,
    ) -> ObsResult<()>;

    fn detach_dimension_scale(
        &self,
        axis: usize,
        scale: &Arc<dyn VariableBackend>,
    ) -> ObsResult<()>;

    fn is_dimension_scale_attached(
        &self,
        axis: usize,
        scale: &Arc<dyn VariableBackend>,
    ) -> ObsResult<bool>;

    /// Ids of the scales attached at `axis`, in attach order.
    fn attached_scale_ids(&self, axis: usize) -> ObsResult<Vec<ObjectId>>;

    fn set_is_dimension_scale(&self, scale_name: &str) -> ObsResult<()>;

    /// Logical scale name, if this variable is marked as a scale.
    fn dimension_scale_name(&self) -> ObsResult<Option<String>>;
}

/// The attributes of one group or variable.
pub trait AttributeContainerBackend: Send + Sync {
    fn create(
        &self,
        name: &str,
        descriptor: &TypeDescriptor,
        dims: &Dimensions,
    ) -> ObsResult<Arc<dyn AttributeBackend>>;

    fn open(&self, name: &str) -> ObsResult<Arc<dyn AttributeBackend>>;

    fn exists(&self, name: &str) -> bool;

    fn remove(&self, name: &str) -> ObsResult<()>;

    fn rename(&self, old_name: &str, new_name: &str) -> ObsResult<()>;

    fn list(&self) -> ObsResult<Vec<String>>;
}

/// One attribute. Writes always replace the whole contents.
pub trait AttributeBackend: Send + Sync {
    fn object_id(&self) -> ObjectId;

    fn data_type(&self) -> ObsResult<TypeDescriptor>;

    fn dimensions(&self) -> ObsResult<Dimensions>;

    fn write(&self, data: &ElementBuffer) -> ObsResult<()>;

    fn read(&self) -> ObsResult<ElementBuffer>;
}

/// Committed (named) types of one group.
pub trait TypeContainerBackend: Send + Sync {
    fn commit(&self, name: &str, descriptor: &TypeDescriptor) -> ObsResult<Type>;

    fn open(&self, name: &str) -> ObsResult<Type>;

    fn exists(&self, name: &str) -> bool;

    fn remove(&self, name: &str) -> ObsResult<()>;

    fn list(&self) -> ObsResult<Vec<String>>;
}

/// Builds engine type handles from descriptors.
pub trait TypeProviderBackend: Send + Sync {
    /// Fails with `UnsupportedType` when the engine cannot store `descriptor`.
    fn make_type(&self, descriptor: &TypeDescriptor) -> ObsResult<Type>;
}
