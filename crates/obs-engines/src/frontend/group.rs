use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use obs_common::{ObsError, ObsResult, ObsResultExt};
use tracing::debug;

use super::{
    parent_and_leaf, split_path, walk_groups, HasAttributes, HasTypes, HasVariables, ObjectType,
    TypeProvider,
};
use crate::backend::GroupBackend;
use crate::capabilities::Capabilities;
use crate::context::{EngineId, ObjectId};
use crate::fill::FillValuePolicy;

/// A node in the group tree.
///
/// Groups are unbound until obtained from a factory or another group.
/// Cloning shares the backend object; it is released with its last handle.
#[derive(Clone, Default)]
pub struct Group {
    backend: Option<Arc<dyn GroupBackend>>,
}

impl fmt::Debug for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.backend {
            Some(b) => write!(f, "Group({})", b.object_id()),
            None => f.write_str("Group(unbound)"),
        }
    }
}

impl Group {
    pub fn from_backend(backend: Arc<dyn GroupBackend>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    pub fn is_bound(&self) -> bool {
        self.backend.is_some()
    }

    fn backend(&self, operation: &str) -> ObsResult<&Arc<dyn GroupBackend>> {
        self.backend
            .as_ref()
            .ok_or_else(|| ObsError::no_backend(operation))
    }

    /// Create a group at `path`, creating missing intermediate groups.
    ///
    /// Fails with `DuplicateName` only when the leaf already exists.
    pub fn create(&self, path: &str) -> ObsResult<Group> {
        let backend = self.backend("Group::create")?;
        let (parent, leaf) = parent_and_leaf(backend, path, true)
            .op("Group::create")
            .ctx("path", path)?;
        let created = parent
            .create_group(&leaf)
            .op("Group::create")
            .ctx("path", path)?;
        debug!(path = %path, id = %created.object_id(), "Created group");
        Ok(Group::from_backend(created))
    }

    /// Open the group at `path`. Fails with `NotFound` at the first missing segment.
    pub fn open(&self, path: &str) -> ObsResult<Group> {
        let backend = self.backend("Group::open")?;
        let segments = split_path(path).op("Group::open")?;
        let found = walk_groups(backend, &segments, false)
            .op("Group::open")
            .ctx("path", path)?;
        Ok(Group::from_backend(found))
    }

    pub fn exists(&self, path: &str) -> ObsResult<bool> {
        let backend = self.backend("Group::exists")?;
        let segments = split_path(path).op("Group::exists")?;
        let mut current = Arc::clone(backend);
        for segment in segments {
            if !current.group_exists(segment) {
                return Ok(false);
            }
            current = current
                .open_group(segment)
                .op("Group::exists")
                .ctx("path", path)?;
        }
        Ok(true)
    }

    /// Immediate child group names.
    pub fn list(&self) -> ObsResult<Vec<String>> {
        self.backend("Group::list")?.list_groups().op("Group::list")
    }

    /// Child groups and/or variables, optionally recursive, keyed by kind.
    pub fn list_objects(
        &self,
        filter: Option<ObjectType>,
        recurse: bool,
    ) -> ObsResult<BTreeMap<ObjectType, Vec<String>>> {
        self.backend("Group::list_objects")?
            .list_objects(filter, recurse)
            .op("Group::list_objects")
    }

    pub fn capabilities(&self) -> ObsResult<Capabilities> {
        Ok(self.backend("Group::capabilities")?.capabilities())
    }

    pub fn fill_value_policy(&self) -> ObsResult<FillValuePolicy> {
        self.backend("Group::fill_value_policy")?
            .fill_value_policy()
            .op("Group::fill_value_policy")
    }

    pub fn engine_id(&self) -> ObsResult<EngineId> {
        Ok(self.backend("Group::engine_id")?.engine_id())
    }

    pub fn object_id(&self) -> ObsResult<ObjectId> {
        Ok(self.backend("Group::object_id")?.object_id())
    }

    /// The variables of this group.
    pub fn vars(&self) -> HasVariables {
        HasVariables::new(self.backend.clone())
    }

    /// The attributes of this group.
    pub fn atts(&self) -> HasAttributes {
        match &self.backend {
            Some(b) => HasAttributes::from_backend(b.attributes()),
            None => HasAttributes::default(),
        }
    }

    /// The committed types of this group.
    pub fn types(&self) -> HasTypes {
        match &self.backend {
            Some(b) => HasTypes::from_backend(b.types()),
            None => HasTypes::default(),
        }
    }

    /// Type construction for this group's engine.
    pub fn type_provider(&self) -> TypeProvider {
        match &self.backend {
            Some(b) => TypeProvider::from_backend(b.type_provider()),
            None => TypeProvider::default(),
        }
    }
}
