//! Group tree shared by the in-process engines.
//!
//! Groups and variables of one group live in a single name table, so a
//! name is used by at most one of them. Children are owned by their parent
//! through the table; nothing points back up the tree.

use std::collections::BTreeMap;
use std::sync::Arc;

use obs_common::{Dimensions, ObsError, ObsResult};
use parking_lot::RwLock;
use tracing::debug;

use super::{check_name, EngineCore, MemoryAttributes, MemoryTypes, NativeTypeProvider};
use crate::backend::{
    AttributeContainerBackend, GroupBackend, TypeContainerBackend, TypeProviderBackend,
    VariableBackend, VariableContainerBackend,
};
use crate::capabilities::Capabilities;
use crate::context::ObjectId;
use crate::fill::FillValuePolicy;
use crate::params::VariableCreationParams;
use crate::types::TypeDescriptor;

/// Storage strategy plugged into the shared group tree.
pub(crate) trait Engine: Send + Sync + 'static {
    type Variable: VariableBackend + EngineVariable + 'static;

    fn core(&self) -> &Arc<EngineCore>;

    fn capabilities(&self) -> Capabilities;

    /// Policy used when the configuration does not force one.
    fn default_fill_policy(&self, root_attributes: &MemoryAttributes) -> FillValuePolicy;

    fn create_variable(
        self: &Arc<Self>,
        descriptor: &TypeDescriptor,
        dims: &Dimensions,
        params: &VariableCreationParams,
    ) -> ObsResult<Arc<Self::Variable>>;

    /// Called before `variable` leaves the tree; an error keeps it in place.
    /// The tree's own reference is the only one when no handle is open.
    fn release_variable(&self, variable: &Arc<Self::Variable>) -> ObsResult<()>;
}

/// Hooks the tree needs from an engine's variables.
pub(crate) trait EngineVariable {
    /// Drop the stored data; later operations on open handles fail.
    fn invalidate(&self);
}

enum Node<E: Engine> {
    Group(Arc<TreeGroup<E>>),
    Variable(Arc<E::Variable>),
}

impl<E: Engine> Clone for Node<E> {
    fn clone(&self) -> Self {
        match self {
            Node::Group(g) => Node::Group(Arc::clone(g)),
            Node::Variable(v) => Node::Variable(Arc::clone(v)),
        }
    }
}

type Namespace<E> = RwLock<BTreeMap<String, Node<E>>>;

fn name_in_use(name: &str) -> ObsError {
    ObsError::duplicate_name("name is already used by a group or variable").with("name", name)
}

/// One group of an in-process engine.
pub(crate) struct TreeGroup<E: Engine> {
    id: ObjectId,
    engine: Arc<E>,
    nodes: Arc<Namespace<E>>,
    variables: Arc<TreeVariables<E>>,
    attributes: Arc<MemoryAttributes>,
    root_attributes: Arc<MemoryAttributes>,
    types: Arc<MemoryTypes>,
    provider: Arc<NativeTypeProvider>,
}

impl<E: Engine> TreeGroup<E> {
    pub(crate) fn root(engine: Arc<E>) -> Arc<Self> {
        let attributes = Arc::new(MemoryAttributes::new(Arc::clone(engine.core())));
        Self::build(engine, Arc::clone(&attributes), attributes)
    }

    fn build(
        engine: Arc<E>,
        attributes: Arc<MemoryAttributes>,
        root_attributes: Arc<MemoryAttributes>,
    ) -> Arc<Self> {
        let core = Arc::clone(engine.core());
        let nodes: Arc<Namespace<E>> = Arc::new(RwLock::new(BTreeMap::new()));
        Arc::new(Self {
            id: core.next_object_id(),
            variables: Arc::new(TreeVariables {
                engine: Arc::clone(&engine),
                nodes: Arc::clone(&nodes),
            }),
            types: Arc::new(MemoryTypes::new(Arc::clone(&core))),
            provider: Arc::new(NativeTypeProvider::new(core)),
            engine,
            nodes,
            attributes,
            root_attributes,
        })
    }

    fn child(&self) -> Arc<Self> {
        let attributes = Arc::new(MemoryAttributes::new(Arc::clone(self.engine.core())));
        Self::build(
            Arc::clone(&self.engine),
            attributes,
            Arc::clone(&self.root_attributes),
        )
    }
}

impl<E: Engine> GroupBackend for TreeGroup<E> {
    fn object_id(&self) -> ObjectId {
        self.id
    }

    fn capabilities(&self) -> Capabilities {
        self.engine.capabilities()
    }

    fn fill_value_policy(&self) -> ObsResult<FillValuePolicy> {
        Ok(match self.engine.core().config.fill_value_policy {
            Some(policy) => policy,
            None => self.engine.default_fill_policy(&self.root_attributes),
        })
    }

    fn create_group(&self, name: &str) -> ObsResult<Arc<dyn GroupBackend>> {
        check_name(name)?;
        let mut nodes = self.nodes.write();
        if nodes.contains_key(name) {
            return Err(name_in_use(name));
        }
        let group = self.child();
        nodes.insert(name.to_string(), Node::Group(Arc::clone(&group)));
        Ok(group)
    }

    fn open_group(&self, name: &str) -> ObsResult<Arc<dyn GroupBackend>> {
        match self.nodes.read().get(name) {
            Some(Node::Group(g)) => Ok(Arc::clone(g) as Arc<dyn GroupBackend>),
            _ => Err(ObsError::not_found("no group with this name").with("name", name)),
        }
    }

    fn remove_empty_group(&self, name: &str) -> ObsResult<()> {
        let mut nodes = self.nodes.write();
        let group = match nodes.get(name) {
            Some(Node::Group(g)) => Arc::clone(g),
            _ => return Err(ObsError::not_found("no group with this name").with("name", name)),
        };
        let empty = group.nodes.read().is_empty()
            && group.attributes.list()?.is_empty()
            && group.types.list()?.is_empty();
        if !empty {
            return Err(ObsError::backend("group is not empty").with("name", name));
        }
        nodes.remove(name);
        debug!(name = %name, id = %group.id, "Empty group removed from tree");
        Ok(())
    }

    fn group_exists(&self, name: &str) -> bool {
        matches!(self.nodes.read().get(name), Some(Node::Group(_)))
    }

    fn list_groups(&self) -> ObsResult<Vec<String>> {
        Ok(self
            .nodes
            .read()
            .iter()
            .filter(|(_, node)| matches!(node, Node::Group(_)))
            .map(|(name, _)| name.clone())
            .collect())
    }

    fn attributes(&self) -> Arc<dyn AttributeContainerBackend> {
        Arc::clone(&self.attributes) as Arc<dyn AttributeContainerBackend>
    }

    fn variables(&self) -> Arc<dyn VariableContainerBackend> {
        Arc::clone(&self.variables) as Arc<dyn VariableContainerBackend>
    }

    fn types(&self) -> Arc<dyn TypeContainerBackend> {
        Arc::clone(&self.types) as Arc<dyn TypeContainerBackend>
    }

    fn type_provider(&self) -> Arc<dyn TypeProviderBackend> {
        Arc::clone(&self.provider) as Arc<dyn TypeProviderBackend>
    }
}

/// Variable view of a group's name table.
pub(crate) struct TreeVariables<E: Engine> {
    engine: Arc<E>,
    nodes: Arc<Namespace<E>>,
}

impl<E: Engine> TreeVariables<E> {
    fn not_found(name: &str) -> ObsError {
        ObsError::not_found("no variable with this name").with("name", name)
    }
}

impl<E: Engine> VariableContainerBackend for TreeVariables<E> {
    fn create(
        &self,
        name: &str,
        descriptor: &TypeDescriptor,
        dims: &Dimensions,
        params: &VariableCreationParams,
    ) -> ObsResult<Arc<dyn VariableBackend>> {
        check_name(name)?;
        self.engine.core().check_type(descriptor)?;
        let mut nodes = self.nodes.write();
        if nodes.contains_key(name) {
            return Err(name_in_use(name));
        }
        let variable = self.engine.create_variable(descriptor, dims, params)?;
        nodes.insert(name.to_string(), Node::Variable(Arc::clone(&variable)));
        Ok(variable)
    }

    fn open(&self, name: &str) -> ObsResult<Arc<dyn VariableBackend>> {
        match self.nodes.read().get(name) {
            Some(Node::Variable(v)) => Ok(Arc::clone(v) as Arc<dyn VariableBackend>),
            _ => Err(Self::not_found(name)),
        }
    }

    fn exists(&self, name: &str) -> bool {
        matches!(self.nodes.read().get(name), Some(Node::Variable(_)))
    }

    fn remove(&self, name: &str) -> ObsResult<()> {
        let mut nodes = self.nodes.write();
        match nodes.get(name) {
            Some(Node::Variable(v)) => self.engine.release_variable(v)?,
            _ => return Err(Self::not_found(name)),
        }
        let Some(Node::Variable(variable)) = nodes.remove(name) else {
            return Err(Self::not_found(name));
        };
        variable.invalidate();
        self.engine.core().scales.forget(variable.object_id());
        debug!(name = %name, id = %variable.object_id(), "Variable removed from tree");
        Ok(())
    }

    fn rename(&self, old_name: &str, new_name: &str) -> ObsResult<()> {
        check_name(new_name)?;
        let mut nodes = self.nodes.write();
        if !matches!(nodes.get(old_name), Some(Node::Variable(_))) {
            return Err(Self::not_found(old_name));
        }
        if nodes.contains_key(new_name) {
            return Err(name_in_use(new_name));
        }
        if let Some(node) = nodes.remove(old_name) {
            nodes.insert(new_name.to_string(), node);
        }
        Ok(())
    }

    fn list(&self) -> ObsResult<Vec<String>> {
        Ok(self
            .nodes
            .read()
            .iter()
            .filter(|(_, node)| matches!(node, Node::Variable(_)))
            .map(|(name, _)| name.clone())
            .collect())
    }
}
