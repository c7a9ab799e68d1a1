use std::fmt;
use std::sync::{Arc, Weak};

use obs_common::{Dimensions, ObsError, ObsResult, ObsResultExt, Selection};
use tracing::debug;

use super::{decode_strings, encode_strings, type_mismatch, HasAttributes};
use crate::backend::{VariableBackend, VariableContainerBackend};
use crate::buffer::ElementBuffer;
use crate::context::{EngineId, ObjectId};
use crate::fill::FillValue;
use crate::params::{Compression, VariableCreationParams};
use crate::types::{BasicType, ObjectAccessor, StorageType, Type, TypeDescriptor};

/// A named, typed, N-dimensional array.
///
/// Besides its backend object, a variable keeps a weak reference to the
/// variable container it was opened from. That reference is only used to
/// resolve attached dimension scales back to names and never keeps the
/// container alive.
#[derive(Clone, Default)]
pub struct Variable {
    backend: Option<Arc<dyn VariableBackend>>,
    container: Option<Weak<dyn VariableContainerBackend>>,
}

impl fmt::Debug for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.backend {
            Some(b) => write!(f, "Variable({})", b.object_id()),
            None => f.write_str("Variable(unbound)"),
        }
    }
}

impl Variable {
    pub fn from_backend(
        backend: Arc<dyn VariableBackend>,
        container: Weak<dyn VariableContainerBackend>,
    ) -> Self {
        Self {
            backend: Some(backend),
            container: Some(container),
        }
    }

    pub fn is_bound(&self) -> bool {
        self.backend.is_some()
    }

    fn backend(&self, operation: &str) -> ObsResult<&Arc<dyn VariableBackend>> {
        self.backend
            .as_ref()
            .ok_or_else(|| ObsError::no_backend(operation))
    }

    pub fn object_id(&self) -> ObsResult<ObjectId> {
        Ok(self.backend("Variable::object_id")?.object_id())
    }

    pub fn engine_id(&self) -> ObsResult<EngineId> {
        Ok(self.object_id()?.engine())
    }

    pub fn data_type(&self) -> ObsResult<Type> {
        let backend = self.backend("Variable::data_type")?;
        let descriptor = backend.data_type().op("Variable::data_type")?;
        Ok(Type::new(descriptor, backend.object_id().engine()))
    }

    pub fn is_a<T: StorageType>(&self) -> ObsResult<bool> {
        Ok(self.data_type()?.is_a::<T>())
    }

    /// Scalar kind of a fundamental variable.
    pub fn basic_type(&self) -> ObsResult<BasicType> {
        match self.data_type()?.descriptor() {
            TypeDescriptor::Fundamental(b) => Ok(*b),
            other => Err(ObsError::type_mismatch("variable does not have a fundamental type")
                .with("actual", other)
                .with("operation", "Variable::basic_type")),
        }
    }

    pub fn dimensions(&self) -> ObsResult<Dimensions> {
        self.backend("Variable::dimensions")?
            .dimensions()
            .op("Variable::dimensions")
    }

    /// Change the current extents. Attached scales are not resized.
    pub fn resize(&self, new_dims: &[u64]) -> ObsResult<()> {
        let backend = self.backend("Variable::resize")?;
        backend
            .resize(new_dims)
            .op("Variable::resize")
            .ctx("requested", format!("{:?}", new_dims))?;
        debug!(id = %backend.object_id(), dims = ?new_dims, "Resized variable");
        Ok(())
    }

    fn checked_type<T: StorageType>(&self, operation: &str) -> ObsResult<TypeDescriptor> {
        let declared = self
            .backend(operation)?
            .data_type()
            .op(operation)?;
        let requested = T::descriptor();
        if !declared.is_compatible_with(&requested) {
            return Err(type_mismatch(&declared, &requested).with("operation", operation));
        }
        Ok(declared)
    }

    /// Write every element.
    pub fn write<T: StorageType>(&self, data: &[T]) -> ObsResult<()> {
        self.write_selected(data, &Selection::all(), &Selection::all())
    }

    /// Write the `mem_selection` elements of `data` to the `file_selection`
    /// elements of the variable.
    pub fn write_selected<T: StorageType>(
        &self,
        data: &[T],
        mem_selection: &Selection,
        file_selection: &Selection,
    ) -> ObsResult<()> {
        self.checked_type::<T>("Variable::write")?;
        let buffer = T::accessor().serialize(data)?;
        self.write_buffer(&buffer, mem_selection, file_selection)
    }

    /// Untyped write. The buffer must carry elements of the declared type.
    pub fn write_buffer(
        &self,
        buffer: &ElementBuffer,
        mem_selection: &Selection,
        file_selection: &Selection,
    ) -> ObsResult<()> {
        let backend = self.backend("Variable::write")?;
        let declared = backend.data_type().op("Variable::write")?;
        if !buffer.matches_type(&declared) {
            return Err(ObsError::type_mismatch("buffer does not match the declared type")
                .with("expected", &declared)
                .with("operation", "Variable::write"));
        }

        let mem = mem_selection
            .resolve_memory(buffer.len() as u64)
            .op("Variable::write")?;
        let compact;
        let payload = if mem_selection.is_all() {
            buffer
        } else {
            compact = buffer.gather(mem.linear_indices())?;
            &compact
        };
        backend
            .write(payload, file_selection)
            .op("Variable::write")
            .ctx("id", backend.object_id())
    }

    /// Write strings to a string variable of either length kind.
    pub fn write_strings<S: AsRef<str>>(&self, values: &[S]) -> ObsResult<()> {
        let declared = self
            .backend("Variable::write_strings")?
            .data_type()
            .op("Variable::write_strings")?;
        let buffer = encode_strings(&declared, values).op("Variable::write_strings")?;
        self.write_buffer(&buffer, &Selection::all(), &Selection::all())
    }

    /// Read every element.
    pub fn read<T: StorageType>(&self) -> ObsResult<Vec<T>> {
        self.read_selected(&Selection::all(), &Selection::all())
    }

    /// Read the `file_selection` elements into the `mem_selection` positions
    /// of a new buffer.
    ///
    /// The buffer has the memory selection's extent, or the file selection's
    /// element count when no extent is given. Unselected positions hold the
    /// type's zero value.
    pub fn read_selected<T: StorageType>(
        &self,
        mem_selection: &Selection,
        file_selection: &Selection,
    ) -> ObsResult<Vec<T>> {
        self.checked_type::<T>("Variable::read")?;
        let accessor = T::accessor();
        let (buffer, len) =
            self.read_layout(mem_selection, file_selection, |n| accessor.prep_deserialize(n))?;
        accessor.deserialize(&buffer, len)
    }

    /// Untyped read; see [`read_selected`](Self::read_selected).
    pub fn read_buffer(
        &self,
        mem_selection: &Selection,
        file_selection: &Selection,
    ) -> ObsResult<ElementBuffer> {
        let declared = self
            .backend("Variable::read")?
            .data_type()
            .op("Variable::read")?;
        let (buffer, _) = self.read_layout(mem_selection, file_selection, |n| {
            if declared.is_variable_length_string() {
                ElementBuffer::strings(vec![String::new(); n])
            } else {
                ElementBuffer::zeroed(declared.size(), n)
            }
        })?;
        Ok(buffer)
    }

    /// Read strings from a string variable of either length kind.
    pub fn read_strings(&self) -> ObsResult<Vec<String>> {
        let declared = self
            .backend("Variable::read_strings")?
            .data_type()
            .op("Variable::read_strings")?;
        let buffer = self.read_buffer(&Selection::all(), &Selection::all())?;
        decode_strings(&declared, &buffer).op("Variable::read_strings")
    }

    fn read_layout(
        &self,
        mem_selection: &Selection,
        file_selection: &Selection,
        blank: impl FnOnce(usize) -> ElementBuffer,
    ) -> ObsResult<(ElementBuffer, usize)> {
        let backend = self.backend("Variable::read")?;
        let compact = backend
            .read(file_selection)
            .op("Variable::read")
            .ctx("id", backend.object_id())?;
        let storage_points = compact.len() as u64;

        let mem_len = match mem_selection.extent() {
            Some(extent) => obs_common::product(extent)?,
            None => storage_points,
        };
        let mem = mem_selection.resolve_memory(mem_len).op("Variable::read")?;
        if mem.num_points() != storage_points {
            return Err(ObsError::selection_size_mismatch(mem.num_points(), storage_points)
                .with("operation", "Variable::read"));
        }
        if mem_selection.is_all() {
            let len = compact.len();
            return Ok((compact, len));
        }
        let mut out = blank(mem_len as usize);
        out.scatter(mem.linear_indices(), &compact)?;
        Ok((out, mem_len as usize))
    }

    pub fn atts(&self) -> ObsResult<HasAttributes> {
        let backend = self.backend("Variable::atts")?;
        Ok(HasAttributes::from_backend(
            backend.attributes().op("Variable::atts")?,
        ))
    }

    fn scale_backend<'a>(
        &self,
        scale: &'a Variable,
        operation: &str,
    ) -> ObsResult<(&Arc<dyn VariableBackend>, &'a Arc<dyn VariableBackend>)> {
        let backend = self.backend(operation)?;
        let scale_backend = scale.backend(operation)?;
        let (mine, theirs) = (
            backend.object_id().engine(),
            scale_backend.object_id().engine(),
        );
        if mine != theirs {
            return Err(ObsError::cross_backend_link(
                "dimension scale belongs to a different engine instance",
            )
            .with("variable_engine", mine)
            .with("scale_engine", theirs)
            .with("operation", operation));
        }
        Ok((backend, scale_backend))
    }

    fn check_axis(&self, axis: usize, operation: &str) -> ObsResult<()> {
        let rank = self.dimensions()?.dimensionality();
        if axis >= rank {
            return Err(ObsError::invalid_dimensions("axis is out of range")
                .with("axis", axis)
                .with("rank", rank)
                .with("operation", operation));
        }
        Ok(())
    }

    /// Link `scale` to `axis`. Fails if the link exists, if the axis is out of
    /// range, or if `scale` lives in another engine instance.
    pub fn attach_dimension_scale(&self, axis: usize, scale: &Variable) -> ObsResult<()> {
        let op = "Variable::attach_dimension_scale";
        let (backend, scale_backend) = self.scale_backend(scale, op)?;
        self.check_axis(axis, op)?;
        backend
            .attach_dimension_scale(axis, scale_backend)
            .op(op)
    }

    /// Remove the link between `scale` and `axis`. Fails if it does not exist.
    pub fn detach_dimension_scale(&self, axis: usize, scale: &Variable) -> ObsResult<()> {
        let op = "Variable::detach_dimension_scale";
        let (backend, scale_backend) = self.scale_backend(scale, op)?;
        backend
            .detach_dimension_scale(axis, scale_backend)
            .op(op)
    }

    pub fn is_dimension_scale_attached(&self, axis: usize, scale: &Variable) -> ObsResult<bool> {
        let op = "Variable::is_dimension_scale_attached";
        match self.scale_backend(scale, op) {
            Ok((backend, scale_backend)) => {
                backend.is_dimension_scale_attached(axis, scale_backend).op(op)
            }
            Err(e) if e.is(obs_common::ErrorKind::CrossBackendLink) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Mark this variable as a coordinate array named `scale_name`.
    pub fn set_is_dimension_scale(&self, scale_name: &str) -> ObsResult<()> {
        self.backend("Variable::set_is_dimension_scale")?
            .set_is_dimension_scale(scale_name)
            .op("Variable::set_is_dimension_scale")
    }

    pub fn is_dimension_scale(&self) -> ObsResult<bool> {
        Ok(self.dimension_scale_name()?.is_some())
    }

    pub fn dimension_scale_name(&self) -> ObsResult<Option<String>> {
        self.backend("Variable::dimension_scale_name")?
            .dimension_scale_name()
            .op("Variable::dimension_scale_name")
    }

    /// Scales attached at `axis` that live in this variable's own group,
    /// with their names.
    pub fn attached_dimension_scales(&self, axis: usize) -> ObsResult<Vec<(String, Variable)>> {
        let op = "Variable::attached_dimension_scales";
        let backend = self.backend(op)?;
        let ids = backend.attached_scale_ids(axis).op(op)?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let container = self
            .container
            .as_ref()
            .and_then(Weak::upgrade)
            .ok_or_else(|| {
                ObsError::not_found("the group owning this variable no longer exists")
                    .with("operation", op)
            })?;

        let mut found = Vec::new();
        for name in container.list().op(op)? {
            let candidate = container.open(&name).op(op)?;
            if ids.contains(&candidate.object_id()) {
                found.push((
                    name,
                    Variable::from_backend(candidate, Arc::downgrade(&container)),
                ));
            }
        }
        Ok(found)
    }

    /// For every axis, the candidates attached there.
    pub fn dimension_scale_mappings(
        &self,
        candidates: &[(String, Variable)],
    ) -> ObsResult<Vec<Vec<(String, Variable)>>> {
        let rank = self.dimensions()?.dimensionality();
        let mut mappings = vec![Vec::new(); rank];
        for (axis, slot) in mappings.iter_mut().enumerate() {
            for (name, scale) in candidates {
                if self.is_dimension_scale_attached(axis, scale)? {
                    slot.push((name.clone(), scale.clone()));
                }
            }
        }
        Ok(mappings)
    }

    /// Creation parameters as stored by the engine.
    pub fn creation_parameters(&self) -> ObsResult<VariableCreationParams> {
        self.backend("Variable::creation_parameters")?
            .creation_parameters()
            .op("Variable::creation_parameters")
    }

    /// Chunk shape, empty when the variable is not chunked.
    pub fn chunk_sizes(&self) -> ObsResult<Vec<u64>> {
        Ok(self
            .creation_parameters()?
            .chunk_sizes()
            .map(<[u64]>::to_vec)
            .unwrap_or_default())
    }

    pub fn is_chunked(&self) -> ObsResult<bool> {
        Ok(self.creation_parameters()?.chunks_enabled())
    }

    /// Gzip level, if gzip compression was requested.
    pub fn gzip_compression(&self) -> ObsResult<Option<u8>> {
        Ok(self.creation_parameters()?.gzip_level())
    }

    /// `(pixels_per_block, options)`, if szip compression was requested.
    pub fn szip_compression(&self) -> ObsResult<Option<(u32, u32)>> {
        Ok(match self.creation_parameters()?.compression {
            Compression::Szip {
                pixels_per_block,
                options,
            } => Some((pixels_per_block, options)),
            _ => None,
        })
    }

    pub fn fill_value(&self) -> ObsResult<Option<FillValue>> {
        Ok(self.creation_parameters()?.fill_value)
    }

    pub fn has_fill_value(&self) -> ObsResult<bool> {
        Ok(self.creation_parameters()?.has_fill_value())
    }
}
