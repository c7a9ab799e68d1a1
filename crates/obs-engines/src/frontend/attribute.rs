use std::fmt;
use std::sync::Arc;

use obs_common::{Dimensions, ObsError, ObsResult, ObsResultExt};

use super::{decode_strings, encode_strings, type_mismatch};
use crate::backend::AttributeBackend;
use crate::buffer::ElementBuffer;
use crate::context::ObjectId;
use crate::types::{ObjectAccessor, StorageType, Type};

/// Small named metadata value on a group or variable.
///
/// Every write replaces the whole contents.
#[derive(Clone, Default)]
pub struct Attribute {
    backend: Option<Arc<dyn AttributeBackend>>,
}

impl fmt::Debug for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.backend {
            Some(b) => write!(f, "Attribute({})", b.object_id()),
            None => f.write_str("Attribute(unbound)"),
        }
    }
}

impl Attribute {
    pub fn from_backend(backend: Arc<dyn AttributeBackend>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    pub fn is_bound(&self) -> bool {
        self.backend.is_some()
    }

    fn backend(&self, operation: &str) -> ObsResult<&Arc<dyn AttributeBackend>> {
        self.backend
            .as_ref()
            .ok_or_else(|| ObsError::no_backend(operation))
    }

    pub fn object_id(&self) -> ObsResult<ObjectId> {
        Ok(self.backend("Attribute::object_id")?.object_id())
    }

    pub fn data_type(&self) -> ObsResult<Type> {
        let backend = self.backend("Attribute::data_type")?;
        let descriptor = backend.data_type().op("Attribute::data_type")?;
        Ok(Type::new(descriptor, backend.object_id().engine()))
    }

    pub fn is_a<T: StorageType>(&self) -> ObsResult<bool> {
        Ok(self.data_type()?.is_a::<T>())
    }

    pub fn dimensions(&self) -> ObsResult<Dimensions> {
        self.backend("Attribute::dimensions")?
            .dimensions()
            .op("Attribute::dimensions")
    }

    /// Replace the contents. `data` must hold exactly one value per element.
    pub fn write<T: StorageType>(&self, data: &[T]) -> ObsResult<()> {
        let backend = self.backend("Attribute::write")?;
        let declared = backend.data_type().op("Attribute::write")?;
        let requested = T::descriptor();
        if !declared.is_compatible_with(&requested) {
            return Err(type_mismatch(&declared, &requested).with("operation", "Attribute::write"));
        }
        let buffer = T::accessor().serialize(data)?;
        self.write_buffer(&buffer)
    }

    /// Untyped write of a complete buffer.
    pub fn write_buffer(&self, buffer: &ElementBuffer) -> ObsResult<()> {
        let backend = self.backend("Attribute::write")?;
        let declared = backend.data_type().op("Attribute::write")?;
        if !buffer.matches_type(&declared) {
            return Err(ObsError::type_mismatch("buffer does not match the declared type")
                .with("expected", &declared)
                .with("operation", "Attribute::write"));
        }
        let expected = backend.dimensions().op("Attribute::write")?.num_elements();
        if buffer.len() as u64 != expected {
            return Err(ObsError::selection_size_mismatch(buffer.len() as u64, expected)
                .with("operation", "Attribute::write"));
        }
        backend
            .write(buffer)
            .op("Attribute::write")
            .ctx("id", backend.object_id())
    }

    pub fn write_strings<S: AsRef<str>>(&self, values: &[S]) -> ObsResult<()> {
        let declared = self
            .backend("Attribute::write_strings")?
            .data_type()
            .op("Attribute::write_strings")?;
        let buffer = encode_strings(&declared, values).op("Attribute::write_strings")?;
        self.write_buffer(&buffer)
    }

    pub fn read<T: StorageType>(&self) -> ObsResult<Vec<T>> {
        let backend = self.backend("Attribute::read")?;
        let declared = backend.data_type().op("Attribute::read")?;
        let requested = T::descriptor();
        if !declared.is_compatible_with(&requested) {
            return Err(type_mismatch(&declared, &requested).with("operation", "Attribute::read"));
        }
        let buffer = self.read_buffer()?;
        T::accessor().deserialize(&buffer, buffer.len())
    }

    pub fn read_buffer(&self) -> ObsResult<ElementBuffer> {
        let backend = self.backend("Attribute::read")?;
        backend
            .read()
            .op("Attribute::read")
            .ctx("id", backend.object_id())
    }

    pub fn read_strings(&self) -> ObsResult<Vec<String>> {
        let declared = self
            .backend("Attribute::read_strings")?
            .data_type()
            .op("Attribute::read_strings")?;
        decode_strings(&declared, &self.read_buffer()?).op("Attribute::read_strings")
    }
}
