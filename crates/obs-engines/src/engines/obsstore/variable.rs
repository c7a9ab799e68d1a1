use std::sync::Arc;

use obs_common::{product, row_major_strides, Dimensions, ObsError, ObsResult, Selection};
use parking_lot::RwLock;
use tracing::debug;

use crate::backend::{AttributeContainerBackend, VariableBackend};
use crate::buffer::ElementBuffer;
use crate::context::ObjectId;
use crate::engines::{removed, EngineCore, EngineVariable, VariableHeader};
use crate::fill::FillValue;
use crate::params::VariableCreationParams;
use crate::types::TypeDescriptor;

struct DenseData {
    dims: Dimensions,
    values: ElementBuffer,
}

/// Variable stored as one row-major buffer.
pub(crate) struct StoreVariable {
    header: VariableHeader,
    /// `None` once removed from its group.
    state: RwLock<Option<DenseData>>,
}

impl StoreVariable {
    pub(crate) fn new(
        core: &Arc<EngineCore>,
        descriptor: &TypeDescriptor,
        dims: &Dimensions,
        params: &VariableCreationParams,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me: &std::sync::Weak<Self>| {
            let header = VariableHeader::new(core, me.clone() as std::sync::Weak<dyn VariableBackend>, descriptor, dims.dims_cur(), params);
            let values = ElementBuffer::filled(&header.fill, dims.num_elements() as usize);
            Self {
                header,
                state: RwLock::new(Some(DenseData {
                    dims: dims.clone(),
                    values,
                })),
            }
        })
    }

    fn with_data<R>(&self, f: impl FnOnce(&DenseData) -> ObsResult<R>) -> ObsResult<R> {
        match self.state.read().as_ref() {
            Some(data) => f(data),
            None => Err(removed("variable", self.header.id)),
        }
    }

    fn with_data_mut<R>(&self, f: impl FnOnce(&mut DenseData) -> ObsResult<R>) -> ObsResult<R> {
        match self.state.write().as_mut() {
            Some(data) => f(data),
            None => Err(removed("variable", self.header.id)),
        }
    }

    fn live(&self) -> ObsResult<()> {
        self.with_data(|_| Ok(()))
    }
}

/// Copy the elements of `old` that are still inside `new_dims`; everything
/// else takes the fill value.
fn relayout(
    old: &ElementBuffer,
    old_dims: &[u64],
    new_dims: &[u64],
    fill: &FillValue,
) -> ObsResult<ElementBuffer> {
    let mut out = ElementBuffer::filled(fill, product(new_dims)? as usize);
    let old_strides = row_major_strides(old_dims);
    let new_strides = row_major_strides(new_dims);
    'elements: for src in 0..old.len() {
        let mut rem = src as u64;
        let mut dst = 0u64;
        for axis in 0..old_dims.len() {
            let coord = rem / old_strides[axis];
            rem %= old_strides[axis];
            if coord >= new_dims[axis] {
                continue 'elements;
            }
            dst += coord * new_strides[axis];
        }
        out.copy_element(dst as usize, old, src);
    }
    Ok(out)
}

impl EngineVariable for StoreVariable {
    fn invalidate(&self) {
        *self.state.write() = None;
        self.header.clear();
    }
}

impl VariableBackend for StoreVariable {
    fn object_id(&self) -> ObjectId {
        self.header.id
    }

    fn data_type(&self) -> ObsResult<TypeDescriptor> {
        self.with_data(|_| Ok(self.header.descriptor.clone()))
    }

    fn dimensions(&self) -> ObsResult<Dimensions> {
        self.with_data(|data| Ok(data.dims.clone()))
    }

    fn resize(&self, new_dims: &[u64]) -> ObsResult<()> {
        self.with_data_mut(|data| {
            let dims = data.dims.resized(new_dims)?;
            data.values = relayout(
                &data.values,
                data.dims.dims_cur(),
                dims.dims_cur(),
                &self.header.fill,
            )?;
            debug!(
                id = %self.header.id,
                from = ?data.dims.dims_cur(),
                to = ?dims.dims_cur(),
                "Resized dense variable"
            );
            data.dims = dims;
            Ok(())
        })?;
        self.header.check_scale_lengths();
        Ok(())
    }

    fn write(&self, data: &ElementBuffer, file_selection: &Selection) -> ObsResult<()> {
        self.with_data_mut(|stored| {
            if !data.matches_type(&self.header.descriptor) {
                return Err(ObsError::type_mismatch("buffer does not hold the variable type")
                    .with("type", &self.header.descriptor));
            }
            let selected = file_selection.resolve(stored.dims.dims_cur())?;
            if selected.num_points() != data.len() as u64 {
                return Err(ObsError::selection_size_mismatch(
                    data.len() as u64,
                    selected.num_points(),
                ));
            }
            stored.values.scatter(selected.linear_indices(), data)
        })
    }

    fn read(&self, file_selection: &Selection) -> ObsResult<ElementBuffer> {
        self.with_data(|stored| {
            let selected = file_selection.resolve(stored.dims.dims_cur())?;
            stored.values.gather(selected.linear_indices())
        })
    }

    fn attributes(&self) -> ObsResult<Arc<dyn AttributeContainerBackend>> {
        self.live()?;
        Ok(self.header.attributes())
    }

    fn creation_parameters(&self) -> ObsResult<VariableCreationParams> {
        self.live()?;
        Ok(self.header.params.clone())
    }

    fn attach_dimension_scale(
        &self,
        axis: usize,
        scale: &Arc<dyn VariableBackend>,
    ) -> ObsResult<()> {
        self.live()?;
        self.header.attach(axis, scale)
    }

    fn detach_dimension_scale(
        &self,
        axis: usize,
        scale: &Arc<dyn VariableBackend>,
    ) -> ObsResult<()> {
        self.live()?;
        self.header.detach(axis, scale)
    }

    fn is_dimension_scale_attached(
        &self,
        axis: usize,
        scale: &Arc<dyn VariableBackend>,
    ) -> ObsResult<bool> {
        self.live()?;
        Ok(self.header.is_attached(axis, scale))
    }

    fn attached_scale_ids(&self, axis: usize) -> ObsResult<Vec<ObjectId>> {
        self.live()?;
        Ok(self.header.scales_on(axis))
    }

    fn set_is_dimension_scale(&self, scale_name: &str) -> ObsResult<()> {
        self.live()?;
        self.header.set_scale_name(scale_name);
        Ok(())
    }

    fn dimension_scale_name(&self) -> ObsResult<Option<String>> {
        self.live()?;
        Ok(self.header.scale_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fill::FillValuePolicy;
    use crate::types::BasicType;

    fn ints(values: &[i32]) -> ElementBuffer {
        ElementBuffer::packed(4, values.iter().flat_map(|v| v.to_le_bytes()).collect()).unwrap()
    }

    #[test]
    fn test_relayout_keeps_overlap() {
        let fill = FillValue::Packed((-1i32).to_le_bytes().to_vec());
        // 2x3 -> 3x2
        let old = ints(&[1, 2, 3, 4, 5, 6]);
        let out = relayout(&old, &[2, 3], &[3, 2], &fill).unwrap();
        assert_eq!(out, ints(&[1, 2, 4, 5, -1, -1]));
    }

    #[test]
    fn test_relayout_to_empty_and_back() {
        let fill = FillValuePolicy::Hdf5.default_for(&TypeDescriptor::Fundamental(BasicType::Int32));
        let old = ints(&[7, 8]);
        let empty = relayout(&old, &[2], &[0], &fill).unwrap();
        assert!(empty.is_empty());
        let regrown = relayout(&empty, &[0], &[2], &fill).unwrap();
        assert_eq!(regrown, ints(&[0, 0]));
    }

    #[test]
    fn test_relayout_scalar() {
        let fill = FillValue::Packed(0i32.to_le_bytes().to_vec());
        let out = relayout(&ints(&[42]), &[], &[], &fill).unwrap();
        assert_eq!(out, ints(&[42]));
    }
}
