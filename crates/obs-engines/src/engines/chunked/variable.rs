use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::io::{Read, Write};
use std::sync::Arc;

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use obs_common::{
    product, row_major_strides, Dimensions, ObsError, ObsResult, ResolvedSelection, Selection,
};
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use super::ChunkCache;
use crate::backend::{AttributeContainerBackend, VariableBackend};
use crate::buffer::ElementBuffer;
use crate::context::ObjectId;
use crate::engines::{removed, EngineCore, EngineVariable, VariableHeader};
use crate::params::{max_chunks, Compression, VariableCreationParams};
use crate::types::TypeDescriptor;

enum StoredChunk {
    Plain(ElementBuffer),
    Deflated { element_size: usize, bytes: Vec<u8> },
}

struct ChunkedData {
    dims: Dimensions,
    chunks: HashMap<Vec<u64>, StoredChunk>,
}

/// Selected cells grouped by chunk: `(position in selection, offset in chunk)`.
type ChunkCells = BTreeMap<Vec<u64>, Vec<(usize, usize)>>;

/// Variable stored as a sparse map of fixed-shape chunks.
pub(crate) struct ChunkedVariable {
    header: VariableHeader,
    cache: Arc<Mutex<ChunkCache>>,
    shape: Vec<u64>,
    strides: Vec<u64>,
    chunk_len: usize,
    gzip_level: Option<u32>,
    /// `None` once removed from its group.
    state: RwLock<Option<ChunkedData>>,
}

impl ChunkedVariable {
    pub(crate) fn new(
        core: &Arc<EngineCore>,
        cache: Arc<Mutex<ChunkCache>>,
        descriptor: &TypeDescriptor,
        dims: &Dimensions,
        params: &VariableCreationParams,
    ) -> ObsResult<Arc<Self>> {
        let shape = params
            .chunk_sizes()
            .map(<[u64]>::to_vec)
            .unwrap_or_else(|| max_chunks(dims.dims_cur(), core.config.max_chunk_elements));
        let chunk_len = product(&shape)? as usize;
        Ok(Arc::new_cyclic(|me: &std::sync::Weak<Self>| {
            let header = VariableHeader::new(core, me.clone() as std::sync::Weak<dyn VariableBackend>, descriptor, dims.dims_cur(), params);
            let gzip_level = match header.params.compression {
                Compression::Gzip { level } => {
                    Some(u32::from(level.unwrap_or(core.config.default_gzip_level)))
                }
                _ => None,
            };
            Self {
                header,
                cache,
                strides: row_major_strides(&shape),
                shape,
                chunk_len,
                gzip_level,
                state: RwLock::new(Some(ChunkedData {
                    dims: dims.clone(),
                    chunks: HashMap::new(),
                })),
            }
        }))
    }

    fn with_data<R>(&self, f: impl FnOnce(&ChunkedData) -> ObsResult<R>) -> ObsResult<R> {
        match self.state.read().as_ref() {
            Some(data) => f(data),
            None => Err(removed("variable", self.header.id)),
        }
    }

    fn with_data_mut<R>(&self, f: impl FnOnce(&mut ChunkedData) -> ObsResult<R>) -> ObsResult<R> {
        match self.state.write().as_mut() {
            Some(data) => f(data),
            None => Err(removed("variable", self.header.id)),
        }
    }

    fn live(&self) -> ObsResult<()> {
        self.with_data(|_| Ok(()))
    }

    fn group_by_chunk(&self, selected: &ResolvedSelection) -> ChunkCells {
        let mut cells = ChunkCells::new();
        for (pos, coord) in selected.coordinates().enumerate() {
            let mut key = Vec::with_capacity(coord.len());
            let mut offset = 0u64;
            for (axis, c) in coord.iter().enumerate() {
                key.push(c / self.shape[axis]);
                offset += (c % self.shape[axis]) * self.strides[axis];
            }
            cells.entry(key).or_default().push((pos, offset as usize));
        }
        cells
    }

    /// Inflated contents of a stored chunk.
    fn load(&self, key: &[u64], chunk: &StoredChunk) -> ObsResult<ElementBuffer> {
        match chunk {
            StoredChunk::Plain(buf) => Ok(buf.clone()),
            StoredChunk::Deflated {
                element_size,
                bytes,
            } => self.inflate(key, *element_size, bytes),
        }
    }

    fn inflate(&self, key: &[u64], element_size: usize, bytes: &[u8]) -> ObsResult<ElementBuffer> {
        let cache_key = (self.header.id, key.to_vec());
        if let Some(buf) = self.cache.lock().get(&cache_key) {
            return Ok(buf.clone());
        }

        let mut raw = Vec::with_capacity(element_size * self.chunk_len);
        ZlibDecoder::new(bytes)
            .read_to_end(&mut raw)
            .map_err(|e| {
                ObsError::backend("failed to inflate chunk")
                    .with("chunk", format!("{:?}", key))
                    .with_source(e)
            })?;
        let buf = ElementBuffer::packed(element_size, raw)?;
        if buf.len() != self.chunk_len {
            return Err(ObsError::backend("inflated chunk has the wrong length")
                .with("chunk", format!("{:?}", key))
                .with("expected", self.chunk_len)
                .with("actual", buf.len()));
        }
        self.cache.lock().insert(cache_key, buf.clone());
        Ok(buf)
    }

    /// Storage form of a chunk; compressed chunks are also cached inflated.
    fn store(&self, key: &[u64], buf: ElementBuffer) -> ObsResult<StoredChunk> {
        let (Some(level), Some(element_size)) = (self.gzip_level, buf.element_size()) else {
            return Ok(StoredChunk::Plain(buf));
        };
        let fail = |e: std::io::Error| {
            ObsError::backend("failed to deflate chunk")
                .with("chunk", format!("{:?}", key))
                .with_source(e)
        };

        let mut encoder = ZlibEncoder::new(Vec::new(), flate2::Compression::new(level));
        encoder
            .write_all(buf.packed_bytes(element_size)?)
            .map_err(fail)?;
        let deflated = encoder.finish().map_err(fail)?;
        self.cache.lock().insert((self.header.id, key.to_vec()), buf);
        Ok(StoredChunk::Deflated {
            element_size,
            bytes: deflated,
        })
    }

    /// Apply `update` to one chunk, allocating it filled when absent.
    fn update_chunk(
        &self,
        chunks: &mut HashMap<Vec<u64>, StoredChunk>,
        key: Vec<u64>,
        update: impl FnOnce(&mut ElementBuffer),
    ) -> ObsResult<()> {
        match chunks.entry(key) {
            Entry::Occupied(mut slot) => {
                if let StoredChunk::Plain(buf) = slot.get_mut() {
                    update(buf);
                    return Ok(());
                }
                let mut buf = self.load(slot.key(), slot.get())?;
                update(&mut buf);
                let stored = self.store(slot.key(), buf)?;
                slot.insert(stored);
            }
            Entry::Vacant(slot) => {
                let mut buf = ElementBuffer::filled(&self.header.fill, self.chunk_len);
                update(&mut buf);
                let stored = self.store(slot.key(), buf)?;
                slot.insert(stored);
            }
        }
        Ok(())
    }

    /// Bring chunks in line with a new extent: chunks wholly outside are
    /// dropped, cells outside in boundary chunks go back to the fill value.
    fn shrink_chunks(&self, data: &mut ChunkedData, old: &[u64], new: &[u64]) -> ObsResult<()> {
        let keys: Vec<Vec<u64>> = data.chunks.keys().cloned().collect();
        let mut dropped = 0usize;
        for key in keys {
            let origin: Vec<u64> = key.iter().zip(&self.shape).map(|(k, s)| k * s).collect();
            if origin.iter().zip(new).any(|(o, n)| o >= n) {
                data.chunks.remove(&key);
                self.cache.lock().invalidate(&(self.header.id, key));
                dropped += 1;
                continue;
            }
            let cut = (0..new.len())
                .any(|axis| new[axis] < old[axis] && origin[axis] + self.shape[axis] > new[axis]);
            if !cut {
                continue;
            }
            let fill = &self.header.fill;
            let (shape, strides, chunk_len) = (&self.shape, &self.strides, self.chunk_len);
            self.update_chunk(&mut data.chunks, key, |buf| {
                for offset in 0..chunk_len {
                    let mut rem = offset as u64;
                    let outside = (0..shape.len()).any(|axis| {
                        let local = rem / strides[axis];
                        rem %= strides[axis];
                        origin[axis] + local >= new[axis]
                    });
                    if outside {
                        buf.set_fill(offset, fill);
                    }
                }
            })?;
        }
        if dropped > 0 {
            debug!(id = %self.header.id, dropped = dropped, "Dropped chunks outside new extent");
        }
        Ok(())
    }

    #[cfg(test)]
    fn allocated_chunks(&self) -> usize {
        self.with_data(|data| Ok(data.chunks.len())).unwrap_or(0)
    }
}

impl EngineVariable for ChunkedVariable {
    fn invalidate(&self) {
        *self.state.write() = None;
        self.cache.lock().invalidate_variable(self.header.id);
        self.header.clear();
    }
}

impl VariableBackend for ChunkedVariable {
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
            let old = data.dims.dims_cur().to_vec();
            self.shrink_chunks(data, &old, dims.dims_cur())?;
            debug!(
                id = %self.header.id,
                from = ?data.dims.dims_cur(),
                to = ?dims.dims_cur(),
                chunks = data.chunks.len(),
                "Resized chunked variable"
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
            for (key, cells) in self.group_by_chunk(&selected) {
                self.update_chunk(&mut stored.chunks, key, |buf| {
                    for (pos, offset) in cells {
                        buf.copy_element(offset, data, pos);
                    }
                })?;
            }
            Ok(())
        })
    }

    fn read(&self, file_selection: &Selection) -> ObsResult<ElementBuffer> {
        self.with_data(|stored| {
            let selected = file_selection.resolve(stored.dims.dims_cur())?;
            let mut out = ElementBuffer::filled(&self.header.fill, selected.num_points() as usize);
            for (key, cells) in self.group_by_chunk(&selected) {
                let buf = match stored.chunks.get(&key) {
                    None => continue,
                    Some(StoredChunk::Plain(buf)) => {
                        for (pos, offset) in cells {
                            out.copy_element(pos, buf, offset);
                        }
                        continue;
                    }
                    Some(StoredChunk::Deflated {
                        element_size,
                        bytes,
                    }) => self.inflate(&key, *element_size, bytes)?,
                };
                for (pos, offset) in cells {
                    out.copy_element(pos, &buf, offset);
                }
            }
            Ok(out)
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
    use crate::config::{EngineConfig, EngineKind};
    use crate::context::EngineContext;
    use crate::fill::FillValue;
    use crate::types::BasicType;
    use obs_common::UNLIMITED;

    fn ints(values: &[i32]) -> ElementBuffer {
        ElementBuffer::packed(4, values.iter().flat_map(|v| v.to_le_bytes()).collect()).unwrap()
    }

    fn variable(dims: Dimensions, chunks: Vec<u64>, gzip: bool) -> Arc<ChunkedVariable> {
        let core = Arc::new(EngineCore::new(
            EngineKind::Chunked,
            Arc::new(EngineContext::new()),
            EngineConfig::default(),
        ));
        let mut params = VariableCreationParams::new()
            .with_fill_value(FillValue::Packed((-9i32).to_le_bytes().to_vec()))
            .chunk(chunks);
        if gzip {
            params = params.compress_with_gzip(4);
        }
        ChunkedVariable::new(
            &core,
            Arc::new(Mutex::new(ChunkCache::new(1 << 20))),
            &TypeDescriptor::Fundamental(BasicType::Int32),
            &dims,
            &params,
        )
        .unwrap()
    }

    #[test]
    fn test_unwritten_chunks_are_not_allocated() {
        let var = variable(Dimensions::fixed(vec![4, 4]).unwrap(), vec![2, 2], false);
        var.write(&ints(&[5]), &Selection::points(vec![vec![3, 3]]))
            .unwrap();
        assert_eq!(var.allocated_chunks(), 1);
        let back = var.read(&Selection::hyperslab(vec![2, 2], vec![2, 2])).unwrap();
        assert_eq!(back, ints(&[-9, -9, -9, 5]));
    }

    #[test]
    fn test_write_spanning_chunks() {
        let var = variable(Dimensions::fixed(vec![2, 3]).unwrap(), vec![1, 2], true);
        var.write(&ints(&[1, 2, 3, 4, 5, 6]), &Selection::all()).unwrap();
        assert_eq!(var.allocated_chunks(), 4);
        assert_eq!(var.read(&Selection::all()).unwrap(), ints(&[1, 2, 3, 4, 5, 6]));
        let col = var.read(&Selection::axis(1, vec![2])).unwrap();
        assert_eq!(col, ints(&[3, 6]));
    }

    #[test]
    fn test_shrink_clears_boundary_cells() {
        let dims = Dimensions::new(vec![5], vec![UNLIMITED]).unwrap();
        let var = variable(dims, vec![4], true);
        var.write(&ints(&[1, 2, 3, 4, 5]), &Selection::all()).unwrap();

        var.resize(&[2]).unwrap();
        assert_eq!(var.allocated_chunks(), 1);
        var.resize(&[6]).unwrap();
        assert_eq!(
            var.read(&Selection::all()).unwrap(),
            ints(&[1, 2, -9, -9, -9, -9])
        );
    }

    #[test]
    fn test_resize_to_zero_drops_everything() {
        let dims = Dimensions::new(vec![3], vec![UNLIMITED]).unwrap();
        let var = variable(dims, vec![2], false);
        var.write(&ints(&[1, 2, 3]), &Selection::all()).unwrap();
        var.resize(&[0]).unwrap();
        assert_eq!(var.allocated_chunks(), 0);
        assert!(var.read(&Selection::all()).unwrap().is_empty());
    }

    #[test]
    fn test_removed_variable_fails() {
        let var = variable(Dimensions::fixed(vec![2]).unwrap(), vec![2], false);
        var.invalidate();
        let err = var.read(&Selection::all()).unwrap_err();
        assert_eq!(err.kind(), obs_common::ErrorKind::NotFound);
    }
}
