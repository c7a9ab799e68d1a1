//! Selections describe which elements of an N-dimensional array an I/O call
//! touches, and resolve into concrete per-axis index sets.
//!
//! Every read and write carries two selections: one for the caller's memory
//! buffer and one for the stored array. Both are resolved with the same
//! algorithm and must select the same number of elements.
//!
//! # Resolution rules
//!
//! - `All` selects the full range of every axis in ascending order.
//! - A hyperslab generates, per axis, `count` block origins starting at
//!   `start` and spaced by `stride` (default 1), each expanded into `block`
//!   contiguous indices (default 1). Overlapping blocks are not merged.
//! - A point list is passed through in caller order; every point must have
//!   one coordinate per axis.
//! - Axis index sets constrain individual axes (sorted, duplicates removed);
//!   unconstrained axes default to their full range.
//!
//! Hyperslab and axis selections take the cartesian product of the per-axis
//! indices, walked in row-major order. Point selections pair the i-th entry
//! of every axis.

use serde::{Deserialize, Serialize};

use crate::dimensions::{product, row_major_strides};
use crate::error::{ObsError, ObsResult};

/// Regular strided/blocked rectangular subset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hyperslab {
    pub start: Vec<u64>,
    pub count: Vec<u64>,
    pub stride: Option<Vec<u64>>,
    pub block: Option<Vec<u64>>,
}

/// Explicit index set for a single axis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisIndices {
    pub axis: usize,
    pub indices: Vec<u64>,
}

/// What a selection asks for, independent of any array shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectionSpec {
    All,
    None,
    Hyperslab(Hyperslab),
    Points(Vec<Vec<u64>>),
    Axes(Vec<AxisIndices>),
}

/// A selection request plus an optional memory-buffer extent.
///
/// The extent only matters for memory-side selections: it gives the shape of
/// the caller's buffer. Without it the buffer is treated as a flat array of
/// its own length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    spec: SelectionSpec,
    extent: Option<Vec<u64>>,
}

impl Default for Selection {
    fn default() -> Self {
        Self::all()
    }
}

impl Selection {
    pub fn all() -> Self {
        Self {
            spec: SelectionSpec::All,
            extent: None,
        }
    }

    pub fn none() -> Self {
        Self {
            spec: SelectionSpec::None,
            extent: None,
        }
    }

    /// Hyperslab with unit stride and block.
    pub fn hyperslab(start: Vec<u64>, count: Vec<u64>) -> Self {
        Self {
            spec: SelectionSpec::Hyperslab(Hyperslab {
                start,
                count,
                stride: None,
                block: None,
            }),
            extent: None,
        }
    }

    /// Set the hyperslab stride. No effect on other selection kinds.
    pub fn with_stride(mut self, stride: Vec<u64>) -> Self {
        if let SelectionSpec::Hyperslab(h) = &mut self.spec {
            h.stride = Some(stride);
        }
        self
    }

    /// Set the hyperslab block. No effect on other selection kinds.
    pub fn with_block(mut self, block: Vec<u64>) -> Self {
        if let SelectionSpec::Hyperslab(h) = &mut self.spec {
            h.block = Some(block);
        }
        self
    }

    /// Explicit list of coordinate tuples.
    pub fn points(points: Vec<Vec<u64>>) -> Self {
        Self {
            spec: SelectionSpec::Points(points),
            extent: None,
        }
    }

    /// Constrain a single axis to an explicit index set.
    pub fn axis(axis: usize, indices: Vec<u64>) -> Self {
        Self {
            spec: SelectionSpec::Axes(vec![AxisIndices { axis, indices }]),
            extent: None,
        }
    }

    /// Add another axis constraint. Turns `All` into an axis selection.
    pub fn and_axis(mut self, axis: usize, indices: Vec<u64>) -> Self {
        match &mut self.spec {
            SelectionSpec::Axes(axes) => axes.push(AxisIndices { axis, indices }),
            _ => self.spec = SelectionSpec::Axes(vec![AxisIndices { axis, indices }]),
        }
        self
    }

    /// Shape of the memory buffer this selection applies to.
    pub fn with_extent(mut self, extent: Vec<u64>) -> Self {
        self.extent = Some(extent);
        self
    }

    pub fn spec(&self) -> &SelectionSpec {
        &self.spec
    }

    pub fn extent(&self) -> Option<&[u64]> {
        self.extent.as_deref()
    }

    pub fn is_all(&self) -> bool {
        matches!(self.spec, SelectionSpec::All)
    }

    /// Resolve against the shape of a memory buffer holding `buffer_len`
    /// elements.
    pub fn resolve_memory(&self, buffer_len: u64) -> ObsResult<ResolvedSelection> {
        match &self.extent {
            Some(extent) => {
                let capacity = product(extent)?;
                if capacity != buffer_len {
                    return Err(ObsError::invalid_dimensions(
                        "memory extent does not match the buffer length",
                    )
                    .with("extent", format!("{:?}", extent))
                    .with("buffer_len", buffer_len));
                }
                self.resolve(extent)
            }
            None => self.resolve(&[buffer_len]),
        }
    }

    /// Resolve into concrete per-axis index sets for an array of `dims`.
    pub fn resolve(&self, dims: &[u64]) -> ObsResult<ResolvedSelection> {
        let rank = dims.len();
        match &self.spec {
            SelectionSpec::All => Ok(ResolvedSelection {
                mode: SelectionMode::All,
                per_axis: dims.iter().map(|d| (0..*d).collect()).collect(),
                dims: dims.to_vec(),
            }),
            SelectionSpec::None => Ok(ResolvedSelection {
                mode: SelectionMode::None,
                per_axis: vec![Vec::new(); rank],
                dims: dims.to_vec(),
            }),
            SelectionSpec::Hyperslab(h) => resolve_hyperslab(h, dims),
            SelectionSpec::Points(points) => resolve_points(points, dims),
            SelectionSpec::Axes(axes) => resolve_axes(axes, dims),
        }
    }
}

/// How a resolved selection maps per-axis indices to elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectionMode {
    /// Every element, in storage order.
    All,
    /// Nothing.
    None,
    /// Cartesian product of the per-axis index lists.
    Intersect,
    /// The i-th entry of every axis list forms the i-th point.
    Point,
}

/// A selection bound to a concrete array shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSelection {
    mode: SelectionMode,
    per_axis: Vec<Vec<u64>>,
    dims: Vec<u64>,
}

impl ResolvedSelection {
    pub fn mode(&self) -> SelectionMode {
        self.mode
    }

    pub fn dims(&self) -> &[u64] {
        &self.dims
    }

    /// Index list of one axis (for `Point` mode, the axis component of every point).
    pub fn axis_indices(&self, axis: usize) -> &[u64] {
        self.per_axis.get(axis).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of selected elements.
    pub fn num_points(&self) -> u64 {
        match self.mode {
            SelectionMode::None => 0,
            SelectionMode::Point => self.per_axis.first().map_or(0, |a| a.len() as u64),
            SelectionMode::All | SelectionMode::Intersect => {
                self.per_axis.iter().map(|a| a.len() as u64).product()
            }
        }
    }

    /// Row-major linear element indices, in selection order.
    pub fn linear_indices(&self) -> LinearIndices<'_> {
        LinearIndices::new(self)
    }

    /// Coordinate tuples, in selection order.
    pub fn coordinates(&self) -> impl Iterator<Item = Vec<u64>> + '_ {
        let strides = row_major_strides(&self.dims);
        self.linear_indices().map(move |lin| {
            let mut rem = lin;
            strides
                .iter()
                .map(|s| {
                    let c = rem / s;
                    rem %= s;
                    c
                })
                .collect()
        })
    }
}

/// Odometer over a resolved selection. The least significant digit is the
/// last axis, so the walk matches nested loops over the per-axis lists.
pub struct LinearIndices<'a> {
    sel: &'a ResolvedSelection,
    strides: Vec<u64>,
    digits: Vec<usize>,
    emitted: u64,
    total: u64,
}

impl<'a> LinearIndices<'a> {
    fn new(sel: &'a ResolvedSelection) -> Self {
        Self {
            strides: row_major_strides(&sel.dims),
            digits: vec![0; sel.per_axis.len()],
            emitted: 0,
            total: sel.num_points(),
            sel,
        }
    }

    fn advance(&mut self) {
        match self.sel.mode {
            SelectionMode::Point => {
                for d in &mut self.digits {
                    *d += 1;
                }
            }
            _ => {
                for axis in (0..self.digits.len()).rev() {
                    self.digits[axis] += 1;
                    if self.digits[axis] < self.sel.per_axis[axis].len() {
                        break;
                    }
                    self.digits[axis] = 0;
                }
            }
        }
    }
}

impl Iterator for LinearIndices<'_> {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        if self.emitted >= self.total {
            return None;
        }
        if self.sel.mode == SelectionMode::All {
            let lin = self.emitted;
            self.emitted += 1;
            return Some(lin);
        }
        let lin = self
            .digits
            .iter()
            .enumerate()
            .map(|(axis, digit)| self.sel.per_axis[axis][*digit] * self.strides[axis])
            .sum();
        self.emitted += 1;
        self.advance();
        Some(lin)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.total - self.emitted) as usize;
        (left, Some(left))
    }
}

fn check_rank(what: &str, len: usize, rank: usize) -> ObsResult<()> {
    if len != rank {
        return Err(ObsError::invalid_dimensions(format!(
            "{} has a different rank than the array",
            what
        ))
        .with("expected_rank", rank)
        .with("actual_rank", len));
    }
    Ok(())
}

fn out_of_bounds(axis: usize, index: u64, dim: u64) -> ObsError {
    ObsError::invalid_dimensions("selection index is out of bounds")
        .with("axis", axis)
        .with("index", index)
        .with("dim", dim)
}

fn resolve_hyperslab(h: &Hyperslab, dims: &[u64]) -> ObsResult<ResolvedSelection> {
    let rank = dims.len();
    check_rank("hyperslab start", h.start.len(), rank)?;
    check_rank("hyperslab count", h.count.len(), rank)?;
    if let Some(stride) = &h.stride {
        check_rank("hyperslab stride", stride.len(), rank)?;
    }
    if let Some(block) = &h.block {
        check_rank("hyperslab block", block.len(), rank)?;
    }

    let mut per_axis = Vec::with_capacity(rank);
    for axis in 0..rank {
        let start = h.start[axis];
        let count = h.count[axis];
        let stride = h.stride.as_ref().map_or(1, |s| s[axis]);
        let block = h.block.as_ref().map_or(1, |b| b[axis]);
        if stride == 0 || block == 0 {
            return Err(ObsError::invalid_argument("hyperslab stride and block must be >= 1")
                .with("axis", axis)
                .with("stride", stride)
                .with("block", block));
        }

        if count == 0 {
            per_axis.push(Vec::new());
            continue;
        }

        // Every generated index is at most the last one, so checking it bounds
        // the whole axis before anything is allocated.
        let last = (count - 1)
            .checked_mul(stride)
            .and_then(|offset| offset.checked_add(start))
            .and_then(|origin| origin.checked_add(block - 1));
        match last {
            Some(idx) if idx < dims[axis] => {}
            Some(idx) => return Err(out_of_bounds(axis, idx, dims[axis])),
            None => {
                return Err(out_of_bounds(axis, u64::MAX, dims[axis])
                    .with("reason", "index arithmetic overflows"))
            }
        }

        let mut indices = Vec::with_capacity((count * block) as usize);
        for i in 0..count {
            let block_start = start + i * stride;
            indices.extend(block_start..block_start + block);
        }
        per_axis.push(indices);
    }

    Ok(ResolvedSelection {
        mode: SelectionMode::Intersect,
        per_axis,
        dims: dims.to_vec(),
    })
}

fn resolve_points(points: &[Vec<u64>], dims: &[u64]) -> ObsResult<ResolvedSelection> {
    let rank = dims.len();
    let mut per_axis = vec![Vec::with_capacity(points.len()); rank];
    for (i, point) in points.iter().enumerate() {
        check_rank("point", point.len(), rank).map_err(|e| e.with("point_index", i))?;
        for (axis, coord) in point.iter().enumerate() {
            if *coord >= dims[axis] {
                return Err(out_of_bounds(axis, *coord, dims[axis]).with("point_index", i));
            }
            per_axis[axis].push(*coord);
        }
    }
    // A rank-0 array has one addressable element; each empty tuple selects it.
    if rank == 0 {
        return Ok(ResolvedSelection {
            mode: if points.is_empty() {
                SelectionMode::None
            } else {
                SelectionMode::All
            },
            per_axis,
            dims: dims.to_vec(),
        });
    }
    Ok(ResolvedSelection {
        mode: SelectionMode::Point,
        per_axis,
        dims: dims.to_vec(),
    })
}

fn resolve_axes(axes: &[AxisIndices], dims: &[u64]) -> ObsResult<ResolvedSelection> {
    let rank = dims.len();
    let mut constrained: Vec<Option<Vec<u64>>> = vec![None; rank];
    for a in axes {
        if a.axis >= rank {
            return Err(ObsError::invalid_dimensions("axis selection names a missing axis")
                .with("axis", a.axis)
                .with("rank", rank));
        }
        for idx in &a.indices {
            if *idx >= dims[a.axis] {
                return Err(out_of_bounds(a.axis, *idx, dims[a.axis]));
            }
        }
        constrained[a.axis]
            .get_or_insert_with(Vec::new)
            .extend_from_slice(&a.indices);
    }

    let per_axis = constrained
        .into_iter()
        .enumerate()
        .map(|(axis, c)| match c {
            Some(mut indices) => {
                indices.sort_unstable();
                indices.dedup();
                indices
            }
            None => (0..dims[axis]).collect(),
        })
        .collect();

    Ok(ResolvedSelection {
        mode: SelectionMode::Intersect,
        per_axis,
        dims: dims.to_vec(),
    })
}
