//! Common types for the observation data model.
//!
//! This crate carries the pieces every engine and frontend agrees on:
//!
//! - [`ObsError`] / [`ErrorKind`]: the failure taxonomy with structured context
//! - [`Dimensions`]: current/maximum extents with the [`UNLIMITED`] sentinel
//! - [`Selection`]: hyperslab, point and axis selections and their resolution
//!   into row-major element indices

pub mod dimensions;
pub mod error;
pub mod selection;

pub use dimensions::{product, row_major_strides, Dimensions, UNLIMITED};
pub use error::{BoxedSource, ErrorContext, ErrorKind, ObsError, ObsResult, ObsResultExt};
pub use selection::{
    AxisIndices, Hyperslab, LinearIndices, ResolvedSelection, Selection, SelectionMode,
    SelectionSpec,
};
