//! Array shapes: current extents, maximum extents and element counts.

use serde::{Deserialize, Serialize};

use crate::error::{ObsError, ObsResult};

/// Maximum-extent sentinel for an axis that may grow without bound.
pub const UNLIMITED: u64 = u64::MAX;

/// Shape of a variable or attribute.
///
/// `num_elements` is derived from `dims_cur` and is recomputed whenever the
/// current extents change; it can never be set independently.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    dims_cur: Vec<u64>,
    dims_max: Vec<u64>,
    num_elements: u64,
}

impl Dimensions {
    /// Create dimensions with explicit maxima.
    ///
    /// Fails with `InvalidDimensions` when the ranks differ or when a fixed
    /// maximum is smaller than the current extent.
    pub fn new(dims_cur: Vec<u64>, dims_max: Vec<u64>) -> ObsResult<Self> {
        if dims_cur.len() != dims_max.len() {
            return Err(ObsError::invalid_dimensions(
                "current and maximum dimensions have different ranks",
            )
            .with("dims_cur", format!("{:?}", dims_cur))
            .with("dims_max", format!("{:?}", dims_max)));
        }
        for (axis, (cur, max)) in dims_cur.iter().zip(dims_max.iter()).enumerate() {
            if *max != UNLIMITED && max < cur {
                return Err(ObsError::invalid_dimensions(
                    "maximum dimension is smaller than current dimension",
                )
                .with("axis", axis)
                .with("dims_cur", cur)
                .with("dims_max", max));
            }
        }
        let num_elements = product(&dims_cur)?;
        Ok(Self {
            dims_cur,
            dims_max,
            num_elements,
        })
    }

    /// Dimensions whose maxima equal the current extents.
    ///
    /// Fails with `InvalidDimensions` when the element count overflows.
    pub fn fixed(dims_cur: Vec<u64>) -> ObsResult<Self> {
        let num_elements = product(&dims_cur)?;
        Ok(Self {
            dims_max: dims_cur.clone(),
            dims_cur,
            num_elements,
        })
    }

    /// Zero-rank shape holding exactly one element.
    pub fn scalar() -> Self {
        Self {
            dims_cur: Vec::new(),
            dims_max: Vec::new(),
            num_elements: 1,
        }
    }

    pub fn dimensionality(&self) -> usize {
        self.dims_cur.len()
    }

    pub fn dims_cur(&self) -> &[u64] {
        &self.dims_cur
    }

    pub fn dims_max(&self) -> &[u64] {
        &self.dims_max
    }

    pub fn num_elements(&self) -> u64 {
        self.num_elements
    }

    /// Whether `axis` may grow without bound.
    pub fn is_unlimited(&self, axis: usize) -> bool {
        self.dims_max.get(axis).copied() == Some(UNLIMITED)
    }

    /// Whether any axis may grow beyond its current extent.
    pub fn is_resizable(&self) -> bool {
        self.dims_cur
            .iter()
            .zip(self.dims_max.iter())
            .any(|(cur, max)| max != cur)
    }

    /// Validate a resize request and return the resulting dimensions.
    ///
    /// Any extent in `[0, dims_max]` is accepted; unlimited axes accept any
    /// extent. Growing a fixed axis past its maximum is a `DimensionOverflow`.
    pub fn resized(&self, new_dims_cur: &[u64]) -> ObsResult<Self> {
        if new_dims_cur.len() != self.dims_cur.len() {
            return Err(ObsError::invalid_dimensions("resize changes the rank")
                .with("expected_rank", self.dims_cur.len())
                .with("actual_rank", new_dims_cur.len()));
        }
        for (axis, (new, max)) in new_dims_cur.iter().zip(self.dims_max.iter()).enumerate() {
            if *max != UNLIMITED && new > max {
                return Err(ObsError::dimension_overflow(
                    "new dimension exceeds the maximum dimension",
                )
                .with("axis", axis)
                .with("dims_max", max)
                .with("requested", new));
            }
        }
        Ok(Self {
            num_elements: product(new_dims_cur)?,
            dims_cur: new_dims_cur.to_vec(),
            dims_max: self.dims_max.clone(),
        })
    }
}

/// Element count of a shape, rejecting overflow.
pub fn product(dims: &[u64]) -> ObsResult<u64> {
    dims.iter().try_fold(1u64, |acc, d| {
        acc.checked_mul(*d).ok_or_else(|| {
            ObsError::invalid_dimensions("element count overflows u64")
                .with("dims", format!("{:?}", dims))
        })
    })
}

/// Row-major strides for a shape, in elements.
pub fn row_major_strides(dims: &[u64]) -> Vec<u64> {
    let mut strides = vec![1u64; dims.len()];
    for i in (0..dims.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * dims[i + 1];
    }
    strides
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_num_elements_is_product() {
        let dims = Dimensions::new(vec![2, 3, 4], vec![2, UNLIMITED, 4]).unwrap();
        assert_eq!(dims.num_elements(), 24);
        assert_eq!(dims.dimensionality(), 3);
        assert!(dims.is_unlimited(1));
        assert!(!dims.is_unlimited(0));
        assert!(dims.is_resizable());
    }

    #[test]
    fn test_scalar_has_one_element() {
        let dims = Dimensions::scalar();
        assert_eq!(dims.dimensionality(), 0);
        assert_eq!(dims.num_elements(), 1);
    }

    #[test]
    fn test_fixed_checks_element_count() {
        let dims = Dimensions::fixed(vec![4, 5]).unwrap();
        assert_eq!(dims.num_elements(), 20);
        assert_eq!(dims.dims_max(), &[4, 5]);
        assert!(!dims.is_resizable());

        let err = Dimensions::fixed(vec![u64::MAX, 2]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidDimensions);
    }

    #[test]
    fn test_max_smaller_than_cur_is_rejected() {
        let err = Dimensions::new(vec![5], vec![4]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidDimensions);
    }

    #[test]
    fn test_rank_mismatch_is_rejected() {
        let err = Dimensions::new(vec![5, 1], vec![5]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidDimensions);
    }

    #[test]
    fn test_resize_recomputes_num_elements() {
        let dims = Dimensions::new(vec![3, 2], vec![UNLIMITED, 2]).unwrap();
        let grown = dims.resized(&[10, 2]).unwrap();
        assert_eq!(grown.num_elements(), 20);
        let shrunk = grown.resized(&[0, 2]).unwrap();
        assert_eq!(shrunk.num_elements(), 0);
        assert_eq!(shrunk.dims_max(), &[UNLIMITED, 2]);
    }

    #[test]
    fn test_resize_past_fixed_max_overflows() {
        let dims = Dimensions::new(vec![3], vec![4]).unwrap();
        assert!(dims.resized(&[4]).is_ok());
        let err = dims.resized(&[5]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DimensionOverflow);
        assert_eq!(err.context().get("axis"), Some("0"));
    }

    #[test]
    fn test_row_major_strides() {
        assert_eq!(row_major_strides(&[2, 3, 4]), vec![12, 4, 1]);
        assert_eq!(row_major_strides(&[7]), vec![1]);
        assert!(row_major_strides(&[]).is_empty());
    }
}
