//! Element buffers exchanged between frontends and engines.

use obs_common::{ObsError, ObsResult};

use crate::fill::FillValue;
use crate::types::TypeDescriptor;

/// A sequence of elements in packed form.
///
/// Fixed-size types (numbers, fixed-length strings, arrays, enumerations,
/// compounds) travel as contiguous packed bytes. Variable-length strings
/// travel as owned strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementBuffer {
    Packed { element_size: usize, bytes: Vec<u8> },
    Strings(Vec<String>),
}

impl ElementBuffer {
    pub fn packed(element_size: usize, bytes: Vec<u8>) -> ObsResult<Self> {
        if element_size == 0 {
            return Err(ObsError::invalid_argument("element size must be > 0"));
        }
        if bytes.len() % element_size != 0 {
            return Err(ObsError::invalid_argument(
                "byte length is not a multiple of the element size",
            )
            .with("element_size", element_size)
            .with("byte_len", bytes.len()));
        }
        Ok(Self::Packed {
            element_size,
            bytes,
        })
    }

    pub fn zeroed(element_size: usize, count: usize) -> Self {
        Self::Packed {
            element_size,
            bytes: vec![0; element_size * count],
        }
    }

    pub fn strings(values: Vec<String>) -> Self {
        Self::Strings(values)
    }

    /// `count` copies of a fill value.
    pub fn filled(fill: &FillValue, count: usize) -> Self {
        match fill {
            FillValue::Packed(bytes) => Self::Packed {
                element_size: bytes.len(),
                bytes: bytes.repeat(count),
            },
            FillValue::String(s) => Self::Strings(vec![s.clone(); count]),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Packed {
                element_size,
                bytes,
            } => {
                if *element_size == 0 {
                    0
                } else {
                    bytes.len() / element_size
                }
            }
            Self::Strings(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Packed width of one element; `None` for string buffers.
    pub fn element_size(&self) -> Option<usize> {
        match self {
            Self::Packed { element_size, .. } => Some(*element_size),
            Self::Strings(_) => None,
        }
    }

    /// Raw bytes, checked against the expected element width.
    pub fn packed_bytes(&self, expected_size: usize) -> ObsResult<&[u8]> {
        match self {
            Self::Packed {
                element_size,
                bytes,
            } if *element_size == expected_size => Ok(bytes),
            Self::Packed { element_size, .. } => Err(ObsError::type_mismatch(
                "buffer element size differs from the requested type",
            )
            .with("expected", expected_size)
            .with("actual", element_size)),
            Self::Strings(_) => Err(ObsError::type_mismatch(
                "buffer holds variable-length strings, not packed elements",
            )),
        }
    }

    pub fn as_strings(&self) -> ObsResult<&[String]> {
        match self {
            Self::Strings(s) => Ok(s),
            Self::Packed { .. } => Err(ObsError::type_mismatch(
                "buffer holds packed elements, not variable-length strings",
            )),
        }
    }

    /// Whether this buffer carries elements of `descriptor`.
    pub fn matches_type(&self, descriptor: &TypeDescriptor) -> bool {
        match self {
            Self::Packed { element_size, .. } => {
                !descriptor.is_variable_length_string() && *element_size == descriptor.size()
            }
            Self::Strings(_) => descriptor.is_variable_length_string(),
        }
    }

    fn check_same_kind(&self, other: &ElementBuffer) -> ObsResult<()> {
        match (self, other) {
            (Self::Strings(_), Self::Strings(_)) => Ok(()),
            (Self::Packed { element_size: a, .. }, Self::Packed { element_size: b, .. })
                if a == b =>
            {
                Ok(())
            }
            _ => Err(ObsError::type_mismatch("element buffers hold different element kinds")),
        }
    }

    /// Copy the elements at `indices`, in order, into a new buffer.
    pub fn gather(&self, indices: impl IntoIterator<Item = u64>) -> ObsResult<ElementBuffer> {
        let len = self.len();
        let check = |i: u64| {
            if (i as usize) < len {
                Ok(i as usize)
            } else {
                Err(ObsError::invalid_dimensions("element index out of range")
                    .with("index", i)
                    .with("len", len))
            }
        };
        match self {
            Self::Packed {
                element_size,
                bytes,
            } => {
                let mut out = Vec::new();
                for i in indices {
                    let i = check(i)?;
                    out.extend_from_slice(&bytes[i * element_size..(i + 1) * element_size]);
                }
                Ok(Self::Packed {
                    element_size: *element_size,
                    bytes: out,
                })
            }
            Self::Strings(s) => {
                let mut out = Vec::new();
                for i in indices {
                    out.push(s[check(i)?].clone());
                }
                Ok(Self::Strings(out))
            }
        }
    }

    /// Write the elements of `src`, in order, to positions `indices`.
    pub fn scatter(
        &mut self,
        indices: impl IntoIterator<Item = u64>,
        src: &ElementBuffer,
    ) -> ObsResult<()> {
        self.check_same_kind(src)?;
        let len = self.len();
        let mut written = 0usize;
        for (n, i) in indices.into_iter().enumerate() {
            if n >= src.len() {
                return Err(ObsError::selection_size_mismatch(src.len() as u64, n as u64 + 1));
            }
            if i as usize >= len {
                return Err(ObsError::invalid_dimensions("element index out of range")
                    .with("index", i)
                    .with("len", len));
            }
            self.copy_element(i as usize, src, n);
            written += 1;
        }
        if written != src.len() {
            return Err(ObsError::selection_size_mismatch(
                src.len() as u64,
                written as u64,
            ));
        }
        Ok(())
    }

    /// Copy one element. Callers guarantee matching kinds and valid indices.
    pub(crate) fn copy_element(&mut self, dst: usize, src: &ElementBuffer, src_idx: usize) {
        match (self, src) {
            (
                Self::Packed {
                    element_size,
                    bytes,
                },
                Self::Packed { bytes: from, .. },
            ) => {
                let size = *element_size;
                bytes[dst * size..(dst + 1) * size]
                    .copy_from_slice(&from[src_idx * size..(src_idx + 1) * size]);
            }
            (Self::Strings(to), Self::Strings(from)) => {
                to[dst] = from[src_idx].clone();
            }
            _ => {}
        }
    }

    /// Overwrite one element with a fill value of the same kind.
    pub(crate) fn set_fill(&mut self, idx: usize, fill: &FillValue) {
        match (self, fill) {
            (
                Self::Packed {
                    element_size,
                    bytes,
                },
                FillValue::Packed(f),
            ) if f.len() == *element_size => {
                let size = *element_size;
                bytes[idx * size..(idx + 1) * size].copy_from_slice(f);
            }
            (Self::Strings(s), FillValue::String(f)) => s[idx] = f.clone(),
            _ => {}
        }
    }

    /// Approximate heap footprint in bytes.
    pub fn memory_bytes(&self) -> usize {
        match self {
            Self::Packed { bytes, .. } => bytes.len(),
            Self::Strings(s) => s.iter().map(|s| s.len() + std::mem::size_of::<String>()).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obs_common::ErrorKind;

    fn bytes(values: &[u16]) -> ElementBuffer {
        let raw = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        ElementBuffer::packed(2, raw).unwrap()
    }

    #[test]
    fn test_gather_in_order() {
        let buf = bytes(&[10, 11, 12, 13]);
        let picked = buf.gather([3, 0, 3]).unwrap();
        assert_eq!(picked, bytes(&[13, 10, 13]));
    }

    #[test]
    fn test_gather_out_of_range() {
        let err = bytes(&[1]).gather([1]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidDimensions);
    }

    #[test]
    fn test_scatter_requires_equal_counts() {
        let mut buf = bytes(&[0, 0, 0]);
        buf.scatter([2, 0], &bytes(&[7, 8])).unwrap();
        assert_eq!(buf, bytes(&[8, 0, 7]));

        let err = buf.scatter([0], &bytes(&[1, 2])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SelectionSizeMismatch);
    }

    #[test]
    fn test_scatter_rejects_other_kinds() {
        let mut buf = bytes(&[0]);
        let err = buf
            .scatter([0], &ElementBuffer::strings(vec!["a".into()]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    }

    #[test]
    fn test_filled_repeats_value() {
        let buf = ElementBuffer::filled(&FillValue::Packed(vec![1, 2]), 3);
        assert_eq!(buf.len(), 3);
        assert_eq!(buf.packed_bytes(2).unwrap(), &[1, 2, 1, 2, 1, 2]);
        let s = ElementBuffer::filled(&FillValue::String("x".into()), 2);
        assert_eq!(s.as_strings().unwrap(), &["x".to_string(), "x".to_string()]);
    }

    #[test]
    fn test_packed_rejects_ragged_bytes() {
        assert!(ElementBuffer::packed(4, vec![0; 6]).is_err());
        assert!(ElementBuffer::packed(0, vec![]).is_err());
    }
}
