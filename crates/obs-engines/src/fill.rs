//! Fill values and the policies that choose their defaults.

use obs_common::{ObsError, ObsResult};
use serde::{Deserialize, Serialize};

use crate::buffer::ElementBuffer;
use crate::types::{BasicType, ObjectAccessor, StorageType, TypeDescriptor};

/// The value observed when reading an element that was never written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FillValue {
    /// Packed bytes of one element.
    Packed(Vec<u8>),
    /// Variable-length string fill.
    String(String),
}

impl FillValue {
    /// Fill value holding `value`.
    pub fn new<T: StorageType>(value: T) -> ObsResult<Self> {
        let buf = T::accessor().serialize(std::slice::from_ref(&value))?;
        Self::from_buffer(&buf, 0)
    }

    /// Element `idx` of a buffer.
    pub fn from_buffer(buffer: &ElementBuffer, idx: usize) -> ObsResult<Self> {
        if idx >= buffer.len() {
            return Err(ObsError::invalid_argument("fill value index out of range")
                .with("index", idx)
                .with("len", buffer.len()));
        }
        Ok(match buffer {
            ElementBuffer::Packed {
                element_size,
                bytes,
            } => FillValue::Packed(bytes[idx * element_size..(idx + 1) * element_size].to_vec()),
            ElementBuffer::Strings(s) => FillValue::String(s[idx].clone()),
        })
    }

    /// Decode as `T`.
    pub fn get<T: StorageType>(&self) -> ObsResult<T> {
        let buf = ElementBuffer::filled(self, 1);
        T::accessor()
            .deserialize(&buf, 1)?
            .pop()
            .ok_or_else(|| ObsError::backend("fill value decoded to nothing"))
    }

    /// Whether this fill value can stand in for an element of `descriptor`.
    pub fn fits(&self, descriptor: &TypeDescriptor) -> bool {
        match self {
            FillValue::Packed(b) => {
                !descriptor.is_variable_length_string() && b.len() == descriptor.size()
            }
            FillValue::String(_) => descriptor.is_variable_length_string(),
        }
    }
}

/// Rule set for default fill values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FillValuePolicy {
    /// Zero for numbers, empty for strings.
    Hdf5,
    /// NetCDF-4 sentinels per numeric width and signedness.
    NetCdf4,
}

/// Root attributes whose presence marks a NetCDF-4 lineage.
pub const NETCDF4_MARKER_ATTRIBUTES: [&str; 2] = ["_NCProperties", "_ioda_layout"];

const NC_FILL_FLOAT: f32 = 9.969_209_968_386_869e36;
const NC_FILL_DOUBLE: f64 = 9.969_209_968_386_869e36;

impl FillValuePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FillValuePolicy::Hdf5 => "hdf5",
            FillValuePolicy::NetCdf4 => "netcdf4",
        }
    }

    /// Parse from string (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "hdf5" => Some(FillValuePolicy::Hdf5),
            "netcdf4" | "netcdf" => Some(FillValuePolicy::NetCdf4),
            _ => None,
        }
    }

    /// Default fill value for a type under this policy.
    pub fn default_for(&self, descriptor: &TypeDescriptor) -> FillValue {
        match descriptor {
            TypeDescriptor::String { .. } if descriptor.is_variable_length_string() => {
                FillValue::String(String::new())
            }
            TypeDescriptor::Fundamental(b) | TypeDescriptor::Enum { base: b, .. } => {
                FillValue::Packed(self.basic_fill(*b))
            }
            TypeDescriptor::FixedArray { base, dims } => {
                let n = dims.iter().product::<u64>() as usize;
                FillValue::Packed(self.basic_fill(*base).repeat(n))
            }
            _ => FillValue::Packed(vec![0; descriptor.size()]),
        }
    }

    fn basic_fill(&self, basic: BasicType) -> Vec<u8> {
        match self {
            FillValuePolicy::Hdf5 => vec![0; basic.size()],
            FillValuePolicy::NetCdf4 => match basic {
                BasicType::Int8 => (-127i8).to_le_bytes().to_vec(),
                BasicType::Int16 => (-32767i16).to_le_bytes().to_vec(),
                BasicType::Int32 => (-2147483647i32).to_le_bytes().to_vec(),
                BasicType::Int64 => (-9223372036854775806i64).to_le_bytes().to_vec(),
                BasicType::UInt8 => 255u8.to_le_bytes().to_vec(),
                BasicType::UInt16 => 65535u16.to_le_bytes().to_vec(),
                BasicType::UInt32 => 4294967295u32.to_le_bytes().to_vec(),
                BasicType::UInt64 => 18446744073709551614u64.to_le_bytes().to_vec(),
                BasicType::Float32 => NC_FILL_FLOAT.to_le_bytes().to_vec(),
                BasicType::Float64 => NC_FILL_DOUBLE.to_le_bytes().to_vec(),
                BasicType::Bool => vec![0],
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Charset, StringLength};

    fn fund(b: BasicType) -> TypeDescriptor {
        TypeDescriptor::Fundamental(b)
    }

    #[test]
    fn test_netcdf4_sentinels() {
        let p = FillValuePolicy::NetCdf4;
        assert_eq!(p.default_for(&fund(BasicType::Int8)).get::<i8>().unwrap(), -127);
        assert_eq!(p.default_for(&fund(BasicType::Int16)).get::<i16>().unwrap(), -32767);
        assert_eq!(
            p.default_for(&fund(BasicType::Int32)).get::<i32>().unwrap(),
            -2147483647
        );
        assert_eq!(
            p.default_for(&fund(BasicType::Int64)).get::<i64>().unwrap(),
            -9223372036854775806
        );
        assert_eq!(p.default_for(&fund(BasicType::UInt8)).get::<u8>().unwrap(), 255);
        assert_eq!(p.default_for(&fund(BasicType::UInt16)).get::<u16>().unwrap(), 65535);
        assert_eq!(
            p.default_for(&fund(BasicType::UInt32)).get::<u32>().unwrap(),
            4294967295
        );
        assert_eq!(
            p.default_for(&fund(BasicType::UInt64)).get::<u64>().unwrap(),
            18446744073709551614
        );
        assert_eq!(
            p.default_for(&fund(BasicType::Float32))
                .get::<f32>()
                .unwrap()
                .to_bits(),
            9.9692099683868690e+36f32.to_bits()
        );
        assert_eq!(
            p.default_for(&fund(BasicType::Float64))
                .get::<f64>()
                .unwrap()
                .to_bits(),
            9.9692099683868690e+36f64.to_bits()
        );
    }

    #[test]
    fn test_hdf5_defaults_are_zero() {
        let p = FillValuePolicy::Hdf5;
        assert_eq!(p.default_for(&fund(BasicType::Int32)).get::<i32>().unwrap(), 0);
        assert_eq!(p.default_for(&fund(BasicType::Float64)).get::<f64>().unwrap(), 0.0);
        let vlen = TypeDescriptor::String {
            length: StringLength::Variable,
            charset: Charset::Utf8,
        };
        assert_eq!(p.default_for(&vlen), FillValue::String(String::new()));
    }

    #[test]
    fn test_array_fill_repeats_base() {
        let arr = TypeDescriptor::FixedArray {
            base: BasicType::Int16,
            dims: vec![2],
        };
        let fill = FillValuePolicy::NetCdf4.default_for(&arr);
        assert_eq!(fill.get::<[i16; 2]>().unwrap(), [-32767, -32767]);
        assert!(fill.fits(&arr));
    }

    #[test]
    fn test_fits_checks_width() {
        let f = FillValue::new(1.5f32).unwrap();
        assert!(f.fits(&fund(BasicType::Float32)));
        assert!(f.fits(&fund(BasicType::Int32)));
        assert!(!f.fits(&fund(BasicType::Float64)));
    }

    #[test]
    fn test_parse_policy() {
        assert_eq!(FillValuePolicy::parse("NETCDF4"), Some(FillValuePolicy::NetCdf4));
        assert_eq!(FillValuePolicy::parse("hdf5"), Some(FillValuePolicy::Hdf5));
        assert_eq!(FillValuePolicy::parse("cdf5"), None);
    }
}
