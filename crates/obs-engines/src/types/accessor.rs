//! Marshalling between Rust values and packed element buffers.
//!
//! In-memory layout (padding, alignment, endianness) is never assumed to
//! match the stored representation. Every value is packed explicitly,
//! little-endian, field by field.

use std::marker::PhantomData;

use obs_common::{ObsError, ObsResult};

use super::{BasicType, Charset, StringLength, TypeDescriptor};
use crate::buffer::ElementBuffer;

/// Converts between a slice of objects and an [`ElementBuffer`].
pub trait ObjectAccessor<T> {
    /// Pack `objects` into a buffer of the same length.
    fn serialize(&self, objects: &[T]) -> ObsResult<ElementBuffer>;

    /// Buffer large enough to receive `count` elements.
    fn prep_deserialize(&self, count: usize) -> ElementBuffer;

    /// Unpack the first `count` elements of `buffer`.
    fn deserialize(&self, buffer: &ElementBuffer, count: usize) -> ObsResult<Vec<T>>;
}

/// A Rust type with a fixed storage type and an accessor for it.
pub trait StorageType: Sized {
    type Accessor: ObjectAccessor<Self> + Default;

    fn descriptor() -> TypeDescriptor;

    fn accessor() -> Self::Accessor {
        Self::Accessor::default()
    }
}

/// Fixed-size value with an explicit packed encoding.
pub trait PackedElement: Sized {
    fn packed_size() -> usize;
    fn pack(&self, out: &mut Vec<u8>);
    fn unpack(bytes: &[u8]) -> ObsResult<Self>;
}

/// Scalar with a [`BasicType`]; usable as the base of array types.
pub trait FundamentalType: PackedElement + Copy {
    const BASIC: BasicType;
}

pub(crate) fn wrong_width(expected: usize, actual: usize) -> ObsError {
    ObsError::type_mismatch("packed element has the wrong width")
        .with("expected", expected)
        .with("actual", actual)
}

macro_rules! impl_fundamental {
    ($($t:ty => $basic:ident),* $(,)?) => {
        $(
            impl PackedElement for $t {
                fn packed_size() -> usize {
                    std::mem::size_of::<$t>()
                }

                fn pack(&self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_le_bytes());
                }

                fn unpack(bytes: &[u8]) -> ObsResult<Self> {
                    let raw: [u8; std::mem::size_of::<$t>()] = bytes
                        .try_into()
                        .map_err(|_| wrong_width(std::mem::size_of::<$t>(), bytes.len()))?;
                    Ok(<$t>::from_le_bytes(raw))
                }
            }

            impl FundamentalType for $t {
                const BASIC: BasicType = BasicType::$basic;
            }

            impl StorageType for $t {
                type Accessor = PackedAccessor<$t>;

                fn descriptor() -> TypeDescriptor {
                    TypeDescriptor::Fundamental(BasicType::$basic)
                }
            }
        )*
    };
}

impl_fundamental! {
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    u8 => UInt8,
    u16 => UInt16,
    u32 => UInt32,
    u64 => UInt64,
    f32 => Float32,
    f64 => Float64,
}

impl PackedElement for bool {
    fn packed_size() -> usize {
        1
    }

    fn pack(&self, out: &mut Vec<u8>) {
        out.push(u8::from(*self));
    }

    fn unpack(bytes: &[u8]) -> ObsResult<Self> {
        match bytes {
            [b] => Ok(*b != 0),
            _ => Err(wrong_width(1, bytes.len())),
        }
    }
}

impl FundamentalType for bool {
    const BASIC: BasicType = BasicType::Bool;
}

impl StorageType for bool {
    type Accessor = PackedAccessor<bool>;

    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Fundamental(BasicType::Bool)
    }
}

impl<T: FundamentalType, const N: usize> PackedElement for [T; N] {
    fn packed_size() -> usize {
        T::packed_size() * N
    }

    fn pack(&self, out: &mut Vec<u8>) {
        for v in self {
            v.pack(out);
        }
    }

    fn unpack(bytes: &[u8]) -> ObsResult<Self> {
        if bytes.len() != Self::packed_size() {
            return Err(wrong_width(Self::packed_size(), bytes.len()));
        }
        let values = bytes
            .chunks_exact(T::packed_size())
            .map(T::unpack)
            .collect::<ObsResult<Vec<T>>>()?;
        values
            .try_into()
            .map_err(|_| wrong_width(Self::packed_size(), bytes.len()))
    }
}

impl<T: FundamentalType, const N: usize> StorageType for [T; N] {
    type Accessor = PackedAccessor<[T; N]>;

    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::FixedArray {
            base: T::BASIC,
            dims: vec![N as u64],
        }
    }
}

impl StorageType for String {
    type Accessor = VlenStringAccessor;

    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::String {
            length: StringLength::Variable,
            charset: Charset::Utf8,
        }
    }
}

/// Accessor for any [`PackedElement`].
pub struct PackedAccessor<T>(PhantomData<fn() -> T>);

impl<T> Default for PackedAccessor<T> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<T: PackedElement> ObjectAccessor<T> for PackedAccessor<T> {
    fn serialize(&self, objects: &[T]) -> ObsResult<ElementBuffer> {
        let size = T::packed_size();
        let mut bytes = Vec::with_capacity(size * objects.len());
        for o in objects {
            o.pack(&mut bytes);
        }
        ElementBuffer::packed(size, bytes)
    }

    fn prep_deserialize(&self, count: usize) -> ElementBuffer {
        ElementBuffer::zeroed(T::packed_size(), count)
    }

    fn deserialize(&self, buffer: &ElementBuffer, count: usize) -> ObsResult<Vec<T>> {
        let size = T::packed_size();
        let bytes = buffer.packed_bytes(size)?;
        if buffer.len() < count {
            return Err(ObsError::invalid_argument("buffer holds fewer elements than requested")
                .with("requested", count)
                .with("available", buffer.len()));
        }
        bytes.chunks_exact(size).take(count).map(T::unpack).collect()
    }
}

/// Accessor for engine-managed variable-length strings.
#[derive(Default)]
pub struct VlenStringAccessor;

impl ObjectAccessor<String> for VlenStringAccessor {
    fn serialize(&self, objects: &[String]) -> ObsResult<ElementBuffer> {
        Ok(ElementBuffer::strings(objects.to_vec()))
    }

    fn prep_deserialize(&self, count: usize) -> ElementBuffer {
        ElementBuffer::strings(vec![String::new(); count])
    }

    fn deserialize(&self, buffer: &ElementBuffer, count: usize) -> ObsResult<Vec<String>> {
        let strings = buffer.as_strings()?;
        if strings.len() < count {
            return Err(ObsError::invalid_argument("buffer holds fewer elements than requested")
                .with("requested", count)
                .with("available", strings.len()));
        }
        Ok(strings[..count].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obs_common::ErrorKind;

    #[test]
    fn test_numeric_packing_is_little_endian() {
        let buf = i32::accessor().serialize(&[1, -2]).unwrap();
        assert_eq!(
            buf.packed_bytes(4).unwrap(),
            &[1, 0, 0, 0, 0xfe, 0xff, 0xff, 0xff]
        );
        assert_eq!(i32::accessor().deserialize(&buf, 2).unwrap(), vec![1, -2]);
    }

    #[test]
    fn test_array_element_roundtrip() {
        let values = [[1i64, -1], [i64::MAX, i64::MIN]];
        let acc = <[i64; 2]>::accessor();
        let buf = acc.serialize(&values).unwrap();
        assert_eq!(buf.element_size(), Some(16));
        assert_eq!(acc.deserialize(&buf, 2).unwrap(), values.to_vec());
        assert_eq!(
            <[i64; 2]>::descriptor(),
            TypeDescriptor::FixedArray {
                base: BasicType::Int64,
                dims: vec![2]
            }
        );
    }

    #[test]
    fn test_width_mismatch_is_type_mismatch() {
        let buf = i16::accessor().serialize(&[7]).unwrap();
        let err = i32::accessor().deserialize(&buf, 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    }

    #[test]
    fn test_prep_deserialize_sizes_buffer() {
        let buf = f64::accessor().prep_deserialize(3);
        assert_eq!(buf.len(), 3);
        assert_eq!(f64::accessor().deserialize(&buf, 3).unwrap(), vec![0.0; 3]);
        assert_eq!(String::accessor().prep_deserialize(2).len(), 2);
    }

    #[test]
    fn test_bool_packs_to_one_byte() {
        let buf = bool::accessor().serialize(&[true, false]).unwrap();
        assert_eq!(buf.packed_bytes(1).unwrap(), &[1, 0]);
    }
}
