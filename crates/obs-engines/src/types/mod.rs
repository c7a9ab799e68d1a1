//! Storage type descriptions.
//!
//! A [`TypeDescriptor`] describes the packed layout of one datum independent
//! of any engine. Engines hand out [`Type`] values through their type
//! provider; a `Type` pairs a descriptor with the engine that produced it and,
//! once committed, its name in a group's type namespace.

mod accessor;
mod datetime;

pub use accessor::{
    FundamentalType, ObjectAccessor, PackedAccessor, PackedElement, StorageType,
    VlenStringAccessor,
};
pub use datetime::DateTimeRecord;

use std::fmt;

use obs_common::{ObsError, ObsResult};
use serde::{Deserialize, Serialize};

use crate::context::EngineId;

/// Fundamental scalar kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BasicType {
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    Bool,
}

impl BasicType {
    /// Packed width in bytes.
    pub fn size(&self) -> usize {
        match self {
            BasicType::Int8 | BasicType::UInt8 | BasicType::Bool => 1,
            BasicType::Int16 | BasicType::UInt16 => 2,
            BasicType::Int32 | BasicType::UInt32 | BasicType::Float32 => 4,
            BasicType::Int64 | BasicType::UInt64 | BasicType::Float64 => 8,
        }
    }

    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            BasicType::Int8
                | BasicType::Int16
                | BasicType::Int32
                | BasicType::Int64
                | BasicType::Float32
                | BasicType::Float64
        )
    }

    pub fn is_integer(&self) -> bool {
        !matches!(
            self,
            BasicType::Float32 | BasicType::Float64 | BasicType::Bool
        )
    }

    pub fn is_float(&self) -> bool {
        matches!(self, BasicType::Float32 | BasicType::Float64)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BasicType::Int8 => "int8",
            BasicType::Int16 => "int16",
            BasicType::Int32 => "int32",
            BasicType::Int64 => "int64",
            BasicType::UInt8 => "uint8",
            BasicType::UInt16 => "uint16",
            BasicType::UInt32 => "uint32",
            BasicType::UInt64 => "uint64",
            BasicType::Float32 => "float32",
            BasicType::Float64 => "float64",
            BasicType::Bool => "bool",
        }
    }
}

impl fmt::Display for BasicType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Character set of a string type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Charset {
    Ascii,
    Utf8,
}

/// Fixed-length strings occupy exactly `n` bytes, NUL-padded. Variable-length
/// strings are managed by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StringLength {
    Variable,
    Fixed(usize),
}

/// Class tag of a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeClass {
    Fundamental,
    String,
    FixedArray,
    Enum,
    Compound,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnumMember {
    pub name: String,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompoundField {
    pub name: String,
    pub offset: usize,
    pub field_type: TypeDescriptor,
}

/// Engine-independent layout of one datum.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeDescriptor {
    Fundamental(BasicType),
    String {
        length: StringLength,
        charset: Charset,
    },
    FixedArray {
        base: BasicType,
        dims: Vec<u64>,
    },
    Enum {
        base: BasicType,
        members: Vec<EnumMember>,
    },
    Compound {
        size: usize,
        fields: Vec<CompoundField>,
    },
}

impl TypeDescriptor {
    pub fn class(&self) -> TypeClass {
        match self {
            TypeDescriptor::Fundamental(_) => TypeClass::Fundamental,
            TypeDescriptor::String { .. } => TypeClass::String,
            TypeDescriptor::FixedArray { .. } => TypeClass::FixedArray,
            TypeDescriptor::Enum { .. } => TypeClass::Enum,
            TypeDescriptor::Compound { .. } => TypeClass::Compound,
        }
    }

    /// Packed size of one element in bytes; zero for variable-length strings.
    pub fn size(&self) -> usize {
        match self {
            TypeDescriptor::Fundamental(b) => b.size(),
            TypeDescriptor::String { length, .. } => match length {
                StringLength::Variable => 0,
                StringLength::Fixed(n) => *n,
            },
            TypeDescriptor::FixedArray { base, dims } => {
                base.size() * dims.iter().product::<u64>() as usize
            }
            TypeDescriptor::Enum { base, .. } => base.size(),
            TypeDescriptor::Compound { size, .. } => *size,
        }
    }

    pub fn is_signed(&self) -> bool {
        match self {
            TypeDescriptor::Fundamental(b)
            | TypeDescriptor::FixedArray { base: b, .. }
            | TypeDescriptor::Enum { base: b, .. } => b.is_signed(),
            _ => false,
        }
    }

    pub fn is_variable_length_string(&self) -> bool {
        matches!(
            self,
            TypeDescriptor::String {
                length: StringLength::Variable,
                ..
            }
        )
    }

    /// Scalar kind for fundamental, array and enum types.
    pub fn basic_type(&self) -> Option<BasicType> {
        match self {
            TypeDescriptor::Fundamental(b)
            | TypeDescriptor::FixedArray { base: b, .. }
            | TypeDescriptor::Enum { base: b, .. } => Some(*b),
            _ => None,
        }
    }

    /// Whether data declared as `self` may be read or written as `requested`.
    ///
    /// Charsets are not compared, and an enumeration accepts its base
    /// integer kind. No numeric conversion is ever implied.
    pub fn is_compatible_with(&self, requested: &TypeDescriptor) -> bool {
        match (self, requested) {
            (
                TypeDescriptor::String { length: a, .. },
                TypeDescriptor::String { length: b, .. },
            ) => a == b,
            (TypeDescriptor::Enum { base, .. }, TypeDescriptor::Fundamental(b)) => base == b,
            (a, b) => a == b,
        }
    }

    /// Reject descriptors no engine can store.
    pub fn validate(&self) -> ObsResult<()> {
        match self {
            TypeDescriptor::Fundamental(_) => Ok(()),
            TypeDescriptor::String { length, .. } => match length {
                StringLength::Fixed(0) => Err(ObsError::invalid_argument(
                    "fixed-length strings need at least one byte",
                )),
                _ => Ok(()),
            },
            TypeDescriptor::FixedArray { dims, .. } => {
                if dims.is_empty() || dims.contains(&0) {
                    return Err(ObsError::invalid_argument(
                        "array types need a non-empty shape with non-zero extents",
                    )
                    .with("dims", format!("{:?}", dims)));
                }
                Ok(())
            }
            TypeDescriptor::Enum { base, members } => {
                if !base.is_integer() {
                    return Err(ObsError::invalid_argument(
                        "enumerations need an integer base type",
                    )
                    .with("base", base));
                }
                for (i, m) in members.iter().enumerate() {
                    if members[..i]
                        .iter()
                        .any(|o| o.name == m.name || o.value == m.value)
                    {
                        return Err(ObsError::duplicate_name(
                            "enumeration members must have unique names and values",
                        )
                        .with("member", &m.name));
                    }
                }
                Ok(())
            }
            TypeDescriptor::Compound { size, fields } => {
                if *size == 0 {
                    return Err(ObsError::invalid_argument("compound types need a non-zero size"));
                }
                for (i, f) in fields.iter().enumerate() {
                    f.field_type.validate()?;
                    if f.field_type.is_variable_length_string() {
                        return Err(ObsError::invalid_argument(
                            "compound fields must have a fixed size",
                        )
                        .with("field", &f.name));
                    }
                    if f.offset + f.field_type.size() > *size {
                        return Err(ObsError::invalid_argument(
                            "compound field extends past the end of the record",
                        )
                        .with("field", &f.name)
                        .with("offset", f.offset)
                        .with("size", size));
                    }
                    if fields[..i].iter().any(|o| o.name == f.name) {
                        return Err(ObsError::duplicate_name("duplicate compound field")
                            .with("field", &f.name));
                    }
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDescriptor::Fundamental(b) => write!(f, "{}", b),
            TypeDescriptor::String { length, .. } => match length {
                StringLength::Variable => f.write_str("string"),
                StringLength::Fixed(n) => write!(f, "string[{}]", n),
            },
            TypeDescriptor::FixedArray { base, dims } => write!(f, "{}{:?}", base, dims),
            TypeDescriptor::Enum { base, members } => {
                write!(f, "enum<{}>({} members)", base, members.len())
            }
            TypeDescriptor::Compound { size, fields } => {
                write!(f, "compound({} bytes, {} fields)", size, fields.len())
            }
        }
    }
}

/// A storage type produced by an engine's type provider.
///
/// The class and base kind never change after creation. Committed types also
/// carry the name under which they were stored in a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Type {
    descriptor: TypeDescriptor,
    engine: EngineId,
    committed_name: Option<String>,
}

impl Type {
    pub(crate) fn new(descriptor: TypeDescriptor, engine: EngineId) -> Self {
        Self {
            descriptor,
            engine,
            committed_name: None,
        }
    }

    pub(crate) fn committed(mut self, name: impl Into<String>) -> Self {
        self.committed_name = Some(name.into());
        self
    }

    pub fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    pub fn class(&self) -> TypeClass {
        self.descriptor.class()
    }

    pub fn size(&self) -> usize {
        self.descriptor.size()
    }

    pub fn is_signed(&self) -> bool {
        self.descriptor.is_signed()
    }

    /// Per-element shape of an array type; empty for every other class.
    pub fn dimensions(&self) -> &[u64] {
        match &self.descriptor {
            TypeDescriptor::FixedArray { dims, .. } => dims,
            _ => &[],
        }
    }

    pub fn basic_type(&self) -> Option<BasicType> {
        self.descriptor.basic_type()
    }

    pub fn string_length(&self) -> Option<StringLength> {
        match &self.descriptor {
            TypeDescriptor::String { length, .. } => Some(*length),
            _ => None,
        }
    }

    pub fn charset(&self) -> Option<Charset> {
        match &self.descriptor {
            TypeDescriptor::String { charset, .. } => Some(*charset),
            _ => None,
        }
    }

    pub fn enum_members(&self) -> &[EnumMember] {
        match &self.descriptor {
            TypeDescriptor::Enum { members, .. } => members,
            _ => &[],
        }
    }

    pub fn compound_fields(&self) -> &[CompoundField] {
        match &self.descriptor {
            TypeDescriptor::Compound { fields, .. } => fields,
            _ => &[],
        }
    }

    /// Whether values of `T` may be stored in this type.
    pub fn is_a<T: StorageType>(&self) -> bool {
        self.descriptor.is_compatible_with(&T::descriptor())
    }

    pub fn engine_id(&self) -> EngineId {
        self.engine
    }

    pub fn committed_name(&self) -> Option<&str> {
        self.committed_name.as_deref()
    }
}
