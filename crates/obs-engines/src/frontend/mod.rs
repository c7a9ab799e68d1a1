//! Engine-independent object model.
//!
//! Every wrapper here is a cheap, cloneable handle around an `Arc` to a
//! backend object. A default-constructed wrapper is unbound and every
//! operation on it fails with `NoBackend`.

mod attribute;
mod group;
mod has_attributes;
mod has_types;
mod has_variables;
mod variable;

pub use attribute::Attribute;
pub use group::Group;
pub use has_attributes::HasAttributes;
pub use has_types::{HasTypes, TypeProvider};
pub use has_variables::HasVariables;
pub use variable::Variable;

use std::sync::Arc;

use obs_common::{ObsError, ObsResult, ObsResultExt};
use serde::{Deserialize, Serialize};

use crate::backend::GroupBackend;
use crate::buffer::ElementBuffer;
use crate::types::{StringLength, TypeDescriptor};

/// Kinds of objects reported by `Group::list_objects`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ObjectType {
    Group,
    Variable,
}

/// Split a `/`-delimited path into its non-empty segments.
pub(crate) fn split_path(path: &str) -> ObsResult<Vec<&str>> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        return Err(ObsError::invalid_argument("path has no name").with("path", path));
    }
    Ok(segments)
}

/// Resolve `segments` below `start`, one open per segment.
///
/// With `create_missing`, absent groups are created on the way; otherwise the
/// first missing segment is reported as `NotFound`.
pub(crate) fn walk_groups(
    start: &Arc<dyn GroupBackend>,
    segments: &[&str],
    create_missing: bool,
) -> ObsResult<Arc<dyn GroupBackend>> {
    let mut current = Arc::clone(start);
    for segment in segments {
        let next = if current.group_exists(segment) {
            current.open_group(segment)
        } else if create_missing {
            current.create_group(segment)
        } else {
            Err(ObsError::not_found("group not found"))
        };
        current = next.ctx("segment", segment)?;
    }
    Ok(current)
}

/// Groups created by [`create_parent`], innermost last.
pub(crate) type CreatedGroups = Vec<(Arc<dyn GroupBackend>, String)>;

/// Resolve the parent group of `path`, creating missing groups and recording
/// each one so a failed creation can be undone with [`discard_groups`].
pub(crate) fn create_parent(
    start: &Arc<dyn GroupBackend>,
    path: &str,
) -> ObsResult<(Arc<dyn GroupBackend>, String, CreatedGroups)> {
    let segments = split_path(path)?;
    let (leaf, parents) = segments
        .split_last()
        .ok_or_else(|| ObsError::invalid_argument("path has no name").with("path", path))?;
    let mut created = CreatedGroups::new();
    let mut current = Arc::clone(start);
    for segment in parents {
        let next = if current.group_exists(segment) {
            current.open_group(segment)
        } else {
            current.create_group(segment).map(|group| {
                created.push((Arc::clone(&current), segment.to_string()));
                group
            })
        };
        current = match next.ctx("segment", segment) {
            Ok(group) => group,
            Err(e) => {
                discard_groups(created);
                return Err(e);
            }
        };
    }
    Ok((current, leaf.to_string(), created))
}

/// Remove groups recorded by [`create_parent`], innermost first. Groups that
/// gained content in the meantime are left alone.
pub(crate) fn discard_groups(created: CreatedGroups) {
    for (parent, name) in created.into_iter().rev() {
        if let Err(e) = parent.remove_empty_group(&name) {
            tracing::warn!(name = %name, error = %e, "Could not remove group created for a failed variable");
            break;
        }
    }
}

/// Split `path` into its parent group (resolved from `start`) and leaf name.
pub(crate) fn parent_and_leaf(
    start: &Arc<dyn GroupBackend>,
    path: &str,
    create_missing: bool,
) -> ObsResult<(Arc<dyn GroupBackend>, String)> {
    let segments = split_path(path)?;
    let (leaf, parents) = segments
        .split_last()
        .ok_or_else(|| ObsError::invalid_argument("path has no name").with("path", path))?;
    let parent = walk_groups(start, parents, create_missing)?;
    Ok((parent, leaf.to_string()))
}

/// Whether `path` names an existing parent group; `None` if any segment is missing.
pub(crate) fn find_parent(
    start: &Arc<dyn GroupBackend>,
    path: &str,
) -> ObsResult<Option<(Arc<dyn GroupBackend>, String)>> {
    match parent_and_leaf(start, path, false) {
        Ok(found) => Ok(Some(found)),
        Err(e) if e.is(obs_common::ErrorKind::NotFound) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Encode strings for a string-typed object of either length kind.
///
/// Fixed-length strings are NUL-padded; a string longer than the declared
/// length is rejected.
pub(crate) fn encode_strings<S: AsRef<str>>(
    descriptor: &TypeDescriptor,
    values: &[S],
) -> ObsResult<ElementBuffer> {
    match descriptor {
        TypeDescriptor::String {
            length: StringLength::Variable,
            ..
        } => Ok(ElementBuffer::strings(
            values.iter().map(|s| s.as_ref().to_string()).collect(),
        )),
        TypeDescriptor::String {
            length: StringLength::Fixed(n),
            ..
        } => {
            let mut bytes = Vec::with_capacity(n * values.len());
            for s in values {
                let raw = s.as_ref().as_bytes();
                if raw.len() > *n {
                    return Err(ObsError::invalid_argument(
                        "string is longer than the fixed-length type",
                    )
                    .with("length", n)
                    .with("value", s.as_ref()));
                }
                bytes.extend_from_slice(raw);
                bytes.resize(bytes.len() + (n - raw.len()), 0);
            }
            ElementBuffer::packed(*n, bytes)
        }
        other => Err(ObsError::type_mismatch("object does not hold strings")
            .with("expected", "string")
            .with("actual", other)),
    }
}

/// Decode strings of either length kind. Trailing NULs are trimmed.
pub(crate) fn decode_strings(
    descriptor: &TypeDescriptor,
    buffer: &ElementBuffer,
) -> ObsResult<Vec<String>> {
    match descriptor {
        TypeDescriptor::String {
            length: StringLength::Variable,
            ..
        } => Ok(buffer.as_strings()?.to_vec()),
        TypeDescriptor::String {
            length: StringLength::Fixed(n),
            ..
        } => buffer
            .packed_bytes(*n)?
            .chunks_exact(*n)
            .map(|raw| {
                let end = raw.iter().rposition(|b| *b != 0).map_or(0, |p| p + 1);
                String::from_utf8(raw[..end].to_vec()).map_err(|e| {
                    ObsError::invalid_argument("stored string is not valid UTF-8").with_source(e)
                })
            })
            .collect(),
        other => Err(ObsError::type_mismatch("object does not hold strings")
            .with("expected", "string")
            .with("actual", other)),
    }
}

pub(crate) fn type_mismatch(declared: &TypeDescriptor, requested: &TypeDescriptor) -> ObsError {
    ObsError::type_mismatch("requested type does not match the declared type")
        .with("expected", declared)
        .with("actual", requested)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Charset;

    fn fixed(n: usize) -> TypeDescriptor {
        TypeDescriptor::String {
            length: StringLength::Fixed(n),
            charset: Charset::Ascii,
        }
    }

    #[test]
    fn test_split_path_drops_empty_segments() {
        assert_eq!(split_path("/a//b/c/").unwrap(), vec!["a", "b", "c"]);
        assert!(split_path("//").is_err());
    }

    #[test]
    fn test_fixed_strings_are_nul_padded() {
        let buf = encode_strings(&fixed(4), &["ab", "wxyz"]).unwrap();
        assert_eq!(buf.packed_bytes(4).unwrap(), b"ab\0\0wxyz");
        assert_eq!(
            decode_strings(&fixed(4), &buf).unwrap(),
            vec!["ab".to_string(), "wxyz".to_string()]
        );
    }

    #[test]
    fn test_fixed_string_too_long() {
        let err = encode_strings(&fixed(2), &["abc"]).unwrap_err();
        assert_eq!(err.kind(), obs_common::ErrorKind::InvalidArgument);
    }
}
