//! Error types shared by every layer of the observation data model.
//!
//! Errors carry a [`ErrorKind`] for programmatic matching, a human readable
//! message, and an ordered key/value [`ErrorContext`] that records the failing
//! operation and its key parameters. Backend errors are never replaced: the
//! original error is kept as the `source` and the frontend only adds context.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using ObsError.
pub type ObsResult<T> = Result<T, ObsError>;

/// Boxed error used to preserve the underlying cause of a failure.
pub type BoxedSource = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failure categories of the object model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Open or lookup of a missing path, name or link.
    NotFound,
    /// A create or rename collided with an existing name or link.
    DuplicateName,
    /// Read or write against an incompatible declared type.
    TypeMismatch,
    /// Dimension constraints violated (rank mismatch, max < cur, out of range).
    InvalidDimensions,
    /// A resize grew a fixed axis beyond its maximum.
    DimensionOverflow,
    /// Memory and storage selections resolved to different element counts.
    SelectionSizeMismatch,
    /// A dimension scale and a variable live in different engine instances.
    CrossBackendLink,
    /// Operation on a handle that is not bound to any engine.
    NoBackend,
    /// The engine cannot represent the requested type.
    UnsupportedType,
    /// The engine does not support a requested feature.
    UnsupportedFeature,
    /// Malformed caller input that is not a dimension problem.
    InvalidArgument,
    /// Opaque failure inside the storage engine.
    BackendFailure,
}

impl ErrorKind {
    /// Stable identifier used in logs and reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "NotFound",
            ErrorKind::DuplicateName => "DuplicateName",
            ErrorKind::TypeMismatch => "TypeMismatch",
            ErrorKind::InvalidDimensions => "InvalidDimensions",
            ErrorKind::DimensionOverflow => "DimensionOverflow",
            ErrorKind::SelectionSizeMismatch => "SelectionSizeMismatch",
            ErrorKind::CrossBackendLink => "CrossBackendLink",
            ErrorKind::NoBackend => "NoBackend",
            ErrorKind::UnsupportedType => "UnsupportedType",
            ErrorKind::UnsupportedFeature => "UnsupportedFeature",
            ErrorKind::InvalidArgument => "InvalidArgument",
            ErrorKind::BackendFailure => "BackendFailure",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered key/value pairs describing where and why an error happened.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorContext {
    entries: Vec<(String, String)>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl ToString) {
        self.entries.push((key.into(), value.to_string()));
    }

    /// First value recorded under `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// All values recorded under `key`, oldest first.
    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.entries.is_empty() {
            return Ok(());
        }
        f.write_str(" [")?;
        for (i, (k, v)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}={}", k, v)?;
        }
        f.write_str("]")
    }
}

/// Primary error type for the object model and every engine.
#[derive(Debug, Error)]
#[error("{kind}: {message}{context}")]
pub struct ObsError {
    kind: ErrorKind,
    message: String,
    context: ErrorContext,
    #[source]
    source: Option<BoxedSource>,
}

impl ObsError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: ErrorContext::new(),
            source: None,
        }
    }

    /// Create a NotFound error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, msg)
    }

    /// Create a DuplicateName error.
    pub fn duplicate_name(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::DuplicateName, msg)
    }

    /// Create a TypeMismatch error.
    pub fn type_mismatch(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::TypeMismatch, msg)
    }

    /// Create an InvalidDimensions error.
    pub fn invalid_dimensions(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidDimensions, msg)
    }

    /// Create a DimensionOverflow error.
    pub fn dimension_overflow(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::DimensionOverflow, msg)
    }

    /// Create a SelectionSizeMismatch error carrying both element counts.
    pub fn selection_size_mismatch(memory: u64, storage: u64) -> Self {
        Self::new(
            ErrorKind::SelectionSizeMismatch,
            "memory and storage selections select different numbers of elements",
        )
        .with("memory_points", memory)
        .with("storage_points", storage)
    }

    /// Create a CrossBackendLink error.
    pub fn cross_backend_link(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::CrossBackendLink, msg)
    }

    /// Create a NoBackend error.
    pub fn no_backend(operation: &str) -> Self {
        Self::new(ErrorKind::NoBackend, "handle is not bound to a backend")
            .with("operation", operation)
    }

    /// Create an UnsupportedType error.
    pub fn unsupported_type(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnsupportedType, msg)
    }

    /// Create an UnsupportedFeature error.
    pub fn unsupported_feature(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnsupportedFeature, msg)
    }

    /// Create an InvalidArgument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, msg)
    }

    /// Create a BackendFailure error.
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::BackendFailure, msg)
    }

    /// Append a context entry.
    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.context.push(key, value);
        self
    }

    /// Attach the underlying cause.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn context(&self) -> &ErrorContext {
        &self.context
    }

    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }

    /// Structured rendering for logs: kind, message, context and the cause chain.
    pub fn report(&self) -> serde_json::Value {
        let context: serde_json::Map<String, serde_json::Value> = self
            .context
            .iter()
            .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.to_string())))
            .collect();

        let mut causes = Vec::new();
        let mut next = std::error::Error::source(self);
        while let Some(cause) = next {
            causes.push(serde_json::Value::String(cause.to_string()));
            next = cause.source();
        }

        serde_json::json!({
            "kind": self.kind.as_str(),
            "message": self.message,
            "context": context,
            "causes": causes,
        })
    }
}

impl From<std::io::Error> for ObsError {
    fn from(err: std::io::Error) -> Self {
        ObsError::backend(format!("I/O error: {}", err)).with_source(err)
    }
}

/// Adds operation context to a failing result while re-raising it.
pub trait ObsResultExt<T> {
    /// Record the failing operation name.
    fn op(self, operation: &str) -> ObsResult<T>;

    /// Record an arbitrary key/value pair.
    fn ctx(self, key: &str, value: impl ToString) -> ObsResult<T>;
}

impl<T> ObsResultExt<T> for ObsResult<T> {
    fn op(self, operation: &str) -> ObsResult<T> {
        self.map_err(|e| e.with("operation", operation))
    }

    fn ctx(self, key: &str, value: impl ToString) -> ObsResult<T> {
        self.map_err(|e| e.with(key, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_context() {
        let err = ObsError::not_found("variable not found")
            .with("name", "Temp")
            .with("operation", "open");
        assert_eq!(
            err.to_string(),
            "NotFound: variable not found [name=Temp, operation=open]"
        );
    }

    #[test]
    fn test_display_without_context() {
        let err = ObsError::no_backend("list");
        assert_eq!(err.kind(), ErrorKind::NoBackend);
        assert_eq!(err.context().get("operation"), Some("list"));
    }

    #[test]
    fn test_op_appends_context_and_keeps_kind() {
        let res: ObsResult<()> = Err(ObsError::dimension_overflow("too big").with("axis", 0));
        let err = res.op("resize").ctx("variable", "Temp").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DimensionOverflow);
        assert_eq!(err.context().get("axis"), Some("0"));
        assert_eq!(err.context().get("operation"), Some("resize"));
        assert_eq!(err.context().get("variable"), Some("Temp"));
    }

    #[test]
    fn test_source_is_preserved() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
        let err: ObsError = io.into();
        assert_eq!(err.kind(), ErrorKind::BackendFailure);
        let source = std::error::Error::source(&err).expect("source kept");
        assert_eq!(source.to_string(), "disk on fire");

        let report = err.report();
        assert_eq!(report["kind"], "BackendFailure");
        assert_eq!(report["causes"][0], "disk on fire");
    }

    #[test]
    fn test_selection_size_mismatch_context() {
        let err = ObsError::selection_size_mismatch(3, 4);
        assert_eq!(err.context().get("memory_points"), Some("3"));
        assert_eq!(err.context().get("storage_points"), Some("4"));
    }

    #[test]
    fn test_get_all_returns_every_value() {
        let err = ObsError::backend("x")
            .with("operation", "write")
            .with("operation", "Variable::write");
        let ops: Vec<&str> = err.context().get_all("operation").collect();
        assert_eq!(ops, vec!["write", "Variable::write"]);
    }
}
