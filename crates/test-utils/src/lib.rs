//! Shared test utilities for the obs-engines workspace.
//!
//! This crate provides common testing infrastructure including:
//! - Engine fixtures (a root group per engine kind, a populated layout)
//! - Observation data generators
//! - Assertion macros for floats and error kinds
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```
//!
//! Then import in your tests:
//!
//! ```ignore
//! use test_utils::{assert_error_kind, each_engine};
//! ```

pub mod fixtures;
pub mod generators;

// Re-export commonly used items at the crate root
pub use fixtures::*;
pub use generators::*;

use std::sync::Once;

static TRACING: Once = Once::new();

/// Install a test subscriber once per process. Honors `RUST_LOG`.
pub fn init_test_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Macro for approximate floating-point equality assertions.
///
/// # Usage
///
/// ```ignore
/// use test_utils::assert_approx_eq;
///
/// assert_approx_eq!(1.0001_f64, 1.0_f64, 0.001_f64); // passes
/// assert_approx_eq!(1.1_f32, 1.0_f32, 0.001_f32);    // fails
/// ```
#[macro_export]
macro_rules! assert_approx_eq {
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let left: f64 = $left as f64;
        let right: f64 = $right as f64;
        let epsilon: f64 = $epsilon as f64;
        let diff = (left - right).abs();
        if diff > epsilon {
            panic!(
                "assertion failed: `(left ≈ right)`\n  left: `{:?}`,\n right: `{:?}`,\n  diff: `{:?}` > epsilon `{:?}`",
                left, right, diff, epsilon
            );
        }
    }};
}

/// Assert that a result failed with the given [`ErrorKind`](obs_common::ErrorKind).
///
/// Evaluates to the error so further context can be checked.
///
/// ```ignore
/// let err = assert_error_kind!(root.open("missing"), ErrorKind::NotFound);
/// assert_eq!(err.context().get("path"), Some("missing"));
/// ```
#[macro_export]
macro_rules! assert_error_kind {
    ($result:expr, $kind:expr) => {{
        match $result {
            Ok(_) => panic!("expected error {:?}, got Ok", $kind),
            Err(err) => {
                assert_eq!(
                    err.kind(),
                    $kind,
                    "unexpected error kind: {}",
                    err
                );
                err
            }
        }
    }};
}
