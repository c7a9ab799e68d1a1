//! Observation data generators for tests.
//!
//! All generators are deterministic so expected values can be computed by
//! hand in assertions.

use chrono::{DateTime, Duration, TimeZone, Utc};

/// Create `n` consecutive integers starting at `start`.
///
/// # Example
/// ```
/// use test_utils::generators::sequence_i32;
/// assert_eq!(sequence_i32(3, 1), vec![1, 2, 3]);
/// ```
pub fn sequence_i32(n: usize, start: i32) -> Vec<i32> {
    (0..n as i32).map(|i| start + i).collect()
}

/// Create a linear ramp of `n` values.
///
/// # Arguments
/// * `n` - Number of values
/// * `start` - First value
/// * `step` - Increment between consecutive values
///
/// # Returns
/// `[start, start + step, start + 2*step, ...]`
pub fn ramp_f32(n: usize, start: f32, step: f32) -> Vec<f32> {
    (0..n).map(|i| start + step * i as f32).collect()
}

/// Create a 2-D field where each value encodes its position.
///
/// # Arguments
/// * `width` - Number of columns (fastest-varying axis)
/// * `height` - Number of rows
///
/// # Returns
/// Row-major values where `value = col * 1000 + row`.
///
/// # Example
/// ```
/// use test_utils::generators::grid_values;
///
/// let grid = grid_values(10, 5);
/// // Value at row 2, col 3
/// assert_eq!(grid[2 * 10 + 3], 3002);
/// ```
pub fn grid_values(width: usize, height: usize) -> Vec<i32> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            data.push((col * 1000 + row) as i32);
        }
    }
    data
}

/// Create `n` station identifiers of varying length (`"ST1"`, `"ST12"`, ...).
pub fn station_names(n: usize) -> Vec<String> {
    (0..n)
        .map(|i| {
            let digits: String = (1..=(i % 4) + 1).map(|d| char::from(b'0' + d as u8)).collect();
            format!("ST{}", digits)
        })
        .collect()
}

/// Create `n` observation times, `step_minutes` apart, from 2024-01-01T00:00Z.
pub fn datetimes(n: usize, step_minutes: i64) -> Vec<DateTime<Utc>> {
    let base = Utc
        .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .expect("valid base time");
    (0..n as i64)
        .map(|i| base + Duration::minutes(i * step_minutes))
        .collect()
}
