//! Testing utilities for scanblend.
//!
//! Assertion helpers and small constructors shared by unit and integration
//! tests.
//!
//! ```ignore
//! use scanblend::testing::{prediction_map, DEFAULT_TOLERANCE};
//! ```

use crate::ensemble::{LabelMap, PredictionMap};

// =============================================================================
// Constants
// =============================================================================

/// Default tolerance for floating point comparisons.
pub const DEFAULT_TOLERANCE: f64 = 1e-6;

// =============================================================================
// Floating Point Assertions
// =============================================================================

/// Assert that two float values are approximately equal.
///
/// Uses absolute difference comparison with the given tolerance.
///
/// # Panics
///
/// Panics if the absolute difference exceeds tolerance.
#[macro_export]
macro_rules! assert_approx_eq {
    ($left:expr, $right:expr, $tolerance:expr) => {{
        let left_val = $left;
        let right_val = $right;
        let tol = $tolerance;
        let diff = (left_val - right_val).abs();
        if diff > tol {
            panic!(
                "assertion failed: `(left ≈ right)`\n  left: `{:?}`\n right: `{:?}`\n  diff: `{:?}` > tolerance `{:?}`",
                left_val, right_val, diff, tol
            );
        }
    }};
    ($left:expr, $right:expr, $tolerance:expr, $($arg:tt)+) => {{
        let left_val = $left;
        let right_val = $right;
        let tol = $tolerance;
        let diff = (left_val - right_val).abs();
        if diff > tol {
            panic!(
                "assertion failed: `(left ≈ right)` - {}\n  left: `{:?}`\n right: `{:?}`\n  diff: `{:?}` > tolerance `{:?}`",
                format_args!($($arg)+), left_val, right_val, diff, tol
            );
        }
    }};
}

// =============================================================================
// Map Constructors
// =============================================================================

/// Build a [`PredictionMap`] from literal pairs.
pub fn prediction_map(pairs: &[(&str, f64)]) -> PredictionMap {
    pairs
        .iter()
        .map(|(pid, p)| (pid.to_string(), *p))
        .collect()
}

/// Build a [`LabelMap`] from literal pairs.
pub fn label_map(pairs: &[(&str, u8)]) -> LabelMap {
    pairs
        .iter()
        .map(|(pid, y)| (pid.to_string(), *y))
        .collect()
}
