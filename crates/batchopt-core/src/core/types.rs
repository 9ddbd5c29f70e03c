//! Type definitions and aliases for batched optimization.
//!
//! This module provides the scalar trait shared by every numeric routine in
//! the workspace, the nalgebra aliases used for per-element vectors, and the
//! default numerical constants for each supported precision.

use nalgebra::{OMatrix, OVector, Dyn, RealField, Scalar as NalgebraScalar};
use num_traits::{Float, FromPrimitive};
use std::fmt::{Debug, Display};

/// Trait for scalar types used in optimization (f32 or f64).
///
/// This trait combines all the necessary numeric traits required
/// by the line search, the curvature history and the driver.
pub trait Scalar:
    NalgebraScalar
    + RealField
    + Float
    + FromPrimitive
    + Display
    + Debug
    + Default
    + Copy
    + Send
    + Sync
    + 'static
{
    /// Machine epsilon for this scalar type.
    const EPSILON: Self;

    /// Default tolerance for the gradient infinity-norm convergence test.
    const DEFAULT_GRADIENT_TOLERANCE: Self;

    /// Smallest curvature `⟨Δg, Δx⟩` treated as strictly positive.
    const MIN_CURVATURE: Self;

    /// Relative width below which a line search bracket is considered collapsed.
    const INTERVAL_TOLERANCE: Self;

    /// Maximum value for line search step size.
    const MAX_STEP_SIZE: Self;

    /// Convert from f64 (for constants).
    ///
    /// # Panics
    ///
    /// Panics if the conversion fails. Use `try_from_f64` for a non-panicking version.
    fn from_f64(v: f64) -> Self {
        <Self as FromPrimitive>::from_f64(v).expect("Failed to convert from f64")
    }

    /// Try to convert from f64.
    ///
    /// Returns None if the conversion fails.
    fn try_from_f64(v: f64) -> Option<Self> {
        <Self as FromPrimitive>::from_f64(v)
    }

    /// Convert to f64 (for logging/display).
    ///
    /// # Panics
    ///
    /// Panics if the conversion fails. Use `try_to_f64` for a non-panicking version.
    fn to_f64(self) -> f64 {
        num_traits::cast(self).expect("Failed to convert to f64")
    }

    /// Try to convert to f64.
    ///
    /// Returns None if the conversion fails.
    fn try_to_f64(self) -> Option<f64> {
        num_traits::cast(self)
    }
}

impl Scalar for f32 {
    const EPSILON: Self = f32::EPSILON;
    const DEFAULT_GRADIENT_TOLERANCE: Self = 1e-5;
    const MIN_CURVATURE: Self = 1e-30;
    const INTERVAL_TOLERANCE: Self = 1e-6;
    const MAX_STEP_SIZE: Self = 1e10;
}

impl Scalar for f64 {
    const EPSILON: Self = f64::EPSILON;
    const DEFAULT_GRADIENT_TOLERANCE: Self = 1e-8;
    const MIN_CURVATURE: Self = 1e-300;
    const INTERVAL_TOLERANCE: Self = 1e-14;
    const MAX_STEP_SIZE: Self = 1e20;
}

/// Type alias for a dynamically-sized matrix.
pub type DMatrix<T> = OMatrix<T, Dyn, Dyn>;

/// Type alias for a dynamically-sized vector.
pub type DVector<T> = OVector<T, Dyn>;

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_scalar_trait_f32() {
        assert_eq!(<f32 as Scalar>::EPSILON, f32::EPSILON);
        assert!(f32::DEFAULT_GRADIENT_TOLERANCE > 0.0);
        assert!(f32::MIN_CURVATURE > 0.0);
        assert!(f32::INTERVAL_TOLERANCE > <f32 as Scalar>::EPSILON);
    }

    #[test]
    fn test_scalar_trait_f64() {
        assert_eq!(<f64 as Scalar>::EPSILON, f64::EPSILON);
        assert!(f64::DEFAULT_GRADIENT_TOLERANCE > 0.0);
        assert!(f64::MIN_CURVATURE > 0.0);
        assert!(f64::INTERVAL_TOLERANCE < f64::DEFAULT_GRADIENT_TOLERANCE);
    }

    #[test]
    fn test_scalar_conversions() {
        let val_f64 = 3.14159;
        let val_f32 = <f32 as Scalar>::from_f64(val_f64);
        assert_relative_eq!(val_f32 as f64, val_f64, epsilon = 1e-6);

        let back_f64 = val_f32.to_f64();
        assert_relative_eq!(back_f64, val_f32 as f64);
        assert_eq!(<f64 as Scalar>::try_from_f64(2.5), Some(2.5));
    }
}
