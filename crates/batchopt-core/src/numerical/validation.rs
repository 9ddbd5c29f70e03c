//! Input validation and gradient checking.
//!
//! [`validate_initial_position`] and [`validate_inverse_hessian`] guard the
//! entry of every optimization call. [`NumericalValidator::check_gradient`]
//! compares the gradients returned by a [`BatchObjective`] against central
//! finite differences, which is the usual first suspect when an element keeps
//! failing its line search.

use crate::{
    compute::batch_ops::Batch,
    error::{OptimizerError, Result},
    objective::BatchObjective,
    types::{DVector, Scalar},
};
use num_traits::Float;

/// Rejects empty batches and zero-dimensional positions.
///
/// Non-finite starting positions are not an error: the initial evaluation
/// marks such elements as failed instead.
pub fn validate_initial_position<T: Scalar>(positions: &Batch<T>) -> Result<()> {
    if positions.is_empty() {
        return Err(OptimizerError::dimension_mismatch(
            "at least one batch element",
            "empty batch",
        ));
    }
    if positions.dim() == 0 {
        return Err(OptimizerError::dimension_mismatch(
            "positions of dimension >= 1",
            "dimension 0",
        ));
    }
    Ok(())
}

/// Checks a diagonal initial inverse Hessian estimate against the dimension.
///
/// Every entry must be positive and finite.
pub fn validate_inverse_hessian<T: Scalar>(estimate: &DVector<T>, dim: usize) -> Result<()> {
    if estimate.len() != dim {
        return Err(OptimizerError::dimension_mismatch(
            format!("inverse Hessian estimate of length {dim}"),
            format!("length {}", estimate.len()),
        ));
    }
    if let Some((i, value)) = estimate
        .iter()
        .enumerate()
        .find(|(_, &v)| !(v > T::zero() && Float::is_finite(v)))
    {
        return Err(OptimizerError::invalid_configuration(
            format!("Inverse Hessian estimate entry {i} must be positive and finite"),
            "initial_inverse_hessian_estimate",
            value.to_string(),
        ));
    }
    Ok(())
}

/// Configuration for finite-difference gradient checks.
#[derive(Debug, Clone)]
pub struct GradientCheckConfig<T> {
    /// Central difference step
    pub step_size: T,
    /// Largest accepted relative error
    pub tolerance: T,
}

impl<T: Scalar> Default for GradientCheckConfig<T> {
    fn default() -> Self {
        Self {
            step_size: <T as Scalar>::from_f64(1e-6),
            tolerance: <T as Scalar>::from_f64(1e-6),
        }
    }
}

/// Results from gradient checking.
#[derive(Debug, Clone)]
pub struct GradientCheckResult<T> {
    /// Largest relative error over every element and coordinate
    pub max_relative_error: T,
    /// Largest relative error per batch element
    pub element_errors: Vec<T>,
    /// Whether every element passed
    pub passed: bool,
}

/// Numerical validation tools for batched objectives.
pub struct NumericalValidator;

impl NumericalValidator {
    /// Compares analytical gradients with central differences at every row
    /// of `positions`.
    ///
    /// Costs `1 + 2 · dim` batched oracle calls. The relative error of a
    /// coordinate is `|g − g̃| / max(1, |g|, |g̃|)`.
    pub fn check_gradient<T, O>(
        objective: &O,
        positions: &Batch<T>,
        config: &GradientCheckConfig<T>,
    ) -> Result<GradientCheckResult<T>>
    where
        T: Scalar,
        O: BatchObjective<T> + ?Sized,
    {
        validate_initial_position(positions)?;
        let analytical = objective.evaluate(positions)?;
        analytical.check_shape(positions)?;

        let h = config.step_size;
        let two = <T as Scalar>::from_f64(2.0);
        let mut element_errors = vec![T::zero(); positions.len()];

        for j in 0..positions.dim() {
            let mut plus = positions.clone();
            let mut minus = positions.clone();
            for i in 0..positions.len() {
                plus.row_mut(i)[j] += h;
                minus.row_mut(i)[j] -= h;
            }
            let f_plus = objective.evaluate(&plus)?;
            let f_minus = objective.evaluate(&minus)?;

            for (i, error) in element_errors.iter_mut().enumerate() {
                let numerical = (f_plus.values[i] - f_minus.values[i]) / (two * h);
                let exact = analytical.gradients.row(i)[j];
                let scale = Float::max(
                    T::one(),
                    Float::max(Float::abs(exact), Float::abs(numerical)),
                );
                let relative = Float::abs(exact - numerical) / scale;
                *error = Float::max(*error, relative);
            }
        }

        let max_relative_error = element_errors
            .iter()
            .copied()
            .fold(T::zero(), |a, b| Float::max(a, b));

        Ok(GradientCheckResult {
            max_relative_error,
            passed: element_errors.iter().all(|&e| e <= config.tolerance),
            element_errors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objective::Pointwise;

    #[test]
    fn test_validate_initial_position() {
        assert!(validate_initial_position(&Batch::<f64>::zeros(2, 3)).is_ok());
        assert!(matches!(
            validate_initial_position(&Batch::<f64>::zeros(0, 3)),
            Err(OptimizerError::DimensionMismatch { .. })
        ));
        assert!(validate_initial_position(&Batch::<f64>::zeros(2, 0)).is_err());
    }

    #[test]
    fn test_validate_inverse_hessian() {
        let good = DVector::from_vec(vec![1.0, 0.5]);
        assert!(validate_inverse_hessian(&good, 2).is_ok());
        assert!(matches!(
            validate_inverse_hessian(&good, 3),
            Err(OptimizerError::DimensionMismatch { .. })
        ));

        let bad = DVector::from_vec(vec![1.0, 0.0]);
        assert!(matches!(
            validate_inverse_hessian(&bad, 2),
            Err(OptimizerError::InvalidConfiguration { .. })
        ));
        let nan = DVector::from_vec(vec![f64::NAN]);
        assert!(validate_inverse_hessian(&nan, 1).is_err());
    }

    #[test]
    fn test_gradient_checking() {
        let correct = Pointwise::new(|_: usize, x: &[f64]| {
            (x[0].powi(3) + x[0] * x[1], vec![3.0 * x[0].powi(2) + x[1], x[0]])
        });
        let positions = Batch::from_flat(2, 2, vec![1.0, 2.0, -0.5, 0.3]).unwrap();
        let result =
            NumericalValidator::check_gradient(
                &correct,
                &positions,
                &GradientCheckConfig::default(),
            )
                .unwrap();
        assert!(result.passed, "max error {}", result.max_relative_error);
        assert_eq!(result.element_errors.len(), 2);

        let wrong = Pointwise::new(|_: usize, x: &[f64]| (x[0] * x[0], vec![x[0]]));
        let positions = Batch::from_flat(1, 1, vec![3.0]).unwrap();
        let result =
            NumericalValidator::check_gradient(&wrong, &positions, &GradientCheckConfig::default())
                .unwrap();
        assert!(!result.passed);
        assert!(result.max_relative_error > 0.4);
    }
}
