//! Objective oracle interface.
//!
//! The optimizer never sees how values or gradients are produced. It calls a
//! [`BatchObjective`] with the positions of every batch element and receives
//! one value and one gradient per element. Objectives must be pure: two calls
//! with the same positions must return the same result, otherwise runs are no
//! longer reproducible.
//!
//! # Adapters
//!
//! - [`FnObjective`] wraps a closure that evaluates a whole batch at once.
//! - [`Pointwise`] wraps a closure that evaluates a single position; rows are
//!   evaluated independently (in parallel with the `parallel` feature).
//! - [`CountingObjective`] wraps any objective and counts oracle calls.

use crate::{
    compute::batch_ops::Batch,
    error::{OptimizerError, Result},
    types::{DVector, Scalar},
};
use std::fmt::Debug;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Values and gradients returned by one batched oracle call.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation<T: Scalar> {
    /// One objective value per batch element
    pub values: DVector<T>,
    /// One gradient row per batch element
    pub gradients: Batch<T>,
}

impl<T: Scalar> Evaluation<T> {
    /// Creates an evaluation from values and gradients.
    pub fn new(values: DVector<T>, gradients: Batch<T>) -> Self {
        Self { values, gradients }
    }

    /// Checks that the evaluation matches the batch it was computed for.
    pub fn check_shape(&self, positions: &Batch<T>) -> Result<()> {
        if self.values.len() != positions.len() {
            return Err(OptimizerError::dimension_mismatch(
                format!("{} objective values", positions.len()),
                format!("{} values", self.values.len()),
            ));
        }
        if self.gradients.len() != positions.len() || self.gradients.dim() != positions.dim() {
            return Err(OptimizerError::dimension_mismatch(
                format!("{}x{} gradient batch", positions.len(), positions.dim()),
                format!("{}x{}", self.gradients.len(), self.gradients.dim()),
            ));
        }
        Ok(())
    }
}

/// Batched value-and-gradient oracle.
///
/// This is the only boundary between the optimizer and the problem being
/// solved. Row `i` of `positions` always belongs to batch element `i`, so an
/// objective may hold per-element data (e.g. one target per element).
pub trait BatchObjective<T: Scalar>: Debug {
    /// Evaluates values and gradients at every row of `positions`.
    ///
    /// Non-finite outputs are allowed and mark the affected element as failed;
    /// returning `Err` aborts the whole optimization call.
    fn evaluate(&self, positions: &Batch<T>) -> Result<Evaluation<T>>;
}

impl<T: Scalar, O: BatchObjective<T> + ?Sized> BatchObjective<T> for &O {
    fn evaluate(&self, positions: &Batch<T>) -> Result<Evaluation<T>> {
        (**self).evaluate(positions)
    }
}

/// Objective backed by a closure evaluating a whole batch.
pub struct FnObjective<F> {
    func: F,
}

impl<F> FnObjective<F> {
    /// Wraps a batched closure.
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> Debug for FnObjective<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnObjective").finish_non_exhaustive()
    }
}

impl<T, F> BatchObjective<T> for FnObjective<F>
where
    T: Scalar,
    F: Fn(&Batch<T>) -> (DVector<T>, Batch<T>),
{
    fn evaluate(&self, positions: &Batch<T>) -> Result<Evaluation<T>> {
        let (values, gradients) = (self.func)(positions);
        Ok(Evaluation::new(values, gradients))
    }
}

/// Objective backed by a closure evaluating one position at a time.
///
/// The closure receives the element index and its position and returns the
/// value and gradient at that position.
pub struct Pointwise<F> {
    func: F,
}

impl<F> Pointwise<F> {
    /// Wraps a per-position closure.
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> Debug for Pointwise<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pointwise").finish_non_exhaustive()
    }
}

impl<T, F> BatchObjective<T> for Pointwise<F>
where
    T: Scalar,
    F: Fn(usize, &[T]) -> (T, Vec<T>) + Sync + Send,
{
    fn evaluate(&self, positions: &Batch<T>) -> Result<Evaluation<T>> {
        let rows = positions.map_rows(|i, x| (self.func)(i, x));

        let mut values = DVector::zeros(positions.len());
        let mut gradients = Batch::zeros(positions.len(), positions.dim());
        for (i, (value, gradient)) in rows.into_iter().enumerate() {
            if gradient.len() != positions.dim() {
                return Err(OptimizerError::dimension_mismatch(
                    format!("gradient of dimension {} for element {i}", positions.dim()),
                    format!("dimension {}", gradient.len()),
                ));
            }
            values[i] = value;
            gradients.set_row(i, &gradient);
        }
        Ok(Evaluation::new(values, gradients))
    }
}

/// Wrapper that counts how many times the inner objective is called.
#[derive(Debug)]
pub struct CountingObjective<O> {
    inner: O,
    calls: AtomicUsize,
}

impl<O> CountingObjective<O> {
    /// Wraps an objective with a zeroed call counter.
    pub fn new(inner: O) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of oracle calls observed so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    /// Resets the call counter.
    pub fn reset(&self) {
        self.calls.store(0, Ordering::Relaxed);
    }

    /// Returns the wrapped objective.
    pub fn into_inner(self) -> O {
        self.inner
    }
}

impl<T: Scalar, O: BatchObjective<T>> BatchObjective<T> for CountingObjective<O> {
    fn evaluate(&self, positions: &Batch<T>) -> Result<Evaluation<T>> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.inner.evaluate(positions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sphere(_: usize, x: &[f64]) -> (f64, Vec<f64>) {
        let value = x.iter().map(|v| v * v).sum();
        (value, x.iter().map(|v| 2.0 * v).collect())
    }

    #[test]
    fn test_pointwise_evaluates_each_row() {
        let objective = Pointwise::new(sphere);
        let positions = Batch::from_flat(2, 2, vec![1.0, 2.0, -3.0, 0.0]).unwrap();

        let eval = objective.evaluate(&positions).unwrap();
        eval.check_shape(&positions).unwrap();
        assert_eq!(eval.values, DVector::from_vec(vec![5.0, 9.0]));
        assert_eq!(eval.gradients.row(0), &[2.0, 4.0]);
        assert_eq!(eval.gradients.row(1), &[-6.0, 0.0]);
    }

    #[test]
    fn test_pointwise_passes_element_index() {
        let targets = [1.0, -1.0];
        let objective = Pointwise::new(|i: usize, x: &[f64]| {
            let d = x[0] - targets[i];
            (d * d, vec![2.0 * d])
        });
        let positions = Batch::from_flat(2, 1, vec![0.0, 0.0]).unwrap();

        let eval = objective.evaluate(&positions).unwrap();
        assert_eq!(eval.gradients.as_slice(), &[-2.0, 2.0]);
    }

    #[test]
    fn test_pointwise_rejects_wrong_gradient_length() {
        let objective = Pointwise::new(|_: usize, _: &[f64]| (0.0, vec![0.0]));
        let positions = Batch::zeros(1, 3);
        assert!(matches!(
            objective.evaluate(&positions),
            Err(OptimizerError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_fn_objective_and_shape_check() {
        let objective = FnObjective::new(|x: &Batch<f64>| {
            (DVector::zeros(x.len() + 1), Batch::zeros(x.len(), x.dim()))
        });
        let positions = Batch::zeros(2, 2);
        let eval = objective.evaluate(&positions).unwrap();
        assert!(eval.check_shape(&positions).is_err());
    }

    #[test]
    fn test_counting_objective() {
        let objective = CountingObjective::new(Pointwise::new(sphere));
        let positions = Batch::zeros(3, 2);

        objective.evaluate(&positions).unwrap();
        (&objective).evaluate(&positions).unwrap();
        assert_eq!(objective.calls(), 2);

        objective.reset();
        assert_eq!(objective.calls(), 0);
    }
}
