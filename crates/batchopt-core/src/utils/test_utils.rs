//! Test objectives shared by unit tests, integration tests and benchmarks.
//!
//! Every objective evaluates row by row, so row `i` of the output only
//! depends on row `i` of the input.

use crate::{
    compute::batch_ops::Batch,
    error::{OptimizerError, Result},
    objective::{BatchObjective, Evaluation},
    types::{DVector, Scalar},
};
use num_traits::Float;

fn c<T: Scalar>(v: f64) -> T {
    <T as Scalar>::from_f64(v)
}

fn evaluate_rows<T, F>(positions: &Batch<T>, f: F) -> Evaluation<T>
where
    T: Scalar,
    F: Fn(usize, &[T], &mut [T]) -> T,
{
    let mut values = DVector::zeros(positions.len());
    let mut gradients = Batch::zeros(positions.len(), positions.dim());
    for i in 0..positions.len() {
        values[i] = f(i, positions.row(i), gradients.row_mut(i));
    }
    Evaluation::new(values, gradients)
}

/// Separable quadratic `f(x) = Σⱼ sⱼ (xⱼ − cⱼ)²`.
///
/// The Hessian is `diag(2s)`; unit scales `sⱼ = ½` give an isotropic bowl
/// with identity Hessian.
#[derive(Debug, Clone)]
pub struct QuadraticBowl<T: Scalar> {
    /// Minimizer
    pub center: DVector<T>,
    /// Per-coordinate curvature
    pub scales: DVector<T>,
}

impl<T: Scalar> QuadraticBowl<T> {
    /// Creates a bowl with the given minimizer and scales.
    pub fn new(center: DVector<T>, scales: DVector<T>) -> Self {
        debug_assert_eq!(center.len(), scales.len());
        Self { center, scales }
    }

    /// Bowl `½ ‖x − c‖²` with identity Hessian.
    pub fn isotropic(center: DVector<T>) -> Self {
        let scales = DVector::from_element(center.len(), c(0.5));
        Self { center, scales }
    }
}

impl<T: Scalar> BatchObjective<T> for QuadraticBowl<T> {
    fn evaluate(&self, positions: &Batch<T>) -> Result<Evaluation<T>> {
        if positions.dim() != self.center.len() {
            return Err(OptimizerError::dimension_mismatch(
                format!("dimension {}", self.center.len()),
                format!("dimension {}", positions.dim()),
            ));
        }
        Ok(evaluate_rows(positions, |_, x, g| {
            let mut value = T::zero();
            for j in 0..x.len() {
                let d = x[j] - self.center[j];
                value += self.scales[j] * d * d;
                g[j] = c::<T>(2.0) * self.scales[j] * d;
            }
            value
        }))
    }
}

/// Himmelblau's function `(x² + y − 11)² + (x + y² − 7)²`.
///
/// Four minima with value zero, one of them at `(3, 2)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Himmelblau;

impl<T: Scalar> BatchObjective<T> for Himmelblau {
    fn evaluate(&self, positions: &Batch<T>) -> Result<Evaluation<T>> {
        if positions.dim() != 2 {
            return Err(OptimizerError::dimension_mismatch(
                "dimension 2",
                format!("dimension {}", positions.dim()),
            ));
        }
        Ok(evaluate_rows(positions, |_, p, g| {
            let (x, y) = (p[0], p[1]);
            let a = x * x + y - c(11.0);
            let b = x + y * y - c(7.0);
            g[0] = c::<T>(4.0) * a * x + c::<T>(2.0) * b;
            g[1] = c::<T>(2.0) * a + c::<T>(4.0) * b * y;
            a * a + b * b
        }))
    }
}

/// Chained Rosenbrock function `Σᵢ 100 (xᵢ₊₁ − xᵢ²)² + (1 − xᵢ)²`.
///
/// Minimum zero at `(1, …, 1)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Rosenbrock;

impl<T: Scalar> BatchObjective<T> for Rosenbrock {
    fn evaluate(&self, positions: &Batch<T>) -> Result<Evaluation<T>> {
        Ok(evaluate_rows(positions, |_, x, g| {
            g.iter_mut().for_each(|v| *v = T::zero());
            let mut value = T::zero();
            for i in 0..x.len().saturating_sub(1) {
                let a = x[i + 1] - x[i] * x[i];
                let b = T::one() - x[i];
                value += c::<T>(100.0) * a * a + b * b;
                g[i] += c::<T>(-400.0) * a * x[i] - c::<T>(2.0) * b;
                g[i + 1] += c::<T>(200.0) * a;
            }
            value
        }))
    }
}

/// Rastrigin function `10 n + Σ (xⱼ² − 10 cos 2πxⱼ)`.
///
/// Highly multimodal; the global minimum is zero at the origin.
#[derive(Debug, Clone, Copy, Default)]
pub struct Rastrigin;

impl<T: Scalar> BatchObjective<T> for Rastrigin {
    fn evaluate(&self, positions: &Batch<T>) -> Result<Evaluation<T>> {
        let two_pi = c::<T>(2.0 * std::f64::consts::PI);
        Ok(evaluate_rows(positions, |_, x, g| {
            let mut value = c::<T>(10.0) * c::<T>(x.len() as f64);
            for j in 0..x.len() {
                value += x[j] * x[j] - c::<T>(10.0) * Float::cos(two_pi * x[j]);
                g[j] = c::<T>(2.0) * x[j] + c::<T>(10.0) * two_pi * Float::sin(two_pi * x[j]);
            }
            value
        }))
    }
}

/// Wraps an objective and poisons the output of selected elements.
///
/// Listed rows get a NaN gradient on every evaluation; the value is left as
/// computed by the inner objective.
#[derive(Debug, Clone)]
pub struct NonFiniteGradient<O> {
    /// Objective evaluated for the other rows
    pub inner: O,
    /// Rows whose gradient is replaced by NaN
    pub elements: Vec<usize>,
}

impl<O> NonFiniteGradient<O> {
    /// Poisons the gradient of `elements`.
    pub fn new(inner: O, elements: Vec<usize>) -> Self {
        Self { inner, elements }
    }
}

impl<T: Scalar, O: BatchObjective<T>> BatchObjective<T> for NonFiniteGradient<O> {
    fn evaluate(&self, positions: &Batch<T>) -> Result<Evaluation<T>> {
        let mut eval = self.inner.evaluate(positions)?;
        for &i in &self.elements {
            if i < positions.len() {
                eval.gradients
                    .row_mut(i)
                    .iter_mut()
                    .for_each(|v| *v = T::nan());
            }
        }
        Ok(eval)
    }
}

/// Objective that always reports an error.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingObjective;

impl<T: Scalar> BatchObjective<T> for FailingObjective {
    fn evaluate(&self, _positions: &Batch<T>) -> Result<Evaluation<T>> {
        Err(OptimizerError::objective("objective unavailable"))
    }
}
