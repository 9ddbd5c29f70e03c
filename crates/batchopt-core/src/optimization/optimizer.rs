//! Optimizer traits, statuses and results for batched optimization.
//!
//! A batched optimizer minimizes `B` independent problems of the same
//! dimension at once. Every element carries its own [`ElementStatus`]; the
//! batch as a whole stops according to a [`StoppingCondition`].
//!
//! # Element lifecycle
//!
//! ```text
//! Running ──► Converged
//!    │
//!    ├──────► Failed(kind)
//!    │
//!    └──────► Exhausted      (iteration cap reached while still running)
//! ```
//!
//! Once an element leaves `Running` its position, value and gradient are
//! frozen; it is never probed again.
//!
//! # Convergence
//!
//! [`ConvergenceChecker`] declares an element converged when any enabled
//! criterion holds:
//!
//! - gradient: `‖∇f(xₖ)‖∞ ≤ ε_g` (always enabled)
//! - position change: `‖xₖ − xₖ₋₁‖∞ ≤ ε_x`
//! - absolute value change: `|f(xₖ) − f(xₖ₋₁)| ≤ ε_f`
//! - relative value change: `|f(xₖ) − f(xₖ₋₁)| ≤ ε_r |f(xₖ₋₁)|`
//! - a caller-supplied [`ConvergenceTest`]
//!
//! Secondary tolerances default to zero, which disables them.

use crate::{
    compute::batch_ops::{all_finite, inf_norm, Batch},
    error::{OptimizerError, Result},
    objective::BatchObjective,
    types::{DMatrix, DVector, Scalar},
};
use num_traits::Float;
use std::fmt::{self, Debug};
use std::sync::Arc;

/// Reason an element stopped without converging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FailureKind {
    /// Non-finite value or gradient at the start point or an accepted point
    NumericalFailure,
    /// The line search used its whole evaluation budget
    LineSearchExhausted,
    /// The search direction does not descend: `∇f · d ≥ 0` or non-finite
    NotDescentDirection,
    /// Bracketing reached the maximum step while still descending
    StepBoundReached,
    /// The bracket collapsed without any decreasing positive step
    NoDecrease,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::NumericalFailure => "non-finite objective value or gradient",
            Self::LineSearchExhausted => "line search evaluation budget exhausted",
            Self::NotDescentDirection => "search direction is not a descent direction",
            Self::StepBoundReached => "line search reached the maximum step size",
            Self::NoDecrease => "line search found no decrease",
        };
        f.write_str(text)
    }
}

/// Lifecycle status of one batch element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ElementStatus {
    /// Still iterating
    #[default]
    Running,
    /// A convergence criterion was met
    Converged,
    /// Stopped on a numerical or line search failure
    Failed(FailureKind),
    /// Still running when the iteration cap was reached
    Exhausted,
}

impl ElementStatus {
    /// Returns true while the element is still iterating.
    #[inline]
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// Returns true for converged elements.
    #[inline]
    pub fn is_converged(&self) -> bool {
        matches!(self, Self::Converged)
    }

    /// Returns true for failed elements.
    #[inline]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Returns true once the element is converged or failed.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        self.is_converged() || self.is_failed()
    }

    /// Failure kind, if the element failed.
    pub fn failure(&self) -> Option<FailureKind> {
        match self {
            Self::Failed(kind) => Some(*kind),
            _ => None,
        }
    }
}

/// Predicate over the per-element `converged` and `failed` flags.
pub type StoppingPredicate = Arc<dyn Fn(&[bool], &[bool]) -> bool + Send + Sync>;

/// When the batch as a whole stops iterating.
#[derive(Clone, Default)]
pub enum StoppingCondition {
    /// Stop once every element has converged or failed.
    #[default]
    All,
    /// Stop as soon as any element has converged, or every element failed.
    Any,
    /// Stop when the predicate over `(converged, failed)` returns true.
    Custom(StoppingPredicate),
}

impl StoppingCondition {
    /// Wraps a closure as a custom stopping condition.
    pub fn custom<F>(predicate: F) -> Self
    where
        F: Fn(&[bool], &[bool]) -> bool + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(predicate))
    }

    /// Evaluates the condition on the per-element flags.
    pub fn should_stop(&self, converged: &[bool], failed: &[bool]) -> bool {
        match self {
            Self::All => converged.iter().zip(failed).all(|(&c, &f)| c || f),
            Self::Any => converged.iter().any(|&c| c) || failed.iter().all(|&f| f),
            Self::Custom(predicate) => predicate(converged, failed),
        }
    }
}

impl Debug for StoppingCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("All"),
            Self::Any => f.write_str("Any"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Why the batch stopped iterating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BatchTermination {
    /// The stopping condition was satisfied
    StoppingCondition,
    /// No element was left running
    NoRunningElements,
    /// The iteration cap was reached
    MaxIterations,
}

/// Data handed to a custom convergence test.
///
/// The previous iterate is absent for the check made on the starting point.
#[derive(Debug, Clone, Copy)]
pub struct ConvergenceContext<'a, T: Scalar> {
    /// Index of the element in the batch
    pub element: usize,
    /// Completed outer iterations of the element
    pub iteration: usize,
    /// Current position
    pub position: &'a [T],
    /// Objective value at `position`
    pub value: T,
    /// Gradient at `position`
    pub gradient: &'a [T],
    /// Position before the last step
    pub previous_position: Option<&'a [T]>,
    /// Objective value before the last step
    pub previous_value: Option<T>,
}

/// Caller-supplied convergence predicate.
#[derive(Clone)]
pub struct ConvergenceTest<T: Scalar> {
    predicate: Arc<dyn Fn(&ConvergenceContext<'_, T>) -> bool + Send + Sync>,
}

impl<T: Scalar> ConvergenceTest<T> {
    /// Wraps a predicate returning true when the element has converged.
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&ConvergenceContext<'_, T>) -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: Arc::new(predicate),
        }
    }

    /// Evaluates the predicate.
    pub fn check(&self, context: &ConvergenceContext<'_, T>) -> bool {
        (self.predicate)(context)
    }
}

impl<T: Scalar> Debug for ConvergenceTest<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ConvergenceTest(..)")
    }
}

/// Per-element convergence and numerical-failure evaluator.
#[derive(Debug, Clone)]
pub struct ConvergenceChecker<T: Scalar> {
    /// Tolerance on the gradient infinity norm
    pub tolerance: T,
    /// Tolerance on the infinity norm of the last position change (0 = off)
    pub x_tolerance: T,
    /// Tolerance on the absolute change of the objective value (0 = off)
    pub f_absolute_tolerance: T,
    /// Tolerance on the relative change of the objective value (0 = off)
    pub f_relative_tolerance: T,
    /// Optional extra convergence criterion
    pub test: Option<ConvergenceTest<T>>,
}

impl<T: Scalar> Default for ConvergenceChecker<T> {
    fn default() -> Self {
        Self::new(T::DEFAULT_GRADIENT_TOLERANCE)
    }
}

impl<T: Scalar> ConvergenceChecker<T> {
    /// Creates a checker using only the gradient test.
    pub fn new(tolerance: T) -> Self {
        Self {
            tolerance,
            x_tolerance: T::zero(),
            f_absolute_tolerance: T::zero(),
            f_relative_tolerance: T::zero(),
            test: None,
        }
    }

    /// Enables the position-change test.
    pub fn with_x_tolerance(mut self, tolerance: T) -> Self {
        self.x_tolerance = tolerance;
        self
    }

    /// Enables the absolute value-change test.
    pub fn with_f_absolute_tolerance(mut self, tolerance: T) -> Self {
        self.f_absolute_tolerance = tolerance;
        self
    }

    /// Enables the relative value-change test.
    pub fn with_f_relative_tolerance(mut self, tolerance: T) -> Self {
        self.f_relative_tolerance = tolerance;
        self
    }

    /// Adds a custom convergence test.
    pub fn with_test(mut self, test: ConvergenceTest<T>) -> Self {
        self.test = Some(test);
        self
    }

    /// Checks that every tolerance is usable.
    pub fn validate(&self) -> Result<()> {
        if !(self.tolerance > T::zero()) {
            return Err(OptimizerError::invalid_configuration(
                "Gradient tolerance must be positive",
                "tolerance",
                self.tolerance.to_string(),
            ));
        }
        let secondary = [
            ("x_tolerance", self.x_tolerance),
            ("f_absolute_tolerance", self.f_absolute_tolerance),
            ("f_relative_tolerance", self.f_relative_tolerance),
        ];
        for (name, value) in secondary {
            if !(value >= T::zero()) {
                return Err(OptimizerError::invalid_configuration(
                    "Tolerance must be non-negative",
                    name,
                    value.to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Classifies an element at its current point.
    ///
    /// Returns `Failed(NumericalFailure)` for a non-finite value or gradient,
    /// `Converged` when any enabled criterion holds, and `Running` otherwise.
    pub fn assess(&self, context: &ConvergenceContext<'_, T>) -> ElementStatus {
        if !Float::is_finite(context.value) || !all_finite(context.gradient) {
            return ElementStatus::Failed(FailureKind::NumericalFailure);
        }

        if inf_norm(context.gradient) <= self.tolerance {
            return ElementStatus::Converged;
        }

        if let Some(previous) = context.previous_position {
            if self.x_tolerance > T::zero() {
                let step = context
                    .position
                    .iter()
                    .zip(previous)
                    .fold(T::zero(), |acc, (&x, &p)| Float::max(acc, Float::abs(x - p)));
                if step <= self.x_tolerance {
                    return ElementStatus::Converged;
                }
            }
        }

        if let Some(previous) = context.previous_value {
            let change = Float::abs(context.value - previous);
            if self.f_absolute_tolerance > T::zero() && change <= self.f_absolute_tolerance {
                return ElementStatus::Converged;
            }
            if self.f_relative_tolerance > T::zero()
                && change <= self.f_relative_tolerance * Float::abs(previous)
            {
                return ElementStatus::Converged;
            }
        }

        match &self.test {
            Some(test) if test.check(context) => ElementStatus::Converged,
            _ => ElementStatus::Running,
        }
    }
}

/// Outcome of a batched optimization call.
///
/// Row `i` of every batch-shaped field belongs to element `i` of the input.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OptimizationResult<T: Scalar> {
    /// Final position of each element
    pub position: Batch<T>,

    /// Objective value at each final position
    pub objective_value: DVector<T>,

    /// Gradient at each final position
    pub objective_gradient: Batch<T>,

    /// Final status of each element
    pub status: Vec<ElementStatus>,

    /// Completed outer iterations per element
    pub num_iterations: Vec<usize>,

    /// Outer iterations run by the batch loop
    pub batch_iterations: usize,

    /// Batched oracle calls, the initial evaluation included
    pub num_objective_evaluations: usize,

    /// Stored position deltas per element, one row per pair, oldest first
    pub position_deltas: Vec<DMatrix<T>>,

    /// Stored gradient deltas per element, one row per pair, oldest first
    pub gradient_deltas: Vec<DMatrix<T>>,

    /// Why the batch stopped
    pub termination: BatchTermination,
}

impl<T: Scalar> OptimizationResult<T> {
    /// Per-element convergence flags.
    pub fn converged(&self) -> Vec<bool> {
        self.status.iter().map(ElementStatus::is_converged).collect()
    }

    /// Per-element failure flags.
    pub fn failed(&self) -> Vec<bool> {
        self.status.iter().map(ElementStatus::is_failed).collect()
    }

    /// Number of elements in the batch.
    pub fn batch_size(&self) -> usize {
        self.status.len()
    }

    /// Returns true if every element converged.
    pub fn all_converged(&self) -> bool {
        self.status.iter().all(ElementStatus::is_converged)
    }

    /// Number of converged elements.
    pub fn num_converged(&self) -> usize {
        self.status.iter().filter(|s| s.is_converged()).count()
    }

    /// Number of failed elements.
    pub fn num_failed(&self) -> usize {
        self.status.iter().filter(|s| s.is_failed()).count()
    }

    /// Final position of element `i` as a vector.
    pub fn position_of(&self, i: usize) -> DVector<T> {
        self.position.row_vector(i)
    }

    /// Infinity norm of the final gradient of element `i`.
    pub fn gradient_norm_of(&self, i: usize) -> T {
        inf_norm(self.objective_gradient.row(i))
    }
}

/// Interface shared by batched minimizers.
pub trait BatchOptimizer<T: Scalar>: Debug {
    /// Human-readable algorithm name.
    fn name(&self) -> &str;

    /// Minimizes `objective` from every row of `initial_position`.
    ///
    /// # Errors
    ///
    /// Fails on an invalid configuration, an empty or zero-dimensional
    /// batch, a malformed objective output, or an error reported by the
    /// objective. Per-element failures are reported through
    /// [`OptimizationResult::status`] instead.
    fn minimize<O>(
        &self,
        objective: &O,
        initial_position: &Batch<T>,
    ) -> Result<OptimizationResult<T>>
    where
        O: BatchObjective<T> + ?Sized;
}
