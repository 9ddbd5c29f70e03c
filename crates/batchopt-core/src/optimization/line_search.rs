//! Strong Wolfe line search for batched quasi-Newton optimization.
//!
//! Given a point `x`, a descent direction `d` and the univariate restriction
//! `φ(α) = f(x + α d)`, the line search looks for a step `α > 0` satisfying
//! the strong Wolfe conditions:
//!
//! 1. Sufficient decrease: `φ(α) ≤ φ(0) + c₁ α φ'(0)`
//! 2. Strong curvature: `|φ'(α)| ≤ c₂ |φ'(0)|`
//!
//! with `0 < c₁ < c₂ < 1`. The procedure is the bracketing phase followed by
//! the zoom phase of Nocedal & Wright (Algorithms 3.5 and 3.6).
//!
//! # Resumable search
//!
//! Every element of a batch runs its own search, but the objective is only
//! ever evaluated for the whole batch at once. [`StrongWolfeSearch`] is
//! therefore written as a state machine rather than a loop: the driver asks
//! each running search for its [`next_trial`](StrongWolfeSearch::next_trial)
//! step, evaluates all trial points in a single oracle call, and feeds each
//! result back through [`observe`](StrongWolfeSearch::observe). A search that
//! has finished returns `None` and is no longer probed.
//!
//! Each [`Probe`] may carry an arbitrary payload (typically the trial point and
//! its gradient) which is handed back untouched with the accepted probe, so
//! the driver never re-evaluates the objective at the accepted step.
//!
//! ```rust
//! use batchopt_core::optimization::line_search::{
//!     LineSearchOutcome, LineSearchParams, Probe, StrongWolfeSearch,
//! };
//!
//! // φ(α) = (α - 2)², a descent direction at α = 0
//! let phi = |a: f64| ((a - 2.0).powi(2), 2.0 * (a - 2.0));
//! let (f0, g0) = phi(0.0);
//! let params = LineSearchParams::default().with_c2(0.1);
//! let mut search = StrongWolfeSearch::new(&params, Probe::new(0.0, f0, g0, ()));
//!
//! while let Some(step) = search.next_trial() {
//!     let (value, derivative) = phi(step);
//!     search.observe(Probe::new(step, value, derivative, ()));
//! }
//! match search.outcome() {
//!     Some(LineSearchOutcome::Accepted(probe)) => assert_eq!(probe.step, 2.0),
//!     other => panic!("unexpected outcome {other:?}"),
//! }
//! ```

use crate::{
    error::{OptimizerError, Result},
    optimization::optimizer::FailureKind,
    types::Scalar,
};
use log::trace;
use num_traits::Float;

/// Parameters of the strong Wolfe line search.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LineSearchParams<T: Scalar> {
    /// Armijo parameter c₁ ∈ (0,1) for the sufficient decrease condition
    pub c1: T,

    /// Curvature parameter c₂ ∈ (c₁,1) for the strong curvature condition
    pub c2: T,

    /// Maximum number of trial evaluations per search
    pub max_evaluations: usize,

    /// First trial step α₀
    pub initial_step_size: T,

    /// Upper bound on any trial step
    pub max_step_size: T,

    /// Growth factor applied to the step while bracketing
    pub expansion_factor: T,

    /// Minimum relative distance of an interpolated step from the bracket ends
    pub interpolation_guard: T,

    /// Relative bracket width below which the zoom phase gives up
    pub interval_tolerance: T,
}

impl<T: Scalar> Default for LineSearchParams<T> {
    fn default() -> Self {
        Self {
            c1: <T as Scalar>::from_f64(1e-4),
            c2: <T as Scalar>::from_f64(0.9),
            max_evaluations: 50,
            initial_step_size: T::one(),
            max_step_size: T::MAX_STEP_SIZE,
            expansion_factor: <T as Scalar>::from_f64(2.0),
            interpolation_guard: <T as Scalar>::from_f64(0.1),
            interval_tolerance: T::INTERVAL_TOLERANCE,
        }
    }
}

impl<T: Scalar> LineSearchParams<T> {
    /// Creates parameters with the default quasi-Newton constants
    /// (c₁ = 10⁻⁴, c₂ = 0.9, α₀ = 1).
    pub fn new() -> Self {
        Self::default()
    }

    /// Alias of [`Self::new`].
    pub fn strong_wolfe() -> Self {
        Self::default()
    }

    /// Sets the Armijo parameter.
    pub fn with_c1(mut self, c1: T) -> Self {
        self.c1 = c1;
        self
    }

    /// Sets the curvature parameter.
    pub fn with_c2(mut self, c2: T) -> Self {
        self.c2 = c2;
        self
    }

    /// Sets the evaluation budget of a single search.
    pub fn with_max_evaluations(mut self, max_evaluations: usize) -> Self {
        self.max_evaluations = max_evaluations;
        self
    }

    /// Sets the first trial step.
    pub fn with_initial_step_size(mut self, step: T) -> Self {
        self.initial_step_size = step;
        self
    }

    /// Sets the largest allowed step.
    pub fn with_max_step_size(mut self, step: T) -> Self {
        self.max_step_size = step;
        self
    }

    /// Sets the bracketing growth factor.
    pub fn with_expansion_factor(mut self, factor: T) -> Self {
        self.expansion_factor = factor;
        self
    }

    /// Sets the interpolation safeguard.
    pub fn with_interpolation_guard(mut self, guard: T) -> Self {
        self.interpolation_guard = guard;
        self
    }

    /// Sets the relative bracket width at which zooming stops.
    pub fn with_interval_tolerance(mut self, tolerance: T) -> Self {
        self.interval_tolerance = tolerance;
        self
    }

    /// Checks that the parameters describe a well-posed search.
    ///
    /// # Errors
    ///
    /// Returns `OptimizerError::InvalidConfiguration` unless
    /// `0 < c₁ < c₂ < 1`, the budget is at least one evaluation,
    /// `0 < α₀ ≤ max_step_size`, the expansion factor exceeds one,
    /// the guard lies in `(0, 0.5)` and the interval tolerance is positive.
    pub fn validate(&self) -> Result<()> {
        if !(self.c1 > T::zero() && self.c1 < T::one()) {
            return Err(OptimizerError::invalid_configuration(
                "Armijo constant c1 must be in (0, 1)",
                "c1",
                self.c1.to_string(),
            ));
        }

        if !(self.c2 > self.c1 && self.c2 < T::one()) {
            return Err(OptimizerError::invalid_configuration(
                "Wolfe constant c2 must satisfy c1 < c2 < 1",
                "c2",
                self.c2.to_string(),
            ));
        }

        if self.max_evaluations == 0 {
            return Err(OptimizerError::invalid_configuration(
                "Line search needs at least one evaluation",
                "max_evaluations",
                "0",
            ));
        }

        if !(self.initial_step_size > T::zero() && Float::is_finite(self.initial_step_size)) {
            return Err(OptimizerError::invalid_configuration(
                "Initial step size must be positive and finite",
                "initial_step_size",
                self.initial_step_size.to_string(),
            ));
        }

        if !(self.max_step_size >= self.initial_step_size) {
            return Err(OptimizerError::invalid_configuration(
                "Maximum step size must not be smaller than the initial step size",
                "max_step_size",
                self.max_step_size.to_string(),
            ));
        }

        if !(self.expansion_factor > T::one()) {
            return Err(OptimizerError::invalid_configuration(
                "Expansion factor must be greater than 1",
                "expansion_factor",
                self.expansion_factor.to_string(),
            ));
        }

        let half = <T as Scalar>::from_f64(0.5);
        if !(self.interpolation_guard > T::zero() && self.interpolation_guard < half) {
            return Err(OptimizerError::invalid_configuration(
                "Interpolation guard must be in (0, 0.5)",
                "interpolation_guard",
                self.interpolation_guard.to_string(),
            ));
        }

        if !(self.interval_tolerance > T::zero()) {
            return Err(OptimizerError::invalid_configuration(
                "Interval tolerance must be positive",
                "interval_tolerance",
                self.interval_tolerance.to_string(),
            ));
        }

        Ok(())
    }

    /// Sufficient decrease test against the origin `(φ(0), φ'(0))`.
    #[inline]
    pub fn sufficient_decrease(&self, value0: T, derivative0: T, step: T, value: T) -> bool {
        value <= value0 + self.c1 * step * derivative0
    }

    /// Strong curvature test against the origin slope `φ'(0)`.
    #[inline]
    pub fn curvature_condition(&self, derivative0: T, derivative: T) -> bool {
        Float::abs(derivative) <= self.c2 * Float::abs(derivative0)
    }
}

/// One evaluation of `φ` at a trial step.
#[derive(Debug, Clone, PartialEq)]
pub struct Probe<T: Scalar, P = ()> {
    /// Trial step α
    pub step: T,
    /// φ(α)
    pub value: T,
    /// φ'(α), the directional derivative at the trial point
    pub derivative: T,
    /// Caller data attached to the trial point
    pub data: P,
}

impl<T: Scalar, P> Probe<T, P> {
    /// Creates a probe.
    pub fn new(step: T, value: T, derivative: T, data: P) -> Self {
        Self {
            step,
            value,
            derivative,
            data,
        }
    }

    /// Returns true if both the value and the slope are finite.
    #[inline]
    pub fn is_finite(&self) -> bool {
        Float::is_finite(self.value) && Float::is_finite(self.derivative)
    }
}

/// Final result of a line search.
#[derive(Debug, Clone, PartialEq)]
pub enum LineSearchOutcome<T: Scalar, P = ()> {
    /// A step satisfying the strong Wolfe conditions, or the best
    /// sufficient-decrease step left when the bracket collapsed.
    Accepted(Probe<T, P>),
    /// The search gave up.
    Failed(FailureKind),
}

impl<T: Scalar, P> LineSearchOutcome<T, P> {
    /// Returns true for an accepted step.
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }
}

/// Resumable strong Wolfe line search for a single element.
///
/// While bracketing, `lo` is the last trial that still descended (initially
/// the origin) and `hi` is unset. Once a bracket is found both ends are set:
/// `lo` always satisfies sufficient decrease with the lowest value seen, and
/// the minimizer lies between `lo` and `hi`.
#[derive(Debug, Clone)]
pub struct StrongWolfeSearch<T: Scalar, P = ()> {
    params: LineSearchParams<T>,
    value0: T,
    derivative0: T,
    lo: Probe<T, P>,
    hi: Option<Probe<T, P>>,
    pending: T,
    evaluations: usize,
    outcome: Option<LineSearchOutcome<T, P>>,
}

impl<T: Scalar, P: Clone> StrongWolfeSearch<T, P> {
    /// Starts a search from the origin probe `(0, φ(0), φ'(0))`.
    ///
    /// A non-finite origin or a non-negative slope finishes the search
    /// immediately with [`FailureKind::NotDescentDirection`].
    pub fn new(params: &LineSearchParams<T>, origin: Probe<T, P>) -> Self {
        let descent = origin.is_finite() && origin.derivative < T::zero();
        let mut search = Self {
            params: params.clone(),
            value0: origin.value,
            derivative0: origin.derivative,
            pending: Float::min(params.initial_step_size, params.max_step_size),
            lo: origin,
            hi: None,
            evaluations: 0,
            outcome: None,
        };
        if !descent {
            trace!(
                "line search: slope {} is not a descent direction",
                search.derivative0
            );
            search.outcome = Some(LineSearchOutcome::Failed(FailureKind::NotDescentDirection));
        }
        search
    }

    /// Step to evaluate next, or `None` once the search has finished.
    pub fn next_trial(&self) -> Option<T> {
        match self.outcome {
            Some(_) => None,
            None => Some(self.pending),
        }
    }

    /// Feeds back the evaluation of the step returned by
    /// [`Self::next_trial`]. Ignored once the search has finished.
    pub fn observe(&mut self, probe: Probe<T, P>) {
        if self.outcome.is_some() {
            return;
        }
        self.evaluations += 1;

        if self.hi.is_none() {
            self.bracket_step(probe);
        } else {
            self.zoom(probe);
        }

        if self.outcome.is_none() && self.hi.is_some() {
            self.schedule_zoom_trial();
        }

        if self.outcome.is_none() && self.evaluations >= self.params.max_evaluations {
            trace!(
                "line search: budget of {} evaluations exhausted",
                self.params.max_evaluations
            );
            self.outcome = Some(LineSearchOutcome::Failed(FailureKind::LineSearchExhausted));
        }
    }

    /// Returns true once the search has an outcome.
    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }

    /// Outcome of a finished search.
    pub fn outcome(&self) -> Option<&LineSearchOutcome<T, P>> {
        self.outcome.as_ref()
    }

    /// Consumes the search and returns its outcome.
    pub fn into_outcome(self) -> Option<LineSearchOutcome<T, P>> {
        self.outcome
    }

    /// Trial evaluations observed so far.
    pub fn evaluations(&self) -> usize {
        self.evaluations
    }

    /// Current bracket `(lo, hi)` once the zoom phase has started.
    pub fn bracket(&self) -> Option<(T, T)> {
        self.hi.as_ref().map(|hi| (self.lo.step, hi.step))
    }

    fn sufficient_decrease(&self, probe: &Probe<T, P>) -> bool {
        self.params
            .sufficient_decrease(self.value0, self.derivative0, probe.step, probe.value)
    }

    fn curvature(&self, probe: &Probe<T, P>) -> bool {
        self.params
            .curvature_condition(self.derivative0, probe.derivative)
    }

    fn accept(&mut self, probe: Probe<T, P>) {
        trace!(
            "line search: accepted step {} after {} evaluations",
            probe.step,
            self.evaluations
        );
        self.outcome = Some(LineSearchOutcome::Accepted(probe));
    }

    fn fail(&mut self, kind: FailureKind) {
        trace!("line search: failed with {kind:?}");
        self.outcome = Some(LineSearchOutcome::Failed(kind));
    }

    fn bracket_step(&mut self, probe: Probe<T, P>) {
        if !probe.is_finite() {
            trace!(
                "line search: non-finite value at step {}, zooming in",
                probe.step
            );
            self.hi = Some(probe);
            return;
        }

        let not_decreasing = self.lo.step > T::zero() && probe.value >= self.lo.value;
        if !self.sufficient_decrease(&probe) || not_decreasing {
            trace!(
                "line search: bracket [{}, {}] found by overshoot",
                self.lo.step,
                probe.step
            );
            self.hi = Some(probe);
            return;
        }

        if self.curvature(&probe) {
            self.accept(probe);
            return;
        }

        if probe.derivative >= T::zero() {
            trace!(
                "line search: bracket [{}, {}] found by slope sign change",
                probe.step,
                self.lo.step
            );
            let previous = std::mem::replace(&mut self.lo, probe);
            self.hi = Some(previous);
            return;
        }

        if probe.step >= self.params.max_step_size {
            self.fail(FailureKind::StepBoundReached);
            return;
        }

        self.pending = Float::min(
            probe.step * self.params.expansion_factor,
            self.params.max_step_size,
        );
        self.lo = probe;
    }

    fn zoom(&mut self, probe: Probe<T, P>) {
        if !probe.is_finite() || !self.sufficient_decrease(&probe) || probe.value >= self.lo.value
        {
            self.hi = Some(probe);
            return;
        }

        if self.curvature(&probe) {
            self.accept(probe);
            return;
        }

        let hi_step = match &self.hi {
            Some(hi) => hi.step,
            None => return,
        };
        if probe.derivative * (hi_step - self.lo.step) >= T::zero() {
            let previous = std::mem::replace(&mut self.lo, probe);
            self.hi = Some(previous);
        } else {
            self.lo = probe;
        }
    }

    fn schedule_zoom_trial(&mut self) {
        let Some(hi) = &self.hi else {
            return;
        };
        let lo = &self.lo;

        let lower = Float::min(lo.step, hi.step);
        let upper = Float::max(lo.step, hi.step);
        let width = upper - lower;
        let scale = Float::max(T::one(), upper);

        if width <= self.params.interval_tolerance * scale {
            if lo.step > T::zero() {
                let best = lo.clone();
                self.accept(best);
            } else {
                self.fail(FailureKind::NoDecrease);
            }
            return;
        }

        let guard = self.params.interpolation_guard * width;
        let two = <T as Scalar>::from_f64(2.0);
        let trial = cubic_minimizer(lo, hi)
            .or_else(|| quadratic_minimizer(lo, hi))
            .unwrap_or((lower + upper) / two);

        self.pending = Float::min(Float::max(trial, lower + guard), upper - guard);
        trace!(
            "line search: zoom in [{}, {}], next trial {}",
            lower,
            upper,
            self.pending
        );
    }
}

/// Minimizer of the cubic interpolating values and slopes at `a` and `b`.
fn cubic_minimizer<T: Scalar, P>(a: &Probe<T, P>, b: &Probe<T, P>) -> Option<T> {
    if !a.is_finite() || !b.is_finite() || a.step == b.step {
        return None;
    }
    let three = <T as Scalar>::from_f64(3.0);
    let two = <T as Scalar>::from_f64(2.0);

    let d1 = a.derivative + b.derivative - three * (a.value - b.value) / (a.step - b.step);
    let discriminant = d1 * d1 - a.derivative * b.derivative;
    if discriminant < T::zero() {
        return None;
    }
    let d2 = Float::signum(b.step - a.step) * Float::sqrt(discriminant);
    let denominator = b.derivative - a.derivative + two * d2;
    if denominator == T::zero() {
        return None;
    }
    let step = b.step - (b.step - a.step) * (b.derivative + d2 - d1) / denominator;
    Float::is_finite(step).then_some(step)
}

/// Minimizer of the quadratic through `φ(a)`, `φ'(a)` and `φ(b)`.
fn quadratic_minimizer<T: Scalar, P>(a: &Probe<T, P>, b: &Probe<T, P>) -> Option<T> {
    if !a.is_finite() || !Float::is_finite(b.value) {
        return None;
    }
    let h = b.step - a.step;
    let curvature = b.value - a.value - a.derivative * h;
    if !(curvature > T::zero()) {
        return None;
    }
    let two = <T as Scalar>::from_f64(2.0);
    let step = a.step - a.derivative * h * h / (two * curvature);
    Float::is_finite(step).then_some(step)
}
