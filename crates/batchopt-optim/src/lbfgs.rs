//! Batched L-BFGS optimizer.
//!
//! L-BFGS (Limited-memory Broyden-Fletcher-Goldfarb-Shanno) is a quasi-Newton
//! algorithm that approximates the inverse Hessian from a bounded history of
//! position and gradient differences. This implementation minimizes a whole
//! batch of independent problems at once: every element keeps its own
//! history, search direction, line search and status, while the objective is
//! evaluated for the full batch in a single call.
//!
//! # Algorithm Overview
//!
//! For every running element, each outer iteration:
//! 1. Computes the direction `dₖ = −Hₖ ∇f(xₖ)` with the two-loop recursion
//! 2. Runs a strong Wolfe line search along `dₖ`
//! 3. Moves to the accepted point `xₖ₊₁ = xₖ + αₖ dₖ`, reusing the value and
//!    gradient already computed by the line search
//! 4. Stores `(sₖ, yₖ)` if it satisfies `⟨yₖ, sₖ⟩ > 0`
//! 5. Checks convergence and numerical failure
//!
//! ## Two-Loop Recursion
//!
//! ```text
//! q = ∇f(xₖ)
//! for i = k-1, ..., k-m:
//!     αᵢ = ρᵢ ⟨sᵢ, q⟩
//!     q  = q − αᵢ yᵢ
//!
//! r = H₀ q                  // H₀ = γ I with γ = ⟨s, y⟩ / ⟨y, y⟩ (newest pair)
//!
//! for i = k-m, ..., k-1:
//!     β = ρᵢ ⟨yᵢ, r⟩
//!     r = r + (αᵢ − β) sᵢ
//!
//! return −r
//! ```
//!
//! ## Batched line search
//!
//! The element line searches advance in lockstep. In each probe round the
//! driver collects the next trial step of every unfinished search, evaluates
//! the whole batch once, and feeds each element its own result. Elements that
//! are not probing in a round are evaluated at their current position and the
//! result is discarded, so row `i` of every oracle call is always element `i`
//! and every call has the shape of the input batch.
//!
//! # References
//!
//! - Nocedal & Wright, "Numerical Optimization" (2006), Algorithms 3.5, 3.6, 7.4

use batchopt_core::{
    compute::batch_ops::{add_scaled, all_finite, axpy, dot, Batch},
    error::Result,
    numerical::validation::{validate_initial_position, validate_inverse_hessian},
    objective::{BatchObjective, Evaluation},
    optimization::{
        line_search::{LineSearchOutcome, LineSearchParams, Probe, StrongWolfeSearch},
        optimizer::{
            BatchOptimizer, BatchTermination, ConvergenceChecker, ConvergenceContext,
            ConvergenceTest, ElementStatus, FailureKind, OptimizationResult, StoppingCondition,
        },
        optimizer_state::{CurvatureHistory, ElementState},
    },
    types::{DMatrix, DVector, Scalar},
    OptimizerError,
};
use log::{debug, info, trace, warn};
use num_traits::Float;

/// Configuration for the L-BFGS optimizer.
#[derive(Debug, Clone)]
pub struct LbfgsConfig<T: Scalar> {
    /// Convergence threshold on the gradient infinity norm
    pub tolerance: T,
    /// Convergence threshold on the position change infinity norm (0 = off)
    pub x_tolerance: T,
    /// Convergence threshold on the relative objective change (0 = off)
    pub f_relative_tolerance: T,
    /// Convergence threshold on the absolute objective change (0 = off)
    pub f_absolute_tolerance: T,
    /// Maximum number of outer iterations
    pub max_iterations: usize,
    /// Number of curvature pairs kept per element (typically 5-20)
    pub memory_size: usize,
    /// Strong Wolfe line search parameters
    pub line_search: LineSearchParams<T>,
    /// Diagonal initial inverse Hessian; replaces the `γ I` scaling when set
    pub initial_inverse_hessian_estimate: Option<DVector<T>>,
    /// When the batch stops iterating
    pub stopping_condition: StoppingCondition,
    /// Extra convergence criterion
    pub convergence_test: Option<ConvergenceTest<T>>,
}

impl<T: Scalar> Default for LbfgsConfig<T> {
    fn default() -> Self {
        Self {
            tolerance: T::DEFAULT_GRADIENT_TOLERANCE,
            x_tolerance: T::zero(),
            f_relative_tolerance: T::zero(),
            f_absolute_tolerance: T::zero(),
            max_iterations: 200,
            memory_size: 10,
            line_search: LineSearchParams::default(),
            initial_inverse_hessian_estimate: None,
            stopping_condition: StoppingCondition::All,
            convergence_test: None,
        }
    }
}

impl<T: Scalar> LbfgsConfig<T> {
    /// Creates a new configuration with default parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the gradient tolerance.
    pub fn with_tolerance(mut self, tolerance: T) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Sets the position change tolerance.
    pub fn with_x_tolerance(mut self, tolerance: T) -> Self {
        self.x_tolerance = tolerance;
        self
    }

    /// Sets the relative objective change tolerance.
    pub fn with_f_relative_tolerance(mut self, tolerance: T) -> Self {
        self.f_relative_tolerance = tolerance;
        self
    }

    /// Sets the absolute objective change tolerance.
    pub fn with_f_absolute_tolerance(mut self, tolerance: T) -> Self {
        self.f_absolute_tolerance = tolerance;
        self
    }

    /// Sets the maximum number of outer iterations.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Sets the memory size (number of vector pairs to store).
    pub fn with_memory_size(mut self, size: usize) -> Self {
        self.memory_size = size;
        self
    }

    /// Replaces the line search parameters.
    pub fn with_line_search(mut self, params: LineSearchParams<T>) -> Self {
        self.line_search = params;
        self
    }

    /// Sets the Armijo constant of the line search.
    pub fn with_c1(mut self, c1: T) -> Self {
        self.line_search.c1 = c1;
        self
    }

    /// Sets the curvature constant of the line search.
    pub fn with_c2(mut self, c2: T) -> Self {
        self.line_search.c2 = c2;
        self
    }

    /// Sets the evaluation budget of each line search.
    pub fn with_max_line_search_evaluations(mut self, evaluations: usize) -> Self {
        self.line_search.max_evaluations = evaluations;
        self
    }

    /// Sets the first trial step of each line search.
    pub fn with_initial_step_size(mut self, step: T) -> Self {
        self.line_search.initial_step_size = step;
        self
    }

    /// Sets a diagonal initial inverse Hessian estimate.
    pub fn with_initial_inverse_hessian_estimate(mut self, estimate: DVector<T>) -> Self {
        self.initial_inverse_hessian_estimate = Some(estimate);
        self
    }

    /// Sets the batch stopping condition.
    pub fn with_stopping_condition(mut self, condition: StoppingCondition) -> Self {
        self.stopping_condition = condition;
        self
    }

    /// Adds a custom convergence test.
    pub fn with_convergence_test(mut self, test: ConvergenceTest<T>) -> Self {
        self.convergence_test = Some(test);
        self
    }

    /// Builds the convergence checker described by this configuration.
    pub fn convergence_checker(&self) -> ConvergenceChecker<T> {
        ConvergenceChecker {
            tolerance: self.tolerance,
            x_tolerance: self.x_tolerance,
            f_absolute_tolerance: self.f_absolute_tolerance,
            f_relative_tolerance: self.f_relative_tolerance,
            test: self.convergence_test.clone(),
        }
    }

    /// Checks every parameter that does not depend on the problem dimension.
    ///
    /// # Errors
    ///
    /// Returns `OptimizerError::InvalidConfiguration` for a non-positive
    /// tolerance, a negative secondary tolerance, a zero memory size, invalid
    /// line search parameters or a non-positive inverse Hessian entry.
    pub fn validate(&self) -> Result<()> {
        self.convergence_checker().validate()?;

        if self.memory_size == 0 {
            return Err(OptimizerError::invalid_configuration(
                "Memory size must be at least 1",
                "memory_size",
                "0",
            ));
        }

        self.line_search.validate()?;

        if let Some(estimate) = &self.initial_inverse_hessian_estimate {
            validate_inverse_hessian(estimate, estimate.len())?;
        }
        Ok(())
    }
}

/// Computes the L-BFGS search direction `−H ∇f` with the two-loop recursion.
///
/// With an empty history the direction is `−H₀ g`, where `H₀` is the
/// diagonal `initial_inverse_hessian` if given and the identity otherwise.
/// With a non-empty history `H₀ = γ I`, `γ = ⟨s, y⟩ / ⟨y, y⟩` of the newest
/// pair, unless a diagonal estimate is given. Pairs with a non-finite `ρ`
/// are skipped, and a non-finite or non-positive `γ` falls back to `I`.
pub fn two_loop_direction<T: Scalar>(
    gradient: &[T],
    history: &CurvatureHistory<T>,
    initial_inverse_hessian: Option<&DVector<T>>,
) -> DVector<T> {
    let m = history.len();
    let mut q = gradient.to_vec();
    let mut alpha = vec![T::zero(); m];

    for i in (0..m).rev() {
        let rho = history.rho(i);
        if !Float::is_finite(rho) {
            continue;
        }
        alpha[i] = rho * dot(history.s(i), &q);
        axpy(-alpha[i], history.y(i), &mut q);
    }

    match initial_inverse_hessian {
        Some(diagonal) => {
            for (qj, &hj) in q.iter_mut().zip(diagonal.iter()) {
                *qj *= hj;
            }
        }
        None => {
            if let Some((s, y)) = history.newest() {
                let gamma = dot(s, y) / dot(y, y);
                if Float::is_finite(gamma) && gamma > T::zero() {
                    q.iter_mut().for_each(|qj| *qj *= gamma);
                }
            }
        }
    }

    for i in 0..m {
        let rho = history.rho(i);
        if !Float::is_finite(rho) {
            continue;
        }
        let beta = rho * dot(history.y(i), &q);
        axpy(alpha[i] - beta, history.s(i), &mut q);
    }

    DVector::from_iterator(q.len(), q.into_iter().map(|v| -v))
}

/// Trial point and gradient carried by each line search probe.
type Sample<T> = (DVector<T>, DVector<T>);

/// Line search in flight for one element.
struct ActiveSearch<T: Scalar> {
    element: usize,
    direction: DVector<T>,
    search: StrongWolfeSearch<T, Sample<T>>,
}

/// Batched L-BFGS optimizer.
///
/// # Examples
///
/// ```rust
/// use batchopt_core::{Batch, Pointwise};
/// use batchopt_optim::{Lbfgs, LbfgsConfig};
///
/// // f(x, y) = 2(x - 1)² + 3(y - 1)²
/// let objective = Pointwise::new(|_: usize, p: &[f64]| {
///     let value = 2.0 * (p[0] - 1.0).powi(2) + 3.0 * (p[1] - 1.0).powi(2);
///     (value, vec![4.0 * (p[0] - 1.0), 6.0 * (p[1] - 1.0)])
/// });
/// let start = Batch::from_flat(2, 2, vec![0.6, 0.8, -3.0, 5.0])?;
///
/// let lbfgs = Lbfgs::new(LbfgsConfig::new().with_tolerance(1e-8));
/// let result = lbfgs.minimize(&objective, &start)?;
///
/// assert!(result.all_converged());
/// assert!((result.position.row(0)[0] - 1.0).abs() < 1e-6);
/// # Ok::<(), batchopt_core::OptimizerError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct Lbfgs<T: Scalar> {
    config: LbfgsConfig<T>,
}

impl<T: Scalar> Lbfgs<T> {
    /// Creates a new L-BFGS optimizer with given configuration.
    pub fn new(config: LbfgsConfig<T>) -> Self {
        Self { config }
    }

    /// Creates a new L-BFGS optimizer with default configuration.
    pub fn with_default_config() -> Self {
        Self::new(LbfgsConfig::default())
    }

    /// Returns the optimizer configuration.
    pub fn config(&self) -> &LbfgsConfig<T> {
        &self.config
    }

    /// Minimizes from every row of `initial_position`.
    ///
    /// # Errors
    ///
    /// Fails before any evaluation on an invalid configuration, an empty or
    /// zero-dimensional batch, or an inverse Hessian estimate of the wrong
    /// length. Fails during the run if the objective returns an error or an
    /// evaluation of the wrong shape.
    pub fn minimize<O>(
        &self,
        objective: &O,
        initial_position: &Batch<T>,
    ) -> Result<OptimizationResult<T>>
    where
        O: BatchObjective<T> + ?Sized,
    {
        self.config.validate()?;
        validate_initial_position(initial_position)?;
        if let Some(estimate) = &self.config.initial_inverse_hessian_estimate {
            validate_inverse_hessian(estimate, initial_position.dim())?;
        }

        let checker = self.config.convergence_checker();
        let mut evaluations = 0;

        let initial = evaluate(objective, initial_position, &mut evaluations)?;
        let mut elements: Vec<ElementState<T>> = (0..initial_position.len())
            .map(|i| {
                ElementState::new(
                    initial_position.row_vector(i),
                    initial.values[i],
                    initial.gradients.row_vector(i),
                    self.config.memory_size,
                )
            })
            .collect();

        for (i, element) in elements.iter_mut().enumerate() {
            let status = checker.assess(&ConvergenceContext {
                element: i,
                iteration: 0,
                position: element.position.as_slice(),
                value: element.value,
                gradient: element.gradient.as_slice(),
                previous_position: None,
                previous_value: None,
            });
            if let ElementStatus::Failed(kind) = status {
                warn!("L-BFGS: element {i} failed at its starting point: {kind}");
            }
            element.finish(status);
        }

        let mut batch_iterations = 0;
        let termination = loop {
            let converged: Vec<bool> = elements.iter().map(|e| e.status.is_converged()).collect();
            let failed: Vec<bool> = elements.iter().map(|e| e.status.is_failed()).collect();

            if self.config.stopping_condition.should_stop(&converged, &failed) {
                break BatchTermination::StoppingCondition;
            }
            if !elements.iter().any(ElementState::is_running) {
                break BatchTermination::NoRunningElements;
            }
            if batch_iterations >= self.config.max_iterations {
                break BatchTermination::MaxIterations;
            }

            self.iterate(objective, &checker, &mut elements, &mut evaluations)?;
            batch_iterations += 1;

            debug!(
                "L-BFGS iteration {}: {} running, {} converged, {} failed, {} evaluations",
                batch_iterations,
                elements.iter().filter(|e| e.is_running()).count(),
                elements.iter().filter(|e| e.status.is_converged()).count(),
                elements.iter().filter(|e| e.status.is_failed()).count(),
                evaluations
            );
        };

        if termination == BatchTermination::MaxIterations {
            for element in elements.iter_mut() {
                element.finish(ElementStatus::Exhausted);
            }
        }

        info!(
            "L-BFGS stopped ({:?}) after {} iterations and {} evaluations",
            termination, batch_iterations, evaluations
        );

        Ok(self.build_result(elements, batch_iterations, evaluations, termination))
    }

    /// Minimizes from every row of a matrix (rows = batch elements).
    pub fn minimize_matrix<O>(
        &self,
        objective: &O,
        initial_position: &DMatrix<T>,
    ) -> Result<OptimizationResult<T>>
    where
        O: BatchObjective<T> + ?Sized,
    {
        self.minimize(objective, &Batch::from_matrix(initial_position))
    }

    /// Minimizes a single problem (batch of size one).
    pub fn minimize_single<O>(
        &self,
        objective: &O,
        initial_position: &DVector<T>,
    ) -> Result<OptimizationResult<T>>
    where
        O: BatchObjective<T> + ?Sized,
    {
        self.minimize(objective, &Batch::from_vector(initial_position))
    }

    /// Runs one outer iteration for every running element.
    fn iterate<O>(
        &self,
        objective: &O,
        checker: &ConvergenceChecker<T>,
        elements: &mut [ElementState<T>],
        evaluations: &mut usize,
    ) -> Result<()>
    where
        O: BatchObjective<T> + ?Sized,
    {
        let estimate = self.config.initial_inverse_hessian_estimate.as_ref();
        let mut active: Vec<ActiveSearch<T>> = Vec::new();

        for (i, element) in elements.iter().enumerate() {
            if !element.is_running() {
                continue;
            }
            let direction =
                two_loop_direction(element.gradient.as_slice(), &element.history, estimate);
            let slope = dot(element.gradient.as_slice(), direction.as_slice());
            let origin = Probe::new(
                T::zero(),
                element.value,
                slope,
                (element.position.clone(), element.gradient.clone()),
            );
            active.push(ActiveSearch {
                element: i,
                direction,
                search: StrongWolfeSearch::new(&self.config.line_search, origin),
            });
        }

        let mut round = 0;
        loop {
            let trials: Vec<(usize, T)> = active
                .iter()
                .enumerate()
                .filter_map(|(k, a)| a.search.next_trial().map(|step| (k, step)))
                .collect();
            if trials.is_empty() {
                break;
            }
            round += 1;
            trace!("L-BFGS probe round {round}: {} trial points", trials.len());

            let mut positions = Batch::zeros(elements.len(), elements[0].position.len());
            for (i, element) in elements.iter().enumerate() {
                positions.set_row(i, element.position.as_slice());
            }
            for &(k, step) in &trials {
                let a = &active[k];
                let x = &elements[a.element].position;
                let trial = add_scaled(x.as_slice(), step, a.direction.as_slice());
                positions.set_row(a.element, &trial);
            }

            let eval = evaluate(objective, &positions, evaluations)?;

            for &(k, step) in &trials {
                let a = &mut active[k];
                let gradient = eval.gradients.row_vector(a.element);
                let slope = dot(gradient.as_slice(), a.direction.as_slice());
                let point = positions.row_vector(a.element);
                a.search.observe(Probe::new(
                    step,
                    eval.values[a.element],
                    slope,
                    (point, gradient),
                ));
            }
        }

        for a in active {
            let i = a.element;
            let element = &mut elements[i];
            element.iterations += 1;

            match a.search.into_outcome() {
                Some(LineSearchOutcome::Accepted(probe)) => {
                    let (position, gradient) = probe.data;
                    if !Float::is_finite(probe.value) || !all_finite(gradient.as_slice()) {
                        fail_element(i, element, FailureKind::NumericalFailure);
                        continue;
                    }

                    let previous_position = element.position.clone();
                    let previous_value = element.value;
                    if !element.advance(position, probe.value, gradient) {
                        trace!("L-BFGS: element {i} skipped a pair without positive curvature");
                    }

                    let status = checker.assess(&ConvergenceContext {
                        element: i,
                        iteration: element.iterations,
                        position: element.position.as_slice(),
                        value: element.value,
                        gradient: element.gradient.as_slice(),
                        previous_position: Some(previous_position.as_slice()),
                        previous_value: Some(previous_value),
                    });
                    match status {
                        ElementStatus::Failed(kind) => fail_element(i, element, kind),
                        status => element.finish(status),
                    }
                }
                Some(LineSearchOutcome::Failed(kind)) => fail_element(i, element, kind),
                None => fail_element(i, element, FailureKind::LineSearchExhausted),
            }
        }

        Ok(())
    }

    fn build_result(
        &self,
        elements: Vec<ElementState<T>>,
        batch_iterations: usize,
        evaluations: usize,
        termination: BatchTermination,
    ) -> OptimizationResult<T> {
        let n = elements.len();
        let dim = elements.first().map_or(0, |e| e.position.len());
        let mut position = Batch::zeros(n, dim);
        let mut objective_gradient = Batch::zeros(n, dim);
        let mut objective_value = DVector::zeros(n);

        for (i, element) in elements.iter().enumerate() {
            position.set_row(i, element.position.as_slice());
            objective_gradient.set_row(i, element.gradient.as_slice());
            objective_value[i] = element.value;
        }

        OptimizationResult {
            position,
            objective_value,
            objective_gradient,
            status: elements.iter().map(|e| e.status).collect(),
            num_iterations: elements.iter().map(|e| e.iterations).collect(),
            batch_iterations,
            num_objective_evaluations: evaluations,
            position_deltas: elements.iter().map(|e| e.history.position_deltas()).collect(),
            gradient_deltas: elements.iter().map(|e| e.history.gradient_deltas()).collect(),
            termination,
        }
    }
}

impl<T: Scalar> BatchOptimizer<T> for Lbfgs<T> {
    fn name(&self) -> &str {
        "L-BFGS"
    }

    fn minimize<O>(
        &self,
        objective: &O,
        initial_position: &Batch<T>,
    ) -> Result<OptimizationResult<T>>
    where
        O: BatchObjective<T> + ?Sized,
    {
        Lbfgs::minimize(self, objective, initial_position)
    }
}

/// Calls the objective once and checks the shape of its output.
fn evaluate<T, O>(
    objective: &O,
    positions: &Batch<T>,
    evaluations: &mut usize,
) -> Result<Evaluation<T>>
where
    T: Scalar,
    O: BatchObjective<T> + ?Sized,
{
    let eval = objective.evaluate(positions)?;
    *evaluations += 1;
    eval.check_shape(positions)?;
    Ok(eval)
}

fn fail_element<T: Scalar>(index: usize, element: &mut ElementState<T>, kind: FailureKind) {
    warn!(
        "L-BFGS: element {index} failed after {} iterations: {kind}",
        element.iterations
    );
    element.finish(ElementStatus::Failed(kind));
}
