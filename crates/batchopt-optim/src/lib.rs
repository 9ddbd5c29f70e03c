//! Batched optimization algorithms.
//!
//! This crate provides the optimization drivers built on `batchopt-core`.
//!
//! # Available Optimizers
//!
//! - **L-BFGS**: Limited memory Broyden-Fletcher-Goldfarb-Shanno with a
//!   strong Wolfe line search, minimizing a batch of independent problems
//!   in lockstep
//!
//! # Examples
//!
//! ```rust
//! use batchopt_core::{optimization::StoppingCondition, test_utils::Himmelblau, Batch};
//! use batchopt_optim::{Lbfgs, LbfgsConfig};
//!
//! let lbfgs = Lbfgs::new(
//!     LbfgsConfig::new()
//!         .with_tolerance(1e-8)
//!         .with_stopping_condition(StoppingCondition::Any),
//! );
//! let start = Batch::from_flat(2, 2, vec![1.0, 1.0, -1.0, -1.0])?;
//! let result = lbfgs.minimize(&Himmelblau, &start)?;
//! assert!(result.converged().iter().any(|&c| c));
//! # Ok::<(), batchopt_core::OptimizerError>(())
//! ```

pub mod lbfgs;

// Re-export main optimizers for convenience
pub use lbfgs::{two_loop_direction, Lbfgs, LbfgsConfig};

// Re-export commonly used items from core
pub use batchopt_core::optimization::{
    BatchOptimizer, BatchTermination, ElementStatus, FailureKind, LineSearchParams,
    OptimizationResult, StoppingCondition,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exports() {
        let _config = LbfgsConfig::<f64>::new().with_stopping_condition(StoppingCondition::Any);
        let _params = LineSearchParams::<f32>::default();
        assert_eq!(Lbfgs::<f32>::with_default_config().name(), "L-BFGS");
    }
}
