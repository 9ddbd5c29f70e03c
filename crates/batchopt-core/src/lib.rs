//! Core traits and types for batched quasi-Newton optimization.
//!
//! This crate provides the building blocks shared by the batched optimizers
//! of the workspace: a contiguous batch container, the objective oracle
//! interface, the strong Wolfe line search, per-element curvature history,
//! and the statuses and results reported to callers.
//!
//! # Key Concepts
//!
//! - **Batch**: `B` independent problems of dimension `d`, stored row by row
//! - **Objective**: a pure oracle returning one value and one gradient per row
//! - **Probe round**: one batched oracle call serving every element whose
//!   line search still needs a trial point
//! - **Element status**: `Running`, `Converged`, `Failed(kind)` or `Exhausted`
//!
//! # Modules
//!
//! - [`error`]: Error types for optimization calls
//! - [`types`]: Scalar trait with per-precision constants, and aliases
//! - [`objective`]: Batched objective oracle and adapters
//! - [`compute`]: Batch storage and row-wise vector algebra
//! - [`optimization`]: Line search, curvature history, statuses and results
//! - [`numerical`]: Input validation and gradient checking
//!
//! # Logging
//!
//! Diagnostics go through the [`log`] facade; the crate never installs a
//! logger.

pub mod compute;
pub mod core;
pub mod numerical;
pub mod optimization;
pub mod utils;

pub use self::core::{error, objective, types};

#[cfg(any(test, feature = "test-utils"))]
pub use utils::test_utils;

// Re-export commonly used items at the crate root
pub use compute::batch_ops::Batch;
pub use error::{OptimizerError, OptimizerResult, Result};
pub use objective::{BatchObjective, CountingObjective, Evaluation, FnObjective, Pointwise};
pub use types::{DMatrix, DVector, Scalar};

/// Prelude module for convenient imports.
///
/// # Example
/// ```
/// use batchopt_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::compute::batch_ops::Batch;
    pub use crate::error::{OptimizerError, OptimizerResult, Result};
    pub use crate::objective::{
        BatchObjective, CountingObjective, Evaluation, FnObjective, Pointwise,
    };
    pub use crate::optimization::line_search::{
        LineSearchOutcome, LineSearchParams, Probe, StrongWolfeSearch,
    };
    pub use crate::optimization::optimizer::{
        BatchOptimizer, BatchTermination, ConvergenceChecker, ConvergenceContext,
        ConvergenceTest, ElementStatus, FailureKind, OptimizationResult, StoppingCondition,
    };
    pub use crate::optimization::optimizer_state::{CurvatureHistory, ElementState};
    pub use crate::types::{DMatrix, DVector, Scalar};
}
