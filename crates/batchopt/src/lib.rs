//! Batched L-BFGS minimization.
//!
//! `batchopt` minimizes many independent, unconstrained, differentiable
//! problems at once. Each batch element keeps its own curvature history,
//! line search and status, while the objective is evaluated for the whole
//! batch in one call per probe round.
//!
//! This crate re-exports the workspace crates:
//!
//! - [`core`]: batch storage, objective oracle, line search, statuses
//! - [`optim`]: the L-BFGS driver
//!
//! # Example
//!
//! ```rust
//! use batchopt::prelude::*;
//!
//! // Two shifted paraboloids, one target per batch element.
//! let targets = [1.0, -2.0];
//! let objective = Pointwise::new(|i: usize, x: &[f64]| {
//!     let d: Vec<f64> = x.iter().map(|v| v - targets[i]).collect();
//!     let value: f64 = d.iter().map(|v| v * v).sum();
//!     (value, d.iter().map(|v| 2.0 * v).collect())
//! });
//!
//! let start = Batch::zeros(2, 3);
//! let result = Lbfgs::new(LbfgsConfig::new()).minimize(&objective, &start)?;
//!
//! assert!(result.all_converged());
//! assert!((result.position.row(1)[2] + 2.0).abs() < 1e-8);
//! # Ok::<(), OptimizerError>(())
//! ```

pub use batchopt_core as core;
pub use batchopt_optim as optim;
pub use nalgebra;

/// Everything needed to set up and run a batched minimization.
pub mod prelude {
    pub use batchopt_core::prelude::*;
    pub use batchopt_optim::{two_loop_direction, Lbfgs, LbfgsConfig};
}
