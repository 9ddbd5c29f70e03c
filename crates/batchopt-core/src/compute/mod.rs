//! Batch storage and row-wise vector algebra.

pub mod batch_ops;

pub use batch_ops::*;
