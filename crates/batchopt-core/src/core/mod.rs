//! Core traits and types for batched optimization.

pub mod error;
pub mod objective;
pub mod types;

// Re-export core types
pub use error::*;
pub use objective::*;
pub use types::*;
