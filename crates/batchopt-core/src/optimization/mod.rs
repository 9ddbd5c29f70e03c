//! Line search, per-element state and optimizer interfaces.

pub mod line_search;
pub mod optimizer;
pub mod optimizer_state;

// Re-export optimization components
pub use line_search::*;
pub use optimizer::*;
pub use optimizer_state::*;
