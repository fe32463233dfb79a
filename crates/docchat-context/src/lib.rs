mod selector;
mod window;

pub use selector::{ContextSelector, DEFAULT_MAX_TURNS};
pub use window::{ContextBudget, ContextWindow};
