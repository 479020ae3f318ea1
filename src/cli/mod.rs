//! CLI commands

mod codeowners;
mod context;
mod gate;
mod style;

pub use codeowners::run_codeowners;
pub use context::CommandContext;
pub use gate::run_gate;
