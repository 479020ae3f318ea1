//! Merge executor
//!
//! Three steps, two of them effectful:
//! 1. Plan - validate the style and build the commit message (pure)
//! 2. Git - run the strategy in a staging checkout (slow, no transaction)
//! 3. Persist - finalize the merge in one short transaction

mod execute;
mod finalize;
mod message;
mod plan;
mod pool;

pub use execute::MergeExecutor;
pub use finalize::finalize_merge;
pub use message::{default_message, reviewed_by_trailers, with_trailers};
pub use plan::{MergePlan, create_merge_plan};
pub use pool::{WorkGuard, WorkingPool};
