//! mr-gate - merge request lifecycle and merge-gate engine
//!
//! Tracks merge requests from creation through conflict checking and
//! review-based gating to a final merge, including deferred
//! "merge when ready" execution.
//!
//! The engine owns no git plumbing, review storage or identity data; those
//! are collaborators behind the traits in [`backend`]. [`engine::MergeEngine`]
//! is the entry point.

pub mod automerge;
pub mod backend;
pub mod checker;
pub mod codeowners;
pub mod config;
pub mod engine;
pub mod error;
pub mod gate;
pub mod identity;
pub mod merge;
pub mod status;
pub mod store;
pub mod types;

pub use engine::{MergeEngine, Services};
pub use error::{Error, Result};
