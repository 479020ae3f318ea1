//! Merge planning - pure functions
//!
//! Decides what a merge attempt will do before any git work happens. All
//! inputs are gathered by the caller, so this is easy to unit test.

use crate::config::MergeConfig;
use crate::error::{Error, Result};
use crate::merge::message::{default_message, reviewed_by_trailers, with_trailers};
use crate::status::ensure_not_merged;
use crate::types::{Issue, MergeRequest, MergeStyle, User};

/// Everything the executor needs to run one merge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergePlan {
    /// Merge request snapshot taken before the git phase
    pub merge_request: MergeRequest,
    /// Strategy to run
    pub style: MergeStyle,
    /// Commit message, for styles that write one
    pub message: Option<String>,
    /// Who is merging (also the commit author)
    pub actor: User,
}

/// Create a merge plan (PURE - no I/O)
///
/// An empty `message` falls back to the style's default message, followed by
/// a `Reviewed-by:` block for `approvers`. A caller-supplied message is used
/// verbatim. Styles without a commit of their own ignore the message.
pub fn create_merge_plan(
    config: &MergeConfig,
    mr: &MergeRequest,
    issue: &Issue,
    style: MergeStyle,
    actor: User,
    message: &str,
    approvers: &[User],
) -> Result<MergePlan> {
    if !config.allows(style) {
        return Err(Error::InvalidArgument(format!(
            "merge style '{style}' is not allowed"
        )));
    }
    ensure_not_merged(mr)?;

    let message = if !style.takes_message() {
        None
    } else if message.trim().is_empty() {
        default_message(style, mr, issue).map(|m| {
            with_trailers(
                m,
                &reviewed_by_trailers(approvers, config.max_approvers_in_message),
            )
        })
    } else {
        Some(message.to_string())
    };

    Ok(MergePlan {
        merge_request: mr.clone(),
        style,
        message,
        actor,
    })
}
