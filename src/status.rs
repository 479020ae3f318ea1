//! Merge request status transitions and validation.
//!
//! Status and `has_merged` are orthogonal: a request can be force-merged from
//! `Conflict`, so merging never goes through this table. Once `has_merged` is
//! set, every transition is rejected.

use crate::backend::CheckOutcome;
use crate::error::{Error, Result};
use crate::types::{MergeRequest, MergeRequestStatus};
use tracing::debug;

/// Whether `from -> to` is a legal status transition
pub const fn is_valid_transition(from: MergeRequestStatus, to: MergeRequestStatus) -> bool {
    use MergeRequestStatus::{Ancestor, Checking, Conflict, Empty, Error, ManuallyMerged, Mergeable};

    match (from, to) {
        // Conflict checker verdicts
        (Checking, Mergeable | Conflict | Error | Empty | Ancestor | ManuallyMerged) => true,
        // A push while a check is queued keeps it queued
        (Checking, Checking) => true,
        // Head or base advanced
        (Mergeable | Conflict | Error | Empty | Ancestor, Checking) => true,
        // ManuallyMerged implies merged, which is final
        _ => false,
    }
}

/// Status recorded for a trial-merge outcome
pub const fn status_for_outcome(outcome: &CheckOutcome) -> MergeRequestStatus {
    match outcome {
        CheckOutcome::Mergeable => MergeRequestStatus::Mergeable,
        CheckOutcome::Conflict(_) => MergeRequestStatus::Conflict,
        CheckOutcome::Empty => MergeRequestStatus::Empty,
        CheckOutcome::Ancestor => MergeRequestStatus::Ancestor,
        CheckOutcome::Error(_) => MergeRequestStatus::Error,
    }
}

/// Reject any mutation of a merged request
pub const fn ensure_not_merged(mr: &MergeRequest) -> Result<()> {
    if mr.has_merged {
        return Err(Error::AlreadyMerged {
            id: mr.id,
            index: mr.index,
        });
    }
    Ok(())
}

/// Apply a validated status change
///
/// Returns the previous status.
pub fn transition(mr: &mut MergeRequest, to: MergeRequestStatus) -> Result<MergeRequestStatus> {
    ensure_not_merged(mr)?;

    let from = mr.status;
    if !is_valid_transition(from, to) {
        return Err(Error::InvalidStatusTransition {
            id: mr.id,
            from,
            to,
        });
    }

    mr.status = to;
    if to != MergeRequestStatus::Conflict {
        mr.conflicted_files.clear();
    }
    debug!(mr_id = mr.id, %from, %to, "status transition");
    Ok(from)
}

/// Record the result of a conflict check
///
/// The request must be in `Checking`.
pub fn apply_check_outcome(
    mr: &mut MergeRequest,
    outcome: &CheckOutcome,
) -> Result<MergeRequestStatus> {
    let from = transition(mr, status_for_outcome(outcome))?;
    if let CheckOutcome::Conflict(files) = outcome {
        mr.conflicted_files.clone_from(files);
    }
    Ok(from)
}

/// Record a conflict hit by a merge strategy
///
/// Unlike checker verdicts this is accepted from any pre-merge status, since
/// the strategy ran against fresher refs than the last check.
pub fn record_merge_conflict(
    mr: &mut MergeRequest,
    files: &[String],
) -> Result<MergeRequestStatus> {
    ensure_not_merged(mr)?;
    let from = mr.status;
    mr.status = MergeRequestStatus::Conflict;
    mr.conflicted_files = files.to_vec();
    debug!(mr_id = mr.id, %from, files = files.len(), "merge conflict recorded");
    Ok(from)
}
