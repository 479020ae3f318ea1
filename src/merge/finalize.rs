//! Transactional merge finalization

use crate::error::{Error, Result};
use crate::store::{Column, Tx};
use crate::types::MergeRequest;
use tracing::debug;

/// Mark a merge request as merged
///
/// Must run inside the transaction that persists the merge. `mr` carries the
/// merge result (`merged_commit_id`, `merger_id`, `merged_at`) produced by
/// the strategy. The stored row is re-read so that a concurrent merge is
/// caught here rather than overwritten. Any auto-merge declaration for the
/// request is removed in the same transaction.
pub fn finalize_merge(tx: &mut Tx<'_>, mr: &mut MergeRequest) -> Result<()> {
    let stored = tx.get_merge_request(mr.id)?;
    if stored.has_merged || mr.has_merged {
        return Err(Error::AlreadyMerged {
            id: mr.id,
            index: mr.index,
        });
    }
    if !mr.has_complete_merge_result() {
        return Err(Error::IncompleteMergeData { index: mr.index });
    }

    let issue = tx.get_issue(mr.issue_id)?;
    if issue.is_closed {
        return Err(Error::IssueAlreadyClosedMismatch {
            index: mr.index,
            issue_id: issue.id,
        });
    }

    mr.has_merged = true;
    mr.conflicted_files.clear();
    tx.update_cols(mr, &Column::MERGE_RESULT)?;
    tx.close_issue(issue.id, mr.merged_at.unwrap_or_else(chrono::Utc::now))?;

    if tx.auto_merge_for(mr.id).is_some() {
        tx.delete_auto_merge(mr.id)?;
        debug!(mr_id = mr.id, "removed auto-merge declaration on merge");
    }
    Ok(())
}
