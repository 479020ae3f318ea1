//! Conflict checker
//!
//! Drives the status machine from trial merges: a push marks the request
//! `Checking`, and a check records the verdict along with the refreshed
//! divergence and merge base.

use crate::backend::{EngineEvent, GitBackend, Observers};
use crate::error::Result;
use crate::merge::finalize_merge;
use crate::status::{apply_check_outcome, ensure_not_merged, transition};
use crate::store::{Column, Store};
use crate::types::{CommitId, MergeRequest, MergeRequestId, MergeRequestStatus, User};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};

/// Runs conflict checks and records their verdicts
pub struct ConflictChecker {
    store: Arc<Store>,
    git: Arc<dyn GitBackend>,
    observers: Observers,
}

impl ConflictChecker {
    /// Checker over a store and git backend
    pub fn new(store: Arc<Store>, git: Arc<dyn GitBackend>, observers: Observers) -> Self {
        Self {
            store,
            git,
            observers,
        }
    }

    fn emit_status(&self, mr_id: MergeRequestId, from: MergeRequestStatus, to: MergeRequestStatus) {
        if from != to {
            self.observers.emit(&EngineEvent::StatusChanged {
                merge_request_id: mr_id,
                from,
                to,
            });
        }
    }

    /// Queue a re-check after head or base moved
    ///
    /// Returns the previous status.
    pub fn mark_checking(&self, mr_id: MergeRequestId) -> Result<MergeRequestStatus> {
        let from = self.store.transaction(|tx| {
            let mut mr = tx.get_merge_request(mr_id)?;
            let from = transition(&mut mr, MergeRequestStatus::Checking)?;
            tx.update_cols(&mr, &[Column::Status, Column::ConflictedFiles])?;
            Ok(from)
        })?;
        self.emit_status(mr_id, from, MergeRequestStatus::Checking);
        Ok(from)
    }

    /// Trial-merge the request and record the verdict
    ///
    /// A request that is not already `Checking` is moved there first.
    /// Returns the recorded status.
    pub async fn check_merge_request(&self, mr_id: MergeRequestId) -> Result<MergeRequestStatus> {
        let mr = self.store.get_merge_request(mr_id)?;
        ensure_not_merged(&mr)?;
        if !mr.is_checking() {
            self.mark_checking(mr_id)?;
        }

        // Git phase: nothing is locked while the backend works
        let check = self
            .git
            .test_merge(&mr)
            .await
            .map_err(|e| e.with_merge_request(mr_id))?;
        let divergence = self
            .git
            .divergence(&mr)
            .await
            .map_err(|e| e.with_merge_request(mr_id))?;

        let to = self.store.transaction(|tx| {
            let mut row = tx.get_merge_request(mr_id)?;
            apply_check_outcome(&mut row, &check.outcome)?;
            row.merge_base.clone_from(&check.merge_base);
            row.changed_protected_files
                .clone_from(&check.changed_protected_files);
            row.commits_ahead = divergence.ahead;
            row.commits_behind = divergence.behind;

            let mut cols = Column::CHECK_RESULT.to_vec();
            cols.extend([Column::CommitsAhead, Column::CommitsBehind]);
            tx.update_cols(&row, &cols)?;
            Ok(row.status)
        })?;

        debug!(mr_id, status = %to, ahead = divergence.ahead, behind = divergence.behind, "conflict check recorded");
        self.emit_status(mr_id, MergeRequestStatus::Checking, to);
        Ok(to)
    }

    /// Record that the head landed on base outside the engine
    ///
    /// Goes through the same finalization as an engine merge, with the
    /// pusher recorded as merger.
    pub fn mark_manually_merged(
        &self,
        mr_id: MergeRequestId,
        commit: CommitId,
        pusher: &User,
    ) -> Result<MergeRequest> {
        let (mr, from) = self.store.transaction(|tx| {
            let mut mr = tx.get_merge_request(mr_id)?;
            let from = mr.status;
            if !mr.is_checking() {
                transition(&mut mr, MergeRequestStatus::Checking)?;
            }
            transition(&mut mr, MergeRequestStatus::ManuallyMerged)?;
            mr.merged_commit_id = Some(commit.clone());
            mr.merger_id = Some(pusher.id);
            mr.merged_at = Some(Utc::now());
            finalize_merge(tx, &mut mr)?;
            Ok((mr, from))
        })?;

        info!(mr_id, commit = %commit, merger = %pusher.name, "marked manually merged");
        self.emit_status(mr_id, from, MergeRequestStatus::ManuallyMerged);
        self.observers.emit(&EngineEvent::Merged {
            merge_request_id: mr_id,
            commit_id: commit,
            merger_id: pusher.id,
            style: None,
        });
        Ok(mr)
    }
}

impl std::fmt::Debug for ConflictChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConflictChecker")
            .field("observers", &self.observers)
            .finish_non_exhaustive()
    }
}
