//! Merge execution - effectful operations
//!
//! Takes a `MergePlan` (created by the pure planning function), runs the
//! strategy against the git backend, then persists the result in one short
//! transaction.

use crate::backend::{EngineEvent, GitBackend, Observers, StagingCheckout, StrategyOutcome};
use crate::error::{Error, Result};
use crate::merge::finalize::finalize_merge;
use crate::merge::plan::MergePlan;
use crate::merge::pool::WorkingPool;
use crate::status::{ensure_not_merged, record_merge_conflict};
use crate::store::{Column, Store};
use crate::types::{CommitId, MergeRequest, MergeRequestId, MergeRequestStatus, MergeStyle};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Runs merge plans
pub struct MergeExecutor {
    store: Arc<Store>,
    git: Arc<dyn GitBackend>,
    observers: Observers,
    pool: WorkingPool,
}

impl MergeExecutor {
    /// Executor over a store and git backend
    pub fn new(store: Arc<Store>, git: Arc<dyn GitBackend>, observers: Observers) -> Self {
        Self {
            store,
            git,
            observers,
            pool: WorkingPool::new(),
        }
    }

    /// Execute a merge plan (EFFECTFUL)
    ///
    /// Returns the commit now at the tip of the base branch. A strategy
    /// conflict is recorded on the merge request before `MergeConflict` is
    /// returned.
    pub async fn execute(&self, plan: &MergePlan) -> Result<CommitId> {
        let mr_id = plan.merge_request.id;
        let _guard = self.pool.acquire(mr_id).await?;

        // A merge that finished while we waited for the lock wins
        let current = self.store.get_merge_request(mr_id)?;
        ensure_not_merged(&current)?;

        let outcome = self
            .run_git_phase(plan, &current)
            .await
            .map_err(|e| e.with_merge_request(mr_id))?;

        match outcome {
            StrategyOutcome::Committed(commit) => {
                self.persist(plan, &commit)?;
                info!(mr_id, style = %plan.style, commit = %commit, "merged");
                Ok(commit)
            }
            StrategyOutcome::Conflict(files) => {
                self.record_conflict(mr_id, &files)?;
                Err(Error::MergeConflict { id: mr_id, files })
            }
            StrategyOutcome::Rejected(reason) => {
                debug!(mr_id, style = %plan.style, %reason, "strategy rejected merge");
                Err(Error::Strategy(reason).with_merge_request(mr_id))
            }
        }
    }

    async fn run_git_phase(&self, plan: &MergePlan, mr: &MergeRequest) -> Result<StrategyOutcome> {
        let staging = self.git.prepare_staging(mr).await?;

        let result = match self.run_strategy(plan, &staging).await {
            Ok(StrategyOutcome::Committed(commit)) => self
                .git
                .publish(&staging, &commit)
                .await
                .map(|()| StrategyOutcome::Committed(commit)),
            other => other,
        };

        if let Err(e) = self.git.cleanup(&staging).await {
            warn!(mr_id = mr.id, staging = %staging.staging_ref, "failed to clean up staging checkout: {e}");
        }
        result
    }

    async fn run_strategy(
        &self,
        plan: &MergePlan,
        staging: &StagingCheckout,
    ) -> Result<StrategyOutcome> {
        let message = plan.message.as_deref().unwrap_or_default();
        let author = &plan.actor;
        match plan.style {
            MergeStyle::FastForwardOnly => self.git.fast_forward_merge(staging).await,
            MergeStyle::Merge => self.git.merge_commit(staging, message, author).await,
            MergeStyle::Squash => self.git.squash_merge(staging, message, author).await,
            MergeStyle::Rebase => self.git.rebase(staging).await,
            MergeStyle::RebaseMerge => self.git.rebase_merge(staging, message, author).await,
        }
    }

    fn persist(&self, plan: &MergePlan, commit: &str) -> Result<()> {
        let mr_id = plan.merge_request.id;
        self.store.transaction(|tx| {
            let mut mr = tx.get_merge_request(mr_id)?;
            mr.merged_commit_id = Some(commit.to_string());
            mr.merger_id = Some(plan.actor.id);
            mr.merged_at = Some(Utc::now());
            finalize_merge(tx, &mut mr)
        })?;

        self.observers.emit(&EngineEvent::Merged {
            merge_request_id: mr_id,
            commit_id: commit.to_string(),
            merger_id: plan.actor.id,
            style: Some(plan.style),
        });
        Ok(())
    }

    fn record_conflict(&self, mr_id: MergeRequestId, files: &[String]) -> Result<()> {
        let from = self.store.transaction(|tx| {
            let mut mr = tx.get_merge_request(mr_id)?;
            let from = record_merge_conflict(&mut mr, files)?;
            tx.update_cols(&mr, &[Column::Status, Column::ConflictedFiles])?;
            Ok(from)
        })?;

        warn!(mr_id, files = files.len(), "merge hit conflicts");
        if from != MergeRequestStatus::Conflict {
            self.observers.emit(&EngineEvent::StatusChanged {
                merge_request_id: mr_id,
                from,
                to: MergeRequestStatus::Conflict,
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for MergeExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergeExecutor")
            .field("observers", &self.observers)
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}
