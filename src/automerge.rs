//! Auto-merge declarations
//!
//! A declaration is a standing instruction to merge a request once its gate
//! passes. Nothing is polled: the engine re-derives the decision whenever a
//! review or a commit status could have unblocked the request.

use crate::backend::{EngineEvent, GitBackend, IdentityResolver, Observers};
use crate::error::{Error, Result};
use crate::gate::BlockReason;
use crate::status::ensure_not_merged;
use crate::store::Store;
use crate::types::{AutoMerge, CommitId, MergeRequestId, MergeStyle, RepoId, Review, ReviewType, User};
use chrono::Utc;
use std::sync::Arc;
use tracing::debug;

/// Result of re-checking one merge request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecheckOutcome {
    /// No declaration exists (or it was cancelled meanwhile)
    NotScheduled,
    /// Declaration exists but the request is not ready
    Blocked(Vec<BlockReason>),
    /// Merged with the declared style
    Merged(CommitId),
}

/// Scheduled requests waiting on a commit
#[derive(Debug, Default)]
pub struct PendingMerges {
    /// Requests whose head is the commit
    pub matched: Vec<MergeRequestId>,
    /// Requests whose head could not be resolved
    pub unresolved: Vec<(MergeRequestId, Error)>,
}

/// Outcomes of a re-check that touched several merge requests
#[derive(Debug, Default)]
pub struct RecheckReport {
    /// Requests that were re-checked
    pub outcomes: Vec<(MergeRequestId, RecheckOutcome)>,
    /// Requests whose re-check failed
    pub failures: Vec<(MergeRequestId, Error)>,
}

impl RecheckReport {
    /// Whether nothing was re-checked
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty() && self.failures.is_empty()
    }

    /// Ids of requests that were merged
    pub fn merged(&self) -> Vec<MergeRequestId> {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, RecheckOutcome::Merged(_)))
            .map(|(id, _)| *id)
            .collect()
    }
}

/// Whether a review event can unblock a pending auto-merge
///
/// Approvals can satisfy the threshold and dismissals can lift a veto.
pub fn review_triggers_recheck(review: &Review) -> bool {
    review.review_type == ReviewType::Approve || review.dismissed
}

/// Manages auto-merge declarations
pub struct AutoMergeScheduler {
    store: Arc<Store>,
    observers: Observers,
}

impl AutoMergeScheduler {
    /// Scheduler over a store
    pub fn new(store: Arc<Store>, observers: Observers) -> Self {
        Self { store, observers }
    }

    /// Declare that a merge request should merge once ready
    ///
    /// Fails with `AlreadyScheduled` when a declaration exists; the unique
    /// key on the table is what enforces this under concurrency.
    pub fn schedule(
        &self,
        requester: &User,
        mr_id: MergeRequestId,
        style: MergeStyle,
        message: &str,
    ) -> Result<AutoMerge> {
        let row = self.store.transaction(|tx| {
            let mr = tx.get_merge_request(mr_id)?;
            ensure_not_merged(&mr)?;
            tx.insert_auto_merge(AutoMerge {
                id: 0,
                merge_request_id: mr_id,
                requested_by_id: requester.id,
                merge_style: style,
                message: message.to_string(),
                created_at: Utc::now(),
            })
        })?;

        debug!(mr_id, requester = %requester.name, %style, "scheduled auto merge");
        self.observers.emit(&EngineEvent::AutoMergeScheduled {
            merge_request_id: mr_id,
            requested_by_id: requester.id,
        });
        Ok(row)
    }

    /// Remove a declaration
    ///
    /// Has no effect on a merge already in flight.
    pub fn cancel(&self, mr_id: MergeRequestId) -> Result<AutoMerge> {
        let row = self.store.transaction(|tx| tx.delete_auto_merge(mr_id))?;
        debug!(mr_id, "cancelled auto merge");
        self.observers.emit(&EngineEvent::AutoMergeCancelled {
            merge_request_id: mr_id,
        });
        Ok(row)
    }

    /// Declaration and its requester, if scheduled
    pub async fn lookup(
        &self,
        identity: &dyn IdentityResolver,
        mr_id: MergeRequestId,
    ) -> Result<Option<(AutoMerge, User)>> {
        let Some(row) = self.store.auto_merge_for(mr_id)? else {
            return Ok(None);
        };
        let requester = identity
            .user_by_id(row.requested_by_id)
            .await?
            .ok_or_else(|| Error::user_id_not_found(row.requested_by_id))?;
        Ok(Some((row, requester)))
    }

    /// Scheduled merge requests whose head commit is `sha`
    ///
    /// Only requests in `repo_id` with a declaration are resolved against
    /// git, so a commit nobody waits on costs no backend calls. A head that
    /// fails to resolve is reported without stopping the others.
    pub async fn pending_for_commit(
        &self,
        git: &dyn GitBackend,
        repo_id: RepoId,
        sha: &str,
    ) -> Result<PendingMerges> {
        let candidates = self.store.read(|t| {
            Ok(t.unmerged_with_head_in(repo_id)
                .into_iter()
                .filter(|mr| t.auto_merge_for(mr.id).is_some())
                .collect::<Vec<_>>())
        })?;

        let mut pending = PendingMerges::default();
        for mr in candidates {
            let (head_repo, head_ref) = mr.head_ref();
            match git.rev_parse(head_repo, &head_ref).await {
                Ok(head) if head.as_deref() == Some(sha) => pending.matched.push(mr.id),
                Ok(_) => {}
                Err(e) => pending.unresolved.push((mr.id, e.with_merge_request(mr.id))),
            }
        }
        debug!(
            repo_id,
            sha,
            matched = pending.matched.len(),
            unresolved = pending.unresolved.len(),
            "resolved pending auto merges"
        );
        Ok(pending)
    }
}

impl std::fmt::Debug for AutoMergeScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutoMergeScheduler")
            .field("observers", &self.observers)
            .finish_non_exhaustive()
    }
}
