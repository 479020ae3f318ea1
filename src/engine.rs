//! Merge engine façade
//!
//! Wires the store, the collaborator services and the lifecycle components
//! together and exposes the operations request handlers and event hooks
//! call. Every entry point follows the same shape: gather (store reads and
//! git), decide (pure), then persist in one short transaction.

use crate::automerge::{
    AutoMergeScheduler, RecheckOutcome, RecheckReport, review_triggers_recheck,
};
use crate::backend::{GitBackend, IdentityResolver, Observers, ReviewFilter, ReviewSource};
use crate::checker::ConflictChecker;
use crate::codeowners::{self, CodeOwnerRule};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::gate::{GateVerdict, ProtectionRules, evaluate_gate, precondition_reasons};
use crate::merge::{MergeExecutor, create_merge_plan};
use crate::status::ensure_not_merged;
use crate::store::Store;
use crate::types::{
    AutoMerge, CommitId, CommitStatusState, Issue, MergeRequest, MergeRequestId,
    MergeRequestStatus, MergeStyle, RepoId, Review, ReviewId, ReviewType, User, UserId,
};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Collaborator services handed to the engine
#[derive(Clone)]
pub struct Services {
    /// Git plumbing
    pub git: Arc<dyn GitBackend>,
    /// Review subsystem
    pub reviews: Arc<dyn ReviewSource>,
    /// Identity subsystem
    pub identity: Arc<dyn IdentityResolver>,
    /// Lifecycle event observers
    pub observers: Observers,
}

/// Gate inputs gathered for one merge request
struct GateSnapshot {
    mr: MergeRequest,
    issue: Issue,
    reviews: Vec<Review>,
    verdict: GateVerdict,
}

/// The merge-request lifecycle engine
pub struct MergeEngine {
    config: EngineConfig,
    store: Arc<Store>,
    git: Arc<dyn GitBackend>,
    reviews: Arc<dyn ReviewSource>,
    identity: Arc<dyn IdentityResolver>,
    checker: ConflictChecker,
    scheduler: AutoMergeScheduler,
    executor: MergeExecutor,
}

impl MergeEngine {
    /// Engine over a store and collaborator services
    pub fn new(config: EngineConfig, store: Arc<Store>, services: Services) -> Self {
        let Services {
            git,
            reviews,
            identity,
            observers,
        } = services;
        Self {
            checker: ConflictChecker::new(Arc::clone(&store), Arc::clone(&git), observers.clone()),
            scheduler: AutoMergeScheduler::new(Arc::clone(&store), observers.clone()),
            executor: MergeExecutor::new(Arc::clone(&store), Arc::clone(&git), observers),
            config,
            store,
            git,
            reviews,
            identity,
        }
    }

    /// Engine configuration
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Underlying store
    pub const fn store(&self) -> &Arc<Store> {
        &self.store
    }

    async fn user(&self, id: UserId) -> Result<User> {
        self.identity
            .user_by_id(id)
            .await?
            .ok_or_else(|| Error::user_id_not_found(id))
    }

    /// The requested style, or the configured default, if enabled
    fn resolve_style(&self, style: Option<MergeStyle>) -> Result<MergeStyle> {
        let style = style.unwrap_or(self.config.merge.default_style);
        if self.config.merge.allows(style) {
            Ok(style)
        } else {
            Err(Error::InvalidArgument(format!(
                "merge style '{style}' is not allowed"
            )))
        }
    }

    /// Open a merge request with its issue
    #[instrument(skip(self, issue, mr), fields(base_repo = mr.base_repo_id, head = %mr.head_branch))]
    pub fn create_merge_request(&self, issue: Issue, mr: MergeRequest) -> Result<(Issue, MergeRequest)> {
        self.store.new_merge_request(issue, mr)
    }

    // =========================================================================
    // Gate
    // =========================================================================

    async fn gate_snapshot(&self, mr_id: MergeRequestId) -> Result<GateSnapshot> {
        let (mut mr, issue) = self.store.get_with_issue(mr_id)?;
        ensure_not_merged(&mr)?;

        // Outdated-branch blocking must not rely on a stale counter
        let divergence = self
            .git
            .divergence(&mr)
            .await
            .map_err(|e| e.with_merge_request(mr_id))?;
        if (divergence.ahead, divergence.behind) != (mr.commits_ahead, mr.commits_behind) {
            let merge_base = self
                .git
                .merge_base(mr.base_repo_id, &mr.base_ref(), &mr.git_ref_name())
                .await
                .map_err(|e| e.with_merge_request(mr_id))?;
            // The row may have merged while git was running
            self.store.refresh_divergence(
                mr_id,
                divergence.ahead,
                divergence.behind,
                merge_base.clone(),
            )?;
            mr.commits_ahead = divergence.ahead;
            mr.commits_behind = divergence.behind;
            mr.merge_base = merge_base;
        }

        let rules = ProtectionRules::new(self.store.protected_branches(mr.base_repo_id)?);
        let rule = rules.rule_for(&mr.base_branch);
        let reviews = self
            .reviews
            .find_reviews(issue.id, &ReviewFilter::default())
            .await
            .map_err(|e| e.with_merge_request(mr_id))?;

        let mut reasons = precondition_reasons(
            &mr,
            &issue.title,
            &self.config.pull_request.work_in_progress_prefixes,
        );
        reasons.extend(evaluate_gate(&mr, rule, &reviews).reasons);
        let verdict = GateVerdict::from_reasons(reasons);

        Ok(GateSnapshot {
            mr,
            issue,
            reviews,
            verdict,
        })
    }

    /// Whether a merge request may be merged right now
    ///
    /// Refreshes the cached divergence first, then combines the mergeable
    /// precondition with the protection gate of the base branch.
    #[instrument(skip(self))]
    pub async fn evaluate_merge_gate(&self, mr_id: MergeRequestId) -> Result<GateVerdict> {
        Ok(self.gate_snapshot(mr_id).await?.verdict)
    }

    // =========================================================================
    // Merging
    // =========================================================================

    async fn approvers(&self, reviews: &[Review]) -> Result<Vec<User>> {
        let official_only = self.config.merge.official_approvers_only_in_message;
        let mut approvers: Vec<User> = Vec::new();
        for review in reviews {
            if review.review_type != ReviewType::Approve
                || review.dismissed
                || (official_only && !review.official)
                || approvers.iter().any(|u| u.id == review.reviewer_id)
            {
                continue;
            }
            match self.identity.user_by_id(review.reviewer_id).await? {
                Some(user) => approvers.push(user),
                None => debug!(reviewer_id = review.reviewer_id, "approver not found, skipping trailer"),
            }
        }
        Ok(approvers)
    }

    async fn run_merge(
        &self,
        snapshot: &GateSnapshot,
        style: MergeStyle,
        actor: User,
        message: &str,
    ) -> Result<CommitId> {
        let approvers = self.approvers(&snapshot.reviews).await?;
        let plan = create_merge_plan(
            &self.config.merge,
            &snapshot.mr,
            &snapshot.issue,
            style,
            actor,
            message,
            &approvers,
        )?;
        self.executor.execute(&plan).await
    }

    /// Merge a request whose gate passes
    ///
    /// `style = None` uses `merge.default_style`; an empty `message` uses
    /// the style's default message.
    #[instrument(skip(self))]
    pub async fn attempt_merge(
        &self,
        mr_id: MergeRequestId,
        style: Option<MergeStyle>,
        actor: UserId,
        message: &str,
    ) -> Result<CommitId> {
        let style = self.resolve_style(style)?;
        let snapshot = self.gate_snapshot(mr_id).await?;
        if snapshot.verdict.is_blocked() {
            return Err(Error::MergeBlocked {
                id: mr_id,
                reasons: snapshot.verdict.reasons,
            });
        }
        let actor = self.user(actor).await?;
        self.run_merge(&snapshot, style, actor, message).await
    }

    /// Merge regardless of the gate (administrative override)
    ///
    /// Only the finalization preconditions still apply, so a request in
    /// `Conflict` can be force-merged when the strategy succeeds.
    #[instrument(skip(self))]
    pub async fn force_merge(
        &self,
        mr_id: MergeRequestId,
        style: Option<MergeStyle>,
        actor: UserId,
        message: &str,
    ) -> Result<CommitId> {
        let style = self.resolve_style(style)?;
        let snapshot = self.gate_snapshot(mr_id).await?;
        if snapshot.verdict.is_blocked() {
            warn!(mr_id, reasons = ?snapshot.verdict.reasons, "forcing merge past gate");
        }
        let actor = self.user(actor).await?;
        self.run_merge(&snapshot, style, actor, message).await
    }

    // =========================================================================
    // Auto-merge
    // =========================================================================

    /// Merge automatically once the gate passes
    #[instrument(skip(self))]
    pub async fn schedule_auto_merge(
        &self,
        requester: UserId,
        mr_id: MergeRequestId,
        style: Option<MergeStyle>,
        message: &str,
    ) -> Result<AutoMerge> {
        let style = self.resolve_style(style)?;
        let requester = self.user(requester).await?;
        self.scheduler.schedule(&requester, mr_id, style, message)
    }

    /// Withdraw an auto-merge declaration
    #[instrument(skip(self))]
    pub fn cancel_auto_merge(&self, mr_id: MergeRequestId) -> Result<AutoMerge> {
        self.scheduler.cancel(mr_id)
    }

    /// Auto-merge declaration and requester, if any
    #[instrument(skip(self))]
    pub async fn get_auto_merge_status(
        &self,
        mr_id: MergeRequestId,
    ) -> Result<Option<(AutoMerge, User)>> {
        self.scheduler.lookup(self.identity.as_ref(), mr_id).await
    }

    /// Re-derive the auto-merge decision for one request
    #[instrument(skip(self))]
    pub async fn recheck(&self, mr_id: MergeRequestId) -> Result<RecheckOutcome> {
        let Some(declaration) = self.store.auto_merge_for(mr_id)? else {
            return Ok(RecheckOutcome::NotScheduled);
        };

        let snapshot = self.gate_snapshot(mr_id).await?;
        if snapshot.verdict.is_blocked() {
            debug!(mr_id, reasons = ?snapshot.verdict.reasons, "auto merge not ready");
            return Ok(RecheckOutcome::Blocked(snapshot.verdict.reasons));
        }

        let requester = self.user(declaration.requested_by_id).await?;
        let commit = self
            .run_merge(
                &snapshot,
                declaration.merge_style,
                requester,
                &declaration.message,
            )
            .await?;
        Ok(RecheckOutcome::Merged(commit))
    }

    /// Re-check after a review was submitted or dismissed
    ///
    /// Returns `None` when the review kind cannot unblock anything.
    #[instrument(skip(self))]
    pub async fn recheck_on_review_event(
        &self,
        review_id: ReviewId,
    ) -> Result<Option<RecheckOutcome>> {
        let review = self
            .reviews
            .get_review(review_id)
            .await?
            .ok_or(Error::ReviewNotFound(review_id))?;
        if !review_triggers_recheck(&review) {
            return Ok(None);
        }
        let mr = self.store.get_by_issue_id(review.issue_id)?;
        self.recheck(mr.id).await.map(Some)
    }

    /// Re-check requests whose head is `sha` after a commit status update
    ///
    /// Only successful states trigger anything. Each request is re-checked
    /// independently; failures are collected rather than aborting the rest.
    #[instrument(skip(self))]
    pub async fn recheck_on_commit_status(
        &self,
        repo_id: RepoId,
        sha: &str,
        state: CommitStatusState,
    ) -> Result<RecheckReport> {
        let mut report = RecheckReport::default();
        if !state.is_success() {
            return Ok(report);
        }

        let pending = self
            .scheduler
            .pending_for_commit(self.git.as_ref(), repo_id, sha)
            .await?;
        for (mr_id, e) in pending.unresolved {
            warn!(mr_id, "cannot resolve head for auto merge: {e}");
            report.failures.push((mr_id, e));
        }
        for mr_id in pending.matched {
            match self.recheck(mr_id).await {
                Ok(outcome) => report.outcomes.push((mr_id, outcome)),
                Err(e) => {
                    warn!(mr_id, "auto merge recheck failed: {e}");
                    report.failures.push((mr_id, e));
                }
            }
        }
        Ok(report)
    }

    // =========================================================================
    // Conflict checking
    // =========================================================================

    /// Queue a re-check after a push to head or base
    #[instrument(skip(self))]
    pub fn mark_checking(&self, mr_id: MergeRequestId) -> Result<MergeRequestStatus> {
        self.checker.mark_checking(mr_id)
    }

    /// Trial-merge and record the verdict
    #[instrument(skip(self))]
    pub async fn check_merge_request(&self, mr_id: MergeRequestId) -> Result<MergeRequestStatus> {
        self.checker.check_merge_request(mr_id).await
    }

    /// Record a merge that happened outside the engine
    #[instrument(skip(self))]
    pub async fn mark_manually_merged(
        &self,
        mr_id: MergeRequestId,
        commit: CommitId,
        pusher: UserId,
    ) -> Result<MergeRequest> {
        let pusher = self.user(pusher).await?;
        self.checker.mark_manually_merged(mr_id, commit, &pusher)
    }

    // =========================================================================
    // CODEOWNERS
    // =========================================================================

    /// Parse CODEOWNERS content against the identity subsystem
    #[instrument(skip(self, content), fields(bytes = content.len()))]
    pub async fn parse_code_owners(&self, content: &str) -> (Vec<CodeOwnerRule>, Vec<String>) {
        codeowners::parse_code_owners(content, self.identity.as_ref()).await
    }
}

impl std::fmt::Debug for MergeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergeEngine")
            .field("config", &self.config)
            .field("executor", &self.executor)
            .finish_non_exhaustive()
    }
}
