//! Collaborator services consumed by the engine
//!
//! The git backend, review subsystem and identity subsystem live outside this
//! crate. The engine only talks to them through these traits, so the same
//! orchestration logic runs against a real forge or an in-memory test double.

mod observer;

pub use observer::{EngineEvent, MergeObserver, Observers};

use crate::error::Result;
use crate::types::{
    CommitId, IssueId, MergeRequest, MergeRequestId, RepoId, Review, ReviewId, ReviewType, Team,
    User, UserId,
};
use async_trait::async_trait;

/// Commit divergence between head and base
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Divergence {
    /// Commits on head not on base
    pub ahead: u32,
    /// Commits on base not on head
    pub behind: u32,
}

/// Result of a trial merge of head into base
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// Merges cleanly
    Mergeable,
    /// Conflicts in the listed files
    Conflict(Vec<String>),
    /// No diff between head and base
    Empty,
    /// Head is already reachable from base
    Ancestor,
    /// Trial merge could not be performed
    Error(String),
}

/// Everything the conflict checker learns from a trial merge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchCheck {
    /// Outcome of the trial merge
    pub outcome: CheckOutcome,
    /// Merge base of head and base, if any
    pub merge_base: Option<CommitId>,
    /// Protected paths touched by the change
    pub changed_protected_files: Vec<String>,
}

/// A working checkout positioned on a staging branch that tracks the base
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingCheckout {
    /// Merge request the checkout was prepared for
    pub merge_request_id: MergeRequestId,
    /// Base repository
    pub base_repo_id: RepoId,
    /// Staging branch (starts at the base tip)
    pub staging_ref: String,
    /// Tracking branch (points at the head tip)
    pub tracking_ref: String,
    /// Base tip when the checkout was prepared
    pub base_commit: CommitId,
    /// Head tip when the checkout was prepared
    pub head_commit: CommitId,
}

/// Result of running a merge strategy in a staging checkout
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategyOutcome {
    /// Strategy produced this commit on the staging branch
    Committed(CommitId),
    /// Strategy hit conflicts in the listed files
    Conflict(Vec<String>),
    /// Strategy refused (e.g. not fast-forwardable)
    Rejected(String),
}

/// Git plumbing used by the checker and the merge executor
///
/// None of these calls may run while a store transaction is open.
#[async_trait]
pub trait GitBackend: Send + Sync {
    /// Resolve a ref to a commit id
    async fn rev_parse(&self, repo: RepoId, reference: &str) -> Result<Option<CommitId>>;

    /// Compute the merge base of two refs
    async fn merge_base(&self, repo: RepoId, left: &str, right: &str)
    -> Result<Option<CommitId>>;

    /// Count commits ahead/behind between head and base
    async fn divergence(&self, mr: &MergeRequest) -> Result<Divergence>;

    /// Trial-merge head into base without touching either branch
    async fn test_merge(&self, mr: &MergeRequest) -> Result<PatchCheck>;

    /// Create a staging checkout for a merge attempt
    async fn prepare_staging(&self, mr: &MergeRequest) -> Result<StagingCheckout>;

    /// `merge --ff-only` of the tracking branch into staging
    async fn fast_forward_merge(&self, staging: &StagingCheckout) -> Result<StrategyOutcome>;

    /// `merge --no-ff` of the tracking branch into staging
    async fn merge_commit(
        &self,
        staging: &StagingCheckout,
        message: &str,
        author: &User,
    ) -> Result<StrategyOutcome>;

    /// Squash the tracking branch into a single commit on staging
    async fn squash_merge(
        &self,
        staging: &StagingCheckout,
        message: &str,
        author: &User,
    ) -> Result<StrategyOutcome>;

    /// Rebase the tracking branch onto staging and fast-forward
    async fn rebase(&self, staging: &StagingCheckout) -> Result<StrategyOutcome>;

    /// Rebase the tracking branch onto staging, then merge with `--no-ff`
    async fn rebase_merge(
        &self,
        staging: &StagingCheckout,
        message: &str,
        author: &User,
    ) -> Result<StrategyOutcome>;

    /// Push the staging result to the base branch
    async fn publish(&self, staging: &StagingCheckout, commit: &str) -> Result<()>;

    /// Remove the staging checkout
    async fn cleanup(&self, staging: &StagingCheckout) -> Result<()>;
}

/// Review query filter
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReviewFilter {
    /// Only these types (empty = all)
    pub types: Vec<ReviewType>,
    /// Only official reviews
    pub official_only: bool,
    /// Drop dismissed reviews
    pub exclude_dismissed: bool,
}

impl ReviewFilter {
    /// Whether a review passes the filter
    pub fn matches(&self, review: &Review) -> bool {
        (self.types.is_empty() || self.types.contains(&review.review_type))
            && (!self.official_only || review.official)
            && (!self.exclude_dismissed || !review.dismissed)
    }
}

/// Review subsystem
#[async_trait]
pub trait ReviewSource: Send + Sync {
    /// Reviews attached to an issue
    async fn find_reviews(&self, issue_id: IssueId, filter: &ReviewFilter) -> Result<Vec<Review>>;

    /// A single review by id
    async fn get_review(&self, id: ReviewId) -> Result<Option<Review>>;
}

/// Outcome of an `org/team` lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TeamLookup {
    /// Team resolved
    Found(Team),
    /// No such organization
    OrgNotFound,
    /// Organization exists, team does not
    TeamNotFound,
}

/// Identity subsystem
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Look up an account by login name
    async fn resolve_user(&self, name: &str) -> Result<Option<User>>;

    /// Look up an account by id
    async fn user_by_id(&self, id: UserId) -> Result<Option<User>>;

    /// Look up a team by organization and team name
    async fn resolve_org_team(&self, org: &str, team: &str) -> Result<TeamLookup>;
}
