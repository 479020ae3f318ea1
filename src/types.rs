//! Core types for mr-gate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Merge request id (global)
pub type MergeRequestId = i64;
/// Issue id (global)
pub type IssueId = i64;
/// Repository id
pub type RepoId = i64;
/// User id
pub type UserId = i64;
/// Team id
pub type TeamId = i64;
/// Review id
pub type ReviewId = i64;
/// Git commit id (hex)
pub type CommitId = String;

/// Prefix of server-side merge request refs
pub const PULL_REF_PREFIX: &str = "refs/pull/";
/// Prefix of branch refs
pub const BRANCH_REF_PREFIX: &str = "refs/heads/";

/// Maximum issue title length in bytes
pub const MAX_TITLE_BYTES: usize = 255;

/// Lifecycle status of a merge request
///
/// Merging is tracked separately by `MergeRequest::has_merged`, so a request
/// can be merged from any pre-merge status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MergeRequestStatus {
    /// Head conflicts with base
    Conflict,
    /// Conflict check pending
    Checking,
    /// Can be merged cleanly
    Mergeable,
    /// Head landed on base outside of the engine
    ManuallyMerged,
    /// Conflict check failed
    Error,
    /// No diff between head and base
    Empty,
    /// Head commit is already reachable from base
    Ancestor,
}

impl std::fmt::Display for MergeRequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Conflict => write!(f, "CONFLICT"),
            Self::Checking => write!(f, "CHECKING"),
            Self::Mergeable => write!(f, "MERGEABLE"),
            Self::ManuallyMerged => write!(f, "MANUALLY_MERGED"),
            Self::Error => write!(f, "ERROR"),
            Self::Empty => write!(f, "EMPTY"),
            Self::Ancestor => write!(f, "ANCESTOR"),
        }
    }
}

/// How the head of a merge request is published
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeRequestFlow {
    /// Head is a visible branch
    #[default]
    Branch,
    /// Head is a server-side ref with no visible branch
    Detached,
}

/// Merge strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergeStyle {
    /// Create a merge commit
    Merge,
    /// Rebase head commits onto base and fast-forward
    Rebase,
    /// Rebase head commits onto base, then create a merge commit
    RebaseMerge,
    /// Squash all commits into one
    Squash,
    /// Only fast-forward the base branch
    FastForwardOnly,
}

impl MergeStyle {
    /// All styles, in display order
    pub const ALL: [Self; 5] = [
        Self::Merge,
        Self::Rebase,
        Self::RebaseMerge,
        Self::Squash,
        Self::FastForwardOnly,
    ];

    /// Whether the style writes a commit message of its own
    pub const fn takes_message(self) -> bool {
        matches!(self, Self::Merge | Self::RebaseMerge | Self::Squash)
    }
}

impl std::fmt::Display for MergeStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Merge => write!(f, "merge"),
            Self::Rebase => write!(f, "rebase"),
            Self::RebaseMerge => write!(f, "rebase-merge"),
            Self::Squash => write!(f, "squash"),
            Self::FastForwardOnly => write!(f, "fast-forward-only"),
        }
    }
}

impl FromStr for MergeStyle {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "merge" => Ok(Self::Merge),
            "rebase" => Ok(Self::Rebase),
            "rebase-merge" => Ok(Self::RebaseMerge),
            "squash" => Ok(Self::Squash),
            "fast-forward-only" => Ok(Self::FastForwardOnly),
            other => Err(crate::error::Error::InvalidArgument(format!(
                "unknown merge style: {other}"
            ))),
        }
    }
}

/// A merge request record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeRequest {
    /// Global id
    pub id: MergeRequestId,
    /// Owning issue (title, description, open/closed state)
    pub issue_id: IssueId,
    /// Sequence number within the base repository
    pub index: i64,

    /// Repository holding the head branch
    pub head_repo_id: RepoId,
    /// Head branch name
    pub head_branch: String,
    /// Repository holding the base branch
    pub base_repo_id: RepoId,
    /// Base branch name
    pub base_branch: String,
    /// Branch or detached flow
    pub flow: MergeRequestFlow,

    /// Lifecycle status
    pub status: MergeRequestStatus,
    /// Conflicting paths, empty unless conflicted
    pub conflicted_files: Vec<String>,
    /// Protected paths touched by the change
    pub changed_protected_files: Vec<String>,

    /// Cached commits on head not on base
    pub commits_ahead: u32,
    /// Cached commits on base not on head
    pub commits_behind: u32,
    /// Cached merge-base commit
    pub merge_base: Option<CommitId>,
    /// Whether maintainers may push to the head branch
    pub allow_maintainer_edit: bool,

    /// Set exactly once, when merged
    pub has_merged: bool,
    /// Resulting commit on the base branch
    pub merged_commit_id: Option<CommitId>,
    /// Who merged
    pub merger_id: Option<UserId>,
    /// When merged
    pub merged_at: Option<DateTime<Utc>>,
}

impl MergeRequest {
    /// A fresh, unsaved merge request in `Checking` status
    pub fn new(
        head_repo_id: RepoId,
        head_branch: impl Into<String>,
        base_repo_id: RepoId,
        base_branch: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            issue_id: 0,
            index: 0,
            head_repo_id,
            head_branch: head_branch.into(),
            base_repo_id,
            base_branch: base_branch.into(),
            flow: MergeRequestFlow::Branch,
            status: MergeRequestStatus::Checking,
            conflicted_files: Vec::new(),
            changed_protected_files: Vec::new(),
            commits_ahead: 0,
            commits_behind: 0,
            merge_base: None,
            allow_maintainer_edit: false,
            has_merged: false,
            merged_commit_id: None,
            merger_id: None,
            merged_at: None,
        }
    }

    /// Whether the conflict check is still pending
    pub fn is_checking(&self) -> bool {
        self.status == MergeRequestStatus::Checking
    }

    /// Whether the last conflict check found a clean merge
    pub fn can_auto_merge(&self) -> bool {
        self.status == MergeRequestStatus::Mergeable
    }

    /// Whether head and base have no diff
    pub fn is_empty(&self) -> bool {
        self.status == MergeRequestStatus::Empty
    }

    /// Whether the head commit is already reachable from base
    pub fn is_ancestor(&self) -> bool {
        self.status == MergeRequestStatus::Ancestor
    }

    /// Whether any files are recorded as conflicting
    pub fn is_files_conflicted(&self) -> bool {
        !self.conflicted_files.is_empty()
    }

    /// Whether head and base live in different repositories
    pub const fn is_from_fork(&self) -> bool {
        self.head_repo_id != self.base_repo_id
    }

    /// Whether the head is a detached server-side ref
    pub fn is_detached_flow(&self) -> bool {
        self.flow == MergeRequestFlow::Detached
    }

    /// Server-side ref for this merge request in the base repository
    pub fn git_ref_name(&self) -> String {
        format!("{PULL_REF_PREFIX}{}/head", self.index)
    }

    /// Full ref name of the head branch
    pub fn head_branch_ref_name(&self) -> String {
        format!("{BRANCH_REF_PREFIX}{}", self.head_branch)
    }

    /// Repository and ref that hold the head commit
    ///
    /// Detached heads only exist as the pull ref in the base repository.
    pub fn head_ref(&self) -> (RepoId, String) {
        match self.flow {
            MergeRequestFlow::Branch => (self.head_repo_id, self.head_branch_ref_name()),
            MergeRequestFlow::Detached => (self.base_repo_id, self.git_ref_name()),
        }
    }

    /// Full ref name of the base branch
    pub fn base_ref(&self) -> String {
        format!("{BRANCH_REF_PREFIX}{}", self.base_branch)
    }

    /// Whether every merge-result field is set
    pub const fn has_complete_merge_result(&self) -> bool {
        self.merged_commit_id.is_some() && self.merger_id.is_some() && self.merged_at.is_some()
    }

    /// Whether no merge-result field is set
    pub const fn has_empty_merge_result(&self) -> bool {
        self.merged_commit_id.is_none() && self.merger_id.is_none() && self.merged_at.is_none()
    }
}

impl std::fmt::Display for MergeRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "<MergeRequest [{}]Repo[{}]#{}[{}...",
            self.id, self.base_repo_id, self.index, self.base_branch
        )?;
        if self.is_from_fork() {
            write!(f, "Repo[{}]:{}]>", self.head_repo_id, self.head_branch)
        } else {
            write!(f, "{}]>", self.head_branch)
        }
    }
}

/// Tracking issue owned by the issue subsystem
///
/// Only the fields the engine reads or writes are modeled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    /// Global id
    pub id: IssueId,
    /// Repository the issue belongs to (the base repository)
    pub repo_id: RepoId,
    /// Sequence number, shared with the merge request
    pub index: i64,
    /// Title
    pub title: String,
    /// Author
    pub poster_id: UserId,
    /// Whether closed
    pub is_closed: bool,
    /// When closed
    pub closed_at: Option<DateTime<Utc>>,
}

impl Issue {
    /// A fresh, unsaved open issue
    pub fn new(repo_id: RepoId, poster_id: UserId, title: impl Into<String>) -> Self {
        Self {
            id: 0,
            repo_id,
            index: 0,
            title: title.into(),
            poster_id,
            is_closed: false,
            closed_at: None,
        }
    }
}

/// A user account
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct User {
    /// Id
    pub id: UserId,
    /// Login name
    pub name: String,
}

/// An organization team
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Team {
    /// Id
    pub id: TeamId,
    /// Owning organization name
    pub org: String,
    /// Team name
    pub name: String,
}

/// Kind of review
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewType {
    /// Approval
    Approve,
    /// Request for changes
    Reject,
    /// Outstanding request for a review
    Request,
    /// Comment only
    Comment,
}

/// A review on a merge request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    /// Id
    #[serde(default)]
    pub id: ReviewId,
    /// Issue of the reviewed merge request
    #[serde(default)]
    pub issue_id: IssueId,
    /// Reviewer
    pub reviewer_id: UserId,
    /// Kind of review
    #[serde(rename = "type")]
    pub review_type: ReviewType,
    /// Reviewer is eligible for the target branch
    pub official: bool,
    /// Dismissed by a maintainer
    #[serde(default)]
    pub dismissed: bool,
    /// Issued against an older head commit
    #[serde(default)]
    pub stale: bool,
    /// Head commit at review time
    #[serde(default)]
    pub commit_id: Option<CommitId>,
}

/// A deferred merge declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoMerge {
    /// Id
    pub id: i64,
    /// Merge request (unique)
    pub merge_request_id: MergeRequestId,
    /// Who scheduled it
    pub requested_by_id: UserId,
    /// Style to merge with
    pub merge_style: MergeStyle,
    /// Commit message to merge with
    pub message: String,
    /// When scheduled
    pub created_at: DateTime<Utc>,
}

/// State of a CI / commit status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitStatusState {
    /// Still running
    Pending,
    /// Succeeded
    Success,
    /// Errored
    Error,
    /// Failed
    Failure,
    /// Succeeded with warnings
    Warning,
    /// Skipped
    Skipped,
}

impl CommitStatusState {
    /// Whether the state is a successful terminal state
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

impl std::fmt::Display for CommitStatusState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Success => write!(f, "success"),
            Self::Error => write!(f, "error"),
            Self::Failure => write!(f, "failure"),
            Self::Warning => write!(f, "warning"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_style_roundtrip_strings() {
        for style in MergeStyle::ALL {
            assert_eq!(style.to_string().parse::<MergeStyle>().unwrap(), style);
        }
        assert!("octopus".parse::<MergeStyle>().is_err());
    }

    #[test]
    fn test_head_ref_follows_flow() {
        let mut mr = MergeRequest::new(2, "feature", 1, "main");
        mr.index = 4;
        assert_eq!(mr.head_ref(), (2, "refs/heads/feature".to_string()));

        mr.flow = MergeRequestFlow::Detached;
        assert_eq!(mr.head_ref(), (1, "refs/pull/4/head".to_string()));
    }

    #[test]
    fn test_display_same_repo_and_fork() {
        let mut mr = MergeRequest::new(1, "feature", 1, "main");
        mr.id = 9;
        mr.index = 3;
        assert_eq!(mr.to_string(), "<MergeRequest [9]Repo[1]#3[main...feature]>");

        mr.head_repo_id = 5;
        assert_eq!(
            mr.to_string(),
            "<MergeRequest [9]Repo[1]#3[main...Repo[5]:feature]>"
        );
    }

    #[test]
    fn test_status_display() {
        assert_eq!(MergeRequestStatus::ManuallyMerged.to_string(), "MANUALLY_MERGED");
        assert_eq!(MergeRequestStatus::Checking.to_string(), "CHECKING");
    }
}
