//! Error types for mr-gate

use crate::gate::BlockReason;
use crate::types::{IssueId, MergeRequestId, MergeRequestStatus, RepoId, ReviewId, UserId};
use thiserror::Error;

/// Errors produced by the merge-request engine
#[derive(Debug, Error)]
pub enum Error {
    /// Merge request lookup failed
    #[error("merge request does not exist [{0}]")]
    MergeRequestNotFound(String),

    /// Owning issue lookup failed
    #[error("issue does not exist [id: {0}]")]
    IssueNotFound(IssueId),

    /// No auto-merge declaration for the merge request
    #[error("auto merge does not exist [merge_request_id: {0}]")]
    AutoMergeNotFound(MergeRequestId),

    /// Referenced account does not exist
    #[error("user does not exist [{0}]")]
    UserNotFound(String),

    /// Referenced review does not exist
    #[error("review does not exist [id: {0}]")]
    ReviewNotFound(ReviewId),

    /// An open merge request already exists for the same head/base pair
    #[error(
        "merge request already exists for these targets [id: {id}, head_repo_id: {head_repo_id}, base_repo_id: {base_repo_id}, head_branch: {head_branch}, base_branch: {base_branch}]"
    )]
    MergeRequestAlreadyExists {
        /// Existing merge request id
        id: MergeRequestId,
        /// Head repository
        head_repo_id: RepoId,
        /// Base repository
        base_repo_id: RepoId,
        /// Head branch
        head_branch: String,
        /// Base branch
        base_branch: String,
    },

    /// An auto-merge declaration already exists
    #[error(
        "merge request is already scheduled to auto merge when checks succeed [merge_request_id: {0}]"
    )]
    AlreadyScheduled(MergeRequestId),

    /// The merge request was already merged
    #[error("merge request #{index} is already merged")]
    AlreadyMerged {
        /// Merge request id
        id: MergeRequestId,
        /// Per-repository index
        index: i64,
    },

    /// Merge-result fields were not all populated before finalization
    #[error("unable to merge merge request #{index}: some required fields are empty")]
    IncompleteMergeData {
        /// Per-repository index
        index: i64,
    },

    /// The owning issue is closed but the merge request is not merged
    #[error("merge request #{index} has a closed issue [{issue_id}] but is not merged")]
    IssueAlreadyClosedMismatch {
        /// Per-repository index
        index: i64,
        /// Owning issue
        issue_id: IssueId,
    },

    /// Illegal status transition
    #[error("invalid status transition for merge request {id}: {from} -> {to}")]
    InvalidStatusTransition {
        /// Merge request id
        id: MergeRequestId,
        /// Current status
        from: MergeRequestStatus,
        /// Requested status
        to: MergeRequestStatus,
    },

    /// The merge gate blocks the merge
    #[error("merge request {id} is blocked: {}", .reasons.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "))]
    MergeBlocked {
        /// Merge request id
        id: MergeRequestId,
        /// Failed checks
        reasons: Vec<BlockReason>,
    },

    /// Merge strategy hit conflicting files
    #[error("merge conflict in merge request {id}: {}", .files.join(", "))]
    MergeConflict {
        /// Merge request id
        id: MergeRequestId,
        /// Conflicting paths
        files: Vec<String>,
    },

    /// Merge strategy failed for another reason
    #[error("merge strategy failed: {0}")]
    Strategy(String),

    /// Git backend failure
    #[error("git backend error: {0}")]
    Git(String),

    /// Storage failure
    #[error("store error: {0}")]
    Store(String),

    /// Configuration failure
    #[error("config error: {0}")]
    Config(String),

    /// Invalid caller input
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    /// Build a `MergeRequestNotFound` for a merge request id
    pub fn mr_not_found(id: MergeRequestId) -> Self {
        Self::MergeRequestNotFound(format!("id: {id}"))
    }

    /// Build a `UserNotFound` for a user id
    pub fn user_id_not_found(id: UserId) -> Self {
        Self::UserNotFound(format!("id: {id}"))
    }

    /// Prefix a backend error with merge request context.
    ///
    /// Only backend-originated variants (`Git`, `Store`, `Strategy`) are rewritten;
    /// typed variants already carry their identifiers.
    #[must_use]
    pub fn with_merge_request(self, id: MergeRequestId) -> Self {
        match self {
            Self::Git(msg) => Self::Git(format!("merge request {id}: {msg}")),
            Self::Store(msg) => Self::Store(format!("merge request {id}: {msg}")),
            Self::Strategy(msg) => Self::Strategy(format!("merge request {id}: {msg}")),
            other => other,
        }
    }

    /// Whether the error means a referenced record does not exist
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::MergeRequestNotFound(_)
                | Self::IssueNotFound(_)
                | Self::AutoMergeNotFound(_)
                | Self::UserNotFound(_)
                | Self::ReviewNotFound(_)
        )
    }

    /// Whether the error is a duplicate-record conflict
    pub const fn is_already_exists(&self) -> bool {
        matches!(
            self,
            Self::MergeRequestAlreadyExists { .. } | Self::AlreadyScheduled(_)
        )
    }

    /// Whether the error is a failed precondition (race or data integrity)
    pub const fn is_precondition_failed(&self) -> bool {
        matches!(
            self,
            Self::AlreadyMerged { .. }
                | Self::IncompleteMergeData { .. }
                | Self::IssueAlreadyClosedMismatch { .. }
                | Self::InvalidStatusTransition { .. }
                | Self::MergeBlocked { .. }
        )
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Self::Config(e.to_string())
    }
}

/// Result type alias for mr-gate
pub type Result<T> = std::result::Result<T, Error>;
