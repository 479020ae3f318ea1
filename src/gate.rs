//! Branch-protection gate evaluation
//!
//! Everything here is pure: the caller gathers the merge request, the
//! matching protection rule and the reviews, and gets back a verdict. This
//! keeps the gate trivially testable and safe to call from any context.

use crate::types::{MergeRequest, MergeRequestStatus, RepoId, Review, ReviewType};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// A branch protection rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedBranch {
    /// Repository the rule belongs to
    #[serde(default)]
    pub repo_id: RepoId,
    /// Exact branch name or glob (`release/*`, `hotfix/**`)
    pub rule_name: String,
    /// Official approvals needed (0 disables the check)
    #[serde(default)]
    pub required_approvals: u32,
    /// Official rejections veto the merge
    #[serde(default)]
    pub block_on_rejected_reviews: bool,
    /// Pending official review requests block the merge
    #[serde(default)]
    pub block_on_official_review_requests: bool,
    /// Head must contain every base commit
    #[serde(default)]
    pub block_on_outdated_branch: bool,
    /// Approvals on an older head commit do not count
    #[serde(default)]
    pub ignore_stale_approvals: bool,
    /// Tie-breaker between matching globs (lower wins)
    #[serde(default)]
    pub priority: i64,
}

impl ProtectedBranch {
    /// A rule with every check disabled
    pub fn new(repo_id: RepoId, rule_name: impl Into<String>) -> Self {
        Self {
            repo_id,
            rule_name: rule_name.into(),
            required_approvals: 0,
            block_on_rejected_reviews: false,
            block_on_official_review_requests: false,
            block_on_outdated_branch: false,
            ignore_stale_approvals: false,
            priority: 0,
        }
    }

    /// Whether the rule name contains glob metacharacters
    pub fn is_glob(&self) -> bool {
        self.rule_name.contains(['*', '?'])
    }
}

/// Translate a branch glob into an anchored regex
///
/// `**` crosses `/`, `*` and `?` do not.
fn glob_to_regex(glob: &str) -> Option<Regex> {
    let mut pattern = String::from("^");
    let mut chars = glob.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                pattern.push_str(".*");
            }
            '*' => pattern.push_str("[^/]*"),
            '?' => pattern.push_str("[^/]"),
            other => pattern.push_str(&regex::escape(&other.to_string())),
        }
    }
    pattern.push('$');
    Regex::new(&pattern).ok()
}

/// The protection rules of one repository
#[derive(Debug, Clone, Default)]
pub struct ProtectionRules {
    rules: Vec<ProtectedBranch>,
}

impl ProtectionRules {
    /// Wrap rules in insertion order
    pub const fn new(rules: Vec<ProtectedBranch>) -> Self {
        Self { rules }
    }

    /// Rule governing a branch
    ///
    /// An exact-name rule wins over any glob. Among matching globs the lowest
    /// priority wins, then the earliest rule. `None` means unprotected.
    pub fn rule_for(&self, branch: &str) -> Option<&ProtectedBranch> {
        if let Some(exact) = self
            .rules
            .iter()
            .find(|r| !r.is_glob() && r.rule_name == branch)
        {
            return Some(exact);
        }

        self.rules
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_glob())
            .filter(|(_, r)| glob_to_regex(&r.rule_name).is_some_and(|re| re.is_match(branch)))
            .min_by_key(|(pos, r)| (r.priority, *pos))
            .map(|(_, r)| r)
    }
}

/// Why a merge is blocked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    /// Not enough official approvals
    InsufficientApprovals,
    /// An official reviewer requested changes
    RejectedReview,
    /// An official review is still requested
    OfficialReviewRequested,
    /// Head is behind base
    OutdatedBranch,
    /// Status is `Checking`, `Conflict` or `Error`
    NotMergeableStatus,
    /// Title carries a work-in-progress prefix
    WorkInProgress,
}

impl BlockReason {
    /// Stable reason code
    pub const fn code(self) -> &'static str {
        match self {
            Self::InsufficientApprovals => "insufficient_approvals",
            Self::RejectedReview => "rejected_review",
            Self::OfficialReviewRequested => "official_review_requested",
            Self::OutdatedBranch => "outdated_branch",
            Self::NotMergeableStatus => "not_mergeable_status",
            Self::WorkInProgress => "work_in_progress",
        }
    }
}

impl std::fmt::Display for BlockReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Result of a gate evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateVerdict {
    /// Whether merging is allowed
    pub allowed: bool,
    /// Every failed check, in evaluation order
    pub reasons: Vec<BlockReason>,
}

impl GateVerdict {
    /// Verdict from a list of failed checks
    pub fn from_reasons(reasons: Vec<BlockReason>) -> Self {
        Self {
            allowed: reasons.is_empty(),
            reasons,
        }
    }

    /// Whether anything blocks the merge
    pub fn is_blocked(&self) -> bool {
        !self.allowed
    }
}

fn is_live_official(review: &Review, review_type: ReviewType) -> bool {
    review.review_type == review_type && review.official && !review.dismissed
}

/// Official approvals that count toward the rule's threshold
pub fn approval_count(rule: &ProtectedBranch, reviews: &[Review]) -> usize {
    reviews
        .iter()
        .filter(|r| is_live_official(r, ReviewType::Approve))
        .filter(|r| !(rule.ignore_stale_approvals && r.stale))
        .count()
}

/// Whether the rule's approval threshold is met
pub fn has_enough_approvals(rule: &ProtectedBranch, reviews: &[Review]) -> bool {
    rule.required_approvals == 0 || approval_count(rule, reviews) >= rule.required_approvals as usize
}

/// Whether an official rejection vetoes the merge
pub fn blocked_by_rejected_review(rule: &ProtectedBranch, reviews: &[Review]) -> bool {
    rule.block_on_rejected_reviews
        && reviews
            .iter()
            .any(|r| is_live_official(r, ReviewType::Reject))
}

/// Whether a pending official review request blocks the merge
///
/// Any official request row counts, dismissed or not.
pub fn blocked_by_official_review_requests(rule: &ProtectedBranch, reviews: &[Review]) -> bool {
    rule.block_on_official_review_requests
        && reviews
            .iter()
            .any(|r| r.review_type == ReviewType::Request && r.official)
}

/// Whether the head is behind base on a rule that forbids it
///
/// Reads the cached divergence; callers refresh it first when freshness matters.
pub const fn blocked_by_outdated_branch(rule: &ProtectedBranch, mr: &MergeRequest) -> bool {
    rule.block_on_outdated_branch && mr.commits_behind > 0
}

/// Evaluate every protection check
///
/// `rule = None` means the base branch is unprotected.
pub fn evaluate_gate(
    mr: &MergeRequest,
    rule: Option<&ProtectedBranch>,
    reviews: &[Review],
) -> GateVerdict {
    let Some(rule) = rule else {
        return GateVerdict::from_reasons(Vec::new());
    };

    let mut reasons = Vec::new();
    if !has_enough_approvals(rule, reviews) {
        reasons.push(BlockReason::InsufficientApprovals);
    }
    if blocked_by_rejected_review(rule, reviews) {
        reasons.push(BlockReason::RejectedReview);
    }
    if blocked_by_official_review_requests(rule, reviews) {
        reasons.push(BlockReason::OfficialReviewRequested);
    }
    if blocked_by_outdated_branch(rule, mr) {
        reasons.push(BlockReason::OutdatedBranch);
    }
    GateVerdict::from_reasons(reasons)
}

/// The work-in-progress prefix of a title, as written in the title
pub fn work_in_progress_prefix<'a, S: AsRef<str>>(title: &'a str, prefixes: &[S]) -> Option<&'a str> {
    prefixes.iter().find_map(|prefix| {
        let prefix = prefix.as_ref();
        title
            .get(..prefix.len())
            .filter(|head| head.to_uppercase() == prefix.to_uppercase())
    })
}

/// Whether a title carries a work-in-progress prefix
pub fn has_work_in_progress_prefix<S: AsRef<str>>(title: &str, prefixes: &[S]) -> bool {
    work_in_progress_prefix(title, prefixes).is_some()
}

/// Whether the status allows a merge at all
pub const fn status_allows_merge(status: MergeRequestStatus) -> bool {
    !matches!(
        status,
        MergeRequestStatus::Checking | MergeRequestStatus::Conflict | MergeRequestStatus::Error
    )
}

/// Status and title precondition, checked before the protection gate
pub fn is_mergeable<S: AsRef<str>>(mr: &MergeRequest, title: &str, wip_prefixes: &[S]) -> bool {
    status_allows_merge(mr.status) && !has_work_in_progress_prefix(title, wip_prefixes)
}

/// Reasons the precondition fails, as block reasons
pub fn precondition_reasons<S: AsRef<str>>(
    mr: &MergeRequest,
    title: &str,
    wip_prefixes: &[S],
) -> Vec<BlockReason> {
    let mut reasons = Vec::new();
    if !status_allows_merge(mr.status) {
        reasons.push(BlockReason::NotMergeableStatus);
    }
    if has_work_in_progress_prefix(title, wip_prefixes) {
        reasons.push(BlockReason::WorkInProgress);
    }
    reasons
}
