//! Row storage and read queries.

use crate::error::{Error, Result};
use crate::gate::ProtectedBranch;
use crate::types::{
    AutoMerge, Issue, IssueId, MergeRequest, MergeRequestFlow, MergeRequestId, RepoId, UserId,
};
use std::collections::{BTreeMap, HashMap};

/// All engine tables
///
/// Reads go through `&Tables`; writes only happen inside a `Tx`.
#[derive(Debug, Clone, Default)]
pub struct Tables {
    pub(super) issues: BTreeMap<IssueId, Issue>,
    pub(super) merge_requests: BTreeMap<MergeRequestId, MergeRequest>,
    /// Keyed by merge request id, which makes the key the uniqueness constraint
    pub(super) auto_merges: BTreeMap<MergeRequestId, AutoMerge>,
    pub(super) protected_branches: Vec<ProtectedBranch>,
    pub(super) issue_index: HashMap<RepoId, i64>,
    pub(super) next_issue_id: IssueId,
    pub(super) next_merge_request_id: MergeRequestId,
    pub(super) next_auto_merge_id: i64,
}

fn not_exist(
    id: MergeRequestId,
    issue_id: IssueId,
    head_repo_id: RepoId,
    base_repo_id: RepoId,
    head_branch: &str,
    base_branch: &str,
) -> Error {
    Error::MergeRequestNotFound(format!(
        "id: {id}, issue_id: {issue_id}, head_repo_id: {head_repo_id}, base_repo_id: {base_repo_id}, head_branch: {head_branch}, base_branch: {base_branch}"
    ))
}

impl Tables {
    fn issue_is_open(&self, issue_id: IssueId) -> bool {
        self.issues.get(&issue_id).is_some_and(|i| !i.is_closed)
    }

    /// Merge request by id
    pub fn get_merge_request(&self, id: MergeRequestId) -> Result<MergeRequest> {
        self.merge_requests
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::mr_not_found(id))
    }

    /// Issue by id
    pub fn get_issue(&self, id: IssueId) -> Result<Issue> {
        self.issues
            .get(&id)
            .cloned()
            .ok_or(Error::IssueNotFound(id))
    }

    /// Merge request by per-repository index
    pub fn get_by_index(&self, repo_id: RepoId, index: i64) -> Result<MergeRequest> {
        if index < 1 {
            return Err(not_exist(0, 0, 0, repo_id, "", ""));
        }
        self.merge_requests
            .values()
            .find(|mr| mr.base_repo_id == repo_id && mr.index == index)
            .cloned()
            .ok_or_else(|| not_exist(0, 0, 0, repo_id, "", ""))
    }

    /// Merge request owned by an issue
    pub fn get_by_issue_id(&self, issue_id: IssueId) -> Result<MergeRequest> {
        self.merge_requests
            .values()
            .find(|mr| mr.issue_id == issue_id)
            .cloned()
            .ok_or_else(|| not_exist(0, issue_id, 0, 0, "", ""))
    }

    /// Open, unmerged merge request for a head/base pair
    pub fn get_unmerged(
        &self,
        head_repo_id: RepoId,
        base_repo_id: RepoId,
        head_branch: &str,
        base_branch: &str,
        flow: MergeRequestFlow,
    ) -> Result<MergeRequest> {
        self.find_unmerged(head_repo_id, base_repo_id, head_branch, base_branch, flow)
            .cloned()
            .ok_or_else(|| not_exist(0, 0, head_repo_id, base_repo_id, head_branch, base_branch))
    }

    pub(super) fn find_unmerged(
        &self,
        head_repo_id: RepoId,
        base_repo_id: RepoId,
        head_branch: &str,
        base_branch: &str,
        flow: MergeRequestFlow,
    ) -> Option<&MergeRequest> {
        self.merge_requests.values().find(|mr| {
            mr.head_repo_id == head_repo_id
                && mr.head_branch == head_branch
                && mr.base_repo_id == base_repo_id
                && mr.base_branch == base_branch
                && mr.flow == flow
                && !mr.has_merged
                && self.issue_is_open(mr.issue_id)
        })
    }

    /// Merge request by base and head, regardless of state
    pub fn get_by_base_head_info(
        &self,
        base_repo_id: RepoId,
        head_repo_id: RepoId,
        base_branch: &str,
        head_branch: &str,
    ) -> Result<MergeRequest> {
        self.merge_requests
            .values()
            .find(|mr| {
                mr.base_repo_id == base_repo_id
                    && mr.base_branch == base_branch
                    && mr.head_repo_id == head_repo_id
                    && mr.head_branch == head_branch
            })
            .cloned()
            .ok_or_else(|| not_exist(0, 0, head_repo_id, base_repo_id, head_branch, base_branch))
    }

    /// Latest branch-flow merge request for a head branch, regardless of state
    pub fn latest_by_head_info(&self, repo_id: RepoId, branch: &str) -> Option<MergeRequest> {
        self.merge_requests
            .values()
            .rev()
            .find(|mr| {
                mr.head_repo_id == repo_id
                    && mr.head_branch == branch
                    && mr.flow == MergeRequestFlow::Branch
            })
            .cloned()
    }

    /// Merged request whose merge produced a commit
    pub fn get_by_merged_commit(&self, repo_id: RepoId, sha: &str) -> Result<MergeRequest> {
        self.merge_requests
            .values()
            .find(|mr| mr.base_repo_id == repo_id && mr.merged_commit_id.as_deref() == Some(sha))
            .cloned()
            .ok_or_else(|| not_exist(0, 0, 0, repo_id, "", ""))
    }

    /// Open, unmerged detached-flow requests by issue author
    pub fn unmerged_detached_by_poster(&self, poster_id: UserId) -> Vec<MergeRequest> {
        self.merge_requests
            .values()
            .filter(|mr| {
                mr.flow == MergeRequestFlow::Detached
                    && !mr.has_merged
                    && self
                        .issues
                        .get(&mr.issue_id)
                        .is_some_and(|i| !i.is_closed && i.poster_id == poster_id)
            })
            .cloned()
            .collect()
    }

    /// Open, unmerged requests whose head commit lives in a repository
    ///
    /// Branch-flow heads live in the head repository; detached heads live in
    /// the base repository.
    pub fn unmerged_with_head_in(&self, repo_id: RepoId) -> Vec<MergeRequest> {
        self.merge_requests
            .values()
            .filter(|mr| {
                mr.head_ref().0 == repo_id && !mr.has_merged && self.issue_is_open(mr.issue_id)
            })
            .cloned()
            .collect()
    }

    /// Auto-merge declaration for a merge request
    pub fn auto_merge_for(&self, merge_request_id: MergeRequestId) -> Option<AutoMerge> {
        self.auto_merges.get(&merge_request_id).cloned()
    }

    /// Protection rules of a repository, in insertion order
    pub fn protected_branches(&self, repo_id: RepoId) -> Vec<ProtectedBranch> {
        self.protected_branches
            .iter()
            .filter(|rule| rule.repo_id == repo_id)
            .cloned()
            .collect()
    }
}
