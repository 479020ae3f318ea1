//! Merge request store
//!
//! An in-memory relational store with all-or-nothing transactions. A
//! transaction works on a snapshot of every table while holding the store
//! lock; the snapshot replaces the live tables only when the closure returns
//! `Ok`. Transaction closures are synchronous, so git work can never run
//! while a transaction is open.

mod tables;

pub use tables::Tables;

use crate::error::{Error, Result};
use crate::gate::ProtectedBranch;
use crate::types::{
    AutoMerge, CommitId, Issue, IssueId, MAX_TITLE_BYTES, MergeRequest, MergeRequestId, RepoId,
};
use chrono::{DateTime, Utc};
use std::ops::Deref;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// Merge request columns for narrow updates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    /// `status`
    Status,
    /// `conflicted_files`
    ConflictedFiles,
    /// `changed_protected_files`
    ChangedProtectedFiles,
    /// `commits_ahead`
    CommitsAhead,
    /// `commits_behind`
    CommitsBehind,
    /// `merge_base`
    MergeBase,
    /// `allow_maintainer_edit`
    AllowMaintainerEdit,
    /// `has_merged`
    HasMerged,
    /// `merged_commit_id`
    MergedCommitId,
    /// `merger_id`
    MergerId,
    /// `merged_at`
    MergedAt,
}

impl Column {
    /// Columns written when a merge is finalized
    pub const MERGE_RESULT: [Self; 7] = [
        Self::HasMerged,
        Self::Status,
        Self::MergeBase,
        Self::MergedCommitId,
        Self::MergerId,
        Self::MergedAt,
        Self::ConflictedFiles,
    ];

    /// Columns written by the conflict checker
    pub const CHECK_RESULT: [Self; 4] = [
        Self::Status,
        Self::ConflictedFiles,
        Self::ChangedProtectedFiles,
        Self::MergeBase,
    ];

    fn copy(self, from: &MergeRequest, to: &mut MergeRequest) {
        match self {
            Self::Status => to.status = from.status,
            Self::ConflictedFiles => to.conflicted_files.clone_from(&from.conflicted_files),
            Self::ChangedProtectedFiles => {
                to.changed_protected_files
                    .clone_from(&from.changed_protected_files);
            }
            Self::CommitsAhead => to.commits_ahead = from.commits_ahead,
            Self::CommitsBehind => to.commits_behind = from.commits_behind,
            Self::MergeBase => to.merge_base.clone_from(&from.merge_base),
            Self::AllowMaintainerEdit => to.allow_maintainer_edit = from.allow_maintainer_edit,
            Self::HasMerged => to.has_merged = from.has_merged,
            Self::MergedCommitId => to.merged_commit_id.clone_from(&from.merged_commit_id),
            Self::MergerId => to.merger_id = from.merger_id,
            Self::MergedAt => to.merged_at = from.merged_at,
        }
    }
}

/// Transactional merge request store
#[derive(Debug, Default)]
pub struct Store {
    tables: Mutex<Tables>,
}

impl Store {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|e| Error::Store(format!("store lock poisoned: {e}")))
    }

    /// Run `f` atomically
    ///
    /// All writes made through the `Tx` are discarded if `f` returns `Err`.
    pub fn transaction<T>(&self, f: impl FnOnce(&mut Tx<'_>) -> Result<T>) -> Result<T> {
        let mut live = self.lock()?;
        let mut snapshot = live.clone();
        let out = f(&mut Tx {
            tables: &mut snapshot,
        })?;
        *live = snapshot;
        Ok(out)
    }

    /// Run a read-only query against a consistent view
    pub fn read<T>(&self, f: impl FnOnce(&Tables) -> Result<T>) -> Result<T> {
        let live = self.lock()?;
        f(&live)
    }

    /// Create an issue and its merge request atomically
    pub fn new_merge_request(
        &self,
        issue: Issue,
        mr: MergeRequest,
    ) -> Result<(Issue, MergeRequest)> {
        self.transaction(|tx| tx.insert_merge_request(issue, mr))
    }

    /// Merge request by id
    pub fn get_merge_request(&self, id: MergeRequestId) -> Result<MergeRequest> {
        self.read(|t| t.get_merge_request(id))
    }

    /// Merge request together with its issue
    pub fn get_with_issue(&self, id: MergeRequestId) -> Result<(MergeRequest, Issue)> {
        self.read(|t| {
            let mr = t.get_merge_request(id)?;
            let issue = t.get_issue(mr.issue_id)?;
            Ok((mr, issue))
        })
    }

    /// Issue by id
    pub fn get_issue(&self, id: IssueId) -> Result<Issue> {
        self.read(|t| t.get_issue(id))
    }

    /// Merge request by per-repository index
    pub fn get_by_index(&self, repo_id: RepoId, index: i64) -> Result<MergeRequest> {
        self.read(|t| t.get_by_index(repo_id, index))
    }

    /// Merge request owned by an issue
    pub fn get_by_issue_id(&self, issue_id: IssueId) -> Result<MergeRequest> {
        self.read(|t| t.get_by_issue_id(issue_id))
    }

    /// Open requests whose head commit lives in a repository
    pub fn unmerged_with_head_in(&self, repo_id: RepoId) -> Result<Vec<MergeRequest>> {
        self.read(|t| Ok(t.unmerged_with_head_in(repo_id)))
    }

    /// Refresh the cached divergence counters
    pub fn update_commit_divergence(
        &self,
        id: MergeRequestId,
        ahead: u32,
        behind: u32,
    ) -> Result<()> {
        if id == 0 {
            return Err(Error::InvalidArgument("merge request id is 0".to_string()));
        }
        self.transaction(|tx| {
            let mut mr = tx.get_merge_request(id)?;
            mr.commits_ahead = ahead;
            mr.commits_behind = behind;
            tx.update_cols(&mr, &[Column::CommitsAhead, Column::CommitsBehind])
        })
    }

    /// Refresh divergence and merge base together, unless the request has merged
    pub fn refresh_divergence(
        &self,
        id: MergeRequestId,
        ahead: u32,
        behind: u32,
        merge_base: Option<CommitId>,
    ) -> Result<()> {
        self.transaction(|tx| {
            let mut mr = tx.get_merge_request(id)?;
            mr.commits_ahead = ahead;
            mr.commits_behind = behind;
            mr.merge_base = merge_base;
            tx.update_cols_if_not_merged(
                &mr,
                &[Column::CommitsAhead, Column::CommitsBehind, Column::MergeBase],
            )
        })
    }

    /// Toggle whether maintainers may push to the head branch
    pub fn update_allow_maintainer_edit(&self, id: MergeRequestId, allow: bool) -> Result<()> {
        self.transaction(|tx| {
            let mut mr = tx.get_merge_request(id)?;
            mr.allow_maintainer_edit = allow;
            tx.update_cols(&mr, &[Column::AllowMaintainerEdit])
        })
    }

    /// Add or replace a protection rule (keyed by repository and rule name)
    pub fn upsert_protected_branch(&self, rule: ProtectedBranch) -> Result<()> {
        self.transaction(|tx| {
            tx.upsert_protected_branch(rule);
            Ok(())
        })
    }

    /// Protection rules of a repository
    pub fn protected_branches(&self, repo_id: RepoId) -> Result<Vec<ProtectedBranch>> {
        self.read(|t| Ok(t.protected_branches(repo_id)))
    }

    /// Auto-merge declaration for a merge request
    pub fn auto_merge_for(&self, merge_request_id: MergeRequestId) -> Result<Option<AutoMerge>> {
        self.read(|t| Ok(t.auto_merge_for(merge_request_id)))
    }

    /// Remove every merge request of a deleted base repository
    pub fn delete_by_base_repo(&self, repo_id: RepoId) -> Result<usize> {
        self.transaction(|tx| Ok(tx.delete_by_base_repo(repo_id)))
    }
}

/// Write access inside a transaction
///
/// Dereferences to `Tables` for reads.
pub struct Tx<'a> {
    tables: &'a mut Tables,
}

impl Deref for Tx<'_> {
    type Target = Tables;

    fn deref(&self) -> &Tables {
        self.tables
    }
}

impl Tx<'_> {
    /// Insert an issue and its merge request
    ///
    /// Allocates the shared per-repository index. Fails if an open, unmerged
    /// request already exists for the same head/base pair and flow.
    pub fn insert_merge_request(
        &mut self,
        mut issue: Issue,
        mut mr: MergeRequest,
    ) -> Result<(Issue, MergeRequest)> {
        if let Some(existing) = self.tables.find_unmerged(
            mr.head_repo_id,
            mr.base_repo_id,
            &mr.head_branch,
            &mr.base_branch,
            mr.flow,
        ) {
            return Err(Error::MergeRequestAlreadyExists {
                id: existing.id,
                head_repo_id: existing.head_repo_id,
                base_repo_id: existing.base_repo_id,
                head_branch: existing.head_branch.clone(),
                base_branch: existing.base_branch.clone(),
            });
        }

        let counter = self.tables.issue_index.entry(mr.base_repo_id).or_insert(0);
        *counter += 1;
        let index = *counter;

        self.tables.next_issue_id += 1;
        issue.id = self.tables.next_issue_id;
        issue.repo_id = mr.base_repo_id;
        issue.index = index;
        truncate_title(&mut issue.title);

        self.tables.next_merge_request_id += 1;
        mr.id = self.tables.next_merge_request_id;
        mr.issue_id = issue.id;
        mr.index = index;

        debug!(mr_id = mr.id, index, repo_id = mr.base_repo_id, "inserted merge request");
        self.tables.issues.insert(issue.id, issue.clone());
        self.tables.merge_requests.insert(mr.id, mr.clone());
        Ok((issue, mr))
    }

    /// Copy only the listed columns of `mr` into the stored row
    pub fn update_cols(&mut self, mr: &MergeRequest, cols: &[Column]) -> Result<()> {
        let row = self
            .tables
            .merge_requests
            .get_mut(&mr.id)
            .ok_or_else(|| Error::mr_not_found(mr.id))?;
        for col in cols {
            col.copy(mr, row);
        }
        Ok(())
    }

    /// `update_cols`, refusing if the stored row is already merged
    pub fn update_cols_if_not_merged(&mut self, mr: &MergeRequest, cols: &[Column]) -> Result<()> {
        let stored = self.get_merge_request(mr.id)?;
        if stored.has_merged {
            return Err(Error::AlreadyMerged {
                id: stored.id,
                index: stored.index,
            });
        }
        self.update_cols(mr, cols)
    }

    /// Close an issue
    pub fn close_issue(&mut self, id: IssueId, at: DateTime<Utc>) -> Result<()> {
        let issue = self
            .tables
            .issues
            .get_mut(&id)
            .ok_or(Error::IssueNotFound(id))?;
        issue.is_closed = true;
        issue.closed_at = Some(at);
        Ok(())
    }

    /// Insert an auto-merge declaration
    ///
    /// The merge request id is a unique key: a second insert fails with
    /// `AlreadyScheduled` even if the caller's pre-check raced.
    pub fn insert_auto_merge(&mut self, mut auto_merge: AutoMerge) -> Result<AutoMerge> {
        if self
            .tables
            .auto_merges
            .contains_key(&auto_merge.merge_request_id)
        {
            return Err(Error::AlreadyScheduled(auto_merge.merge_request_id));
        }
        self.tables.next_auto_merge_id += 1;
        auto_merge.id = self.tables.next_auto_merge_id;
        self.tables
            .auto_merges
            .insert(auto_merge.merge_request_id, auto_merge.clone());
        Ok(auto_merge)
    }

    /// Delete the auto-merge declaration of a merge request
    pub fn delete_auto_merge(&mut self, merge_request_id: MergeRequestId) -> Result<AutoMerge> {
        self.tables
            .auto_merges
            .remove(&merge_request_id)
            .ok_or(Error::AutoMergeNotFound(merge_request_id))
    }

    /// Add or replace a protection rule
    pub fn upsert_protected_branch(&mut self, rule: ProtectedBranch) {
        let rules = &mut self.tables.protected_branches;
        if let Some(existing) = rules
            .iter_mut()
            .find(|r| r.repo_id == rule.repo_id && r.rule_name == rule.rule_name)
        {
            *existing = rule;
        } else {
            rules.push(rule);
        }
    }

    /// Delete every merge request of a base repository, with its auto-merges
    pub fn delete_by_base_repo(&mut self, repo_id: RepoId) -> usize {
        let doomed: Vec<MergeRequestId> = self
            .tables
            .merge_requests
            .values()
            .filter(|mr| mr.base_repo_id == repo_id)
            .map(|mr| mr.id)
            .collect();
        for id in &doomed {
            self.tables.auto_merges.remove(id);
            self.tables.merge_requests.remove(id);
        }
        debug!(repo_id, count = doomed.len(), "deleted merge requests of base repo");
        doomed.len()
    }
}

fn truncate_title(title: &mut String) {
    if title.len() <= MAX_TITLE_BYTES {
        return;
    }
    let mut end = MAX_TITLE_BYTES;
    while !title.is_char_boundary(end) {
        end -= 1;
    }
    title.truncate(end);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MergeRequestFlow, MergeRequestStatus};

    fn create(store: &Store, head: &str) -> MergeRequest {
        store
            .new_merge_request(
                Issue::new(1, 100, format!("Add {head}")),
                MergeRequest::new(1, head, 1, "main"),
            )
            .unwrap()
            .1
    }

    #[test]
    fn test_insert_allocates_shared_index() {
        let store = Store::new();
        let a = create(&store, "feat-a");
        let b = create(&store, "feat-b");

        assert_eq!(a.index, 1);
        assert_eq!(b.index, 2);
        let issue = store.get_issue(b.issue_id).unwrap();
        assert_eq!(issue.index, 2);
        assert_eq!(store.get_by_index(1, 2).unwrap().id, b.id);
        assert_eq!(store.get_by_issue_id(a.issue_id).unwrap().id, a.id);
    }

    #[test]
    fn test_index_sequences_are_per_repo() {
        let store = Store::new();
        create(&store, "feat-a");
        let (_, other) = store
            .new_merge_request(Issue::new(2, 1, "x"), MergeRequest::new(2, "x", 2, "main"))
            .unwrap();
        assert_eq!(other.index, 1);
    }

    #[test]
    fn test_duplicate_open_pair_rejected() {
        let store = Store::new();
        let first = create(&store, "feat-a");
        let err = store
            .new_merge_request(
                Issue::new(1, 100, "again"),
                MergeRequest::new(1, "feat-a", 1, "main"),
            )
            .unwrap_err();

        assert!(matches!(err, Error::MergeRequestAlreadyExists { id, .. } if id == first.id));
        // Failed transaction must not consume an index
        assert_eq!(create(&store, "feat-b").index, 2);
    }

    #[test]
    fn test_closed_pair_can_be_reopened() {
        let store = Store::new();
        let first = create(&store, "feat-a");
        store
            .transaction(|tx| tx.close_issue(first.issue_id, Utc::now()))
            .unwrap();
        assert_eq!(create(&store, "feat-a").index, 2);
    }

    #[test]
    fn test_get_by_index_below_one() {
        let store = Store::new();
        assert!(store.get_by_index(1, 0).unwrap_err().is_not_found());
    }

    #[test]
    fn test_title_truncated_on_char_boundary() {
        let store = Store::new();
        let title = "é".repeat(200);
        let (issue, _) = store
            .new_merge_request(Issue::new(1, 1, title), MergeRequest::new(1, "t", 1, "main"))
            .unwrap();
        assert!(issue.title.len() <= MAX_TITLE_BYTES);
        assert_eq!(issue.title.chars().count(), 127);
    }

    #[test]
    fn test_failed_transaction_rolls_back() {
        let store = Store::new();
        let mr = create(&store, "feat-a");

        let result: Result<()> = store.transaction(|tx| {
            let mut row = tx.get_merge_request(mr.id)?;
            row.status = MergeRequestStatus::Mergeable;
            tx.update_cols(&row, &[Column::Status])?;
            Err(Error::Store("boom".to_string()))
        });

        assert!(result.is_err());
        assert_eq!(
            store.get_merge_request(mr.id).unwrap().status,
            MergeRequestStatus::Checking
        );
    }

    #[test]
    fn test_update_cols_is_narrow() {
        let store = Store::new();
        let mr = create(&store, "feat-a");
        store.update_commit_divergence(mr.id, 3, 2).unwrap();

        // A stale copy must not clobber the divergence columns
        let mut stale = mr;
        stale.status = MergeRequestStatus::Mergeable;
        store
            .transaction(|tx| tx.update_cols(&stale, &[Column::Status]))
            .unwrap();

        let row = store.get_merge_request(stale.id).unwrap();
        assert_eq!(row.status, MergeRequestStatus::Mergeable);
        assert_eq!((row.commits_ahead, row.commits_behind), (3, 2));
    }

    #[test]
    fn test_refresh_divergence_skips_merged_rows() {
        let store = Store::new();
        let mr = create(&store, "feat-a");
        store
            .refresh_divergence(mr.id, 1, 4, Some("base1".to_string()))
            .unwrap();
        let row = store.get_merge_request(mr.id).unwrap();
        assert_eq!((row.commits_ahead, row.commits_behind), (1, 4));
        assert_eq!(row.merge_base.as_deref(), Some("base1"));

        store
            .transaction(|tx| {
                let mut merged = tx.get_merge_request(mr.id)?;
                merged.has_merged = true;
                tx.update_cols(&merged, &[Column::HasMerged])
            })
            .unwrap();

        let err = store
            .refresh_divergence(mr.id, 0, 9, Some("base2".to_string()))
            .unwrap_err();
        assert!(err.is_precondition_failed());
        let row = store.get_merge_request(mr.id).unwrap();
        assert_eq!(row.commits_behind, 4);
        assert_eq!(row.merge_base.as_deref(), Some("base1"));
    }

    #[test]
    fn test_update_divergence_rejects_zero_id() {
        let store = Store::new();
        assert!(matches!(
            store.update_commit_divergence(0, 1, 1),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_auto_merge_unique_per_request() {
        let store = Store::new();
        let mr = create(&store, "feat-a");
        let row = AutoMerge {
            id: 0,
            merge_request_id: mr.id,
            requested_by_id: 1,
            merge_style: crate::types::MergeStyle::Merge,
            message: String::new(),
            created_at: Utc::now(),
        };

        store
            .transaction(|tx| tx.insert_auto_merge(row.clone()))
            .unwrap();
        let err = store
            .transaction(|tx| tx.insert_auto_merge(row.clone()))
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyScheduled(id) if id == mr.id));
    }

    #[test]
    fn test_delete_by_base_repo_cascades_auto_merge() {
        let store = Store::new();
        let mr = create(&store, "feat-a");
        store
            .transaction(|tx| {
                tx.insert_auto_merge(AutoMerge {
                    id: 0,
                    merge_request_id: mr.id,
                    requested_by_id: 1,
                    merge_style: crate::types::MergeStyle::Squash,
                    message: String::new(),
                    created_at: Utc::now(),
                })
            })
            .unwrap();

        assert_eq!(store.delete_by_base_repo(1).unwrap(), 1);
        assert!(store.get_merge_request(mr.id).unwrap_err().is_not_found());
        assert!(store.auto_merge_for(mr.id).unwrap().is_none());
    }

    #[test]
    fn test_latest_by_head_info_ignores_detached() {
        let store = Store::new();
        let first = create(&store, "feat-a");
        let mut detached = MergeRequest::new(1, "feat-a", 1, "develop");
        detached.flow = MergeRequestFlow::Detached;
        store
            .new_merge_request(Issue::new(1, 100, "agit"), detached)
            .unwrap();

        let latest = store
            .read(|t| Ok(t.latest_by_head_info(1, "feat-a")))
            .unwrap()
            .unwrap();
        assert_eq!(latest.id, first.id);
    }

    #[test]
    fn test_unmerged_detached_by_poster() {
        let store = Store::new();
        let mut detached = MergeRequest::new(1, "topic", 1, "main");
        detached.flow = MergeRequestFlow::Detached;
        store
            .new_merge_request(Issue::new(1, 42, "agit"), detached)
            .unwrap();
        create(&store, "feat-a");

        let found = store
            .transaction(|tx| Ok(tx.unmerged_detached_by_poster(42)))
            .unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].is_detached_flow());
    }
}
