//! Mock collaborator services for testing without a real forge
//!
//! Provides in-memory implementations of the backend traits with call
//! tracking and error injection.

#![allow(dead_code)]

use async_trait::async_trait;
use mr_gate::backend::{
    CheckOutcome, Divergence, EngineEvent, GitBackend, MergeObserver, PatchCheck, ReviewFilter,
    ReviewSource, StagingCheckout, StrategyOutcome,
};
use mr_gate::error::{Error, Result};
use mr_gate::types::{CommitId, IssueId, MergeRequest, RepoId, Review, ReviewId, User};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};

/// Recorded strategy call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyCall {
    pub strategy: &'static str,
    pub message: Option<String>,
    pub author: Option<String>,
    pub head_commit: CommitId,
}

/// Mock git backend with configurable refs and outcomes
pub struct MockGitBackend {
    heads: Mutex<HashMap<(RepoId, String), CommitId>>,
    divergence: Mutex<Divergence>,
    patch_check: Mutex<PatchCheck>,
    strategy_outcome: Mutex<Option<StrategyOutcome>>,
    // Call tracking
    rev_parse_calls: Mutex<Vec<(RepoId, String)>>,
    merge_base_calls: Mutex<Vec<(RepoId, String, String)>>,
    test_merge_calls: Mutex<Vec<i64>>,
    strategy_calls: Mutex<Vec<StrategyCall>>,
    publish_calls: Mutex<Vec<CommitId>>,
    cleanup_calls: Mutex<usize>,
    // Error injection
    error_on_test_merge: Mutex<Option<String>>,
    error_on_divergence: Mutex<Option<String>>,
    error_on_publish: Mutex<Option<String>>,
    error_on_rev_parse: Mutex<Option<String>>,
}

impl Default for MockGitBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGitBackend {
    /// Clean merges, no divergence, committing strategies
    pub fn new() -> Self {
        Self {
            heads: Mutex::new(HashMap::new()),
            divergence: Mutex::new(Divergence::default()),
            patch_check: Mutex::new(PatchCheck {
                outcome: CheckOutcome::Mergeable,
                merge_base: Some("base0".to_string()),
                changed_protected_files: Vec::new(),
            }),
            strategy_outcome: Mutex::new(None),
            rev_parse_calls: Mutex::new(Vec::new()),
            merge_base_calls: Mutex::new(Vec::new()),
            test_merge_calls: Mutex::new(Vec::new()),
            strategy_calls: Mutex::new(Vec::new()),
            publish_calls: Mutex::new(Vec::new()),
            cleanup_calls: Mutex::new(0),
            error_on_test_merge: Mutex::new(None),
            error_on_divergence: Mutex::new(None),
            error_on_publish: Mutex::new(None),
            error_on_rev_parse: Mutex::new(None),
        }
    }

    // === Configuration ===

    /// Point a ref at a commit
    pub fn set_head(&self, repo: RepoId, reference: &str, commit: &str) {
        self.heads
            .lock()
            .unwrap()
            .insert((repo, reference.to_string()), commit.to_string());
    }

    /// Divergence reported for every merge request
    pub fn set_divergence(&self, ahead: u32, behind: u32) {
        *self.divergence.lock().unwrap() = Divergence { ahead, behind };
    }

    /// Trial-merge outcome reported by `test_merge`
    pub fn set_check_outcome(&self, outcome: CheckOutcome) {
        self.patch_check.lock().unwrap().outcome = outcome;
    }

    /// Merge base reported by `merge_base` and `test_merge`
    pub fn set_merge_base(&self, commit: &str) {
        self.patch_check.lock().unwrap().merge_base = Some(commit.to_string());
    }

    /// Protected paths reported by `test_merge`
    pub fn set_changed_protected_files(&self, files: &[&str]) {
        self.patch_check.lock().unwrap().changed_protected_files =
            files.iter().map(ToString::to_string).collect();
    }

    /// Outcome of the next strategies (default: commit)
    pub fn set_strategy_outcome(&self, outcome: StrategyOutcome) {
        *self.strategy_outcome.lock().unwrap() = Some(outcome);
    }

    // === Error injection methods ===

    /// Make `test_merge` return an error
    pub fn fail_test_merge(&self, msg: &str) {
        *self.error_on_test_merge.lock().unwrap() = Some(msg.to_string());
    }

    /// Make `divergence` return an error
    pub fn fail_divergence(&self, msg: &str) {
        *self.error_on_divergence.lock().unwrap() = Some(msg.to_string());
    }

    /// Make `publish` return an error
    pub fn fail_publish(&self, msg: &str) {
        *self.error_on_publish.lock().unwrap() = Some(msg.to_string());
    }

    /// Make `rev_parse` of one ref return an error
    pub fn fail_rev_parse(&self, reference: &str) {
        *self.error_on_rev_parse.lock().unwrap() = Some(reference.to_string());
    }

    // === Call inspection ===

    pub fn rev_parse_calls(&self) -> Vec<(RepoId, String)> {
        self.rev_parse_calls.lock().unwrap().clone()
    }

    pub fn merge_base_calls(&self) -> Vec<(RepoId, String, String)> {
        self.merge_base_calls.lock().unwrap().clone()
    }

    pub fn test_merge_calls(&self) -> Vec<i64> {
        self.test_merge_calls.lock().unwrap().clone()
    }

    pub fn strategy_calls(&self) -> Vec<StrategyCall> {
        self.strategy_calls.lock().unwrap().clone()
    }

    pub fn publish_calls(&self) -> Vec<CommitId> {
        self.publish_calls.lock().unwrap().clone()
    }

    pub fn cleanup_count(&self) -> usize {
        *self.cleanup_calls.lock().unwrap()
    }

    fn head_of(&self, repo: RepoId, reference: &str) -> Option<CommitId> {
        self.heads
            .lock()
            .unwrap()
            .get(&(repo, reference.to_string()))
            .cloned()
    }

    fn run_strategy(
        &self,
        strategy: &'static str,
        staging: &StagingCheckout,
        message: Option<&str>,
        author: Option<&User>,
    ) -> StrategyOutcome {
        self.strategy_calls.lock().unwrap().push(StrategyCall {
            strategy,
            message: message.map(ToString::to_string),
            author: author.map(|u| u.name.clone()),
            head_commit: staging.head_commit.clone(),
        });

        if let Some(outcome) = self.strategy_outcome.lock().unwrap().clone() {
            return outcome;
        }
        match strategy {
            // Fast-forward and rebase leave the head commit at the tip
            "fast-forward" | "rebase" => StrategyOutcome::Committed(staging.head_commit.clone()),
            _ => StrategyOutcome::Committed(format!(
                "{strategy}_{}",
                staging.merge_request_id
            )),
        }
    }
}

#[async_trait]
impl GitBackend for MockGitBackend {
    async fn rev_parse(&self, repo: RepoId, reference: &str) -> Result<Option<CommitId>> {
        self.rev_parse_calls
            .lock()
            .unwrap()
            .push((repo, reference.to_string()));
        if self.error_on_rev_parse.lock().unwrap().as_deref() == Some(reference) {
            return Err(Error::Git(format!("cannot resolve {reference}")));
        }
        Ok(self.head_of(repo, reference))
    }

    async fn merge_base(&self, repo: RepoId, left: &str, right: &str) -> Result<Option<CommitId>> {
        self.merge_base_calls
            .lock()
            .unwrap()
            .push((repo, left.to_string(), right.to_string()));
        Ok(self.patch_check.lock().unwrap().merge_base.clone())
    }

    async fn divergence(&self, _mr: &MergeRequest) -> Result<Divergence> {
        if let Some(msg) = self.error_on_divergence.lock().unwrap().as_ref() {
            return Err(Error::Git(msg.clone()));
        }
        Ok(*self.divergence.lock().unwrap())
    }

    async fn test_merge(&self, mr: &MergeRequest) -> Result<PatchCheck> {
        self.test_merge_calls.lock().unwrap().push(mr.id);
        if let Some(msg) = self.error_on_test_merge.lock().unwrap().as_ref() {
            return Err(Error::Git(msg.clone()));
        }
        Ok(self.patch_check.lock().unwrap().clone())
    }

    async fn prepare_staging(&self, mr: &MergeRequest) -> Result<StagingCheckout> {
        let (head_repo, head_ref) = mr.head_ref();
        let head_commit = self
            .head_of(head_repo, &head_ref)
            .ok_or_else(|| Error::Git(format!("unknown ref {head_ref}")))?;
        let base_commit = self
            .head_of(mr.base_repo_id, &mr.base_ref())
            .unwrap_or_else(|| "base0".to_string());
        Ok(StagingCheckout {
            merge_request_id: mr.id,
            base_repo_id: mr.base_repo_id,
            staging_ref: "staging".to_string(),
            tracking_ref: "tracking".to_string(),
            base_commit,
            head_commit,
        })
    }

    async fn fast_forward_merge(&self, staging: &StagingCheckout) -> Result<StrategyOutcome> {
        Ok(self.run_strategy("fast-forward", staging, None, None))
    }

    async fn merge_commit(
        &self,
        staging: &StagingCheckout,
        message: &str,
        author: &User,
    ) -> Result<StrategyOutcome> {
        Ok(self.run_strategy("merge", staging, Some(message), Some(author)))
    }

    async fn squash_merge(
        &self,
        staging: &StagingCheckout,
        message: &str,
        author: &User,
    ) -> Result<StrategyOutcome> {
        Ok(self.run_strategy("squash", staging, Some(message), Some(author)))
    }

    async fn rebase(&self, staging: &StagingCheckout) -> Result<StrategyOutcome> {
        Ok(self.run_strategy("rebase", staging, None, None))
    }

    async fn rebase_merge(
        &self,
        staging: &StagingCheckout,
        message: &str,
        author: &User,
    ) -> Result<StrategyOutcome> {
        Ok(self.run_strategy("rebase-merge", staging, Some(message), Some(author)))
    }

    async fn publish(&self, _staging: &StagingCheckout, commit: &str) -> Result<()> {
        if let Some(msg) = self.error_on_publish.lock().unwrap().as_ref() {
            return Err(Error::Git(msg.clone()));
        }
        self.publish_calls.lock().unwrap().push(commit.to_string());
        Ok(())
    }

    async fn cleanup(&self, _staging: &StagingCheckout) -> Result<()> {
        *self.cleanup_calls.lock().unwrap() += 1;
        Ok(())
    }
}

/// Mock review subsystem
#[derive(Default)]
pub struct MockReviewSource {
    next_id: AtomicI64,
    reviews: Mutex<Vec<Review>>,
    find_calls: Mutex<Vec<IssueId>>,
}

impl MockReviewSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a review, assigning its id
    pub fn add(&self, mut review: Review) -> ReviewId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        review.id = id;
        self.reviews.lock().unwrap().push(review);
        id
    }

    /// Mark a stored review dismissed
    pub fn dismiss(&self, id: ReviewId) {
        if let Some(review) = self.reviews.lock().unwrap().iter_mut().find(|r| r.id == id) {
            review.dismissed = true;
        }
    }

    pub fn find_calls(&self) -> Vec<IssueId> {
        self.find_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReviewSource for MockReviewSource {
    async fn find_reviews(&self, issue_id: IssueId, filter: &ReviewFilter) -> Result<Vec<Review>> {
        self.find_calls.lock().unwrap().push(issue_id);
        Ok(self
            .reviews
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.issue_id == issue_id && filter.matches(r))
            .cloned()
            .collect())
    }

    async fn get_review(&self, id: ReviewId) -> Result<Option<Review>> {
        Ok(self
            .reviews
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == id)
            .cloned())
    }
}

/// Observer that records every event
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<EngineEvent>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<EngineEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }

    /// Number of `Merged` events
    pub fn merged_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, EngineEvent::Merged { .. }))
            .count()
    }
}

impl MergeObserver for RecordingObserver {
    fn notify(&self, event: &EngineEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}
