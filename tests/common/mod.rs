//! Shared test fixtures

#![allow(dead_code)]

mod mock_backend;

pub use mock_backend::{MockGitBackend, MockReviewSource, RecordingObserver, StrategyCall};

use mr_gate::backend::Observers;
use mr_gate::config::EngineConfig;
use mr_gate::gate::ProtectedBranch;
use mr_gate::identity::Directory;
use mr_gate::store::Store;
use mr_gate::types::{Issue, MergeRequest, Review, ReviewType, Team, User};
use mr_gate::{MergeEngine, Services};
use std::sync::Arc;

pub const REPO: i64 = 1;
pub const ALICE: i64 = 1;
pub const BOB: i64 = 2;
pub const CAROL: i64 = 3;

pub fn user(id: i64, name: &str) -> User {
    User {
        id,
        name: name.to_string(),
    }
}

/// alice, bob, carol and `org1/team1`
pub fn directory() -> Directory {
    let mut d = Directory::new();
    d.add_user(user(ALICE, "alice"));
    d.add_user(user(BOB, "bob"));
    d.add_user(user(CAROL, "carol"));
    d.add_team(Team {
        id: 10,
        org: "org1".to_string(),
        name: "team1".to_string(),
    });
    d
}

pub fn review(issue_id: i64, reviewer_id: i64, review_type: ReviewType, official: bool) -> Review {
    Review {
        id: 0,
        issue_id,
        reviewer_id,
        review_type,
        official,
        dismissed: false,
        stale: false,
        commit_id: None,
    }
}

/// Engine wired to mocks, with handles to every mock
pub struct Harness {
    pub engine: MergeEngine,
    pub store: Arc<Store>,
    pub git: Arc<MockGitBackend>,
    pub reviews: Arc<MockReviewSource>,
    pub events: Arc<RecordingObserver>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let store = Arc::new(Store::new());
        let git = Arc::new(MockGitBackend::new());
        let reviews = Arc::new(MockReviewSource::new());
        let events = Arc::new(RecordingObserver::default());
        let services = Services {
            git: git.clone(),
            reviews: reviews.clone(),
            identity: Arc::new(directory()),
            observers: Observers::new().with(events.clone()),
        };
        Self {
            engine: MergeEngine::new(config, Arc::clone(&store), services),
            store,
            git,
            reviews,
            events,
        }
    }

    /// Open `feature -> main` in `REPO`, posted by bob, with head at `head`
    pub fn open(&self, branch: &str, title: &str, head: &str) -> (Issue, MergeRequest) {
        self.git
            .set_head(REPO, &format!("refs/heads/{branch}"), head);
        self.engine
            .create_merge_request(
                Issue::new(REPO, BOB, title),
                MergeRequest::new(REPO, branch, REPO, "main"),
            )
            .unwrap()
    }

    /// `open`, then run the conflict check (clean by default)
    pub async fn open_checked(&self, branch: &str, title: &str, head: &str) -> (Issue, MergeRequest) {
        let (issue, mr) = self.open(branch, title, head);
        self.engine.check_merge_request(mr.id).await.unwrap();
        let mr = self.store.get_merge_request(mr.id).unwrap();
        (issue, mr)
    }

    /// Protect `main` with a number of required approvals
    pub fn protect_main(&self, required_approvals: u32) -> ProtectedBranch {
        let mut rule = ProtectedBranch::new(REPO, "main");
        rule.required_approvals = required_approvals;
        self.store.upsert_protected_branch(rule.clone()).unwrap();
        rule
    }

    /// Add an official review and return its id
    pub fn official(&self, issue: &Issue, reviewer_id: i64, review_type: ReviewType) -> i64 {
        self.reviews
            .add(review(issue.id, reviewer_id, review_type, true))
    }
}
