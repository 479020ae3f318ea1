//! Lifecycle event fan-out to injected observers.

use crate::types::{CommitId, MergeRequestId, MergeRequestStatus, MergeStyle, UserId};
use std::sync::Arc;
use tracing::debug;

/// Lifecycle events emitted after the owning transaction commits
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Merge request finalized as merged
    Merged {
        /// Merge request
        merge_request_id: MergeRequestId,
        /// Resulting commit on base
        commit_id: CommitId,
        /// Who merged
        merger_id: UserId,
        /// Style used (`None` for manual merges)
        style: Option<MergeStyle>,
    },
    /// Status changed
    StatusChanged {
        /// Merge request
        merge_request_id: MergeRequestId,
        /// Previous status
        from: MergeRequestStatus,
        /// New status
        to: MergeRequestStatus,
    },
    /// Auto-merge declaration created
    AutoMergeScheduled {
        /// Merge request
        merge_request_id: MergeRequestId,
        /// Requester
        requested_by_id: UserId,
    },
    /// Auto-merge declaration removed by a user
    AutoMergeCancelled {
        /// Merge request
        merge_request_id: MergeRequestId,
    },
}

/// Receives engine lifecycle events
///
/// Delivery is fire-and-forget: implementations should queue work rather
/// than block the caller.
pub trait MergeObserver: Send + Sync {
    /// Handle one event
    fn notify(&self, event: &EngineEvent);
}

/// Observer list handed to the engine at construction
#[derive(Clone, Default)]
pub struct Observers {
    observers: Vec<Arc<dyn MergeObserver>>,
}

impl Observers {
    /// Empty observer list
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an observer
    #[must_use]
    pub fn with(mut self, observer: Arc<dyn MergeObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Number of registered observers
    pub fn len(&self) -> usize {
        self.observers.len()
    }

    /// Whether no observers are registered
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Deliver an event to every observer
    pub fn emit(&self, event: &EngineEvent) {
        debug!(?event, observers = self.observers.len(), "emitting engine event");
        for observer in &self.observers {
            observer.notify(event);
        }
    }
}

impl std::fmt::Debug for Observers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observers")
            .field("len", &self.observers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<EngineEvent>>);

    impl MergeObserver for Recorder {
        fn notify(&self, event: &EngineEvent) {
            self.0.lock().unwrap().push(event.clone());
        }
    }

    #[test]
    fn test_emit_reaches_every_observer() {
        let a = Arc::new(Recorder::default());
        let b = Arc::new(Recorder::default());
        let observers = Observers::new().with(a.clone()).with(b.clone());

        observers.emit(&EngineEvent::AutoMergeCancelled {
            merge_request_id: 4,
        });

        assert_eq!(a.0.lock().unwrap().len(), 1);
        assert_eq!(b.0.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_empty_list_is_noop() {
        let observers = Observers::new();
        assert!(observers.is_empty());
        observers.emit(&EngineEvent::AutoMergeCancelled {
            merge_request_id: 1,
        });
    }
}
