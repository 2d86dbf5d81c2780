//! Shared handle to a download task.

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::TaskError;
use crate::identity::StreamIdentity;
use crate::storage::CacheEntry;
use crate::task::state::{TaskOutcome, TaskSnapshot, TaskState};

struct TaskInner {
    id: Uuid,
    identity: StreamIdentity,
    status: watch::Sender<TaskSnapshot>,
    cancel: CancellationToken,
}

/// Cloneable handle to one download task.
///
/// Every caller asking for the same identity while the task is active gets a
/// clone of the same handle.
#[derive(Clone)]
pub struct TaskHandle {
    inner: Arc<TaskInner>,
}

impl TaskHandle {
    pub(crate) fn new(identity: StreamIdentity) -> Self {
        let (status, _) = watch::channel(TaskSnapshot::queued());
        Self {
            inner: Arc::new(TaskInner {
                id: Uuid::new_v4(),
                identity,
                status,
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// A handle for a stream that is already cached in full.
    pub(crate) fn completed(identity: StreamIdentity, entry: CacheEntry) -> Self {
        let handle = Self::new(identity);
        let total = entry.segments_declared;
        handle.start();
        handle.set_total(total, total, entry.size_bytes);
        handle.complete(entry);
        handle
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn identity(&self) -> &StreamIdentity {
        &self.inner.identity
    }

    pub fn state(&self) -> TaskState {
        self.inner.status.borrow().state
    }

    pub fn is_active(&self) -> bool {
        self.state().is_active()
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        self.inner.status.borrow().clone()
    }

    /// Subscribe to state and progress updates.
    pub fn subscribe(&self) -> watch::Receiver<TaskSnapshot> {
        self.inner.status.subscribe()
    }

    /// Whether both handles refer to the same task.
    pub fn same_task(&self, other: &TaskHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Request cancellation.
    ///
    /// A queued task is cancelled on the spot; a running one stops before its
    /// next network operation. No-op on a terminal task.
    pub fn cancel(&self) {
        if self.state().is_terminal() {
            return;
        }
        self.inner.cancel.cancel();
        let was_queued = self.inner.status.send_if_modified(|s| {
            if s.state != TaskState::Queued {
                return false;
            }
            s.state = TaskState::Cancelled;
            true
        });
        if was_queued {
            tracing::debug!("Cancelled queued task for {}", self.inner.identity);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    pub(crate) fn cancellation(&self) -> &CancellationToken {
        &self.inner.cancel
    }

    /// Wait for the task to reach a terminal state.
    pub async fn wait(&self) -> TaskOutcome {
        let mut rx = self.subscribe();
        loop {
            let outcome = rx.borrow_and_update().outcome();
            if let Some(outcome) = outcome {
                return outcome;
            }
            if rx.changed().await.is_err() {
                // The sender lives in `self`, so this only happens on teardown.
                return TaskOutcome::Cancelled;
            }
        }
    }

    /// Queued → Running. Fails if the task was cancelled first.
    pub(crate) fn start(&self) -> bool {
        !self.is_cancelled() && self.transition(TaskState::Running, |_| {})
    }

    pub(crate) fn set_total(&self, total: usize, done: usize, bytes: u64) {
        self.inner.status.send_modify(|s| {
            s.segments_total = total;
            s.segments_done = done;
            s.bytes_written = bytes;
        });
    }

    pub(crate) fn add_progress(&self, bytes: u64) {
        self.inner.status.send_modify(|s| {
            s.segments_done += 1;
            s.bytes_written += bytes;
        });
    }

    pub(crate) fn complete(&self, entry: CacheEntry) -> bool {
        self.transition(TaskState::Completed, |s| {
            s.segments_done = s.segments_total;
            s.entry = Some(entry);
        })
    }

    pub(crate) fn fail(&self, error: TaskError) -> bool {
        self.transition(TaskState::Failed, |s| s.error = Some(Arc::new(error)))
    }

    pub(crate) fn mark_cancelled(&self) -> bool {
        self.transition(TaskState::Cancelled, |_| {})
    }

    /// Apply a state transition if it is legal; returns whether it happened.
    fn transition(&self, next: TaskState, update: impl FnOnce(&mut TaskSnapshot)) -> bool {
        self.inner.status.send_if_modified(|s| {
            if !s.state.can_transition_to(next) {
                return false;
            }
            s.state = next;
            update(s);
            true
        })
    }
}

impl std::fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.inner.id)
            .field("identity", &self.inner.identity)
            .field("state", &self.state())
            .finish()
    }
}
