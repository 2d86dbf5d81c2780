//! Download task lifecycle states.

use std::fmt;

use crate::error::SharedTaskError;
use crate::storage::CacheEntry;

/// Lifecycle of a download task.
///
/// `Queued → Running → {Completed, Failed, Cancelled}`, or `Queued →
/// Cancelled` when cancelled before it starts. Terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Cancelled
        )
    }

    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(&self, next: TaskState) -> bool {
        match (self, next) {
            (TaskState::Queued, TaskState::Running) => true,
            (TaskState::Queued, TaskState::Cancelled) => true,
            (TaskState::Running, s) => s.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskState::Queued => write!(f, "queued"),
            TaskState::Running => write!(f, "running"),
            TaskState::Completed => write!(f, "completed"),
            TaskState::Failed => write!(f, "failed"),
            TaskState::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Point-in-time view of a task, published to observers.
#[derive(Debug, Clone)]
pub struct TaskSnapshot {
    pub state: TaskState,
    pub segments_done: usize,
    pub segments_total: usize,
    pub bytes_written: u64,
    /// Set once the task has completed.
    pub entry: Option<CacheEntry>,
    /// Set once the task has failed.
    pub error: Option<SharedTaskError>,
}

impl TaskSnapshot {
    pub(crate) fn queued() -> Self {
        Self {
            state: TaskState::Queued,
            segments_done: 0,
            segments_total: 0,
            bytes_written: 0,
            entry: None,
            error: None,
        }
    }

    /// Progress fraction in `[0, 1]`; zero while the segment count is unknown.
    pub fn fraction(&self) -> f64 {
        if self.segments_total == 0 {
            return if self.state == TaskState::Completed { 1.0 } else { 0.0 };
        }
        (self.segments_done as f64 / self.segments_total as f64).min(1.0)
    }

    /// Terminal outcome, if the task has reached one.
    pub fn outcome(&self) -> Option<TaskOutcome> {
        match self.state {
            TaskState::Completed => self.entry.clone().map(TaskOutcome::Completed),
            TaskState::Failed => self.error.clone().map(TaskOutcome::Failed),
            TaskState::Cancelled => Some(TaskOutcome::Cancelled),
            TaskState::Queued | TaskState::Running => None,
        }
    }
}

/// How a task ended.
#[derive(Debug, Clone)]
pub enum TaskOutcome {
    Completed(CacheEntry),
    Failed(SharedTaskError),
    Cancelled,
}

impl TaskOutcome {
    pub fn state(&self) -> TaskState {
        match self {
            TaskOutcome::Completed(_) => TaskState::Completed,
            TaskOutcome::Failed(_) => TaskState::Failed,
            TaskOutcome::Cancelled => TaskState::Cancelled,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, TaskOutcome::Completed(_))
    }
}
