//! Registry of active download tasks, keyed by stream identity.

use std::collections::HashMap;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::identity::StreamIdentity;
use crate::task::TaskHandle;

/// Result of [`TaskRegistry::get_or_create`].
#[derive(Debug, Clone)]
pub struct Registration {
    pub handle: TaskHandle,
    /// True when `handle` was built by this call.
    pub created: bool,
    /// A cancelled task for the same identity that has not settled yet. The
    /// new task must wait for it before touching storage.
    pub predecessor: Option<TaskHandle>,
}

/// At most one joinable task per identity.
///
/// Lookup and insertion happen under one lock, so concurrent callers asking
/// for the same identity always end up sharing a single task. A cancelled
/// task is never joined; it stays tracked only until a successor replaces it.
#[derive(Default)]
pub struct TaskRegistry {
    tasks: Mutex<HashMap<StreamIdentity, TaskHandle>>,
}

fn joinable(handle: &TaskHandle) -> bool {
    handle.is_active() && !handle.is_cancelled()
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the joinable task for `identity`, or register the one built by
    /// `create`.
    pub fn get_or_create(
        &self,
        identity: &StreamIdentity,
        create: impl FnOnce() -> TaskHandle,
    ) -> Registration {
        let mut tasks = self.tasks.lock();
        let predecessor = match tasks.get(identity) {
            Some(existing) if joinable(existing) => {
                return Registration {
                    handle: existing.clone(),
                    created: false,
                    predecessor: None,
                };
            }
            Some(existing) if existing.is_active() => Some(existing.clone()),
            _ => None,
        };

        let handle = create();
        tasks.insert(identity.clone(), handle.clone());
        Registration {
            handle,
            created: true,
            predecessor,
        }
    }

    /// The joinable task for `identity`.
    pub fn get(&self, identity: &StreamIdentity) -> Option<TaskHandle> {
        self.tasks.lock().get(identity).filter(|h| joinable(h)).cloned()
    }

    /// The latest task for `identity` that has not settled, cancelled or not.
    pub fn current(&self, identity: &StreamIdentity) -> Option<TaskHandle> {
        self.tasks
            .lock()
            .get(identity)
            .filter(|h| h.is_active())
            .cloned()
    }

    /// Cancel the task for `identity`. Returns whether one was running.
    pub fn cancel(&self, identity: &StreamIdentity) -> bool {
        match self.get(identity) {
            Some(handle) => {
                handle.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every task. Returns how many were cancelled.
    ///
    /// Afterwards nothing is joinable; the next download of any identity
    /// starts a fresh task.
    pub fn cancel_all(&self) -> usize {
        let handles: Vec<TaskHandle> = {
            let mut tasks = self.tasks.lock();
            // Settled tasks have nothing left to wait for.
            tasks.retain(|_, h| h.is_active());
            tasks.values().filter(|h| joinable(h)).cloned().collect()
        };

        for handle in &handles {
            handle.cancel();
        }
        handles.len()
    }

    /// Deregister the task `task_id` once it is terminal. A newer task
    /// registered under the same identity is left alone.
    pub fn remove(&self, identity: &StreamIdentity, task_id: Uuid) {
        let mut tasks = self.tasks.lock();
        if tasks.get(identity).is_some_and(|h| h.id() == task_id) {
            tasks.remove(identity);
        }
    }

    /// Number of joinable tasks.
    pub fn len(&self) -> usize {
        self.tasks.lock().values().filter(|h| joinable(h)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
