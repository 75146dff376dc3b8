//! Shared scheduling state: live scheduler instances and in-flight markers.
//!
//! Both live behind a single lock so a rebuild (stop, reset, start) and a
//! dispatch's test-and-mark can never interleave.

use std::collections::{BTreeMap, HashMap, HashSet};

use tokio::sync::{Mutex, MutexGuard};

use crate::task::TaskRef;

use super::namespace::NamespaceScheduler;

/// What a fire is allowed to do after consulting the running-task set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Marked as running; the dispatcher must release it when done.
    Tracked,
    /// Concurrent runs are allowed for this task; nothing was marked.
    Untracked,
    /// A previous run of the same index has not completed.
    AlreadyRunning,
    /// The fire belongs to a scheduler that has since been replaced.
    Stale,
}

#[derive(Debug, Default)]
struct RunningSlot {
    generation: u64,
    indices: HashSet<usize>,
}

/// Namespace -> indices with a run in flight, scoped to one rebuild generation.
#[derive(Debug, Default)]
pub struct RunningTaskSet {
    namespaces: HashMap<String, RunningSlot>,
}

impl RunningTaskSet {
    /// Start `namespace` over with an empty set owned by `generation`.
    pub fn reset(&mut self, namespace: &str, generation: u64) {
        self.namespaces.insert(
            namespace.to_string(),
            RunningSlot {
                generation,
                indices: HashSet::new(),
            },
        );
    }

    pub fn remove(&mut self, namespace: &str) {
        self.namespaces.remove(namespace);
    }

    pub fn try_mark(&mut self, task: &TaskRef) -> Admission {
        let Some(slot) = self.namespaces.get_mut(&*task.namespace) else {
            return Admission::Stale;
        };
        if slot.generation != task.generation {
            return Admission::Stale;
        }
        if task.allow_concurrent {
            return Admission::Untracked;
        }
        if slot.indices.insert(task.index) {
            Admission::Tracked
        } else {
            Admission::AlreadyRunning
        }
    }

    /// Clear the marker set by [`try_mark`](Self::try_mark). A completion
    /// from an older generation leaves the current set alone.
    pub fn unmark(&mut self, task: &TaskRef) -> bool {
        match self.namespaces.get_mut(&*task.namespace) {
            Some(slot) if slot.generation == task.generation => slot.indices.remove(&task.index),
            _ => false,
        }
    }

    pub fn is_running(&self, namespace: &str, index: usize) -> bool {
        self.namespaces
            .get(namespace)
            .is_some_and(|slot| slot.indices.contains(&index))
    }

    /// Sorted indices currently marked for `namespace`.
    pub fn running(&self, namespace: &str) -> Vec<usize> {
        let mut indices: Vec<usize> = self
            .namespaces
            .get(namespace)
            .map(|slot| slot.indices.iter().copied().collect())
            .unwrap_or_default();
        indices.sort_unstable();
        indices
    }
}

#[derive(Default)]
pub(crate) struct ScheduleState {
    pub(crate) schedulers: HashMap<String, NamespaceScheduler>,
    pub(crate) running: RunningTaskSet,
    generation: u64,
}

impl ScheduleState {
    pub(crate) fn next_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }
}

/// Lock-guarded home of the namespace -> scheduler map and the running set.
#[derive(Default)]
pub struct ScheduleRegistry {
    state: Mutex<ScheduleState>,
}

impl ScheduleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, ScheduleState> {
        self.state.lock().await
    }

    pub async fn try_admit(&self, task: &TaskRef) -> Admission {
        self.state.lock().await.running.try_mark(task)
    }

    pub async fn release(&self, task: &TaskRef) -> bool {
        self.state.lock().await.running.unmark(task)
    }

    pub async fn running(&self, namespace: &str) -> Vec<usize> {
        self.state.lock().await.running.running(namespace)
    }

    /// Active namespaces with their number of registered timers.
    pub async fn snapshot(&self) -> BTreeMap<String, usize> {
        self.state
            .lock()
            .await
            .schedulers
            .iter()
            .map(|(ns, scheduler)| (ns.clone(), scheduler.timer_count()))
            .collect()
    }

    /// Registered indices of `namespace`, if it has a live scheduler.
    pub async fn registered(&self, namespace: &str) -> Option<Vec<usize>> {
        self.state
            .lock()
            .await
            .schedulers
            .get(namespace)
            .map(NamespaceScheduler::registered_indices)
    }

    pub async fn generation_of(&self, namespace: &str) -> Option<u64> {
        self.state
            .lock()
            .await
            .schedulers
            .get(namespace)
            .map(NamespaceScheduler::generation)
    }
}
