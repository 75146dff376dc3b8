//! [`NamespaceScheduler`]: the timers of one namespace's task list.

use std::sync::Arc;

use chrono::Utc;
use cron::Schedule;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::dispatch::Dispatcher;
use crate::error::CronError;
use crate::task::{ScheduledTaskDef, TaskRef};

use super::cron::{next_fire, parse_schedule};

#[derive(Clone)]
struct Timer {
    task: TaskRef,
    expression: String,
    schedule: Schedule,
}

/// One scheduler instance: a timer per registered task, all stopped together.
///
/// Timers are registered first and only begin firing after
/// [`start`](NamespaceScheduler::start). Dropping the scheduler stops it.
pub struct NamespaceScheduler {
    namespace: Arc<str>,
    generation: u64,
    timers: Vec<Timer>,
    handles: Vec<JoinHandle<()>>,
}

impl NamespaceScheduler {
    pub fn new(namespace: Arc<str>, generation: u64) -> Self {
        Self {
            namespace,
            generation,
            timers: Vec::new(),
            handles: Vec::new(),
        }
    }

    /// Register the task at `index`. Fails only if its schedule does not parse.
    pub fn register(&mut self, index: usize, def: &ScheduledTaskDef) -> Result<(), CronError> {
        let schedule = parse_schedule(&def.schedule)?;
        self.timers.push(Timer {
            task: TaskRef {
                namespace: Arc::clone(&self.namespace),
                index,
                allow_concurrent: def.allow_concurrent,
                generation: self.generation,
            },
            expression: def.schedule.clone(),
            schedule,
        });
        Ok(())
    }

    /// Spawn one timer task per registered task.
    pub fn start(&mut self, dispatcher: &Arc<Dispatcher>) {
        self.stop();
        self.handles = self
            .timers
            .iter()
            .cloned()
            .map(|timer| tokio::spawn(run_timer(timer, Arc::clone(dispatcher))))
            .collect();
    }

    /// Abort every timer. Runs already dispatched are left to finish.
    pub fn stop(&mut self) {
        for handle in self.handles.drain(..) {
            handle.abort();
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of tasks that registered successfully.
    pub fn timer_count(&self) -> usize {
        self.timers.len()
    }

    /// Indices of the registered tasks, in list order.
    pub fn registered_indices(&self) -> Vec<usize> {
        self.timers.iter().map(|t| t.task.index).collect()
    }

    pub fn is_running(&self) -> bool {
        !self.handles.is_empty()
    }
}

impl Drop for NamespaceScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Sleep until each matching instant and hand the fire to the dispatcher.
///
/// The dispatch runs on its own task so a long execution never delays the
/// next tick. The cursor only moves forward, so each tick fires once.
async fn run_timer(timer: Timer, dispatcher: Arc<Dispatcher>) {
    let mut cursor = Utc::now();
    loop {
        let Some(next) = next_fire(&timer.schedule, cursor) else {
            debug!(
                namespace = %timer.task.namespace,
                index = timer.task.index,
                schedule = %timer.expression,
                "schedule has no further fire times"
            );
            return;
        };

        if let Ok(wait) = (next - Utc::now()).to_std() {
            tokio::time::sleep(wait).await;
        }
        cursor = next.max(Utc::now());

        trace!(
            namespace = %timer.task.namespace,
            index = timer.task.index,
            tick = %next,
            "timer fired"
        );
        let dispatcher = Arc::clone(&dispatcher);
        let task = timer.task.clone();
        tokio::spawn(async move {
            dispatcher.dispatch(task).await;
        });
    }
}
