//! [`NamespaceSchedulerSet`]: rebuilds namespace schedules on config pushes.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::dispatch::Dispatcher;
use crate::task::{decode_config, NamespaceTasks, ScheduledTaskDef};

use super::namespace::NamespaceScheduler;
use super::registry::ScheduleRegistry;

/// Owns one scheduler instance per namespace with tasks.
///
/// Each push replaces a namespace's instance wholesale. Namespaces the push
/// does not mention keep running untouched.
pub struct NamespaceSchedulerSet {
    registry: Arc<ScheduleRegistry>,
    dispatcher: Arc<Dispatcher>,
}

impl NamespaceSchedulerSet {
    pub fn new(registry: Arc<ScheduleRegistry>, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            registry,
            dispatcher,
        }
    }

    pub fn registry(&self) -> &Arc<ScheduleRegistry> {
        &self.registry
    }

    /// Handle a `config` push. Failures are logged and scoped to the
    /// namespace they occur in.
    pub async fn on_config_notification(&self, payload: &Value) {
        debug!("config update received");
        let namespaces = match decode_config(payload) {
            Ok(namespaces) => namespaces,
            Err(e) => {
                warn!(error = %e, "ignoring malformed config push");
                return;
            }
        };

        for NamespaceTasks { namespace, tasks } in namespaces {
            match tasks {
                Ok(tasks) => {
                    self.apply(&namespace, &tasks).await;
                }
                Err(e) => {
                    error!(namespace = %namespace, error = %e, "cannot decode task list");
                }
            }
        }
    }

    /// Replace `namespace`'s schedule with `tasks`. Returns the number of
    /// timers started; an empty list removes the namespace.
    pub async fn apply(&self, namespace: &str, tasks: &[ScheduledTaskDef]) -> usize {
        let mut state = self.registry.lock().await;

        if let Some(mut previous) = state.schedulers.remove(namespace) {
            previous.stop();
            debug!(
                namespace,
                generation = previous.generation(),
                "stopped previous schedule"
            );
        }

        if tasks.is_empty() {
            state.running.remove(namespace);
            info!(namespace, "namespace has no tasks, schedule removed");
            return 0;
        }

        let generation = state.next_generation();
        state.running.reset(namespace, generation);

        let mut scheduler = NamespaceScheduler::new(Arc::from(namespace), generation);
        for (index, def) in tasks.iter().enumerate() {
            match scheduler.register(index, def) {
                Ok(()) => debug!(namespace, index, schedule = %def.schedule, "task scheduled"),
                Err(e) => warn!(
                    namespace,
                    index,
                    schedule = %def.schedule,
                    error = %e,
                    "skipping task with invalid schedule"
                ),
            }
        }
        scheduler.start(&self.dispatcher);

        let registered = scheduler.timer_count();
        state.schedulers.insert(namespace.to_string(), scheduler);
        info!(
            namespace,
            tasks = tasks.len(),
            registered,
            generation,
            "namespace rescheduled"
        );
        registered
    }

    /// Active namespaces with their number of registered timers.
    pub async fn snapshot(&self) -> BTreeMap<String, usize> {
        self.registry.snapshot().await
    }

    /// Stop every timer and forget all namespaces.
    pub async fn shutdown(&self) {
        let mut state = self.registry.lock().await;
        let stopped = state.schedulers.len();
        for (_, mut scheduler) in state.schedulers.drain() {
            scheduler.stop();
        }
        if stopped > 0 {
            info!(namespaces = stopped, "all schedules stopped");
        }
    }
}
