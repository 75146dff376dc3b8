//! Fire handling: concurrency guard plus the `cron.run` call.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::link::ConnectionLink;
use crate::scheduler::{Admission, ScheduleRegistry};
use crate::task::TaskRef;

/// Procedure invoked on the execution service for each fire.
pub const RUN_PROCEDURE: &str = "cron.run";

/// How a single fire ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The execution service acknowledged the run.
    Completed,
    /// The call failed or the session dropped mid-call.
    Failed,
    /// A previous run of the same task is still in flight.
    Suppressed,
    /// No execution session was available.
    LinkDown,
    /// The fire came from a schedule that has since been replaced.
    Stale,
}

pub struct Dispatcher {
    registry: Arc<ScheduleRegistry>,
    execution: Arc<ConnectionLink>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ScheduleRegistry>, execution: Arc<ConnectionLink>) -> Self {
        Self {
            registry,
            execution,
        }
    }

    /// Run one fire of `task`.
    ///
    /// Unless the task allows concurrent runs, its index is marked running
    /// before the call and unmarked afterwards whatever the result.
    #[instrument(skip_all, fields(namespace = %task.namespace, index = task.index))]
    pub async fn dispatch(&self, task: TaskRef) -> DispatchOutcome {
        let tracked = match self.registry.try_admit(&task).await {
            Admission::Tracked => true,
            Admission::Untracked => false,
            Admission::AlreadyRunning => {
                info!("previous run still in flight, skipping fire");
                return DispatchOutcome::Suppressed;
            }
            Admission::Stale => {
                debug!(generation = task.generation, "fire from a replaced schedule, dropped");
                return DispatchOutcome::Stale;
            }
        };

        let outcome = self.invoke(&task).await;

        if tracked {
            self.registry.release(&task).await;
        }
        outcome
    }

    async fn invoke(&self, task: &TaskRef) -> DispatchOutcome {
        let Some(session) = self.execution.session().await else {
            warn!("execution service not connected, run skipped");
            return DispatchOutcome::LinkDown;
        };

        let args = vec![Value::from(&*task.namespace), Value::from(task.index)];
        match session.call(RUN_PROCEDURE, args).await {
            Ok(result) => {
                debug!(%result, "run acknowledged");
                DispatchOutcome::Completed
            }
            Err(e) => {
                warn!(error = %e, "run failed");
                DispatchOutcome::Failed
            }
        }
    }
}
