//! Cron-style task dispatcher.
//!
//! Registers with a directory service, receives per-namespace task lists
//! on its `config` topic and the execution service's location on its
//! `registry` topic, and invokes `cron.run(namespace, index)` on the
//! execution service whenever a task's cron expression fires.
//!
//! - [`link`] keeps a connection alive with fixed-backoff retries
//! - [`scheduler`] rebuilds each namespace's timers on every push
//! - [`dispatch`] guards against overlapping runs and makes the call
//! - [`resolver`] follows the execution service across addresses
//! - [`service`] wires everything together

pub mod config;
pub mod directory;
pub mod dispatch;
pub mod error;
pub mod link;
pub mod observe;
pub mod resolver;
pub mod scheduler;
pub mod service;
pub mod task;

#[cfg(test)]
mod testing;

pub use config::{DispatcherConfig, GraylogConfig, LoggingConfig};
pub use dispatch::{DispatchOutcome, Dispatcher};
pub use error::CronError;
pub use link::{ConnectionLink, LinkEvent, LinkHook};
pub use resolver::{RegistryResolver, Resolution};
pub use scheduler::{NamespaceScheduler, NamespaceSchedulerSet, ScheduleRegistry};
pub use service::CronService;
pub use task::{ScheduledTaskDef, ServiceRecord, TaskRef};
