//! Per-namespace cron scheduling.
//!
//! A `config` push rebuilds each mentioned namespace:
//! 1. the running scheduler instance (if any) is stopped
//! 2. an empty task list removes the namespace and stops there
//! 3. otherwise a new instance registers every task with a valid schedule
//! 4. the new instance is started and installed
//!
//! Every rebuild gets a fresh generation number; fires and completions
//! from an earlier generation never touch the new instance's state.

pub(crate) mod cron;
mod namespace;
mod registry;
mod set;

pub use self::cron::parse_schedule;
pub use namespace::NamespaceScheduler;
pub use registry::{Admission, RunningTaskSet, ScheduleRegistry};
pub use set::NamespaceSchedulerSet;
