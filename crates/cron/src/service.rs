//! [`CronService`]: wires the links, resolver, scheduler set and
//! dispatcher together and runs them until shutdown.

use std::sync::Arc;

use taktgeber_wire::Connector;
use tokio::sync::Notify;
use tracing::{info, warn};

use crate::config::DispatcherConfig;
use crate::directory::DirectoryHook;
use crate::dispatch::Dispatcher;
use crate::link::ConnectionLink;
use crate::resolver::RegistryResolver;
use crate::scheduler::{NamespaceSchedulerSet, ScheduleRegistry};

pub struct CronService {
    directory: Arc<ConnectionLink>,
    execution: Arc<ConnectionLink>,
    schedules: Arc<NamespaceSchedulerSet>,
}

impl CronService {
    pub fn new(config: &DispatcherConfig, connector: Arc<dyn Connector>) -> Self {
        let backoff = config.reconnect_backoff();

        let execution = Arc::new(ConnectionLink::new(
            "execution",
            Arc::clone(&connector),
            config.execution_address.clone(),
            backoff,
        ));
        let registry = Arc::new(ScheduleRegistry::new());
        let dispatcher = Arc::new(Dispatcher::new(registry.clone(), execution.clone()));
        let schedules = Arc::new(NamespaceSchedulerSet::new(registry, dispatcher));
        let resolver = Arc::new(RegistryResolver::new(execution.clone()));

        let hook = DirectoryHook::new(schedules.clone(), resolver);
        let directory = Arc::new(
            ConnectionLink::new(
                "directory",
                connector,
                Some(config.directory_address.clone()),
                backoff,
            )
            .with_hook(Arc::new(hook)),
        );

        Self {
            directory,
            execution,
            schedules,
        }
    }

    pub fn directory(&self) -> &Arc<ConnectionLink> {
        &self.directory
    }

    pub fn execution(&self) -> &Arc<ConnectionLink> {
        &self.execution
    }

    pub fn schedules(&self) -> &Arc<NamespaceSchedulerSet> {
        &self.schedules
    }

    /// Run both links until SIGINT/SIGTERM or until `shutdown` is notified,
    /// then stop every timer and close both sessions.
    pub async fn run(&self, shutdown: Option<Arc<Notify>>) {
        let links = [Arc::clone(&self.directory), Arc::clone(&self.execution)].map(|link| {
            tokio::spawn(async move { link.run().await })
        });
        info!("cron service running");

        match shutdown {
            Some(notify) => {
                tokio::select! {
                    _ = os_signal() => {}
                    _ = notify.notified() => {}
                }
            }
            None => os_signal().await,
        }
        info!("shutdown requested");

        for handle in links {
            handle.abort();
        }
        self.schedules.shutdown().await;
        self.directory.disconnect().await;
        self.execution.disconnect().await;
        info!("cron service stopped");
    }
}

/// Resolves on SIGINT or SIGTERM (ctrl-c elsewhere).
async fn os_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match (
            signal(SignalKind::interrupt()),
            signal(SignalKind::terminate()),
        ) {
            (Ok(mut sigint), Ok(mut sigterm)) => {
                tokio::select! {
                    _ = sigint.recv() => info!("received SIGINT"),
                    _ = sigterm.recv() => info!("received SIGTERM"),
                }
                return;
            }
            _ => warn!("cannot install signal handlers, falling back to ctrl-c"),
        }
    }
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "ctrl-c handler failed, waiting for programmatic shutdown");
        std::future::pending::<()>().await;
    }
}
