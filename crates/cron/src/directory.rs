//! Directory-link behaviour: registration, subscriptions and the
//! notification pump feeding the scheduler set and the resolver.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use taktgeber_wire::{Event, Session};
use tracing::{debug, info, warn};

use crate::link::LinkHook;
use crate::resolver::RegistryResolver;
use crate::scheduler::NamespaceSchedulerSet;

pub const REGISTER_PROCEDURE: &str = "register";
pub const SERVICE_TYPE: &str = "cron";
pub const CONFIG_TOPIC: &str = "config";
pub const REGISTRY_TOPIC: &str = "registry";

#[derive(Clone)]
pub struct DirectoryHook {
    schedules: Arc<NamespaceSchedulerSet>,
    resolver: Arc<RegistryResolver>,
}

impl DirectoryHook {
    pub fn new(schedules: Arc<NamespaceSchedulerSet>, resolver: Arc<RegistryResolver>) -> Self {
        Self {
            schedules,
            resolver,
        }
    }

    /// Hand one notification to its consumer.
    pub async fn route(&self, event: Event) {
        match event.topic.as_str() {
            CONFIG_TOPIC => self.schedules.on_config_notification(&event.payload).await,
            REGISTRY_TOPIC => {
                self.resolver.on_registry_notification(&event.payload).await;
            }
            other => debug!(topic = other, "ignoring notification on unrelated topic"),
        }
    }

    /// Deliver notifications in arrival order until the session ends.
    async fn pump(self, session: Arc<dyn Session>) {
        loop {
            match session.next_event().await {
                Ok(event) => self.route(event).await,
                Err(e) => {
                    debug!(error = %e, "notification stream ended");
                    return;
                }
            }
        }
    }
}

#[async_trait]
impl LinkHook for DirectoryHook {
    async fn on_connected(&self, session: Arc<dyn Session>) {
        match session
            .call(REGISTER_PROCEDURE, vec![json!({ "type": SERVICE_TYPE })])
            .await
        {
            Ok(reply) => info!(%reply, "registered with directory"),
            Err(e) => warn!(error = %e, "registration failed"),
        }

        // Without both subscriptions the session is useless; closing it makes
        // the link dial again.
        for topic in [CONFIG_TOPIC, REGISTRY_TOPIC] {
            if let Err(e) = session.subscribe(topic).await {
                warn!(topic, error = %e, "subscription failed, dropping session");
                session.close().await;
                return;
            }
        }

        tokio::spawn(self.clone().pump(session));
    }
}
