//! Tracks the execution service's address from `registry` pushes.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::link::ConnectionLink;
use crate::task::{decode_registry, ServiceRecord, TASK_QUEUE};

/// What a registry push did to the execution link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The payload could not be decoded.
    Invalid,
    /// No `taskQueue` instances were listed.
    NoTaskQueue,
    /// The current address is still the preferred one.
    Unchanged,
    /// The link was pointed at a new address and told to reconnect.
    Switched { from: Option<String>, to: String },
}

pub struct RegistryResolver {
    execution: Arc<ConnectionLink>,
}

impl RegistryResolver {
    pub fn new(execution: Arc<ConnectionLink>) -> Self {
        Self { execution }
    }

    pub async fn on_registry_notification(&self, payload: &Value) -> Resolution {
        let registry = match decode_registry(payload) {
            Ok(registry) => registry,
            Err(e) => {
                warn!(error = %e, "ignoring malformed registry push");
                return Resolution::Invalid;
            }
        };

        let Some(records) = registry.get(TASK_QUEUE).filter(|r| !r.is_empty()) else {
            warn!("registry push lists no taskQueue instances");
            return Resolution::NoTaskQueue;
        };

        let current = self.execution.address().await;
        let Some(candidate) = select_candidate(records, current.as_deref()) else {
            debug!(address = ?current, "execution address unchanged");
            return Resolution::Unchanged;
        };

        if !self.execution.update_address(&candidate).await {
            return Resolution::Unchanged;
        }
        info!(from = ?current, to = %candidate, "execution service moved, reconnecting");
        self.execution.force_reconnect();
        Resolution::Switched {
            from: current,
            to: candidate,
        }
    }
}

/// Pick the address to switch to. Instances are scanned in order up to the
/// one matching `current`; the last instance seen before it wins. When
/// `current` is not listed the last instance wins. `None` means stay put.
pub fn select_candidate(records: &[ServiceRecord], current: Option<&str>) -> Option<String> {
    let mut candidate = None;
    for endpoint in records
        .iter()
        .filter(|r| r.is_task_queue())
        .map(ServiceRecord::endpoint)
    {
        if Some(endpoint.as_str()) == current {
            break;
        }
        candidate = Some(endpoint);
    }
    candidate
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::testing::{eventually, MockConnector};

    fn record(address: &str, port: &str) -> ServiceRecord {
        ServiceRecord {
            service_type: TASK_QUEUE.into(),
            address: address.into(),
            port: port.into(),
        }
    }

    #[test]
    fn scan_stops_at_current_instance() {
        let records = vec![
            record("10.0.0.2", "9000"),
            record("10.0.0.5", "9000"),
            record("10.0.0.7", "9000"),
        ];
        assert_eq!(select_candidate(&records, Some("10.0.0.2:9000")), None);
        assert_eq!(
            select_candidate(&records, Some("10.0.0.5:9000")).as_deref(),
            Some("10.0.0.2:9000")
        );
        assert_eq!(
            select_candidate(&records, Some("10.0.0.7:9000")).as_deref(),
            Some("10.0.0.5:9000")
        );
    }

    #[test]
    fn unlisted_current_takes_last_instance() {
        let records = vec![
            record("10.0.0.2", "9000"),
            record("10.0.0.5", "9000"),
            record("10.0.0.7", "9000"),
        ];
        assert_eq!(
            select_candidate(&records, None).as_deref(),
            Some("10.0.0.7:9000")
        );
        assert_eq!(
            select_candidate(&records, Some("10.0.0.9:9000")).as_deref(),
            Some("10.0.0.7:9000")
        );
    }

    #[test]
    fn switched_address_is_stable_under_the_same_list() {
        let records = vec![record("10.0.0.5", "9000"), record("10.0.0.2", "9000")];
        let first = select_candidate(&records, Some("10.0.0.2:9000"));
        assert_eq!(first.as_deref(), Some("10.0.0.5:9000"));
        assert_eq!(select_candidate(&records, first.as_deref()), None);
    }

    #[test]
    fn sole_current_instance_means_no_change() {
        let records = vec![record("10.0.0.2", "9000")];
        assert_eq!(select_candidate(&records, Some("10.0.0.2:9000")), None);
    }

    #[test]
    fn foreign_record_types_are_skipped() {
        let mut other = record("10.0.0.9", "1");
        other.service_type = "cron".into();
        let records = vec![record("10.0.0.2", "9000"), other];
        assert_eq!(
            select_candidate(&records, None).as_deref(),
            Some("10.0.0.2:9000")
        );
    }

    fn resolver_at(address: &str) -> (Arc<MockConnector>, Arc<ConnectionLink>, RegistryResolver) {
        let connector = Arc::new(MockConnector::default());
        let link = Arc::new(ConnectionLink::new(
            "execution",
            connector.clone(),
            Some(address.into()),
            Duration::from_millis(10),
        ));
        let resolver = RegistryResolver::new(link.clone());
        (connector, link, resolver)
    }

    #[tokio::test]
    async fn moved_service_reconnects_once() {
        let (connector, link, resolver) = resolver_at("10.0.0.2:9000");
        let handle = {
            let link = link.clone();
            tokio::spawn(async move { link.run().await })
        };
        assert!(eventually!(link.is_connected().await));

        let payload = json!({"taskQueue": [{"type": "taskQueue", "address": "10.0.0.5", "port": "9000"}]});
        let resolution = resolver.on_registry_notification(&payload).await;
        assert_eq!(
            resolution,
            Resolution::Switched {
                from: Some("10.0.0.2:9000".into()),
                to: "10.0.0.5:9000".into()
            }
        );
        assert!(eventually!(connector.attempts().len() == 2));

        // Same push again: already there.
        assert_eq!(
            resolver.on_registry_notification(&payload).await,
            Resolution::Unchanged
        );
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(
            connector.attempts(),
            vec!["10.0.0.2:9000".to_string(), "10.0.0.5:9000".to_string()]
        );
        handle.abort();
    }

    #[tokio::test]
    async fn repeated_push_with_two_instances_switches_once() {
        let (connector, link, resolver) = resolver_at("10.0.0.2:9000");
        let handle = {
            let link = link.clone();
            tokio::spawn(async move { link.run().await })
        };
        assert!(eventually!(link.is_connected().await));

        let payload = json!({"taskQueue": [
            {"type": "taskQueue", "address": "10.0.0.5", "port": "9000"},
            {"type": "taskQueue", "address": "10.0.0.2", "port": "9000"}
        ]});
        assert_eq!(
            resolver.on_registry_notification(&payload).await,
            Resolution::Switched {
                from: Some("10.0.0.2:9000".into()),
                to: "10.0.0.5:9000".into()
            }
        );
        assert!(eventually!(connector.attempts().len() == 2));

        for _ in 0..3 {
            assert_eq!(
                resolver.on_registry_notification(&payload).await,
                Resolution::Unchanged
            );
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(link.address().await.as_deref(), Some("10.0.0.5:9000"));
        assert_eq!(connector.attempts().len(), 2);
        handle.abort();
    }

    #[tokio::test]
    async fn unlisted_address_switches_to_last_instance_once() {
        let (_connector, link, resolver) = resolver_at("10.0.0.9:9000");
        let payload = json!({"taskQueue": [
            {"type": "taskQueue", "address": "10.0.0.2", "port": "9000"},
            {"type": "taskQueue", "address": "10.0.0.5", "port": "9000"}
        ]});

        assert_eq!(
            resolver.on_registry_notification(&payload).await,
            Resolution::Switched {
                from: Some("10.0.0.9:9000".into()),
                to: "10.0.0.5:9000".into()
            }
        );
        assert_eq!(
            resolver.on_registry_notification(&payload).await,
            Resolution::Unchanged
        );
        assert_eq!(link.address().await.as_deref(), Some("10.0.0.5:9000"));
    }

    #[tokio::test]
    async fn unchanged_address_does_not_reconnect() {
        let (_connector, link, resolver) = resolver_at("10.0.0.2:9000");
        let payload = json!({"taskQueue": [{"type": "taskQueue", "address": "10.0.0.2", "port": 9000}]});

        assert_eq!(
            resolver.on_registry_notification(&payload).await,
            Resolution::Unchanged
        );
        assert_eq!(link.address().await.as_deref(), Some("10.0.0.2:9000"));
    }

    #[tokio::test]
    async fn missing_task_queue_is_ignored() {
        let (_connector, link, resolver) = resolver_at("10.0.0.2:9000");

        assert_eq!(
            resolver
                .on_registry_notification(&json!({"cron": [{"type": "cron", "address": "h", "port": "1"}]}))
                .await,
            Resolution::NoTaskQueue
        );
        assert_eq!(
            resolver.on_registry_notification(&json!("garbage")).await,
            Resolution::Invalid
        );
        assert_eq!(link.address().await.as_deref(), Some("10.0.0.2:9000"));
    }
}
