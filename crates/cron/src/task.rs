//! Task definitions, service records, and decoding of the `config` and
//! `registry` notification payloads.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::CronError;

/// Registry key (and record type) of the task-execution service.
pub const TASK_QUEUE: &str = "taskQueue";

/// One entry of a namespace's task list.
///
/// Its position in the pushed list is its index; there is no identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledTaskDef {
    /// Cron expression, 5-field or 6-field with leading seconds.
    #[serde(default)]
    pub schedule: String,
    /// Whether a fire may dispatch while a previous one is still running.
    #[serde(default)]
    pub allow_concurrent: bool,
}

/// Everything a timer needs to dispatch its task, captured by value when
/// the timer is registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRef {
    pub namespace: Arc<str>,
    pub index: usize,
    pub allow_concurrent: bool,
    /// Rebuild generation of the namespace the task was registered under.
    pub generation: u64,
}

/// A service instance as published on the `registry` topic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRecord {
    #[serde(rename = "type", default)]
    pub service_type: String,
    #[serde(default)]
    pub address: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub port: String,
}

impl ServiceRecord {
    /// `address:port`, the form the execution link connects to.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    /// Records without a type are trusted to match the key they were listed under.
    pub fn is_task_queue(&self) -> bool {
        self.service_type.is_empty() || self.service_type == TASK_QUEUE
    }
}

fn string_or_number<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    match Value::deserialize(d)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!(
            "expected port string or number, got {other}"
        ))),
    }
}

/// The decoded task list of one namespace carried by a `config` push.
#[derive(Debug)]
pub struct NamespaceTasks {
    pub namespace: String,
    /// Decode failures are per namespace and never affect siblings.
    pub tasks: Result<Vec<ScheduledTaskDef>, CronError>,
}

/// Decode a `config` payload into per-namespace task lists.
///
/// Namespaces without a `tasks` field (absent or null) are left out, so
/// their current schedule stays untouched. An explicit empty list is kept.
pub fn decode_config(payload: &Value) -> Result<Vec<NamespaceTasks>, CronError> {
    let namespaces = payload
        .as_object()
        .ok_or_else(|| CronError::Decode("config payload is not an object".into()))?;

    let mut decoded = Vec::with_capacity(namespaces.len());
    for (namespace, config) in namespaces {
        let Some(config) = config.as_object() else {
            decoded.push(NamespaceTasks {
                namespace: namespace.clone(),
                tasks: Err(CronError::Decode(format!(
                    "configuration of {namespace:?} is not an object"
                ))),
            });
            continue;
        };

        let tasks = match config.get("tasks") {
            None | Some(Value::Null) => continue,
            Some(tasks) => tasks,
        };

        decoded.push(NamespaceTasks {
            namespace: namespace.clone(),
            tasks: Vec::<ScheduledTaskDef>::deserialize(tasks).map_err(CronError::from),
        });
    }
    Ok(decoded)
}

/// Decode a `registry` payload: service type -> ordered instances.
pub fn decode_registry(payload: &Value) -> Result<HashMap<String, Vec<ServiceRecord>>, CronError> {
    Ok(HashMap::deserialize(payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn task_def_decodes_camel_case_with_defaults() {
        let tasks: Vec<ScheduledTaskDef> = serde_json::from_value(json!([
            {"schedule": "*/5 * * * *", "allowConcurrent": true},
            {"schedule": "0 3 * * *"},
            {}
        ]))
        .unwrap();
        assert_eq!(tasks[0].schedule, "*/5 * * * *");
        assert!(tasks[0].allow_concurrent);
        assert!(!tasks[1].allow_concurrent);
        assert_eq!(tasks[2], ScheduledTaskDef::default());
    }

    #[test]
    fn decode_config_skips_namespaces_without_tasks() {
        let payload = json!({
            "acme": {"tasks": [{"schedule": "*/5 * * * *", "allowConcurrent": false}]},
            "quiet": {"title": "no tasks here"},
            "nulled": {"tasks": null},
            "emptied": {"tasks": []}
        });
        let decoded = decode_config(&payload).unwrap();
        let names: Vec<&str> = decoded.iter().map(|n| n.namespace.as_str()).collect();
        assert_eq!(names, vec!["acme", "emptied"]);

        let acme = decoded.iter().find(|n| n.namespace == "acme").unwrap();
        assert_eq!(acme.tasks.as_ref().unwrap().len(), 1);
        let emptied = decoded.iter().find(|n| n.namespace == "emptied").unwrap();
        assert!(emptied.tasks.as_ref().unwrap().is_empty());
    }

    #[test]
    fn decode_config_isolates_bad_namespaces() {
        let payload = json!({
            "good": {"tasks": [{"schedule": "* * * * *"}]},
            "scalar": {"tasks": 42},
            "broken": "not an object",
            "wrong_item": {"tasks": ["* * * * *"]}
        });
        let decoded = decode_config(&payload).unwrap();
        assert_eq!(decoded.len(), 4);
        for entry in &decoded {
            if entry.namespace == "good" {
                assert!(entry.tasks.is_ok());
            } else {
                assert!(entry.tasks.is_err(), "{} should fail", entry.namespace);
            }
        }
    }

    #[test]
    fn decode_config_rejects_non_object_payload() {
        assert!(matches!(
            decode_config(&json!(["acme"])),
            Err(CronError::Decode(_))
        ));
    }

    #[test]
    fn decode_registry_reads_ordered_records() {
        let payload = json!({
            "taskQueue": [
                {"type": "taskQueue", "address": "10.0.0.2", "port": "9000"},
                {"type": "taskQueue", "address": "10.0.0.5", "port": 9000}
            ],
            "cron": [{"type": "cron", "address": "10.0.0.9", "port": "1"}]
        });
        let registry = decode_registry(&payload).unwrap();
        let queues = &registry[TASK_QUEUE];
        assert_eq!(queues[0].endpoint(), "10.0.0.2:9000");
        assert_eq!(queues[1].endpoint(), "10.0.0.5:9000");
        assert!(queues.iter().all(ServiceRecord::is_task_queue));
        assert!(!registry["cron"][0].is_task_queue());
    }

    #[test]
    fn decode_registry_rejects_malformed_payload() {
        assert!(decode_registry(&json!({"taskQueue": "10.0.0.2:9000"})).is_err());
    }
}
