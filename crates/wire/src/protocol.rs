//! Payload shapes for calls, replies and events.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Suffix appended to a procedure name to form its reply topic.
pub const REPLY_SUFFIX: &str = ".reply";

/// Reply topic for a procedure, e.g. `cron.run` -> `cron.run.reply`.
pub fn reply_topic(procedure: &str) -> String {
    format!("{procedure}{REPLY_SUFFIX}")
}

/// Result of a remote call as carried in the reply payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "body", rename_all = "snake_case")]
pub enum CallOutcome {
    Ok(Value),
    Err(String),
}

/// A message delivered on a subscribed topic.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub topic: String,
    pub payload: Value,
}
