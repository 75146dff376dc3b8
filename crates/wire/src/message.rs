use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;
use zeromq::ZmqMessage;

use crate::error::WireError;

/// Wire-format envelope shared by calls, replies and published events.
///
/// The envelope is MessagePack-encoded and travels as the second frame of a
/// `[topic, envelope]` ZeroMQ message. The payload stays a JSON-shaped
/// [`Value`] so receivers can decode it structurally, one part at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Procedure name for calls, `<procedure>.reply` for replies, topic name for events.
    pub topic: String,

    /// Call arguments, reply outcome, or event body.
    pub payload: Value,

    /// When this message was created.
    pub timestamp: DateTime<Utc>,

    /// Matches a reply to the call that caused it.
    pub correlation_id: Uuid,
}

impl Message {
    /// Create a message with a fresh correlation ID.
    pub fn new(topic: impl Into<String>, payload: Value) -> Self {
        Self {
            topic: topic.into(),
            payload,
            timestamp: Utc::now(),
            correlation_id: Uuid::new_v4(),
        }
    }

    /// Create a message that answers `request`, reusing its correlation ID.
    pub fn reply_to(request: &Message, topic: impl Into<String>, payload: Value) -> Self {
        Self {
            topic: topic.into(),
            payload,
            timestamp: Utc::now(),
            correlation_id: request.correlation_id,
        }
    }

    /// Decode the payload into the expected type.
    pub fn decode<T: for<'de> Deserialize<'de>>(&self) -> Result<T, WireError> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }

    /// Serialize the envelope to MessagePack bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, WireError> {
        Ok(rmp_serde::to_vec(self)?)
    }

    /// Deserialize an envelope from MessagePack bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        Ok(rmp_serde::from_slice(bytes)?)
    }

    /// Build the two-frame `[topic, envelope]` ZeroMQ message.
    pub fn to_frames(&self) -> Result<ZmqMessage, WireError> {
        let mut frames = ZmqMessage::from(self.topic.as_str());
        frames.push_back(self.to_bytes()?.into());
        Ok(frames)
    }

    /// Decode `[topic, envelope]` frames, skipping leading empty delimiters.
    pub fn from_frames<'a>(frames: impl IntoIterator<Item = &'a [u8]>) -> Result<Self, WireError> {
        let data: Vec<&[u8]> = frames.into_iter().skip_while(|f| f.is_empty()).collect();
        match data.as_slice() {
            [_topic, envelope, ..] => Self::from_bytes(envelope),
            _ => Err(WireError::Framing(format!(
                "expected [topic, envelope], got {} data frames",
                data.len()
            ))),
        }
    }
}
