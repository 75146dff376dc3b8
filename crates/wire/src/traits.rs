use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::WireError;
use crate::protocol::Event;

/// One live connection to a remote service.
///
/// A session supports request/reply calls and, for services that publish,
/// topic subscriptions. Once it has ended every operation fails with
/// [`WireError::Closed`].
#[async_trait]
pub trait Session: Send + Sync {
    /// Invoke `procedure` with positional arguments and wait for its reply.
    ///
    /// No local timeout is applied; the call ends when the reply arrives or
    /// the session closes.
    async fn call(&self, procedure: &str, args: Vec<Value>) -> Result<Value, WireError>;

    /// Start receiving events whose topic starts with `topic`.
    async fn subscribe(&self, topic: &str) -> Result<(), WireError>;

    /// Receive the next event on any subscribed topic.
    async fn next_event(&self) -> Result<Event, WireError>;

    /// Resolve once the session has ended, for whatever reason.
    async fn closed(&self);

    /// Tear the session down. Pending calls fail with [`WireError::Closed`].
    async fn close(&self);
}

/// Opens sessions to a service address. A single attempt per call; retrying
/// is the caller's business.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, address: &str) -> Result<Arc<dyn Session>, WireError>;
}

/// Blanket implementation so `Arc<dyn Connector>` can be used directly.
#[async_trait]
impl<T: Connector + ?Sized> Connector for Arc<T> {
    async fn connect(&self, address: &str) -> Result<Arc<dyn Session>, WireError> {
        (**self).connect(address).await
    }
}
