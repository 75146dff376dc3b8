//! Service side of the transport: a ROUTER socket answering calls and a PUB
//! socket publishing events.
//!
//! zeromq-rs ROUTER pushes the peer identity as the first frame on recv and
//! pops it on send, so requests arrive as `[identity, procedure, envelope]`
//! and replies leave as `[identity, procedure.reply, envelope]`.

use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use zeromq::prelude::*;
use zeromq::{PubSocket, RouterSocket, ZmqMessage};

use crate::error::WireError;
use crate::message::Message;
use crate::protocol::{reply_topic, CallOutcome};
use crate::transport::Transport;

/// A call received by a [`ServiceHost`], answered with [`ServiceHost::reply`].
#[derive(Debug, Clone)]
pub struct IncomingCall {
    identity: Vec<u8>,
    request: Message,
}

impl IncomingCall {
    /// Name of the invoked procedure.
    pub fn procedure(&self) -> &str {
        &self.request.topic
    }

    /// Positional arguments; empty if the payload was not an array.
    pub fn args(&self) -> &[Value] {
        self.request
            .payload
            .as_array()
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Binds a service's call and event endpoints.
///
/// The ROUTER socket is owned by a background task, so calls can be received
/// and answered concurrently and out of order.
pub struct ServiceHost {
    transport: Transport,
    calls_rx: Mutex<mpsc::Receiver<IncomingCall>>,
    replies_tx: mpsc::Sender<ZmqMessage>,
    publisher: Mutex<PubSocket>,
    loop_handle: JoinHandle<()>,
}

impl ServiceHost {
    /// Bind the ROUTER socket on the call port and the PUB socket on the event port.
    #[instrument(skip_all, fields(transport = %transport))]
    pub async fn bind(transport: &Transport) -> Result<Self, WireError> {
        let mut router = RouterSocket::new();
        router.bind(&transport.rpc_endpoint()).await?;

        let mut publisher = PubSocket::new();
        publisher.bind(&transport.events_endpoint()).await?;
        info!(
            rpc = %transport.rpc_endpoint(),
            events = %transport.events_endpoint(),
            "service host bound"
        );

        let (calls_tx, calls_rx) = mpsc::channel(256);
        let (replies_tx, replies_rx) = mpsc::channel(256);
        let loop_handle = tokio::spawn(Self::router_loop(router, calls_tx, replies_rx));

        Ok(Self {
            transport: transport.clone(),
            calls_rx: Mutex::new(calls_rx),
            replies_tx,
            publisher: Mutex::new(publisher),
            loop_handle,
        })
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    async fn router_loop(
        mut router: RouterSocket,
        calls_tx: mpsc::Sender<IncomingCall>,
        mut replies_rx: mpsc::Receiver<ZmqMessage>,
    ) {
        loop {
            tokio::select! {
                Some(frames) = replies_rx.recv() => {
                    if let Err(e) = router.send(frames).await {
                        warn!(error = %e, "ROUTER send failed");
                    }
                }
                result = router.recv() => {
                    let frames = match result {
                        Ok(frames) => frames,
                        Err(e) => {
                            debug!(error = %e, "ROUTER recv loop ending");
                            break;
                        }
                    };
                    match Self::decode_call(&frames) {
                        Ok(call) => {
                            if calls_tx.send(call).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!(error = %e, "dropping malformed call"),
                    }
                }
            }
        }
    }

    fn decode_call(frames: &ZmqMessage) -> Result<IncomingCall, WireError> {
        let mut parts = frames.iter().map(|f| f.as_ref());
        let identity = parts
            .next()
            .ok_or_else(|| WireError::Framing("missing identity frame".into()))?
            .to_vec();
        let request = Message::from_frames(parts)?;
        debug!(procedure = %request.topic, correlation_id = %request.correlation_id, "received call");
        Ok(IncomingCall { identity, request })
    }

    /// Wait for the next call from any connected client.
    pub async fn next_call(&self) -> Result<IncomingCall, WireError> {
        self.calls_rx.lock().await.recv().await.ok_or(WireError::Closed)
    }

    /// Answer a previously received call.
    pub async fn reply(&self, call: &IncomingCall, outcome: CallOutcome) -> Result<(), WireError> {
        let reply = Message::reply_to(
            &call.request,
            reply_topic(call.procedure()),
            serde_json::to_value(outcome)?,
        );
        let mut frames = ZmqMessage::from(call.identity.clone());
        frames.push_back(reply.topic.as_bytes().to_vec().into());
        frames.push_back(reply.to_bytes()?.into());
        self.replies_tx
            .send(frames)
            .await
            .map_err(|_| WireError::Closed)
    }

    /// Publish an event to every subscriber of `topic`.
    pub async fn publish(&self, topic: &str, payload: Value) -> Result<(), WireError> {
        let frames = Message::new(topic, payload).to_frames()?;
        self.publisher.lock().await.send(frames).await?;
        debug!(topic, "published event");
        Ok(())
    }
}

impl Drop for ServiceHost {
    fn drop(&mut self) {
        self.loop_handle.abort();
    }
}
