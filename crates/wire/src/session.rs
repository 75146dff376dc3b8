//! ZeroMQ client session: DEALER for calls, SUB for events.
//!
//! ## Framing (zeromq-rs 0.4)
//!
//! - DEALER sends `[procedure, envelope]`, receives `[procedure.reply, envelope]`
//! - SUB receives `[topic, envelope]`
//!
//! The DEALER socket is owned by a background task that multiplexes outbound
//! calls (received over an mpsc channel), inbound replies (routed to callers
//! by `correlation_id`) and socket monitor events. When that task ends the
//! session is closed: pending calls fail and [`Session::closed`] resolves.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use zeromq::prelude::*;
use zeromq::{DealerSocket, SocketEvent, SubSocket, ZmqMessage};

use crate::error::WireError;
use crate::message::Message;
use crate::protocol::{CallOutcome, Event};
use crate::traits::{Connector, Session};
use crate::transport::Transport;

type PendingCalls = Arc<Mutex<HashMap<Uuid, oneshot::Sender<Message>>>>;

/// A [`Session`] over ZeroMQ sockets.
pub struct ZmqSession {
    transport: Transport,
    send_tx: mpsc::Sender<ZmqMessage>,
    pending: PendingCalls,
    /// Connected on the first `subscribe`; services that only answer calls
    /// never bind an event port.
    subscriber: Mutex<Option<SubSocket>>,
    shutdown: Arc<Notify>,
    closed_rx: watch::Receiver<bool>,
    loop_handle: JoinHandle<()>,
}

impl ZmqSession {
    /// Connect a DEALER socket to the service's call endpoint.
    ///
    /// Fails if the service is not reachable right now.
    #[instrument(skip_all, fields(address = %address))]
    pub async fn connect(address: &str) -> Result<Self, WireError> {
        let transport = Transport::parse(address)?;
        let mut socket = DealerSocket::new();
        let monitor = socket.monitor();
        let endpoint = transport.rpc_endpoint();
        debug!(endpoint = %endpoint, "connecting DEALER socket");
        socket.connect(&endpoint).await?;

        let pending: PendingCalls = Arc::new(Mutex::new(HashMap::new()));
        let (send_tx, send_rx) = mpsc::channel::<ZmqMessage>(256);
        let (closed_tx, closed_rx) = watch::channel(false);
        let shutdown = Arc::new(Notify::new());

        let loop_handle = tokio::spawn(Self::event_loop(
            socket,
            monitor,
            send_rx,
            Arc::clone(&pending),
            Arc::clone(&shutdown),
            closed_tx,
        ));

        info!(endpoint = %endpoint, "session established");
        Ok(Self {
            transport,
            send_tx,
            pending,
            subscriber: Mutex::new(None),
            shutdown,
            closed_rx,
            loop_handle,
        })
    }

    /// The service this session talks to.
    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    async fn event_loop(
        mut socket: DealerSocket,
        mut monitor: futures::channel::mpsc::Receiver<SocketEvent>,
        mut send_rx: mpsc::Receiver<ZmqMessage>,
        pending: PendingCalls,
        shutdown: Arc<Notify>,
        closed_tx: watch::Sender<bool>,
    ) {
        loop {
            tokio::select! {
                Some(frames) = send_rx.recv() => {
                    if let Err(e) = socket.send(frames).await {
                        warn!(error = %e, "DEALER send failed, closing session");
                        break;
                    }
                }
                result = socket.recv() => {
                    match result {
                        Ok(frames) => Self::dispatch_reply(&pending, frames).await,
                        Err(e) => {
                            debug!(error = %e, "DEALER recv loop ending");
                            break;
                        }
                    }
                }
                Some(event) = monitor.next() => {
                    if matches!(event, SocketEvent::Disconnected(_) | SocketEvent::Closed) {
                        warn!("peer went away, closing session");
                        break;
                    }
                }
                _ = shutdown.notified() => {
                    debug!("session close requested");
                    break;
                }
            }
        }

        // Dropping the senders fails every pending call.
        pending.lock().await.clear();
        let _ = closed_tx.send(true);
    }

    /// Route a reply to the caller waiting on its correlation ID.
    async fn dispatch_reply(pending: &Mutex<HashMap<Uuid, oneshot::Sender<Message>>>, frames: ZmqMessage) {
        let message = match Message::from_frames(frames.iter().map(|f| f.as_ref())) {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "failed to decode reply");
                return;
            }
        };

        let cid = message.correlation_id;
        match pending.lock().await.remove(&cid) {
            Some(tx) => {
                let _ = tx.send(message);
            }
            None => debug!(correlation_id = %cid, "reply for unknown call"),
        }
    }

    fn is_closed(&self) -> bool {
        *self.closed_rx.borrow()
    }
}

#[async_trait]
impl Session for ZmqSession {
    async fn call(&self, procedure: &str, args: Vec<Value>) -> Result<Value, WireError> {
        if self.is_closed() {
            return Err(WireError::Closed);
        }

        let request = Message::new(procedure, Value::Array(args));
        let cid = request.correlation_id;
        let frames = request.to_frames()?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(cid, tx);

        if self.send_tx.send(frames).await.is_err() {
            self.pending.lock().await.remove(&cid);
            return Err(WireError::Closed);
        }
        debug!(correlation_id = %cid, procedure, "sent call");

        let reply = tokio::select! {
            reply = rx => reply.map_err(|_| WireError::Closed)?,
            _ = self.closed() => {
                self.pending.lock().await.remove(&cid);
                return Err(WireError::Closed);
            }
        };

        match reply.decode::<CallOutcome>()? {
            CallOutcome::Ok(value) => Ok(value),
            CallOutcome::Err(message) => Err(WireError::Remote {
                procedure: procedure.to_string(),
                message,
            }),
        }
    }

    async fn subscribe(&self, topic: &str) -> Result<(), WireError> {
        let mut guard = self.subscriber.lock().await;
        if guard.is_none() {
            let mut socket = SubSocket::new();
            let endpoint = self.transport.events_endpoint();
            debug!(endpoint = %endpoint, "connecting SUB socket");
            socket.connect(&endpoint).await?;
            *guard = Some(socket);
        }
        let Some(socket) = guard.as_mut() else {
            return Err(WireError::Closed);
        };
        socket.subscribe(topic).await?;
        info!(topic, "subscribed");
        Ok(())
    }

    async fn next_event(&self) -> Result<Event, WireError> {
        let mut guard = self.subscriber.lock().await;
        let socket = guard
            .as_mut()
            .ok_or_else(|| WireError::Framing("no subscriptions on this session".into()))?;

        let mut closed = self.closed_rx.clone();
        tokio::select! {
            result = socket.recv() => {
                let frames = result?;
                let message = Message::from_frames(frames.iter().map(|f| f.as_ref()))?;
                debug!(topic = %message.topic, "received event");
                Ok(Event {
                    topic: message.topic,
                    payload: message.payload,
                })
            }
            _ = closed.wait_for(|c| *c) => Err(WireError::Closed),
        }
    }

    async fn closed(&self) {
        let mut rx = self.closed_rx.clone();
        // A dropped sender means the loop is gone, which is also closed.
        let _ = rx.wait_for(|c| *c).await;
    }

    async fn close(&self) {
        self.shutdown.notify_one();
        self.closed().await;
    }
}

impl Drop for ZmqSession {
    fn drop(&mut self) {
        self.loop_handle.abort();
    }
}

/// [`Connector`] that opens [`ZmqSession`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZmqConnector;

#[async_trait]
impl Connector for ZmqConnector {
    async fn connect(&self, address: &str) -> Result<Arc<dyn Session>, WireError> {
        Ok(Arc::new(ZmqSession::connect(address).await?))
    }
}
