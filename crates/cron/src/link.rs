//! [`ConnectionLink`]: a self-healing connection to one remote service.
//!
//! The link owns its session. Whenever the session ends, or a reconnect is
//! requested, the link drops it and dials its current address again,
//! forever, with a fixed pause between failed attempts.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use taktgeber_wire::{Connector, Session};
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, info, warn};

/// Runs every time a link establishes a new session.
#[async_trait]
pub trait LinkHook: Send + Sync {
    async fn on_connected(&self, session: Arc<dyn Session>);
}

/// Requests the link loop reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// Drop the current session (if any) and dial the current address.
    Reconnect,
}

#[derive(Default)]
struct ConnectionState {
    address: Option<String>,
    session: Option<Arc<dyn Session>>,
}

pub struct ConnectionLink {
    name: &'static str,
    connector: Arc<dyn Connector>,
    state: RwLock<ConnectionState>,
    events_tx: mpsc::UnboundedSender<LinkEvent>,
    events_rx: Mutex<mpsc::UnboundedReceiver<LinkEvent>>,
    backoff: Duration,
    hook: Option<Arc<dyn LinkHook>>,
}

impl ConnectionLink {
    /// A link with no address waits until one is set through
    /// [`update_address`](Self::update_address).
    pub fn new(
        name: &'static str,
        connector: Arc<dyn Connector>,
        address: Option<String>,
        backoff: Duration,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            name,
            connector,
            state: RwLock::new(ConnectionState {
                address,
                session: None,
            }),
            events_tx,
            events_rx: Mutex::new(events_rx),
            backoff,
            hook: None,
        }
    }

    pub fn with_hook(mut self, hook: Arc<dyn LinkHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub async fn address(&self) -> Option<String> {
        self.state.read().await.address.clone()
    }

    /// The live session, if connected. Callers get their own handle and
    /// never hold the link's lock while using it.
    pub async fn session(&self) -> Option<Arc<dyn Session>> {
        self.state.read().await.session.clone()
    }

    pub async fn is_connected(&self) -> bool {
        self.state.read().await.session.is_some()
    }

    /// Set the target address. Returns `false` if it was already current.
    ///
    /// The running session is left alone; pair with
    /// [`force_reconnect`](Self::force_reconnect) to switch over.
    pub async fn update_address(&self, address: &str) -> bool {
        let mut state = self.state.write().await;
        if state.address.as_deref() == Some(address) {
            return false;
        }
        state.address = Some(address.to_string());
        true
    }

    pub fn force_reconnect(&self) {
        // The receiver lives as long as the link itself.
        let _ = self.events_tx.send(LinkEvent::Reconnect);
    }

    /// Close and forget the current session without touching the loop.
    pub async fn disconnect(&self) {
        let session = self.state.write().await.session.take();
        if let Some(session) = session {
            session.close().await;
            debug!(link = self.name, "session closed");
        }
    }

    /// Keep the link connected. Never returns; abort the task to stop it.
    pub async fn run(&self) {
        let mut events = self.events_rx.lock().await;
        loop {
            let address = match self.address().await {
                Some(address) => address,
                None => {
                    debug!(link = self.name, "no address yet, waiting");
                    if events.recv().await.is_none() {
                        return;
                    }
                    continue;
                }
            };

            // Requests queued before this attempt are satisfied by it.
            while events.try_recv().is_ok() {}

            let session = match self.connector.connect(&address).await {
                Ok(session) => session,
                Err(e) => {
                    warn!(
                        link = self.name,
                        address = %address,
                        error = %e,
                        retry_in_ms = self.backoff.as_millis() as u64,
                        "connect failed, retrying"
                    );
                    tokio::time::sleep(self.backoff).await;
                    continue;
                }
            };

            self.state.write().await.session = Some(Arc::clone(&session));
            info!(link = self.name, address = %address, "connected");

            if let Some(hook) = &self.hook {
                hook.on_connected(Arc::clone(&session)).await;
            }

            tokio::select! {
                _ = session.closed() => {
                    warn!(link = self.name, address = %address, "connection lost, reconnecting");
                }
                Some(event) = events.recv() => {
                    info!(link = self.name, address = %address, ?event, "reconnect requested");
                    session.close().await;
                }
            }

            self.state.write().await.session = None;
        }
    }

    #[cfg(test)]
    pub(crate) async fn install_session(&self, session: Arc<dyn Session>) {
        self.state.write().await.session = Some(session);
    }
}
