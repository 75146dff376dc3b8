//! In-memory sessions and connectors for unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use taktgeber_wire::{Connector, Event, Session, WireError};
use tokio::sync::{mpsc, watch, Semaphore};

/// Poll `$cond` every 10ms for up to 5s; evaluates to whether it held.
macro_rules! eventually {
    ($cond:expr) => {{
        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
        loop {
            if $cond {
                break true;
            }
            if tokio::time::Instant::now() >= deadline {
                break false;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    }};
}
pub(crate) use eventually;

/// Records calls and subscriptions; events are fed in by the test.
pub(crate) struct MockSession {
    calls: Mutex<Vec<(String, Vec<Value>)>>,
    subscriptions: Mutex<Vec<String>>,
    events_tx: mpsc::UnboundedSender<Event>,
    events_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Event>>,
    /// When set, each call waits for a permit before replying.
    gate: Option<Arc<Semaphore>>,
    fail_calls: AtomicBool,
    fail_subscribe: AtomicBool,
    closed_tx: watch::Sender<bool>,
    closed_rx: watch::Receiver<bool>,
}

impl Default for MockSession {
    fn default() -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (closed_tx, closed_rx) = watch::channel(false);
        Self {
            calls: Mutex::new(Vec::new()),
            subscriptions: Mutex::new(Vec::new()),
            events_tx,
            events_rx: tokio::sync::Mutex::new(events_rx),
            gate: None,
            fail_calls: AtomicBool::new(false),
            fail_subscribe: AtomicBool::new(false),
            closed_tx,
            closed_rx,
        }
    }
}

impl MockSession {
    pub(crate) fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    pub(crate) fn failing() -> Self {
        let session = Self::default();
        session.fail_calls.store(true, Ordering::SeqCst);
        session
    }

    /// Every `subscribe` is rejected.
    pub(crate) fn unsubscribable() -> Self {
        let session = Self::default();
        session.fail_subscribe.store(true, Ordering::SeqCst);
        session
    }

    pub(crate) fn calls(&self) -> Vec<(String, Vec<Value>)> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub(crate) fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().unwrap().clone()
    }

    pub(crate) fn push_event(&self, topic: &str, payload: Value) {
        let _ = self.events_tx.send(Event {
            topic: topic.to_string(),
            payload,
        });
    }

    /// Simulate the remote end going away.
    pub(crate) fn drop_connection(&self) {
        let _ = self.closed_tx.send(true);
    }

    pub(crate) fn is_closed(&self) -> bool {
        *self.closed_rx.borrow()
    }
}

#[async_trait]
impl Session for MockSession {
    async fn call(&self, procedure: &str, args: Vec<Value>) -> Result<Value, WireError> {
        if self.is_closed() {
            return Err(WireError::Closed);
        }
        self.calls
            .lock()
            .unwrap()
            .push((procedure.to_string(), args));

        if let Some(gate) = &self.gate {
            tokio::select! {
                permit = gate.acquire() => permit.map_err(|_| WireError::Closed)?.forget(),
                _ = self.closed() => return Err(WireError::Closed),
            }
        }

        if self.fail_calls.load(Ordering::SeqCst) {
            return Err(WireError::Remote {
                procedure: procedure.to_string(),
                message: "rejected".into(),
            });
        }
        Ok(json!({"ok": true}))
    }

    async fn subscribe(&self, topic: &str) -> Result<(), WireError> {
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(WireError::Framing(format!("subscription to {topic} rejected")));
        }
        self.subscriptions.lock().unwrap().push(topic.to_string());
        Ok(())
    }

    async fn next_event(&self) -> Result<Event, WireError> {
        let mut rx = self.events_rx.lock().await;
        tokio::select! {
            event = rx.recv() => event.ok_or(WireError::Closed),
            _ = self.closed() => Err(WireError::Closed),
        }
    }

    async fn closed(&self) {
        let mut rx = self.closed_rx.clone();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    async fn close(&self) {
        let _ = self.closed_tx.send(true);
    }
}

/// Hands out fresh [`MockSession`]s, optionally refusing the first attempts
/// or handing out sessions that reject subscriptions.
#[derive(Default)]
pub(crate) struct MockConnector {
    attempts: Mutex<Vec<String>>,
    failures_left: AtomicUsize,
    unsubscribable_left: AtomicUsize,
    sessions: Mutex<Vec<Arc<MockSession>>>,
}

impl MockConnector {
    pub(crate) fn failing(attempts: usize) -> Self {
        Self {
            failures_left: AtomicUsize::new(attempts),
            ..Self::default()
        }
    }

    /// The first `sessions` sessions reject every subscription.
    pub(crate) fn unsubscribable(sessions: usize) -> Self {
        Self {
            unsubscribable_left: AtomicUsize::new(sessions),
            ..Self::default()
        }
    }

    pub(crate) fn attempts(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }

    pub(crate) fn last_session(&self) -> Option<Arc<MockSession>> {
        self.sessions.lock().unwrap().last().cloned()
    }

    pub(crate) fn sessions(&self) -> Vec<Arc<MockSession>> {
        self.sessions.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, address: &str) -> Result<Arc<dyn Session>, WireError> {
        self.attempts.lock().unwrap().push(address.to_string());
        let refused = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(WireError::Framing(format!("connection refused: {address}")));
        }
        let unsubscribable = self
            .unsubscribable_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        let session = Arc::new(if unsubscribable {
            MockSession::unsubscribable()
        } else {
            MockSession::default()
        });
        self.sessions.lock().unwrap().push(Arc::clone(&session));
        Ok(session)
    }
}
