//! Message transport seam.
//!
//! The runtime never talks to a socket directly. It sends named messages
//! through a [`Transport`] and reads every inbound message from its
//! receive channel. [`LocalTransport`] is the in-process implementation
//! used by the replay binary and by tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use livesync_protocol::Envelope;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{trace, warn};

#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("transport closed")]
    Closed,
}

/// Named-message transport.
pub trait Transport: Send + Sync {
    /// Sends one message to the far side.
    fn send(&self, name: &str, data: Value) -> Result<(), TransportError>;

    /// Every inbound message, regardless of name.
    ///
    /// Each call returns an independent receiver that sees messages
    /// arriving after the call.
    fn received(&self) -> broadcast::Receiver<Envelope>;

    /// Inbound messages whose name is one of the space-separated `names`.
    fn subscribe(&self, names: &str) -> Subscription {
        Subscription::new(names, self.received())
    }
}

/// Receiver filtered to a set of message names.
pub struct Subscription {
    names: HashSet<String>,
    receiver: broadcast::Receiver<Envelope>,
}

impl Subscription {
    pub fn new(names: &str, receiver: broadcast::Receiver<Envelope>) -> Self {
        Self {
            names: names.split_whitespace().map(str::to_string).collect(),
            receiver,
        }
    }

    /// Next matching message; `None` once the transport is gone.
    pub async fn recv(&mut self) -> Option<Envelope> {
        loop {
            match self.receiver.recv().await {
                Ok(envelope) if self.names.contains(&envelope.name) => return Some(envelope),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "subscription lagged, messages dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

// ============================================================================
// Local Transport
// ============================================================================

/// In-process transport.
///
/// [`LocalTransport::deliver`] injects a message as if the far side had
/// sent it; [`LocalTransport::outgoing`] observes what the runtime sends.
pub struct LocalTransport {
    inbound: broadcast::Sender<Envelope>,
    outbound: broadcast::Sender<Envelope>,
    closed: AtomicBool,
}

impl LocalTransport {
    pub fn new(capacity: usize) -> Self {
        let (inbound, _) = broadcast::channel(capacity.max(1));
        let (outbound, _) = broadcast::channel(capacity.max(1));
        Self {
            inbound,
            outbound,
            closed: AtomicBool::new(false),
        }
    }

    /// Delivers a message to local listeners.
    pub fn deliver(&self, name: &str, data: Value) {
        trace!(name, "inbound");
        // No listeners is fine
        let _ = self.inbound.send(Envelope::new(name, data));
    }

    /// Messages the runtime sends, from now on.
    pub fn outgoing(&self) -> broadcast::Receiver<Envelope> {
        self.outbound.subscribe()
    }

    /// Rejects further sends.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl Transport for LocalTransport {
    fn send(&self, name: &str, data: Value) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        trace!(name, "outbound");
        // Nobody on the far side is not a send failure
        let _ = self.outbound.send(Envelope::new(name, data));
        Ok(())
    }

    fn received(&self) -> broadcast::Receiver<Envelope> {
        self.inbound.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_named_subscription_filters() {
        let transport = LocalTransport::new(16);
        let mut sub = transport.subscribe("open  close");

        transport.deliver("rv-pong", Value::Null);
        transport.deliver("close", json!({"code": 1000}));

        let envelope = sub.recv().await.unwrap();
        assert_eq!(envelope.name, "close");
        assert_eq!(envelope.data["code"], 1000);
    }

    #[tokio::test]
    async fn test_send_and_close() {
        let transport = LocalTransport::new(16);
        let mut outgoing = transport.outgoing();

        transport.send("rv-ping", Value::Null).unwrap();
        assert_eq!(outgoing.recv().await.unwrap().name, "rv-ping");

        transport.close();
        assert!(matches!(
            transport.send("rv-ping", Value::Null),
            Err(TransportError::Closed)
        ));
    }
}
