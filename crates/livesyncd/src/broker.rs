//! Request/response on top of a named-message transport.
//!
//! [`Broker::send`] starts listening before the request goes out, so a
//! reply that arrives immediately is not missed. [`Request::expect`]
//! then waits for the first matching reply or the timeout, whichever
//! comes first. The listener is dropped on both paths.
//!
//! # Panic-Free Guarantees
//!
//! A predicate that panics is caught and treated as a non-match.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use livesync_core::SessionError;
use livesync_protocol::{Envelope, MessageName};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::transport::{Transport, TransportError};

/// Wait applied when the caller has no better value.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1_000);

#[derive(Debug, Clone, Error)]
pub enum BrokerError {
    #[error("Expected message \"{expected}\" timed out")]
    Timeout { expected: String },

    #[error("transport closed while waiting for \"{expected}\"")]
    Closed { expected: String },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl BrokerError {
    /// Code carried by timeout errors.
    pub const TIMEOUT_CODE: &'static str = "EEXPECTTIMEOUT";

    pub fn code(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => Self::TIMEOUT_CODE,
            Self::Closed { .. } | Self::Transport(_) => "ETRANSPORT",
        }
    }
}

impl From<BrokerError> for SessionError {
    fn from(err: BrokerError) -> Self {
        SessionError::new(err.code(), err.to_string())
    }
}

#[derive(Clone)]
pub struct Broker {
    transport: Arc<dyn Transport>,
}

impl Broker {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Sends a request and returns a handle for awaiting its reply.
    pub fn send(&self, name: MessageName, data: Value) -> Request {
        // Listen first so an immediate reply is not lost
        let replies = self.transport.received();
        let send_error = self.transport.send(name.as_str(), data).err();
        Request {
            replies,
            send_error,
        }
    }

    /// Sends a message nobody replies to.
    pub fn notify(&self, name: MessageName, data: Value) -> Result<(), TransportError> {
        self.transport.send(name.as_str(), data)
    }
}

/// A sent request whose reply has not been claimed yet.
#[must_use = "a request does nothing unless its reply is awaited"]
pub struct Request {
    replies: broadcast::Receiver<Envelope>,
    send_error: Option<TransportError>,
}

impl Request {
    /// Waits for the first `expected` message within `wait`.
    pub async fn expect(self, expected: MessageName, wait: Duration) -> Result<Value, BrokerError> {
        self.expect_where(expected, |_| true, wait).await
    }

    /// Waits for the first `expected` message whose payload satisfies
    /// `predicate` within `wait`.
    pub async fn expect_where<P>(
        mut self,
        expected: MessageName,
        predicate: P,
        wait: Duration,
    ) -> Result<Value, BrokerError>
    where
        P: Fn(&Value) -> bool,
    {
        if let Some(err) = self.send_error.take() {
            return Err(err.into());
        }

        let replies = &mut self.replies;
        let matched = async {
            loop {
                match replies.recv().await {
                    Ok(envelope) if envelope.is(expected) => {
                        if accepts(&predicate, &envelope.data) {
                            return Ok(envelope.data);
                        }
                        debug!(expected = %expected, "reply rejected by predicate");
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(expected = %expected, skipped, "reply listener lagged");
                    }
                    Err(RecvError::Closed) => {
                        return Err(BrokerError::Closed {
                            expected: expected.to_string(),
                        })
                    }
                }
            }
        };

        match timeout(wait, matched).await {
            Ok(result) => result,
            Err(_) => {
                debug!(expected = %expected, wait_ms = wait.as_millis() as u64, "expected message timed out");
                Err(BrokerError::Timeout {
                    expected: expected.to_string(),
                })
            }
        }
    }
}

fn accepts<P: Fn(&Value) -> bool>(predicate: &P, data: &Value) -> bool {
    catch_unwind(AssertUnwindSafe(|| predicate(data))).unwrap_or(false)
}
