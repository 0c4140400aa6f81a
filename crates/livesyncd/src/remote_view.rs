//! Remote view session lifecycle.
//!
//! ```text
//!            create                 rv-session ok
//!   (none) ─────────▶ pending ────────────────────▶ connected
//!                        │
//!                        │ error / timeout
//!                        ▼
//!                      error ──(auto-expiry)──▶ (removed)
//! ```
//!
//! Any state is removed by an explicit close, by `rv-session-closed`, or
//! by a session list that no longer names it. The store is the single
//! source of truth; this module only issues requests and dispatches the
//! resulting transitions.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use livesync_core::{
    DomainError, RemoteViewAction, RemoteViewSession, SessionError,
};
use livesync_protocol::{session_reply, Envelope, MessageName};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::broker::Broker;
use crate::config::Options;
use crate::store::{StoreError, StoreHandle};

#[derive(Debug, Error)]
pub enum RemoteViewError {
    #[error(transparent)]
    Invalid(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Hook that wraps the remote creation call.
///
/// Receives the continuation that performs the actual request and the
/// payload without the delegate. It decides when, and whether, to call
/// the continuation, for example after refreshing a credential.
#[async_trait]
pub trait SessionDelegate: Send + Sync {
    async fn create(
        &self,
        proceed: Continuation,
        payload: Map<String, Value>,
    ) -> Result<RemoteViewSession, SessionError>;
}

/// Performs `rv-create-session` and waits for the matching `rv-session`.
#[derive(Clone)]
pub struct Continuation {
    broker: Broker,
    wait: Duration,
}

impl Continuation {
    pub async fn run(&self, payload: Map<String, Value>) -> Result<RemoteViewSession, SessionError> {
        let origin = payload
            .get("origin")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let reply = self
            .broker
            .send(MessageName::RvCreateSession, Value::Object(payload))
            .expect_where(
                MessageName::RvSession,
                |data| data.get("origin").and_then(Value::as_str) == Some(origin.as_str()),
                self.wait,
            )
            .await?;

        let session = session_reply(&reply)
            .map_err(|err| SessionError::new("EPROTOCOL", err.to_string()))?;
        if let Some(err) = &session.error {
            return Err(err.as_ref().clone());
        }
        Ok(session.connected())
    }
}

/// Input to [`RemoteView::create_session`].
pub struct CreateSessionRequest {
    payload: Map<String, Value>,
    delegate: Option<Arc<dyn SessionDelegate>>,
}

impl CreateSessionRequest {
    /// Wraps a creation payload; non-object payloads become empty.
    pub fn new(payload: Value) -> Self {
        let payload = match payload {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            payload,
            delegate: None,
        }
    }

    #[must_use]
    pub fn with_delegate(mut self, delegate: Arc<dyn SessionDelegate>) -> Self {
        self.delegate = Some(delegate);
        self
    }

    pub fn origin(&self) -> Option<&str> {
        self.payload
            .get("origin")
            .and_then(Value::as_str)
            .filter(|origin| !origin.is_empty())
    }
}

#[derive(Clone)]
pub struct RemoteView {
    store: StoreHandle,
    broker: Broker,
    request_timeout: Duration,
    create_timeout: Duration,
    auto_remove_error: Option<Duration>,
}

impl RemoteView {
    pub fn new(store: StoreHandle, broker: Broker, options: &Options) -> Self {
        Self {
            store,
            broker,
            request_timeout: options.request_timeout(),
            create_timeout: options.create_session_timeout(),
            auto_remove_error: options.auto_remove_error(),
        }
    }

    /// Starts creating a session for `request.origin()`.
    ///
    /// Validation happens before anything is dispatched. Returns `None`
    /// when a session for the origin is already pending; otherwise the
    /// pending state is published and the returned task drives the rest.
    ///
    /// # Errors
    ///
    /// - `RemoteViewError::Invalid` if the payload has no origin
    /// - `RemoteViewError::Store` if the store has shut down
    pub async fn create_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<Option<JoinHandle<()>>, RemoteViewError> {
        let origin = request
            .origin()
            .ok_or(DomainError::MissingOrigin)?
            .to_string();

        let begun = self
            .store
            .dispatch(RemoteViewAction::Begin {
                origin: origin.clone(),
            })
            .await?;
        if !begun.changed {
            debug!(origin = %origin, "create ignored, session already pending");
            return Ok(None);
        }

        info!(origin = %origin, "creating remote view session");
        let machine = self.clone();
        Ok(Some(tokio::spawn(async move {
            machine.complete(origin, request).await;
        })))
    }

    async fn complete(&self, origin: String, request: CreateSessionRequest) {
        let CreateSessionRequest {
            mut payload,
            delegate,
        } = request;
        payload.remove("delegate");

        let proceed = Continuation {
            broker: self.broker.clone(),
            wait: self.create_timeout,
        };
        let result = match delegate {
            Some(delegate) => delegate.create(proceed, payload).await,
            None => proceed.run(payload).await,
        };

        match result {
            Ok(mut session) => {
                session.origin = origin.clone();
                info!(origin = %origin, public_id = ?session.public_id, "remote view session connected");
                self.apply(RemoteViewAction::UpdateSession { session }).await;
            }
            Err(err) => {
                warn!(origin = %origin, code = %err.code, message = %err.message, "remote view session failed");
                let err = Arc::new(err);
                self.apply(RemoteViewAction::UpdateSession {
                    session: RemoteViewSession::errored(origin.as_str(), Arc::clone(&err)),
                })
                .await;

                if let Some(delay) = self.auto_remove_error {
                    tokio::time::sleep(delay).await;
                    self.apply(RemoteViewAction::ExpireErrored { origin, error: err })
                        .await;
                }
            }
        }
    }

    /// Removes the session locally and tells the far side, best effort.
    pub async fn close_session(&self, origin: &str) -> Result<(), StoreError> {
        self.store
            .dispatch(RemoteViewAction::RemoveSession {
                origin: origin.to_string(),
            })
            .await?;

        let close = Envelope::close_session(origin);
        if let Err(err) = self.broker.notify(MessageName::RvCloseSession, close.data) {
            warn!(origin, error = %err, "close notice not sent");
        }
        Ok(())
    }

    /// Pings the remote view service and records whether it answered.
    pub async fn check_connection(&self) -> Result<bool, StoreError> {
        let connected = self
            .broker
            .send(MessageName::RvPing, Value::Null)
            .expect(MessageName::RvPong, self.request_timeout)
            .await
            .is_ok();
        debug!(connected, "remote view probe finished");

        self.store
            .dispatch(RemoteViewAction::SetStatus { connected })
            .await?;
        Ok(connected)
    }

    /// Probes the service and, if it answered, asks for the session list.
    ///
    /// The list itself arrives as `rv-session-list` and is applied by
    /// [`RemoteView::reconcile`].
    pub async fn request_session_list(&self) -> Result<bool, StoreError> {
        if !self.check_connection().await? {
            return Ok(false);
        }
        if let Err(err) = self.broker.notify(MessageName::RvGetSessionList, Value::Null) {
            warn!(error = %err, "session list request not sent");
            return Ok(false);
        }
        Ok(true)
    }

    /// Replaces the session collection with `sessions`.
    pub async fn reconcile(&self, sessions: Vec<RemoteViewSession>) -> Result<(), StoreError> {
        debug!(count = sessions.len(), "reconciling remote view sessions");
        self.store
            .dispatch(RemoteViewAction::UpdateSessionList { sessions })
            .await?;
        Ok(())
    }

    /// Applies an unsolicited `rv-session-closed`.
    pub async fn session_closed(&self, origin: String) -> Result<(), StoreError> {
        self.store
            .dispatch(RemoteViewAction::RemoveSession { origin })
            .await?;
        Ok(())
    }

    /// The transport went away: drop every session.
    pub async fn disconnected(&self) -> Result<(), StoreError> {
        self.store
            .dispatch(RemoteViewAction::SetStatus { connected: false })
            .await?;
        Ok(())
    }

    async fn apply(&self, action: RemoteViewAction) {
        if let Err(err) = self.store.dispatch(action).await {
            error!(error = %err, "remote view transition lost");
        }
    }
}
