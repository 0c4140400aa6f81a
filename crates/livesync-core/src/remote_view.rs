//! Remote view tunnel sessions, keyed by the local origin they expose.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::immutable::Keyed;

/// Lifecycle state of one remote view session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Pending,
    #[default]
    Connected,
    Error,
}

/// Normalized failure attached to a session in the `error` state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionError {
    pub code: String,
    pub message: String,
}

impl SessionError {
    /// Code used when the remote side reports an error without one.
    pub const DEFAULT_CODE: &'static str = "ERVERROR";

    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// An error reported by the remote side as plain text.
    pub fn remote(message: impl Into<String>) -> Self {
        Self::new(Self::DEFAULT_CODE, message)
    }
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for SessionError {}

/// One remote view session record.
///
/// Fields the remote side sends beyond the known ones are kept in `extra`
/// so they survive round trips to observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteViewSession {
    pub origin: String,
    #[serde(default)]
    pub state: ConnectionState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_site: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_url: Option<String>,
    /// Expiry as milliseconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Arc<SessionError>>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl RemoteViewSession {
    fn with_state(origin: impl Into<String>, state: ConnectionState) -> Self {
        Self {
            origin: origin.into(),
            state,
            local_site: None,
            public_id: None,
            connect_url: None,
            expires_at: None,
            error: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn pending(origin: impl Into<String>) -> Self {
        Self::with_state(origin, ConnectionState::Pending)
    }

    pub fn errored(origin: impl Into<String>, error: Arc<SessionError>) -> Self {
        let mut session = Self::with_state(origin, ConnectionState::Error);
        session.error = Some(error);
        session
    }

    /// Marks the record as connected and drops any stale error.
    #[must_use]
    pub fn connected(mut self) -> Self {
        self.state = ConnectionState::Connected;
        self.error = None;
        self
    }

    pub fn is_pending(&self) -> bool {
        self.state == ConnectionState::Pending
    }
}

/// Remote view service state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteViewState {
    /// Whether the remote view service answered the last probe.
    pub connected: bool,
    pub sessions: Keyed<Arc<RemoteViewSession>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RemoteViewAction {
    /// Records the service status; a disconnect drops every session.
    SetStatus { connected: bool },
    /// Publishes a pending record unless one is already pending.
    Begin { origin: String },
    /// Replaces the record for `session.origin`.
    UpdateSession { session: RemoteViewSession },
    /// Upserts every listed session and drops the ones not listed.
    UpdateSessionList { sessions: Vec<RemoteViewSession> },
    RemoveSession { origin: String },
    /// Removes an error record only if it still carries exactly `error`.
    ExpireErrored {
        origin: String,
        error: Arc<SessionError>,
    },
}

impl RemoteViewAction {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SetStatus { .. } => "rv-set-status",
            Self::Begin { .. } => "rv-begin",
            Self::UpdateSession { .. } => "rv-update-session",
            Self::UpdateSessionList { .. } => "rv-update-session-list",
            Self::RemoveSession { .. } => "rv-remove-session",
            Self::ExpireErrored { .. } => "rv-expire-errored",
        }
    }
}

pub fn reduce(state: &Arc<RemoteViewState>, action: &RemoteViewAction) -> Arc<RemoteViewState> {
    match action {
        RemoteViewAction::SetStatus { connected } => {
            let sessions = if *connected {
                state.sessions.clone()
            } else {
                Keyed::new()
            };
            if state.connected == *connected && sessions.len() == state.sessions.len() {
                return Arc::clone(state);
            }
            info!(connected, "remote view status changed");
            Arc::new(RemoteViewState {
                connected: *connected,
                sessions,
            })
        }
        RemoteViewAction::Begin { origin } => {
            if state.sessions.get(origin).is_some_and(|s| s.is_pending()) {
                debug!(origin = %origin, "session already pending");
                return Arc::clone(state);
            }
            with_sessions(
                state,
                state
                    .sessions
                    .set(origin.as_str(), Arc::new(RemoteViewSession::pending(origin.as_str()))),
            )
        }
        RemoteViewAction::UpdateSession { session } => with_sessions(
            state,
            state
                .sessions
                .set(session.origin.as_str(), Arc::new(session.clone())),
        ),
        RemoteViewAction::UpdateSessionList { sessions } => {
            let mut next = state.sessions.clone();
            next.retain(|origin, _| sessions.iter().any(|s| s.origin == origin));
            for session in sessions {
                if next
                    .get(&session.origin)
                    .is_some_and(|current| **current == *session)
                {
                    continue;
                }
                next.insert(session.origin.as_str(), Arc::new(session.clone()));
            }
            with_sessions(state, next)
        }
        RemoteViewAction::RemoveSession { origin } => {
            with_sessions(state, state.sessions.delete(origin))
        }
        RemoteViewAction::ExpireErrored { origin, error } => {
            let expired = state.sessions.get(origin).is_some_and(|session| {
                session.state == ConnectionState::Error
                    && session
                        .error
                        .as_ref()
                        .is_some_and(|current| Arc::ptr_eq(current, error))
            });
            if !expired {
                return Arc::clone(state);
            }
            debug!(origin = %origin, "errored session expired");
            with_sessions(state, state.sessions.delete(origin))
        }
    }
}

fn with_sessions(
    state: &Arc<RemoteViewState>,
    sessions: Keyed<Arc<RemoteViewSession>>,
) -> Arc<RemoteViewState> {
    if sessions.ptr_eq(&state.sessions) {
        return Arc::clone(state);
    }
    Arc::new(RemoteViewState {
        connected: state.connected,
        sessions,
    })
}
