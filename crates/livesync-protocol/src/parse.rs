//! Parsing inbound payloads into domain types.
//!
//! Payloads come from editors and from the remote view service. Fields are
//! optional wherever peers are known to omit them.

use std::sync::Arc;

use livesync_core::{
    ConnectionState, EditorAction, EditorId, RemoteViewSession, SessionError,
};
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::message::{Envelope, MessageName};

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Malformed {name} payload: {source}")]
    Malformed {
        name: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Editor announcement (`editor-connect`, `editor-disconnect`, `editor-files`).
#[derive(Debug, Clone, Deserialize)]
pub struct RawEditor {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub files: Vec<String>,
}

/// Error as reported by the remote view service: either plain text or
/// an object with optional code and message.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawError {
    Text(String),
    Detail {
        #[serde(default)]
        code: Option<String>,
        #[serde(default)]
        message: Option<String>,
    },
}

impl From<RawError> for SessionError {
    fn from(raw: RawError) -> Self {
        match raw {
            RawError::Text(message) => SessionError::remote(message),
            RawError::Detail { code, message } => SessionError::new(
                code.unwrap_or_else(|| SessionError::DEFAULT_CODE.to_string()),
                message.unwrap_or_default(),
            ),
        }
    }
}

/// Session record from `rv-session` / `rv-session-list`.
///
/// A missing `state` means connected.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSessionRecord {
    pub origin: String,
    #[serde(default)]
    pub state: Option<ConnectionState>,
    #[serde(default)]
    pub local_site: Option<String>,
    #[serde(default)]
    pub public_id: Option<String>,
    #[serde(default)]
    pub connect_url: Option<String>,
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub error: Option<RawError>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RawSessionRecord {
    pub fn into_session(self) -> RemoteViewSession {
        let error = self.error.map(|raw| Arc::new(SessionError::from(raw)));
        let state = match (self.state, &error) {
            (Some(state), _) => state,
            (None, Some(_)) => ConnectionState::Error,
            (None, None) => ConnectionState::Connected,
        };
        RemoteViewSession {
            origin: self.origin,
            state,
            local_site: self.local_site,
            public_id: self.public_id,
            connect_url: self.connect_url,
            expires_at: self.expires_at,
            error,
            extra: self.extra,
        }
    }
}

/// Inbound messages the runtime reacts to.
#[derive(Debug, Clone)]
pub enum Inbound {
    EditorConnect(RawEditor),
    EditorDisconnect(RawEditor),
    EditorFiles(RawEditor),
    SessionList(Vec<RemoteViewSession>),
    SessionClosed { origin: String },
    /// The remote view service asks for a liveness probe.
    Connection,
    Open,
    ClientConnect,
    ClientDisconnect,
    Close,
}

impl Inbound {
    /// Parses one envelope.
    ///
    /// Returns `Ok(None)` for names the runtime does not react to here
    /// (replies such as `rv-pong` are consumed by request handles).
    pub fn parse(envelope: &Envelope) -> Result<Option<Self>, ProtocolError> {
        let Some(name) = MessageName::parse(&envelope.name) else {
            return Ok(None);
        };
        let inbound = match name {
            MessageName::EditorConnect => Self::EditorConnect(payload(name, &envelope.data)?),
            MessageName::EditorDisconnect => {
                Self::EditorDisconnect(payload(name, &envelope.data)?)
            }
            MessageName::EditorFiles => Self::EditorFiles(payload(name, &envelope.data)?),
            MessageName::RvSessionList => Self::SessionList(session_list(&envelope.data)?),
            MessageName::RvSessionClosed => {
                #[derive(Deserialize)]
                struct Closed {
                    origin: String,
                }
                let closed: Closed = payload(name, &envelope.data)?;
                Self::SessionClosed {
                    origin: closed.origin,
                }
            }
            MessageName::RvConnection => Self::Connection,
            MessageName::Open => Self::Open,
            MessageName::ClientConnect => Self::ClientConnect,
            MessageName::ClientDisconnect => Self::ClientDisconnect,
            MessageName::Close => Self::Close,
            MessageName::RvPing
            | MessageName::RvPong
            | MessageName::RvCreateSession
            | MessageName::RvSession
            | MessageName::RvCloseSession
            | MessageName::RvGetSessionList => return Ok(None),
        };
        Ok(Some(inbound))
    }

    /// The editor registry action this message maps to, if any.
    pub fn editor_action(&self) -> Option<EditorAction> {
        match self {
            Self::EditorConnect(raw) => Some(EditorAction::Connect {
                id: EditorId::new(raw.id.as_str()),
                name: raw.name.clone().unwrap_or_default(),
                files: raw.files.clone(),
            }),
            Self::EditorDisconnect(raw) => Some(EditorAction::Disconnect {
                id: EditorId::new(raw.id.as_str()),
            }),
            Self::EditorFiles(raw) => Some(EditorAction::UpdateFiles {
                id: EditorId::new(raw.id.as_str()),
                files: raw.files.clone(),
            }),
            _ => None,
        }
    }
}

/// Parses an `rv-session` reply.
pub fn session_reply(data: &Value) -> Result<RemoteViewSession, ProtocolError> {
    let raw: RawSessionRecord = payload(MessageName::RvSession, data)?;
    Ok(raw.into_session())
}

/// Parses an `rv-session-list` payload: a bare array or `{ "sessions": [...] }`.
pub fn session_list(data: &Value) -> Result<Vec<RemoteViewSession>, ProtocolError> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawList {
        Bare(Vec<RawSessionRecord>),
        Wrapped { sessions: Vec<RawSessionRecord> },
    }

    let list = match payload(MessageName::RvSessionList, data)? {
        RawList::Bare(list) | RawList::Wrapped { sessions: list } => list,
    };
    Ok(list.into_iter().map(RawSessionRecord::into_session).collect())
}

fn payload<T: for<'de> Deserialize<'de>>(name: MessageName, data: &Value) -> Result<T, ProtocolError> {
    T::deserialize(data).map_err(|source| ProtocolError::Malformed {
        name: name.as_str(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_editor_connect() {
        let envelope = Envelope::new(
            "editor-connect",
            json!({"id": "st3", "name": "Sublime Text", "files": ["/a.css"]}),
        );
        let inbound = Inbound::parse(&envelope).unwrap().unwrap();
        match inbound.editor_action() {
            Some(EditorAction::Connect { id, name, files }) => {
                assert_eq!(id.as_str(), "st3");
                assert_eq!(name, "Sublime Text");
                assert_eq!(files, vec!["/a.css".to_string()]);
            }
            other => panic!("unexpected action: {other:?}"),
        }
    }

    #[test]
    fn test_missing_state_defaults_to_connected() {
        let session = session_reply(&json!({
            "origin": "http://localhost:8080",
            "publicId": "abc",
            "connectUrl": "https://rv.example/abc",
            "expiresAt": 1700000000000i64
        }))
        .unwrap();
        assert_eq!(session.state, ConnectionState::Connected);
        assert_eq!(session.public_id.as_deref(), Some("abc"));
        assert_eq!(session.expires_at, Some(1_700_000_000_000));
    }

    #[test]
    fn test_explicit_state_is_kept() {
        let session = session_reply(&json!({"origin": "http://a", "state": "pending"})).unwrap();
        assert_eq!(session.state, ConnectionState::Pending);
    }

    #[test]
    fn test_error_normalization() {
        let text = session_reply(&json!({"origin": "http://a", "error": "quota exceeded"})).unwrap();
        let error = text.error.unwrap();
        assert_eq!(error.code, "ERVERROR");
        assert_eq!(error.message, "quota exceeded");
        assert_eq!(text.state, ConnectionState::Error);

        let detail = session_reply(&json!({"origin": "http://a", "error": {"code": "EAUTH", "message": "no"}}))
            .unwrap();
        assert_eq!(detail.error.unwrap().code, "EAUTH");

        let bare = session_reply(&json!({"origin": "http://a", "error": {"message": "x"}})).unwrap();
        assert_eq!(bare.error.unwrap().code, "ERVERROR");
    }

    #[test]
    fn test_session_list_shapes() {
        let bare = session_list(&json!([{"origin": "http://a"}, {"origin": "http://b"}])).unwrap();
        assert_eq!(bare.len(), 2);

        let wrapped = session_list(&json!({"sessions": [{"origin": "http://a"}]})).unwrap();
        assert_eq!(wrapped.len(), 1);
    }

    #[test]
    fn test_malformed_payload() {
        let envelope = Envelope::new("rv-session-closed", json!({"nope": true}));
        assert!(matches!(
            Inbound::parse(&envelope),
            Err(ProtocolError::Malformed { name: "rv-session-closed", .. })
        ));
    }

    #[test]
    fn test_replies_are_not_inbound_events() {
        let envelope = Envelope::new("rv-pong", Value::Null);
        assert!(Inbound::parse(&envelope).unwrap().is_none());
        let unknown = Envelope::new("something-else", Value::Null);
        assert!(Inbound::parse(&unknown).unwrap().is_none());
    }
}
