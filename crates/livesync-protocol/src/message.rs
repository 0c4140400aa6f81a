//! Message vocabulary exchanged with editors and the remote view service.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Every message name livesync sends or reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageName {
    EditorConnect,
    EditorDisconnect,
    EditorFiles,
    RvPing,
    RvPong,
    RvConnection,
    RvCreateSession,
    RvSession,
    RvCloseSession,
    RvGetSessionList,
    RvSessionList,
    RvSessionClosed,
    /// Transport opened.
    Open,
    ClientConnect,
    ClientDisconnect,
    /// Transport closed.
    Close,
}

impl MessageName {
    pub const ALL: [MessageName; 16] = [
        Self::EditorConnect,
        Self::EditorDisconnect,
        Self::EditorFiles,
        Self::RvPing,
        Self::RvPong,
        Self::RvConnection,
        Self::RvCreateSession,
        Self::RvSession,
        Self::RvCloseSession,
        Self::RvGetSessionList,
        Self::RvSessionList,
        Self::RvSessionClosed,
        Self::Open,
        Self::ClientConnect,
        Self::ClientDisconnect,
        Self::Close,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EditorConnect => "editor-connect",
            Self::EditorDisconnect => "editor-disconnect",
            Self::EditorFiles => "editor-files",
            Self::RvPing => "rv-ping",
            Self::RvPong => "rv-pong",
            Self::RvConnection => "rv-connection",
            Self::RvCreateSession => "rv-create-session",
            Self::RvSession => "rv-session",
            Self::RvCloseSession => "rv-close-session",
            Self::RvGetSessionList => "rv-get-session-list",
            Self::RvSessionList => "rv-session-list",
            Self::RvSessionClosed => "rv-session-closed",
            Self::Open => "open",
            Self::ClientConnect => "client-connect",
            Self::ClientDisconnect => "client-disconnect",
            Self::Close => "close",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|known| known.as_str() == name)
    }

    /// Space-separated list of names, as accepted by named subscriptions.
    pub fn join(names: &[MessageName]) -> String {
        names
            .iter()
            .map(|name| name.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for MessageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message as carried by a transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub name: String,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    pub fn new(name: impl Into<String>, data: Value) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    pub fn is(&self, name: MessageName) -> bool {
        self.name == name.as_str()
    }

    /// Payload of `rv-close-session`.
    pub fn close_session(origin: &str) -> Self {
        Self::new(MessageName::RvCloseSession.as_str(), json!({ "origin": origin }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for name in MessageName::ALL {
            assert_eq!(MessageName::parse(name.as_str()), Some(name));
        }
        assert_eq!(MessageName::parse("rv-unknown"), None);
    }

    #[test]
    fn test_join() {
        assert_eq!(
            MessageName::join(&[MessageName::Open, MessageName::ClientConnect]),
            "open client-connect"
        );
    }

    #[test]
    fn test_envelope_defaults_missing_data() {
        let envelope: Envelope = serde_json::from_str(r#"{"name": "rv-pong"}"#).unwrap();
        assert!(envelope.is(MessageName::RvPong));
        assert_eq!(envelope.data, Value::Null);
    }

    #[test]
    fn test_close_session_payload() {
        let envelope = Envelope::close_session("http://localhost:8080");
        assert_eq!(envelope.name, "rv-close-session");
        assert_eq!(envelope.data["origin"], "http://localhost:8080");
    }
}
