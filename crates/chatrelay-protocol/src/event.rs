//! Event frames exchanged between clients and the daemon.

use std::collections::BTreeMap;

use chatrelay_core::{Ack, ChatMessage, SessionId, SessionInput, StreamId, UserInfo};
use serde::{Deserialize, Serialize};

use crate::version::ProtocolVersion;

/// Handshake query parameter naming the stream to join.
pub const STREAM_ID_PARAM: &str = "streamid";

/// Connection-open parameters sent in the `connect` frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Handshake {
    /// Client protocol version (defaults to the current version)
    #[serde(default)]
    pub protocol_version: ProtocolVersion,

    /// Key-value query parameters, as a browser would put in the URL
    #[serde(default)]
    pub query: BTreeMap<String, serde_json::Value>,
}

impl Handshake {
    /// Creates a handshake for the given stream (or none).
    pub fn new(stream_id: Option<&str>) -> Self {
        let mut query = BTreeMap::new();
        if let Some(id) = stream_id {
            query.insert(STREAM_ID_PARAM.to_string(), serde_json::Value::from(id));
        }
        Self {
            protocol_version: ProtocolVersion::CURRENT,
            query,
        }
    }

    /// Stream to join, taken from the `streamid` query parameter.
    ///
    /// Absent or null maps to the empty stream id. Non-string scalars are
    /// used in their JSON text form, the way a URL query would carry them.
    pub fn stream_id(&self) -> StreamId {
        match self.query.get(STREAM_ID_PARAM) {
            None | Some(serde_json::Value::Null) => StreamId::default(),
            Some(serde_json::Value::String(s)) => StreamId::new(s.as_str()),
            Some(other) => StreamId::new(other.to_string()),
        }
    }
}

/// Frames sent by clients to the daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    /// Connection-open handshake; must be the first frame
    #[serde(rename = "connect")]
    Connect(Handshake),

    #[serde(rename = "signed in")]
    SignedIn(UserInfo),

    #[serde(rename = "signed out")]
    SignedOut,

    /// Chat text to post to the room
    #[serde(rename = "new message")]
    NewMessage(String),

    /// Keepalive
    #[serde(rename = "ping")]
    Ping { seq: u64 },

    /// Client closing gracefully
    #[serde(rename = "disconnect")]
    Disconnect,
}

impl ClientEvent {
    pub fn connect(stream_id: Option<&str>) -> Self {
        Self::Connect(Handshake::new(stream_id))
    }

    pub fn sign_in(userid: impl Into<String>, username: impl Into<String>) -> Self {
        Self::SignedIn(UserInfo::new(userid, username))
    }

    pub fn new_message(text: impl Into<String>) -> Self {
        Self::NewMessage(text.into())
    }

    /// Maps the frame onto a session state machine input.
    ///
    /// Returns `None` for frames handled at the connection level
    /// (handshake and keepalive).
    pub fn into_session_input(self) -> Option<SessionInput> {
        match self {
            Self::SignedIn(info) => Some(SessionInput::SignIn(info)),
            Self::SignedOut => Some(SessionInput::SignOut),
            Self::NewMessage(text) => Some(SessionInput::NewMessage(text)),
            Self::Disconnect => Some(SessionInput::Disconnect),
            Self::Connect(_) | Self::Ping { .. } => None,
        }
    }
}

/// Frames sent by the daemon to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    /// Handshake accepted
    #[serde(rename = "connected")]
    Connected {
        protocol_version: ProtocolVersion,
        session_id: SessionId,
    },

    /// Handshake refused; the connection closes after this frame
    #[serde(rename = "rejected")]
    Rejected {
        reason: String,
        protocol_version: ProtocolVersion,
    },

    /// Number of connections currently in the room
    #[serde(rename = "viewer count")]
    ViewerCount(usize),

    #[serde(rename = "signed in")]
    SignedIn,

    #[serde(rename = "signed out")]
    SignedOut,

    #[serde(rename = "new message")]
    NewMessage(ChatMessage),

    #[serde(rename = "message received")]
    MessageReceived,

    #[serde(rename = "pong")]
    Pong { seq: u64 },
}

impl ServerEvent {
    pub fn connected(session_id: SessionId) -> Self {
        Self::Connected {
            protocol_version: ProtocolVersion::CURRENT,
            session_id,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
            protocol_version: ProtocolVersion::CURRENT,
        }
    }

    /// Wire name of the event, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::Rejected { .. } => "rejected",
            Self::ViewerCount(_) => "viewer count",
            Self::SignedIn => "signed in",
            Self::SignedOut => "signed out",
            Self::NewMessage(_) => "new message",
            Self::MessageReceived => "message received",
            Self::Pong { .. } => "pong",
        }
    }
}

impl From<Ack> for ServerEvent {
    fn from(ack: Ack) -> Self {
        match ack {
            Ack::SignedIn => Self::SignedIn,
            Ack::SignedOut => Self::SignedOut,
            Ack::MessageReceived => Self::MessageReceived,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatrelay_core::{Session, SessionAction};
    use chrono::Utc;

    #[test]
    fn test_client_event_wire_names() {
        let json = serde_json::to_string(&ClientEvent::new_message("hello")).unwrap();
        assert_eq!(json, r#"{"event":"new message","data":"hello"}"#);

        let json = serde_json::to_string(&ClientEvent::sign_in("u1", "alice")).unwrap();
        assert_eq!(
            json,
            r#"{"event":"signed in","data":{"userid":"u1","username":"alice"}}"#
        );
    }

    #[test]
    fn test_unit_events_parse_without_data() {
        let event: ClientEvent = serde_json::from_str(r#"{"event":"signed out"}"#).unwrap();
        assert_eq!(event, ClientEvent::SignedOut);

        let event: ClientEvent = serde_json::from_str(r#"{"event":"disconnect"}"#).unwrap();
        assert_eq!(event, ClientEvent::Disconnect);
    }

    #[test]
    fn test_unknown_event_is_a_parse_error() {
        let result = serde_json::from_str::<ClientEvent>(r#"{"event":"/kick","data":"bob"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_non_string_message_is_a_parse_error() {
        let result = serde_json::from_str::<ClientEvent>(r#"{"event":"new message","data":42}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_handshake_stream_id() {
        let event: ClientEvent =
            serde_json::from_str(r#"{"event":"connect","data":{"query":{"streamid":"abc"}}}"#)
                .unwrap();
        let ClientEvent::Connect(handshake) = event else {
            panic!("expected connect");
        };
        assert_eq!(handshake.stream_id(), StreamId::new("abc"));
        assert_eq!(handshake.protocol_version, ProtocolVersion::CURRENT);
    }

    #[test]
    fn test_handshake_without_stream_id_maps_to_empty() {
        assert!(Handshake::new(None).stream_id().is_empty());

        let handshake: Handshake =
            serde_json::from_str(r#"{"query":{"streamid":null}}"#).unwrap();
        assert!(handshake.stream_id().is_empty());
    }

    #[test]
    fn test_handshake_numeric_stream_id() {
        let handshake: Handshake = serde_json::from_str(r#"{"query":{"streamid":42}}"#).unwrap();
        assert_eq!(handshake.stream_id(), StreamId::new("42"));
    }

    #[test]
    fn test_server_event_wire_names() {
        let json = serde_json::to_string(&ServerEvent::ViewerCount(2)).unwrap();
        assert_eq!(json, r#"{"event":"viewer count","data":2}"#);

        let json = serde_json::to_string(&ServerEvent::MessageReceived).unwrap();
        assert_eq!(json, r#"{"event":"message received"}"#);
        assert_eq!(ServerEvent::MessageReceived.name(), "message received");
    }

    #[test]
    fn test_new_message_payload() {
        let (mut session, _) = Session::connect(StreamId::new("abc"));
        session.apply(SessionInput::SignIn(UserInfo::new("u1", "alice")), Utc::now());
        let actions = session.apply(SessionInput::NewMessage("hello".to_string()), Utc::now());
        let Some(SessionAction::BroadcastMessage(message)) = actions.into_iter().next() else {
            panic!("expected broadcast");
        };

        let value = serde_json::to_value(ServerEvent::NewMessage(message)).unwrap();
        assert_eq!(value["event"], "new message");
        assert_eq!(value["data"]["streamid"], "abc");
        assert_eq!(value["data"]["username"], "alice");
        assert!(value["data"]["timestamp"].is_string());
    }

    #[test]
    fn test_ack_conversion() {
        assert_eq!(ServerEvent::from(Ack::SignedIn), ServerEvent::SignedIn);
        assert_eq!(ServerEvent::from(Ack::SignedOut), ServerEvent::SignedOut);
        assert_eq!(
            ServerEvent::from(Ack::MessageReceived),
            ServerEvent::MessageReceived
        );
    }

    #[test]
    fn test_into_session_input() {
        assert_eq!(
            ClientEvent::new_message("hi").into_session_input(),
            Some(SessionInput::NewMessage("hi".to_string()))
        );
        assert_eq!(ClientEvent::Ping { seq: 1 }.into_session_input(), None);
        assert_eq!(ClientEvent::connect(Some("abc")).into_session_input(), None);
    }
}
