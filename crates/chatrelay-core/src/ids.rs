//! Type-safe identifiers for streams and sessions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a stream, which doubles as the chat room key.
///
/// Opaque and unvalidated: any string is accepted, including the empty
/// string. Connections that omit the `streamid` handshake parameter all
/// share the empty-key room.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(String);

impl StreamId {
    /// Creates a new StreamId from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the underlying string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for the degenerate room shared by connections without a stream id.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for StreamId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for StreamId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for StreamId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Identifier of one live connection.
///
/// Assigned by the server from a monotonically increasing counter; never
/// reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(u64);

impl SessionId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_id_accepts_empty() {
        let id = StreamId::new("");
        assert!(id.is_empty());
        assert_eq!(id, StreamId::default());
    }

    #[test]
    fn test_stream_id_serializes_as_plain_string() {
        let json = serde_json::to_string(&StreamId::new("abc")).unwrap();
        assert_eq!(json, "\"abc\"");
    }

    #[test]
    fn test_session_id_display() {
        assert_eq!(SessionId::new(7).to_string(), "session-7");
        assert_eq!(serde_json::to_string(&SessionId::new(7)).unwrap(), "7");
    }
}
