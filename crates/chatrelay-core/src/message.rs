//! User identity and chat message types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::StreamId;

/// Sign-in payload as supplied by the client.
///
/// Both fields are optional on the wire: a client may sign in with a
/// partial payload, which leaves the session unable to post until a later
/// sign-in supplies both. `user_id` is accepted as an alias for `userid`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    #[serde(default, alias = "user_id", skip_serializing_if = "Option::is_none")]
    pub userid: Option<String>,
    #[serde(default, alias = "user_name", skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl UserInfo {
    /// Creates a complete sign-in payload.
    pub fn new(userid: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            userid: Some(userid.into()),
            username: Some(username.into()),
        }
    }
}

/// A complete posting identity: both fields present and non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    user_id: String,
    username: String,
}

impl Identity {
    /// Builds an identity, rejecting empty fields.
    pub fn new(user_id: impl Into<String>, username: impl Into<String>) -> DomainResult<Self> {
        let user_id = user_id.into();
        let username = username.into();

        if user_id.is_empty() {
            return Err(DomainError::MissingField { field: "userid" });
        }
        if username.is_empty() {
            return Err(DomainError::MissingField { field: "username" });
        }

        Ok(Self { user_id, username })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn username(&self) -> &str {
        &self.username
    }
}

impl TryFrom<&UserInfo> for Identity {
    type Error = DomainError;

    fn try_from(info: &UserInfo) -> DomainResult<Self> {
        let user_id = info
            .userid
            .as_deref()
            .ok_or(DomainError::MissingField { field: "userid" })?;
        let username = info
            .username
            .as_deref()
            .ok_or(DomainError::MissingField { field: "username" })?;
        Self::new(user_id, username)
    }
}

/// A chat message as broadcast to a room.
///
/// Only the session state machine composes these, so every message
/// carries the sender's identity at broadcast time and a server-assigned
/// timestamp. Field names match the wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    streamid: StreamId,
    text: String,
    timestamp: DateTime<Utc>,
    userid: String,
    username: String,
}

impl ChatMessage {
    pub(crate) fn compose(
        stream_id: &StreamId,
        identity: &Identity,
        text: String,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            streamid: stream_id.clone(),
            text,
            timestamp,
            userid: identity.user_id.clone(),
            username: identity.username.clone(),
        }
    }

    pub fn stream_id(&self) -> &StreamId {
        &self.streamid
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn user_id(&self) -> &str {
        &self.userid
    }

    pub fn username(&self) -> &str {
        &self.username
    }
}
