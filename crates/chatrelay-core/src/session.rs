//! Per-connection session state machine.
//!
//! A [`Session`] owns the transient state of one connection: the stream it
//! is bound to and the identity it signed in with. Inbound events are fed
//! through [`Session::apply`], which mutates the session and returns the
//! ordered list of [`SessionAction`]s the caller must carry out against
//! the room registry and the connection itself.
//!
//! The state machine does no I/O and never fails: invalid events (posting
//! without an identity, empty text, anything after disconnect) are
//! rejected by returning no actions.
//!
//! ```text
//!            connect
//!               │
//!               ▼
//!   ┌───────────────────────┐   sign in    ┌───────────────────────┐
//!   │  Anonymous-Connected  │─────────────▶│  Identified-Connected │
//!   │                       │◀─────────────│                       │
//!   └───────────┬───────────┘   sign out   └───────────┬───────────┘
//!               │ disconnect                           │ disconnect
//!               ▼                                      ▼
//!   ┌─────────────────────────────────────────────────────────────┐
//!   │                       Disconnected                          │
//!   └─────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::message::{ChatMessage, Identity, UserInfo};
use crate::StreamId;

// ============================================================================
// Inputs and Actions
// ============================================================================

/// An inbound event for a connected session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionInput {
    /// Client signed in with the given user info
    SignIn(UserInfo),
    /// Client signed out
    SignOut,
    /// Client posted a chat message
    NewMessage(String),
    /// Connection closed, for whatever reason
    Disconnect,
}

/// Acknowledgment delivered to the originating connection only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    SignedIn,
    SignedOut,
    MessageReceived,
}

/// Side effect requested by a session transition.
///
/// Actions are returned in the order they must be executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Add this connection to the room's membership and send the new
    /// viewer count to every member, this connection included
    JoinRoom(StreamId),
    /// Remove this connection from the room's membership and send the new
    /// viewer count to the remaining members
    LeaveRoom(StreamId),
    /// Send a message to every member of its room, sender included
    BroadcastMessage(ChatMessage),
    /// Reply to this connection only
    Acknowledge(Ack),
}

/// Observable state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Bound to a room without a complete identity
    Anonymous,
    /// Bound to a room with both user id and username set
    Identified,
    /// Terminal; no further events are processed
    Disconnected,
}

// ============================================================================
// Session
// ============================================================================

/// Transient state of one live connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    stream_id: StreamId,
    user_id: Option<String>,
    username: Option<String>,
    disconnected: bool,
}

impl Session {
    /// Opens a session bound to `stream_id`.
    ///
    /// Returns the session in the anonymous state along with the action
    /// that binds it to its room and announces the new viewer count.
    pub fn connect(stream_id: StreamId) -> (Self, Vec<SessionAction>) {
        let actions = vec![SessionAction::JoinRoom(stream_id.clone())];

        let session = Self {
            stream_id,
            user_id: None,
            username: None,
            disconnected: false,
        };

        (session, actions)
    }

    pub fn stream_id(&self) -> &StreamId {
        &self.stream_id
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Returns the posting identity if both fields are set and non-empty.
    pub fn identity(&self) -> Option<Identity> {
        let user_id = self.user_id.as_deref()?;
        let username = self.username.as_deref()?;
        Identity::new(user_id, username).ok()
    }

    pub fn state(&self) -> SessionState {
        if self.disconnected {
            SessionState::Disconnected
        } else if self.identity().is_some() {
            SessionState::Identified
        } else {
            SessionState::Anonymous
        }
    }

    /// Applies one inbound event and returns the actions it produces.
    ///
    /// `now` becomes the timestamp of any message composed by this
    /// transition.
    pub fn apply(&mut self, input: SessionInput, now: DateTime<Utc>) -> Vec<SessionAction> {
        if self.disconnected {
            debug!(stream_id = %self.stream_id, input = ?input, "Ignoring event after disconnect");
            return Vec::new();
        }

        match input {
            SessionInput::SignIn(info) => self.sign_in(info),
            SessionInput::SignOut => self.sign_out(),
            SessionInput::NewMessage(text) => self.post(text, now),
            SessionInput::Disconnect => self.disconnect(),
        }
    }

    fn sign_in(&mut self, info: UserInfo) -> Vec<SessionAction> {
        // No uniqueness check: several connections may share one identity.
        self.user_id = info.userid;
        self.username = info.username;
        vec![SessionAction::Acknowledge(Ack::SignedIn)]
    }

    fn sign_out(&mut self) -> Vec<SessionAction> {
        self.user_id = None;
        self.username = None;
        vec![SessionAction::Acknowledge(Ack::SignedOut)]
    }

    fn post(&mut self, text: String, now: DateTime<Utc>) -> Vec<SessionAction> {
        if text.is_empty() {
            debug!(stream_id = %self.stream_id, "Rejecting empty message");
            return Vec::new();
        }

        let Some(identity) = self.identity() else {
            debug!(stream_id = %self.stream_id, "Rejecting message from unidentified session");
            return Vec::new();
        };

        let message = ChatMessage::compose(&self.stream_id, &identity, text, now);
        vec![
            SessionAction::BroadcastMessage(message),
            SessionAction::Acknowledge(Ack::MessageReceived),
        ]
    }

    fn disconnect(&mut self) -> Vec<SessionAction> {
        self.disconnected = true;
        vec![SessionAction::LeaveRoom(self.stream_id.clone())]
    }
}
