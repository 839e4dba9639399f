//! Registry actor commands, errors, and events.
//!
//! This module defines the message types for communicating with the `RegistryActor`:
//! - `RegistryCommand`: Commands sent to the actor
//! - `BroadcastTarget`: Which room members receive a broadcast
//! - `RegistryError`: Errors that can occur during registry operations
//!
//! All types are designed for async message passing and follow the panic-free policy.

use chatrelay_core::{SessionId, StreamId};
use chatrelay_protocol::ServerEvent;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Outbound queue of one connection.
///
/// The registry holds a clone per room member and pushes room-wide
/// events into it; the connection's writer task drains it.
pub type Outbox = mpsc::Sender<ServerEvent>;

// ============================================================================
// Registry Commands
// ============================================================================

/// Commands sent to the registry actor.
///
/// Each command uses a oneshot channel for the response, enabling
/// request-response patterns in async code without blocking.
#[derive(Debug)]
pub enum RegistryCommand {
    /// Add a connection to a room and send the new `viewer count` to every
    /// member, the joining connection included.
    ///
    /// Joining a room the session is already in replaces its outbox.
    /// Responds with the room's member count after the join.
    Join {
        session_id: SessionId,
        stream_id: StreamId,
        outbox: Outbox,
        respond_to: oneshot::Sender<usize>,
    },

    /// Remove a connection from a room and send the new `viewer count` to
    /// the remaining members.
    ///
    /// Idempotent: a connection that is not a member changes nothing and
    /// triggers no announcement. Responds with the room's member count
    /// after the leave.
    Leave {
        session_id: SessionId,
        stream_id: StreamId,
        respond_to: oneshot::Sender<usize>,
    },

    /// Get the number of connections in a room (0 for unknown rooms).
    Count {
        stream_id: StreamId,
        respond_to: oneshot::Sender<usize>,
    },

    /// Deliver an event to the members of a room.
    ///
    /// Responds with the number of members the event was queued for.
    Broadcast {
        stream_id: StreamId,
        event: ServerEvent,
        target: BroadcastTarget,
        respond_to: oneshot::Sender<usize>,
    },
}

/// Which members of a room receive a broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastTarget {
    /// Every member, the triggering session included
    Everyone,
    /// Every member except the given session
    EveryoneExcept(SessionId),
}

impl BroadcastTarget {
    /// Returns true if `session_id` should receive the broadcast.
    pub fn includes(&self, session_id: SessionId) -> bool {
        match self {
            Self::Everyone => true,
            Self::EveryoneExcept(excluded) => *excluded != session_id,
        }
    }
}

// ============================================================================
// Registry Errors
// ============================================================================

/// Errors that can occur during registry operations.
///
/// Room operations themselves are total; the only failure is losing
/// contact with the actor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The command or response channel was closed.
    ///
    /// This typically indicates the actor was shut down.
    #[error("registry channel closed")]
    ChannelClosed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_error_display() {
        assert_eq!(
            RegistryError::ChannelClosed.to_string(),
            "registry channel closed"
        );
    }

    #[test]
    fn test_broadcast_target_includes() {
        let me = SessionId::new(1);
        let other = SessionId::new(2);

        assert!(BroadcastTarget::Everyone.includes(me));
        assert!(!BroadcastTarget::EveryoneExcept(me).includes(me));
        assert!(BroadcastTarget::EveryoneExcept(me).includes(other));
    }

    #[tokio::test]
    async fn test_command_channel_closed_error() {
        // Verify behavior when the responder is dropped
        let (tx, rx) = oneshot::channel::<usize>();
        drop(tx);
        assert!(rx.await.is_err());
    }
}
