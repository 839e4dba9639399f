//! Registry actor - owns all room membership and processes commands.
//!
//! The RegistryActor is the single owner of room state in the system.
//! It receives commands via an mpsc channel and fans room-wide events out
//! to member outboxes. Every join and leave announces the room's new
//! viewer count in the same step, so no other membership change can slip
//! between the change and its announcement.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Delivery failures are logged but don't panic

use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use chatrelay_core::{SessionId, StreamId};
use chatrelay_protocol::ServerEvent;

use super::commands::{BroadcastTarget, Outbox, RegistryCommand};

/// Members of one room, keyed by session.
type Room = HashMap<SessionId, Outbox>;

// ============================================================================
// Registry Actor
// ============================================================================

/// The registry actor - owns all room membership.
///
/// Implements the actor pattern: receives commands via mpsc channel,
/// processes them sequentially, and pushes events to room members.
///
/// # Thread Safety
///
/// The actor runs in a single task and processes commands sequentially.
/// Every join, leave and count happens within this task, so a count
/// always reflects the membership changes processed before it.
///
/// Rooms exist only while they have members: the last leave removes the
/// room entry.
pub struct RegistryActor {
    /// Command receiver
    receiver: mpsc::Receiver<RegistryCommand>,

    /// Live membership: stream → (session → outbox)
    rooms: HashMap<StreamId, Room>,
}

impl RegistryActor {
    /// Creates a new registry actor.
    pub fn new(receiver: mpsc::Receiver<RegistryCommand>) -> Self {
        Self {
            receiver,
            rooms: HashMap::new(),
        }
    }

    /// Runs the actor event loop.
    ///
    /// Processes commands until the channel closes (all senders dropped).
    /// This is the main entry point - call this in a spawned task.
    pub async fn run(mut self) {
        info!("Registry actor starting");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!(
            rooms = self.rooms.len(),
            connections = self.connection_count(),
            "Registry actor stopped"
        );
    }

    /// Dispatches a command to the appropriate handler.
    fn handle_command(&mut self, cmd: RegistryCommand) {
        match cmd {
            RegistryCommand::Join {
                session_id,
                stream_id,
                outbox,
                respond_to,
            } => {
                let result = self.handle_join(session_id, stream_id, outbox);
                // Ignore send error - client may have dropped the receiver
                let _ = respond_to.send(result);
            }
            RegistryCommand::Leave {
                session_id,
                stream_id,
                respond_to,
            } => {
                let result = self.handle_leave(session_id, stream_id);
                let _ = respond_to.send(result);
            }
            RegistryCommand::Count {
                stream_id,
                respond_to,
            } => {
                let _ = respond_to.send(self.count(&stream_id));
            }
            RegistryCommand::Broadcast {
                stream_id,
                event,
                target,
                respond_to,
            } => {
                let result = self.handle_broadcast(&stream_id, &event, target);
                let _ = respond_to.send(result);
            }
        }
    }

    // ========================================================================
    // Command Handlers
    // ========================================================================

    /// Adds a member and announces the new count to the whole room,
    /// the joining session included.
    fn handle_join(&mut self, session_id: SessionId, stream_id: StreamId, outbox: Outbox) -> usize {
        let room = self.rooms.entry(stream_id.clone()).or_default();

        if room.insert(session_id, outbox).is_some() {
            debug!(
                session_id = %session_id,
                stream_id = %stream_id,
                "Session re-joined room, outbox replaced"
            );
        }

        let viewers = room.len();

        debug!(
            session_id = %session_id,
            stream_id = %stream_id,
            viewers,
            total_rooms = self.rooms.len(),
            "Session joined room"
        );

        self.announce_viewer_count(&stream_id, viewers);
        viewers
    }

    /// Removes a member and announces the new count to those remaining.
    ///
    /// Leaving a room the session is not in changes nothing and announces
    /// nothing.
    fn handle_leave(&mut self, session_id: SessionId, stream_id: StreamId) -> usize {
        let Some(room) = self.rooms.get_mut(&stream_id) else {
            debug!(
                session_id = %session_id,
                stream_id = %stream_id,
                "Leave for unknown room ignored"
            );
            return 0;
        };

        let removed = room.remove(&session_id).is_some();
        let viewers = room.len();

        if viewers == 0 {
            self.rooms.remove(&stream_id);
        }

        if !removed {
            debug!(
                session_id = %session_id,
                stream_id = %stream_id,
                "Session was not a member, leave ignored"
            );
            return viewers;
        }

        debug!(
            session_id = %session_id,
            stream_id = %stream_id,
            viewers,
            total_rooms = self.rooms.len(),
            "Session left room"
        );

        self.announce_viewer_count(&stream_id, viewers);
        viewers
    }

    fn handle_broadcast(
        &self,
        stream_id: &StreamId,
        event: &ServerEvent,
        target: BroadcastTarget,
    ) -> usize {
        let Some(room) = self.rooms.get(stream_id) else {
            return 0;
        };

        let mut delivered = 0;
        for (session_id, outbox) in room {
            if !target.includes(*session_id) {
                continue;
            }
            if deliver(*session_id, outbox, event.clone()) {
                delivered += 1;
            }
        }

        debug!(
            stream_id = %stream_id,
            event = event.name(),
            delivered,
            members = room.len(),
            "Broadcast to room"
        );

        delivered
    }

    fn announce_viewer_count(&self, stream_id: &StreamId, viewers: usize) {
        self.handle_broadcast(
            stream_id,
            &ServerEvent::ViewerCount(viewers),
            BroadcastTarget::Everyone,
        );
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Number of connections in a room.
    pub fn count(&self, stream_id: &StreamId) -> usize {
        self.rooms.get(stream_id).map_or(0, HashMap::len)
    }

    /// Number of rooms with at least one member.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Number of connections across all rooms.
    pub fn connection_count(&self) -> usize {
        self.rooms.values().map(HashMap::len).sum()
    }
}

/// Queues an event on one member's outbox without waiting.
///
/// A full outbox means the connection is not keeping up; the event is
/// dropped for that connection only. A closed outbox means the connection
/// is going away and will leave the room shortly.
fn deliver(session_id: SessionId, outbox: &Outbox, event: ServerEvent) -> bool {
    match outbox.try_send(event) {
        Ok(()) => true,
        Err(TrySendError::Full(event)) => {
            warn!(
                session_id = %session_id,
                event = event.name(),
                "Outbox full, dropping event for slow connection"
            );
            false
        }
        Err(TrySendError::Closed(_)) => {
            debug!(session_id = %session_id, "Outbox closed, skipping");
            false
        }
    }
}
