//! Client interface for interacting with the RegistryActor.
//!
//! The `RegistryHandle` provides a cheap-to-clone interface for sending
//! commands to the registry actor.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Channel errors are mapped to `RegistryError::ChannelClosed`

use tokio::sync::{mpsc, oneshot};

use chatrelay_core::{SessionId, StreamId};
use chatrelay_protocol::ServerEvent;

use super::commands::{BroadcastTarget, Outbox, RegistryCommand, RegistryError};

/// Handle for interacting with the registry actor.
///
/// This is a cheap-to-clone handle that can be shared across tasks.
/// All methods are async and communicate with the actor via channels.
///
/// # Usage
///
/// ```ignore
/// let handle = registry_handle.clone();
///
/// let viewers = handle.join(session_id, stream_id.clone(), outbox).await?;
/// handle.leave(session_id, stream_id).await?;
/// ```
#[derive(Clone)]
pub struct RegistryHandle {
    /// Command sender to the actor
    sender: mpsc::Sender<RegistryCommand>,
}

impl RegistryHandle {
    /// Create a new registry handle.
    pub fn new(sender: mpsc::Sender<RegistryCommand>) -> Self {
        Self { sender }
    }

    /// Sends a command built around a fresh oneshot and awaits the reply.
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> RegistryCommand,
    ) -> Result<T, RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(build(tx))
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)
    }

    /// Add a connection to a room and announce the new viewer count to the
    /// room. Returns the member count after the join.
    ///
    /// # Errors
    ///
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn join(
        &self,
        session_id: SessionId,
        stream_id: StreamId,
        outbox: Outbox,
    ) -> Result<usize, RegistryError> {
        self.request(|respond_to| RegistryCommand::Join {
            session_id,
            stream_id,
            outbox,
            respond_to,
        })
        .await
    }

    /// Remove a connection from a room and announce the new viewer count to
    /// the remaining members. Returns the member count after the leave;
    /// leaving a room twice is harmless.
    ///
    /// # Errors
    ///
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn leave(
        &self,
        session_id: SessionId,
        stream_id: StreamId,
    ) -> Result<usize, RegistryError> {
        self.request(|respond_to| RegistryCommand::Leave {
            session_id,
            stream_id,
            respond_to,
        })
        .await
    }

    /// Number of connections in a room.
    ///
    /// # Errors
    ///
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn count(&self, stream_id: StreamId) -> Result<usize, RegistryError> {
        self.request(|respond_to| RegistryCommand::Count {
            stream_id,
            respond_to,
        })
        .await
    }

    /// Deliver an event to a room. Returns how many members it was queued for.
    ///
    /// # Errors
    ///
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn broadcast(
        &self,
        stream_id: StreamId,
        event: ServerEvent,
        target: BroadcastTarget,
    ) -> Result<usize, RegistryError> {
        self.request(|respond_to| RegistryCommand::Broadcast {
            stream_id,
            event,
            target,
            respond_to,
        })
        .await
    }
}
