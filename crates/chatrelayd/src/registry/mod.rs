//! Room registry using Actor pattern.
//!
//! The registry is the central owner of room membership: which
//! connections are currently watching which stream. It receives commands
//! via a tokio mpsc channel and fans room-wide events out to the
//! outboxes of the members.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │ConnectionHandler│────▶│  RegistryActor  │────▶│ member outboxes │
//! └─────────────────┘     └─────────────────┘     └─────────────────┘
//!         │                       │                       │
//!         │   RegistryCommand     │   HashMap<StreamId,   │   ServerEvent
//!         │   (mpsc channel)      │   HashMap<SessionId,  │   (viewer count,
//!         ▼                       ▼   Outbox>>            ▼   new message)
//!    join/leave/count        one task, sequential    one writer task
//!    broadcast               processing              per connection
//! ```
//!
//! The registry knows nothing about message content; it only routes
//! the events it is handed.

use tokio::sync::mpsc;

mod actor;
mod commands;
mod handle;

pub use actor::RegistryActor;
pub use commands::{BroadcastTarget, Outbox, RegistryCommand, RegistryError};
pub use handle::RegistryHandle;

/// Command channel buffer size
const COMMAND_BUFFER: usize = 1024;

/// Spawn the registry actor and return a handle for interaction.
///
/// One registry is shared by every connection in the process; pass
/// clones of the handle to each connection handler.
///
/// # Example
///
/// ```no_run
/// use chatrelay_core::StreamId;
/// use chatrelayd::registry::spawn_registry;
///
/// #[tokio::main]
/// async fn main() {
///     let handle = spawn_registry();
///
///     let viewers = handle.count(StreamId::new("abc")).await;
/// }
/// ```
pub fn spawn_registry() -> RegistryHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);

    let actor = RegistryActor::new(cmd_rx);
    tokio::spawn(actor.run());

    RegistryHandle::new(cmd_tx)
}
