//! chatrelay Core - Shared types for the chat relay
//!
//! This crate provides the domain types shared between the wire
//! protocol (chatrelay-protocol) and the daemon (chatrelayd):
//! stream and session identifiers, user identity, chat messages and
//! the per-connection session state machine.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod error;
pub mod ids;
pub mod message;
pub mod session;

// Re-exports for convenience
pub use error::{DomainError, DomainResult};
pub use ids::{SessionId, StreamId};
pub use message::{ChatMessage, Identity, UserInfo};
pub use session::{Ack, Session, SessionAction, SessionInput, SessionState};
