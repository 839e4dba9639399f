//! chatrelay Daemon - Room registry and chat broadcast server
//!
//! This crate provides the core infrastructure for the chat relay:
//! - `registry` - Room registry actor tracking which connections watch which stream
//! - `server` - TCP server and per-connection session handlers
//! - `config` - Server configuration
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    chatrelayd                               │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │   ChatServer    │────▶│     RegistryActor           │   │
//! │  │ (TCP listener)  │     │  (room membership owner)    │   │
//! │  └────────┬────────┘     └──────────────┬──────────────┘   │
//! │           │                             │                   │
//! │           │ connections                 │ fan-out           │
//! │           ▼                             ▼                   │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │ConnectionHandler│◀────│   per-connection outbox     │   │
//! │  │  (per client)   │     │   (mpsc, one writer task)   │   │
//! │  └─────────────────┘     └─────────────────────────────┘   │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod config;
pub mod registry;
pub mod server;
