//! TCP server for the chat relay.
//!
//! The server:
//! - Listens on a TCP address for client connections
//! - Assigns each connection a fresh `SessionId`
//! - Spawns a ConnectionHandler for each client
//! - Supports graceful shutdown via CancellationToken
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   ChatServer    │
//! │                 │
//! │   TcpListener   │
//! └───────┬─────────┘
//!         │ accept()
//!         ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │ConnectionHandler│────▶│  RegistryHandle │
//! │   (per client)  │     │                 │
//! └─────────────────┘     └────────┬────────┘
//!         ▲                        │
//!         │ outbox                 │ room fan-out
//!         └────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Accept errors are logged and allow continued operation

mod connection;

pub use connection::{ConnectionError, ConnectionHandler};

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use chatrelay_core::SessionId;

use crate::config::ServerConfig;
use crate::registry::RegistryHandle;

/// TCP server for the chat relay.
///
/// Owns the listener and spawns one handler task per accepted client.
pub struct ChatServer {
    /// Bound listener
    listener: TcpListener,

    /// Settings shared with every connection
    config: ServerConfig,

    /// Handle to the room registry
    registry: RegistryHandle,

    /// Cancellation token for graceful shutdown
    cancel_token: CancellationToken,

    /// Counter for generating session ids
    connection_counter: AtomicU64,
}

impl ChatServer {
    /// Binds the listen address from `config`.
    ///
    /// # Errors
    ///
    /// - `ServerError::Bind` if the address is invalid or in use
    pub async fn bind(
        config: ServerConfig,
        registry: RegistryHandle,
        cancel_token: CancellationToken,
    ) -> Result<Self, ServerError> {
        let listener =
            TcpListener::bind(config.listen_addr.as_str())
                .await
                .map_err(|e| ServerError::Bind {
                    addr: config.listen_addr.clone(),
                    error: e.to_string(),
                })?;

        Ok(Self {
            listener,
            config,
            registry,
            cancel_token,
            connection_counter: AtomicU64::new(1),
        })
    }

    /// Returns the address the server is listening on.
    ///
    /// Useful when binding to port 0.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener
            .local_addr()
            .map_err(|e| ServerError::Io(e.to_string()))
    }

    /// Runs the server.
    ///
    /// Accepts connections until the cancellation token is triggered, then
    /// waits for every connection handler to finish leaving its room.
    pub async fn run(self) -> Result<(), ServerError> {
        match self.local_addr() {
            Ok(addr) => info!(addr = %addr, "Chat relay listening"),
            Err(e) => warn!(error = %e, "Chat relay listening on unknown address"),
        }

        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Server shutdown requested");
                    break;
                }

                result = self.listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let session_id = SessionId::new(
                                self.connection_counter.fetch_add(1, Ordering::Relaxed),
                            );
                            debug!(session_id = %session_id, peer = %addr, "Accepted connection");
                            self.handle_connection(&mut connections, stream, session_id);
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }

                // Reap finished handlers so the set does not grow unbounded
                Some(result) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = result {
                        warn!(error = %e, "Connection task failed");
                    }
                }
            }
        }

        while let Some(result) = connections.join_next().await {
            if let Err(e) = result {
                warn!(error = %e, "Connection task failed");
            }
        }

        info!("Server shutdown complete");
        Ok(())
    }

    /// Handles a new client connection by spawning a handler task.
    fn handle_connection(
        &self,
        connections: &mut JoinSet<()>,
        stream: TcpStream,
        session_id: SessionId,
    ) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!(session_id = %session_id, error = %e, "Failed to set TCP_NODELAY");
        }

        let (reader, writer) = stream.into_split();
        let handler = ConnectionHandler::new(
            reader,
            writer,
            self.registry.clone(),
            session_id,
            &self.config,
            self.cancel_token.child_token(),
        );

        connections.spawn(handler.run());
    }
}

/// Errors that can occur in server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {error}")]
    Bind { addr: String, error: String },

    #[error("I/O error: {0}")]
    Io(String),
}
