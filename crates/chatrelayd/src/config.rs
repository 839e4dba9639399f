//! Server configuration.
//!
//! The listen address is resolved from, in order: an explicit value
//! (the `--listen` flag), the `CHATRELAY_LISTEN` environment variable,
//! then [`DEFAULT_LISTEN_ADDR`].

use std::env;

/// Default listen address
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8001";

/// Environment variable overriding the listen address
pub const LISTEN_ENV_VAR: &str = "CHATRELAY_LISTEN";

/// Maximum inbound frame size (64 KiB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 65_536;

/// Outbound frames buffered per connection before events are dropped
pub const DEFAULT_OUTBOX_CAPACITY: usize = 256;

/// Runtime configuration for [`ChatServer`](crate::server::ChatServer).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to bind, anything `TcpListener::bind` accepts
    pub listen_addr: String,

    /// Frames larger than this end the connection
    pub max_frame_size: usize,

    /// Capacity of each connection's outbound queue
    pub outbox_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            outbox_capacity: DEFAULT_OUTBOX_CAPACITY,
        }
    }
}

impl ServerConfig {
    /// Builds a configuration, taking the listen address from `listen`,
    /// else the environment, else the default.
    pub fn resolve(listen: Option<String>) -> Self {
        Self::resolve_with(listen, env::var(LISTEN_ENV_VAR).ok())
    }

    fn resolve_with(listen: Option<String>, from_env: Option<String>) -> Self {
        let listen_addr = listen
            .or(from_env.filter(|addr| !addr.trim().is_empty()))
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string());

        Self {
            listen_addr,
            ..Self::default()
        }
    }

    /// Returns a copy listening on `addr`.
    #[must_use]
    pub fn with_listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.listen_addr = addr.into();
        self
    }
}
