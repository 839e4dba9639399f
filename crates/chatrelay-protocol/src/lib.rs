//! chatrelay Protocol - Wire protocol for chat relay connections
//!
//! Frames are newline-delimited JSON envelopes of the form
//! `{"event": "<name>", "data": <payload>}`. Event names match the
//! socket.io-style names used by browser clients (`"new message"`,
//! `"viewer count"`, ...).

pub mod event;
pub mod version;

pub use event::{ClientEvent, Handshake, ServerEvent, STREAM_ID_PARAM};
pub use version::{ProtocolVersion, VersionError};
