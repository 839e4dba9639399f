//! Connection handler for individual client connections.
//!
//! Each client connection gets its own `ConnectionHandler` that:
//! - Performs the `connect` handshake and binds the connection to a room
//! - Parses incoming frames and feeds them to the session state machine
//! - Executes the resulting actions against the registry and the outbox
//! - Runs the disconnect transition exactly once when the connection ends
//!
//! All outbound frames, direct replies and room broadcasts alike, go
//! through one bounded outbox drained by a single writer task, so a
//! connection sees its frames in the order they were produced.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Connection errors are logged and result in graceful disconnect

use std::time::Duration;

use chrono::Utc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use chatrelay_core::{Ack, Session, SessionAction, SessionId, SessionInput, SessionState, StreamId};
use chatrelay_protocol::{ClientEvent, ProtocolVersion, ServerEvent, VersionError};

use crate::config::ServerConfig;
use crate::registry::{BroadcastTarget, Outbox, RegistryError, RegistryHandle};

/// Time allowed for the client to send its `connect` frame
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Write timeout (10 seconds)
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection handler for a single client.
pub struct ConnectionHandler<R> {
    /// Buffered reader for incoming frames
    reader: BufReader<R>,

    /// Queue drained by the writer task; clones live in the registry
    outbox: Outbox,

    /// Task writing queued frames to the socket
    writer_task: JoinHandle<()>,

    /// Handle to the room registry
    registry: RegistryHandle,

    /// Server-assigned identifier of this connection
    session_id: SessionId,

    /// Cancelled on server shutdown
    cancel_token: CancellationToken,

    /// Frames longer than this end the connection
    max_frame_size: usize,
}

impl<R> ConnectionHandler<R>
where
    R: AsyncRead + Unpin,
{
    /// Creates a new connection handler and starts its writer task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new<W>(
        reader: R,
        writer: W,
        registry: RegistryHandle,
        session_id: SessionId,
        config: &ServerConfig,
        cancel_token: CancellationToken,
    ) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (outbox, outbox_rx) = mpsc::channel(config.outbox_capacity.max(1));
        let writer_task = tokio::spawn(write_loop(writer, outbox_rx, session_id));

        Self {
            reader: BufReader::new(reader),
            outbox,
            writer_task,
            registry,
            session_id,
            cancel_token,
            max_frame_size: config.max_frame_size,
        }
    }

    /// Runs the connection handler.
    ///
    /// Performs the handshake, then processes events until the connection
    /// closes. Returns once the session has left its room and all queued
    /// frames are flushed.
    pub async fn run(mut self) {
        debug!(session_id = %self.session_id, "New client connected");

        let stream_id = match self.handle_handshake().await {
            Ok(stream_id) => stream_id,
            Err(e) => {
                warn!(session_id = %self.session_id, error = %e, "Handshake failed");
                self.finish().await;
                return;
            }
        };

        let (mut session, actions) = Session::connect(stream_id);

        match self.execute(&session, actions).await {
            Ok(()) => {
                if let Err(e) = self.process_events(&mut session).await {
                    debug!(session_id = %self.session_id, error = %e, "Connection closed");
                }
            }
            Err(e) => {
                warn!(session_id = %self.session_id, error = %e, "Failed to join room");
            }
        }

        // A `disconnect` frame may already have run the transition.
        if session.state() != SessionState::Disconnected {
            let actions = session.apply(SessionInput::Disconnect, Utc::now());
            if let Err(e) = self.execute(&session, actions).await {
                warn!(session_id = %self.session_id, error = %e, "Failed to leave room");
            }
        }

        self.finish().await;
    }

    /// Handles the initial `connect` frame.
    ///
    /// Validates the protocol version and replies with `connected` or
    /// `rejected`. Returns the stream the client asked to join.
    async fn handle_handshake(&mut self) -> Result<StreamId, ConnectionError> {
        let frame = tokio::select! {
            _ = self.cancel_token.cancelled() => return Err(ConnectionError::Shutdown),

            result = timeout(
                HANDSHAKE_TIMEOUT,
                read_frame(&mut self.reader, self.max_frame_size),
            ) => match result {
                Ok(result) => result?,
                Err(_) => return Err(ConnectionError::HandshakeTimeout),
            },
        };

        let parsed = std::str::from_utf8(&frame)
            .map_err(|e| ConnectionError::ParseError(e.to_string()))
            .and_then(|line| {
                serde_json::from_str::<ClientEvent>(line.trim())
                    .map_err(|e| ConnectionError::ParseError(e.to_string()))
            });

        let handshake = match parsed {
            Ok(ClientEvent::Connect(handshake)) => handshake,
            Ok(other) => {
                self.send(ServerEvent::rejected("Expected connect event for handshake"))
                    .await?;
                return Err(ConnectionError::UnexpectedMessage(format!("{other:?}")));
            }
            Err(e) => {
                self.send(ServerEvent::rejected("Expected connect event for handshake"))
                    .await?;
                return Err(e);
            }
        };

        if let Err(e) = handshake
            .protocol_version
            .check_against(&ProtocolVersion::CURRENT)
        {
            self.send(ServerEvent::rejected(e.to_string())).await?;
            return Err(e.into());
        }

        self.send(ServerEvent::connected(self.session_id)).await?;
        Ok(handshake.stream_id())
    }

    /// Main event loop.
    ///
    /// Returns `Ok` when the client closes the connection or the server
    /// shuts down; errors are transport failures. Either way the caller
    /// runs the disconnect transition.
    async fn process_events(&mut self, session: &mut Session) -> Result<(), ConnectionError> {
        loop {
            let frame = tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    debug!(session_id = %self.session_id, "Server shutting down");
                    return Ok(());
                }

                _ = self.outbox.closed() => {
                    return Err(ConnectionError::WriterClosed);
                }

                result = read_frame(&mut self.reader, self.max_frame_size) => match result {
                    Ok(frame) => frame,
                    Err(ConnectionError::Eof) => {
                        debug!(session_id = %self.session_id, "Client sent EOF");
                        return Ok(());
                    }
                    Err(e) => return Err(e),
                },
            };

            let Some(event) = self.parse_frame(&frame) else {
                continue;
            };

            match event {
                ClientEvent::Connect(_) => {
                    debug!(session_id = %self.session_id, "Ignoring repeated connect");
                }
                ClientEvent::Ping { seq } => {
                    self.send(ServerEvent::Pong { seq }).await?;
                }
                other => {
                    if let Some(input) = other.into_session_input() {
                        let actions = session.apply(input, Utc::now());
                        self.execute(session, actions).await?;
                    }
                }
            }

            if session.state() == SessionState::Disconnected {
                debug!(session_id = %self.session_id, "Client requested disconnect");
                return Ok(());
            }
        }
    }

    /// Parses one frame; unparseable frames are dropped without a reply.
    fn parse_frame(&self, frame: &[u8]) -> Option<ClientEvent> {
        let line = match std::str::from_utf8(frame) {
            Ok(line) => line.trim(),
            Err(e) => {
                debug!(
                    session_id = %self.session_id,
                    error = %e,
                    "Dropping frame that is not valid UTF-8"
                );
                return None;
            }
        };
        if line.is_empty() {
            return None;
        }

        match serde_json::from_str::<ClientEvent>(line) {
            Ok(event) => Some(event),
            Err(e) => {
                debug!(
                    session_id = %self.session_id,
                    error = %e,
                    "Dropping unparseable frame"
                );
                None
            }
        }
    }

    /// Carries out the actions of one session transition, in order.
    async fn execute(
        &self,
        session: &Session,
        actions: Vec<SessionAction>,
    ) -> Result<(), ConnectionError> {
        for action in actions {
            match action {
                SessionAction::JoinRoom(stream_id) => {
                    let viewers = self
                        .registry
                        .join(self.session_id, stream_id, self.outbox.clone())
                        .await?;
                    info!(
                        session_id = %self.session_id,
                        stream_id = %session.stream_id(),
                        viewers,
                        "Viewer connected to stream"
                    );
                }
                SessionAction::LeaveRoom(stream_id) => {
                    let viewers = self.registry.leave(self.session_id, stream_id).await?;
                    info!(
                        session_id = %self.session_id,
                        stream_id = %session.stream_id(),
                        user_id = ?session.user_id(),
                        username = ?session.username(),
                        viewers,
                        "Viewer disconnected from stream"
                    );
                }
                SessionAction::BroadcastMessage(message) => {
                    info!(
                        session_id = %self.session_id,
                        stream_id = %message.stream_id(),
                        user_id = message.user_id(),
                        username = message.username(),
                        timestamp = %message.timestamp(),
                        text = message.text(),
                        "Message"
                    );
                    self.registry
                        .broadcast(
                            message.stream_id().clone(),
                            ServerEvent::NewMessage(message),
                            BroadcastTarget::Everyone,
                        )
                        .await?;
                }
                SessionAction::Acknowledge(ack) => {
                    match ack {
                        Ack::SignedIn => info!(
                            session_id = %self.session_id,
                            stream_id = %session.stream_id(),
                            user_id = ?session.user_id(),
                            username = ?session.username(),
                            "User signed in"
                        ),
                        Ack::SignedOut => info!(
                            session_id = %self.session_id,
                            stream_id = %session.stream_id(),
                            "User signed out"
                        ),
                        Ack::MessageReceived => {}
                    }
                    self.send(ack.into()).await?;
                }
            }
        }

        Ok(())
    }

    /// Queues a frame for this connection only.
    async fn send(&self, event: ServerEvent) -> Result<(), ConnectionError> {
        self.outbox
            .send(event)
            .await
            .map_err(|_| ConnectionError::WriterClosed)
    }

    /// Releases the outbox and waits for queued frames to be written.
    async fn finish(self) {
        let Self {
            outbox,
            writer_task,
            session_id,
            ..
        } = self;

        drop(outbox);
        if let Err(e) = writer_task.await {
            warn!(session_id = %session_id, error = %e, "Writer task failed");
        }
        debug!(session_id = %session_id, "Connection finished");
    }
}

/// Reads a single newline-terminated frame as raw bytes.
///
/// At most `max_frame_size + 1` bytes are buffered; a longer frame is an
/// error and ends the connection. Text decoding is left to the caller.
async fn read_frame<R>(reader: &mut BufReader<R>, max_frame_size: usize) -> Result<Vec<u8>, ConnectionError>
where
    R: AsyncRead + Unpin,
{
    let mut frame = Vec::new();
    let limit = u64::try_from(max_frame_size).unwrap_or(u64::MAX).saturating_add(1);

    let bytes_read = reader
        .take(limit)
        .read_until(b'\n', &mut frame)
        .await
        .map_err(|e| ConnectionError::Io(e.to_string()))?;

    if bytes_read == 0 {
        return Err(ConnectionError::Eof);
    }

    if bytes_read > max_frame_size {
        return Err(ConnectionError::MessageTooLarge {
            size: bytes_read,
            max: max_frame_size,
        });
    }

    Ok(frame)
}

/// Drains the outbox onto the socket until every sender is gone or a
/// write fails.
async fn write_loop<W>(writer: W, mut outbox: mpsc::Receiver<ServerEvent>, session_id: SessionId)
where
    W: AsyncWrite + Unpin,
{
    let mut writer = BufWriter::new(writer);

    while let Some(event) = outbox.recv().await {
        if let Err(e) = write_event(&mut writer, &event).await {
            debug!(
                session_id = %session_id,
                event = event.name(),
                error = %e,
                "Failed to write frame"
            );
            break;
        }
    }

    let _ = writer.shutdown().await;
}

/// Writes one frame as a JSON line.
async fn write_event<W>(writer: &mut BufWriter<W>, event: &ServerEvent) -> Result<(), ConnectionError>
where
    W: AsyncWrite + Unpin,
{
    let json = serde_json::to_string(event).map_err(|e| ConnectionError::ParseError(e.to_string()))?;

    match timeout(WRITE_TIMEOUT, async {
        writer.write_all(json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        Ok::<(), std::io::Error>(())
    })
    .await
    {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(ConnectionError::Io(e.to_string())),
        Err(_) => Err(ConnectionError::WriteTimeout),
    }
}

/// Errors that can occur during connection handling.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error(transparent)]
    VersionMismatch(#[from] VersionError),

    #[error("Unexpected message: {0}")]
    UnexpectedMessage(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Connection closed")]
    Eof,

    #[error("Handshake timeout")]
    HandshakeTimeout,

    #[error("Write timeout")]
    WriteTimeout,

    #[error("Writer closed")]
    WriterClosed,

    #[error("Server shutting down")]
    Shutdown,

    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
}
