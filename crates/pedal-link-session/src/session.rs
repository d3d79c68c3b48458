//! Device session state machine and background read loop.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use pedal_link_core::{
    DeviceEvent, EventStore, OpenedPort, PortHandle, PortOpener, ReadHalf, WriteHalf,
};
use pedal_link_protocol::{DEVICE_SIGNATURE, INFO_COMMAND, LineFramer, Response, parse_line};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex as AsyncMutex, oneshot};
use tokio::task::JoinHandle;

use crate::error::{ConnectionError, DisconnectError, SendError};

/// Fixed baud rate of the pedal's serial link.
pub const BAUD_RATE: u32 = 9600;

/// How long to wait for the identity response after sending `INFO`.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_millis(3000);

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No transport is held.
    Disconnected,
    /// Opening the port.
    Connecting,
    /// Port open, waiting for the identity response.
    AwaitingHandshake,
    /// Identity verified; arbitrary commands may be sent.
    Ready,
    /// Teardown in progress.
    Disconnecting,
}

/// One-shot listener slot for the identity response. Settled exactly
/// once by whichever of {identity line, handshake timeout} comes first.
type IdentitySlot = Arc<Mutex<Option<oneshot::Sender<String>>>>;

struct ReadTask {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// The single live connection to the pedal.
///
/// Owns the transport halves for the duration of a connection and
/// publishes log entries, device events and the connected flag through
/// its [`EventStore`]. At most one session is active at a time; a second
/// `connect` while not `Disconnected` is rejected.
pub struct DeviceSession<O: PortOpener> {
    opener: O,
    events: Arc<EventStore>,
    state: Mutex<SessionState>,
    writer: AsyncMutex<Option<Box<dyn WriteHalf>>>,
    port: AsyncMutex<Option<Box<dyn PortHandle>>>,
    read_task: Mutex<Option<ReadTask>>,
    pending_identity: IdentitySlot,
}

impl<O: PortOpener> DeviceSession<O> {
    /// Create a session with its own event store.
    #[must_use]
    pub fn new(opener: O) -> Self {
        Self::with_events(opener, Arc::new(EventStore::new()))
    }

    /// Create a session publishing into an existing event store.
    #[must_use]
    pub fn with_events(opener: O, events: Arc<EventStore>) -> Self {
        Self {
            opener,
            events,
            state: Mutex::new(SessionState::Disconnected),
            writer: AsyncMutex::new(None),
            port: AsyncMutex::new(None),
            read_task: Mutex::new(None),
            pending_identity: Arc::new(Mutex::new(None)),
        }
    }

    /// The session's notification sink.
    #[must_use]
    pub fn events(&self) -> Arc<EventStore> {
        Arc::clone(&self.events)
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap()
    }

    /// Open the port, start the read loop and verify the device identity.
    ///
    /// Returns only after the handshake settles. On failure the session
    /// is fully torn down and restored to `Disconnected`; a secondary
    /// failure while tearing down never masks the original error.
    ///
    /// # Errors
    /// Returns [`ConnectionError`] if a session is already active, the
    /// port cannot be opened, the handshake times out, or the device
    /// reports an unexpected identity.
    pub async fn connect(&self) -> Result<(), ConnectionError> {
        {
            let mut state = self.state.lock().unwrap();
            if *state != SessionState::Disconnected {
                drop(state);
                self.events
                    .push_error("Connection failed: a session is already active");
                return Err(ConnectionError::AlreadyConnected);
            }
            *state = SessionState::Connecting;
        }

        match self.establish().await {
            Ok(()) => {
                self.set_state(SessionState::Ready);
                self.events.set_connected(true);
                self.events.push_info("Connected to foot_switch_pro device");
                Ok(())
            }
            Err(err) => {
                self.events.push_error(format!("Connection failed: {err}"));
                if let Err(teardown_err) = self.teardown().await {
                    tracing::debug!(error = %teardown_err, "teardown after failed connect");
                }
                self.set_state(SessionState::Disconnected);
                self.events.set_connected(false);
                Err(err)
            }
        }
    }

    async fn establish(&self) -> Result<(), ConnectionError> {
        let OpenedPort {
            reader,
            writer,
            port,
        } = self.opener.open(BAUD_RATE).await?;

        *self.writer.lock().await = Some(writer);
        *self.port.lock().await = Some(port);

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(run_read_loop(
            reader,
            Arc::clone(&self.events),
            Arc::clone(&self.pending_identity),
            shutdown_rx,
        ));
        *self.read_task.lock().unwrap() = Some(ReadTask {
            shutdown: shutdown_tx,
            handle,
        });

        self.set_state(SessionState::AwaitingHandshake);
        self.verify_device().await
    }

    /// Send `INFO` and race the identity response against the timeout.
    async fn verify_device(&self) -> Result<(), ConnectionError> {
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending_identity.lock().unwrap();
            // Only one verification may be outstanding per attempt.
            debug_assert!(pending.is_none());
            *pending = Some(tx);
        }

        self.send_command(INFO_COMMAND).await?;

        match tokio::time::timeout(HANDSHAKE_TIMEOUT, rx).await {
            Ok(Ok(identity)) if identity == DEVICE_SIGNATURE => Ok(()),
            Ok(Ok(identity)) => Err(ConnectionError::UnexpectedIdentity(identity)),
            // The read loop ended before any identity line arrived.
            Ok(Err(_)) => Err(ConnectionError::HandshakeTimeout),
            Err(_) => {
                // Remove the listener so a late identity line is a no-op.
                self.pending_identity.lock().unwrap().take();
                Err(ConnectionError::HandshakeTimeout)
            }
        }
    }

    /// Tear the session down and return to `Disconnected`.
    ///
    /// Safe to call from any state; calling it again once disconnected
    /// is a no-op. Every teardown step runs even if an earlier one
    /// fails.
    ///
    /// # Errors
    /// Returns [`DisconnectError`] for the first step that failed. The
    /// state is reset regardless.
    pub async fn disconnect(&self) -> Result<(), DisconnectError> {
        {
            let mut state = self.state.lock().unwrap();
            if *state == SessionState::Disconnected {
                return Ok(());
            }
            *state = SessionState::Disconnecting;
        }

        let result = self.teardown().await;
        self.set_state(SessionState::Disconnected);
        self.events.set_connected(false);

        match result {
            Ok(()) => {
                self.events.push_info("Disconnected from device");
                Ok(())
            }
            Err(err) => {
                self.events.push_error(format!("Disconnect failed: {err}"));
                Err(err)
            }
        }
    }

    /// Write a command line to the device.
    ///
    /// Valid once write access is held, i.e. from `AwaitingHandshake`
    /// or `Ready`. The command is encoded as text plus a single newline
    /// and logged as a send entry. Failed sends are not retried.
    ///
    /// # Errors
    /// Returns [`SendError::NotConnected`] without touching the
    /// transport when no write access is held, or [`SendError::Write`]
    /// if the write fails.
    pub async fn send_command(&self, command: &str) -> Result<(), SendError> {
        let mut writer = self.writer.lock().await;
        let Some(writer) = writer.as_mut() else {
            return Err(SendError::NotConnected);
        };

        let mut frame = Vec::with_capacity(command.len() + 1);
        frame.extend_from_slice(command.as_bytes());
        frame.push(b'\n');

        if let Err(err) = writer.write_chunk(&frame).await {
            self.events.push_error(format!("Send error: {err}"));
            return Err(SendError::Write(err));
        }

        self.events.push_send(format!("→ {command}"));
        Ok(())
    }

    /// Ordered teardown: stop the read loop (releases the read half),
    /// release the write half, close the port. Each step tolerates the
    /// resource already being absent.
    async fn teardown(&self) -> Result<(), DisconnectError> {
        let mut first_failure = None;

        let task = self.read_task.lock().unwrap().take();
        if let Some(ReadTask { shutdown, handle }) = task {
            // The loop may already have exited on its own.
            let _ = shutdown.send(());
            if let Err(err) = handle.await {
                first_failure = Some(DisconnectError::ReadLoop(err.to_string()));
            }
        }

        self.writer.lock().await.take();

        if let Some(mut port) = self.port.lock().await.take() {
            if let Err(err) = port.close().await {
                if first_failure.is_none() {
                    first_failure = Some(DisconnectError::Close(err));
                } else {
                    tracing::debug!(error = %err, "port close failed during teardown");
                }
            }
        }

        // Drop any stale one-shot identity listener.
        self.pending_identity.lock().unwrap().take();

        first_failure.map_or(Ok(()), Err)
    }

    fn set_state(&self, state: SessionState) {
        *self.state.lock().unwrap() = state;
    }
}

/// Background read loop. Owns the read half until it exits.
///
/// Exits on the shutdown signal raised by disconnect or on end of
/// stream; a read failure is surfaced once to the log and also ends the
/// loop, leaving the session for the application to disconnect.
async fn run_read_loop(
    mut reader: Box<dyn ReadHalf>,
    events: Arc<EventStore>,
    pending_identity: IdentitySlot,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let mut framer = LineFramer::new();

    loop {
        tokio::select! {
            _ = &mut shutdown_rx => break,
            chunk = reader.read_chunk() => match chunk {
                Ok(chunk) if chunk.is_empty() => break, // end of stream
                Ok(chunk) => {
                    for line in framer.push(&chunk) {
                        events.push_receive(format!("← {line}"));
                        dispatch_line(&line, &events, &pending_identity);
                    }
                }
                Err(err) => {
                    events.push_error(format!("Read error: {err}"));
                    break;
                }
            },
        }
    }

    tracing::debug!("read loop exited");
}

fn dispatch_line(line: &str, events: &EventStore, pending_identity: &IdentitySlot) {
    match parse_line(line) {
        Some(Response::Identity(identity)) => resolve_identity(pending_identity, identity),
        Some(Response::SwitchConfig { switch, action }) => {
            events.publish(DeviceEvent::SwitchConfig { switch, action });
        }
        Some(Response::BankName { index, name }) => {
            events.publish(DeviceEvent::BankName { index, name });
        }
        // During the handshake an unrecognized line is the device's
        // answer to INFO; outside it, unknown output is ignored.
        None => resolve_identity(pending_identity, line.to_string()),
    }
}

fn resolve_identity(slot: &IdentitySlot, identity: String) {
    if let Some(tx) = slot.lock().unwrap().take() {
        // Receiver gone means the timeout already settled the race.
        let _ = tx.send(identity);
    }
}
