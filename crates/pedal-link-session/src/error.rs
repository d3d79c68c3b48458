//! Session error types.

use pedal_link_core::TransportError;

/// Failure to send a command to the device.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// No write access is currently held.
    #[error("not connected to device")]
    NotConnected,
    /// The underlying write failed. The send is not retried.
    #[error("write failed: {0}")]
    Write(TransportError),
}

/// Failure of a connect attempt. The session is restored to
/// `Disconnected` before this is returned.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// A session is already active; disconnect it first.
    #[error("a session is already active")]
    AlreadyConnected,
    /// The environment could not provide or open the port.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The handshake command could not be written.
    #[error("handshake send failed: {0}")]
    Handshake(#[from] SendError),
    /// No identity response arrived within the handshake window.
    #[error("device verification timed out")]
    HandshakeTimeout,
    /// The device identified itself with an unexpected signature.
    #[error("unexpected device identity: {0}")]
    UnexpectedIdentity(String),
}

/// Failure during teardown. All steps still run and the session still
/// ends up `Disconnected`; this reports the first step that failed.
#[derive(Debug, thiserror::Error)]
pub enum DisconnectError {
    /// The read loop did not shut down cleanly.
    #[error("read loop did not shut down cleanly: {0}")]
    ReadLoop(String),
    /// Closing the port failed.
    #[error("failed to close port: {0}")]
    Close(TransportError),
}
