//! Session state machine for the pedal device connection.
//!
//! Provides:
//! - `DeviceSession` - Connect, handshake, command sends, teardown
//! - `SessionState` - Lifecycle states
//! - Error types for connect, send and disconnect failures

pub mod error;
pub mod session;

pub use error::{ConnectionError, DisconnectError, SendError};
pub use session::{BAUD_RATE, DeviceSession, HANDSHAKE_TIMEOUT, SessionState};
