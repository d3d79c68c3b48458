//! Abstraction over the duplex byte channel to the device.
//!
//! The hosting environment mediates device selection and supplies the
//! opened port; the session only sees the exclusive halves below. Read
//! and write directions are independent and may proceed concurrently.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

#[cfg(feature = "mem")]
pub mod mem;

/// Transport failure.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("serial transport not supported: {0}")]
    Unsupported(String),
    #[error("failed to open port: {0}")]
    OpenFailed(String),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("port closed")]
    Closed,
}

/// Exclusive read access to an open port.
#[async_trait]
pub trait ReadHalf: Send {
    /// Read the next available chunk of bytes.
    ///
    /// An empty chunk signals end of stream.
    ///
    /// # Errors
    /// Returns error if the underlying read fails.
    async fn read_chunk(&mut self) -> Result<Bytes, TransportError>;
}

/// Exclusive write access to an open port.
#[async_trait]
pub trait WriteHalf: Send {
    /// Write the full chunk to the port.
    ///
    /// # Errors
    /// Returns error if the underlying write fails.
    async fn write_chunk(&mut self, data: &[u8]) -> Result<(), TransportError>;
}

/// Handle used to close the underlying port once the halves are released.
#[async_trait]
pub trait PortHandle: Send {
    /// Close the port. Tolerates the port already being gone.
    ///
    /// # Errors
    /// Returns error if the close itself fails.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// An opened duplex connection to the device.
pub struct OpenedPort {
    /// Read half, owned by the session's read loop.
    pub reader: Box<dyn ReadHalf>,
    /// Write half, owned by the session for command sends.
    pub writer: Box<dyn WriteHalf>,
    /// Close handle, used during teardown.
    pub port: Box<dyn PortHandle>,
}

/// Environment-mediated access to the device port.
#[async_trait]
pub trait PortOpener: Send + Sync {
    /// Select and open the device port at the given baud rate.
    ///
    /// # Errors
    /// Returns [`TransportError::Unsupported`] when the environment cannot
    /// provide serial access, or [`TransportError::OpenFailed`] when the
    /// selected port cannot be opened.
    async fn open(&self, baud_rate: u32) -> Result<OpenedPort, TransportError>;
}
