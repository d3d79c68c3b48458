//! In-memory duplex link.
//!
//! Useful for development and integration tests: the far end stands in
//! for the pedal firmware. Data moves over unbounded channels; dropping
//! either end reads as end of stream on the other side.

use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use super::{OpenedPort, PortHandle, PortOpener, ReadHalf, TransportError, WriteHalf};

/// Create a linked opener/device pair.
#[must_use]
pub fn link() -> (MemoryLink, MemoryDevice) {
    let (host_tx, device_rx) = mpsc::unbounded_channel();
    let (device_tx, host_rx) = mpsc::unbounded_channel();

    let port = OpenedPort {
        reader: Box::new(MemoryReader { rx: host_rx }),
        writer: Box::new(MemoryWriter { tx: host_tx }),
        port: Box::new(MemoryPortHandle { closed: false }),
    };

    (
        MemoryLink {
            slot: Mutex::new(Some(port)),
        },
        MemoryDevice {
            rx: device_rx,
            tx: device_tx,
            buffer: Vec::new(),
        },
    )
}

/// Single-use opener handing out the in-memory port.
///
/// Mirrors the single user-mediated pairing action: the first `open`
/// succeeds, any further attempt fails.
pub struct MemoryLink {
    slot: Mutex<Option<OpenedPort>>,
}

#[async_trait]
impl PortOpener for MemoryLink {
    async fn open(&self, _baud_rate: u32) -> Result<OpenedPort, TransportError> {
        self.slot
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| TransportError::OpenFailed("in-memory port already taken".into()))
    }
}

struct MemoryReader {
    rx: mpsc::UnboundedReceiver<Bytes>,
}

#[async_trait]
impl ReadHalf for MemoryReader {
    async fn read_chunk(&mut self) -> Result<Bytes, TransportError> {
        // A closed channel is end of stream, not an error.
        Ok(self.rx.recv().await.unwrap_or_default())
    }
}

struct MemoryWriter {
    tx: mpsc::UnboundedSender<Bytes>,
}

#[async_trait]
impl WriteHalf for MemoryWriter {
    async fn write_chunk(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.tx
            .send(Bytes::copy_from_slice(data))
            .map_err(|_| TransportError::Closed)
    }
}

struct MemoryPortHandle {
    closed: bool,
}

#[async_trait]
impl PortHandle for MemoryPortHandle {
    async fn close(&mut self) -> Result<(), TransportError> {
        if !self.closed {
            self.closed = true;
            tracing::debug!("in-memory port closed");
        }
        Ok(())
    }
}

/// Far end of the link, scripted by tests and demos as the pedal.
pub struct MemoryDevice {
    rx: mpsc::UnboundedReceiver<Bytes>,
    tx: mpsc::UnboundedSender<Bytes>,
    buffer: Vec<u8>,
}

impl MemoryDevice {
    /// Receive the next raw chunk the host wrote.
    ///
    /// Returns `None` once the host's write half is gone.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }

    /// Receive the next complete line the host wrote, reassembling
    /// across chunks.
    pub async fn recv_line(&mut self) -> Option<String> {
        loop {
            if let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
                let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
                return Some(String::from_utf8_lossy(&raw).trim().to_string());
            }
            let chunk = self.rx.recv().await?;
            self.buffer.extend_from_slice(&chunk);
        }
    }

    /// Receive without waiting, if a chunk is already queued.
    pub fn try_recv(&mut self) -> Option<Bytes> {
        self.rx.try_recv().ok()
    }

    /// Deliver bytes to the host's read half.
    ///
    /// Returns `false` once the host reader is gone.
    pub fn send(&self, data: impl Into<Bytes>) -> bool {
        self.tx.send(data.into()).is_ok()
    }

    /// Deliver a line (newline appended) to the host's read half.
    pub fn send_line(&self, line: &str) -> bool {
        self.send(Bytes::from(format!("{line}\n")))
    }
}
