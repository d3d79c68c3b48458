//! Core abstractions for pedal device session management.
//!
//! This crate provides the fundamental building blocks:
//! - `EventStore` - Broadcast + history notification sink
//! - `LogEntry` / `DeviceEvent` / `SwitchAction` - Typed session events
//! - Transport traits over the environment-supplied duplex byte channel

pub mod event;
pub mod event_store;
pub mod transport;

pub use event::{DeviceEvent, LogCategory, LogEntry, SwitchAction};
pub use event_store::EventStore;
pub use transport::{OpenedPort, PortHandle, PortOpener, ReadHalf, TransportError, WriteHalf};
