//! Typed events published by a device session.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Category of a session log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogCategory {
    /// Lifecycle and status messages.
    Info,
    /// Commands written to the device.
    Send,
    /// Lines received from the device.
    Receive,
    /// Failures surfaced to the log stream.
    Error,
}

/// Immutable entry in the session log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// Arrival time in milliseconds since the Unix epoch.
    pub timestamp_ms: i64,
    /// Display text, already prefixed for send/receive entries.
    pub message: String,
    /// Entry category.
    pub category: LogCategory,
}

impl LogEntry {
    /// Create an entry stamped with the current time.
    #[must_use]
    pub fn new(category: LogCategory, message: impl Into<String>) -> Self {
        Self {
            timestamp_ms: now_ms(),
            message: message.into(),
            category,
        }
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Action a physical switch triggers when pressed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SwitchAction {
    /// Switch is unassigned.
    None,
    /// Send a MIDI note.
    Note { value: u8 },
    /// Send a MIDI control change.
    ControlChange { number: u8, value: u8 },
    /// Emit a keyboard combination, e.g. "CTRL+A".
    Key { label: String },
    /// Select a bank by index.
    BankSelect { bank: u32 },
    /// Step to the next bank.
    BankNext,
    /// Step to the previous bank.
    BankPrevious,
}

/// Configuration notification published by the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeviceEvent {
    /// A switch reported its current action.
    SwitchConfig {
        /// Switch number as reported by the device.
        switch: u32,
        /// Decoded action.
        action: SwitchAction,
    },
    /// A bank reported its display name.
    BankName {
        /// Bank index.
        index: u32,
        /// Display name.
        name: String,
    },
}
