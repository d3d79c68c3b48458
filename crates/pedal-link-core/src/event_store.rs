//! Broadcast + history notification sink for a device session.

use std::sync::RwLock;

use futures::StreamExt;
use tokio::sync::{broadcast, watch};
use tokio_stream::wrappers::BroadcastStream;

use crate::{DeviceEvent, LogCategory, LogEntry};

/// Broadcast capacity for log entries and device events.
const CHANNEL_CAPACITY: usize = 1024;

/// Notification sink connecting a device session to its observers.
///
/// Publishes three kinds of notifications:
/// - an append-only, time-ordered session log (history + live broadcast)
/// - device configuration events (switch actions, bank names)
/// - a connected/disconnected flag
///
/// Publishing never blocks: broadcasts to absent or lagging subscribers
/// are fire-and-forget, while the log history stays complete.
pub struct EventStore {
    log: RwLock<Vec<LogEntry>>,
    log_tx: broadcast::Sender<LogEntry>,
    event_tx: broadcast::Sender<DeviceEvent>,
    connected_tx: watch::Sender<bool>,
}

impl Default for EventStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EventStore {
    /// Create a new event store.
    #[must_use]
    pub fn new() -> Self {
        let (log_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (event_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (connected_tx, _) = watch::channel(false);
        Self {
            log: RwLock::new(Vec::new()),
            log_tx,
            event_tx,
            connected_tx,
        }
    }

    /// Append an entry to the log and notify live subscribers.
    pub fn push(&self, entry: LogEntry) {
        let _ = self.log_tx.send(entry.clone()); // live listeners
        self.log.write().unwrap().push(entry);
    }

    /// Append an info entry.
    pub fn push_info<S: Into<String>>(&self, s: S) {
        self.push(LogEntry::new(LogCategory::Info, s));
    }

    /// Append a send entry.
    pub fn push_send<S: Into<String>>(&self, s: S) {
        self.push(LogEntry::new(LogCategory::Send, s));
    }

    /// Append a receive entry.
    pub fn push_receive<S: Into<String>>(&self, s: S) {
        self.push(LogEntry::new(LogCategory::Receive, s));
    }

    /// Append an error entry.
    pub fn push_error<S: Into<String>>(&self, s: S) {
        self.push(LogEntry::new(LogCategory::Error, s));
    }

    /// Publish a device configuration event.
    pub fn publish(&self, event: DeviceEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Update the connected flag.
    pub fn set_connected(&self, connected: bool) {
        self.connected_tx.send_replace(connected);
    }

    /// Current value of the connected flag.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        *self.connected_tx.borrow()
    }

    /// Subscribe to connected-flag changes.
    #[must_use]
    pub fn watch_connected(&self) -> watch::Receiver<bool> {
        self.connected_tx.subscribe()
    }

    /// Get a receiver for live log entries.
    #[must_use]
    pub fn subscribe_log(&self) -> broadcast::Receiver<LogEntry> {
        self.log_tx.subscribe()
    }

    /// Get a receiver for live device events.
    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<DeviceEvent> {
        self.event_tx.subscribe()
    }

    /// Get a snapshot of the log history.
    #[must_use]
    pub fn log_history(&self) -> Vec<LogEntry> {
        self.log.read().unwrap().clone()
    }

    /// Drop all retained log entries. Live subscriptions are unaffected.
    pub fn clear_log(&self) {
        self.log.write().unwrap().clear();
    }

    /// Stream that yields the retained history first, then live entries.
    #[must_use]
    pub fn log_stream(&self) -> futures::stream::BoxStream<'static, LogEntry> {
        let (history, rx) = (self.log_history(), self.subscribe_log());

        let hist = futures::stream::iter(history);
        let live = BroadcastStream::new(rx).filter_map(|res| async move { res.ok() });

        Box::pin(hist.chain(live))
    }
}
