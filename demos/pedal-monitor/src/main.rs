//! Demo: drive a device session against a scripted in-memory pedal.
//!
//! Run with: cargo run -p pedal-monitor
//!
//! Connects, performs the identity handshake, prints the session log
//! and the decoded configuration events, then disconnects.

use std::time::Duration;

use futures::StreamExt;
use pedal_link_core::DeviceEvent;
use pedal_link_core::transport::mem::{self, MemoryDevice};
use pedal_link_protocol::DEVICE_SIGNATURE;
use pedal_link_session::DeviceSession;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let (opener, device) = mem::link();
    let pedal = tokio::spawn(run_fake_pedal(device));

    let session = DeviceSession::new(opener);
    let events = session.events();

    // Print every log entry as it arrives.
    let mut log = events.log_stream();
    let printer = tokio::spawn(async move {
        while let Some(entry) = log.next().await {
            println!("[{:?}] {}", entry.category, entry.message);
        }
    });

    let mut device_events = events.subscribe_events();
    let watcher = tokio::spawn(async move {
        while let Ok(event) = device_events.recv().await {
            match event {
                DeviceEvent::SwitchConfig { switch, action } => {
                    tracing::info!(switch, action = ?action, "switch configured");
                }
                DeviceEvent::BankName { index, name } => {
                    tracing::info!(index, name = %name, "bank named");
                }
            }
        }
    });

    if let Err(err) = session.connect().await {
        tracing::error!(error = %err, "connect failed");
        return;
    }

    // Give the scripted pedal time to report its configuration.
    tokio::time::sleep(Duration::from_millis(200)).await;

    if let Err(err) = session.disconnect().await {
        tracing::warn!(error = %err, "disconnect reported an error");
    }

    watcher.abort();
    printer.abort();
    let _ = pedal.await;
}

/// Minimal stand-in for the pedal firmware: answers `INFO`, then
/// reports its configuration in deliberately fragmented chunks to
/// exercise the line framer.
async fn run_fake_pedal(mut device: MemoryDevice) {
    while let Some(line) = device.recv_line().await {
        if line == "INFO" {
            device.send_line(DEVICE_SIGNATURE);
            break;
        }
    }

    device.send(&b"SWITCH 1: NOTE 60\nSWITCH 2: CC 2"[..]);
    device.send(&b"0 64\nSWITCH 3: KEY CTRL+A\n"[..]);
    device.send(&b"SWITCH 4: BANK_NEXT\nBANK 0: Clean\nBANK 1: Lead\n"[..]);
}
