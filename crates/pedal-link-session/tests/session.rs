//! End-to-end session tests over the in-memory link.
//!
//! Tokio time is paused so the 3 s handshake window elapses instantly
//! when nothing else can make progress.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use pedal_link_core::transport::mem::{self, MemoryDevice, MemoryLink};
use pedal_link_core::{
    DeviceEvent, LogCategory, OpenedPort, PortHandle, PortOpener, ReadHalf, SwitchAction,
    TransportError, WriteHalf,
};
use pedal_link_protocol::DEVICE_SIGNATURE;
use pedal_link_session::{ConnectionError, DeviceSession, SendError, SessionState};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

fn new_session() -> (DeviceSession<MemoryLink>, MemoryDevice) {
    let (opener, device) = mem::link();
    (DeviceSession::new(opener), device)
}

/// Script the device side: wait for `INFO`, reply with `identity`,
/// then hand the device back for further scripting.
fn spawn_responder(mut device: MemoryDevice, identity: &str) -> JoinHandle<MemoryDevice> {
    let identity = identity.to_string();
    tokio::spawn(async move {
        while let Some(line) = device.recv_line().await {
            if line == "INFO" {
                device.send_line(&identity);
                break;
            }
        }
        device
    })
}

#[tokio::test(start_paused = true)]
async fn test_connect_verifies_identity_and_becomes_ready() {
    let (session, device) = new_session();
    let events = session.events();
    let mut connected = events.watch_connected();
    let responder = spawn_responder(device, DEVICE_SIGNATURE);

    session.connect().await.unwrap();

    assert_eq!(session.state(), SessionState::Ready);
    assert!(events.is_connected());
    connected.changed().await.unwrap();
    assert!(*connected.borrow());

    let history = events.log_history();
    assert!(
        history
            .iter()
            .any(|e| e.category == LogCategory::Send && e.message == "→ INFO")
    );
    assert!(
        history
            .iter()
            .any(|e| e.category == LogCategory::Receive && e.message.contains(DEVICE_SIGNATURE))
    );
    assert!(
        history
            .iter()
            .any(|e| e.category == LogCategory::Info && e.message.contains("Connected"))
    );

    let _device = responder.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_handshake_timeout_restores_disconnected() {
    let (session, device) = new_session();
    let events = session.events();

    // Device stays silent: the 3 s window elapses.
    let err = session.connect().await.unwrap_err();
    assert!(matches!(err, ConnectionError::HandshakeTimeout));
    assert_eq!(session.state(), SessionState::Disconnected);
    assert!(!events.is_connected());

    // Exactly one failure surfaced.
    let failures = events
        .log_history()
        .iter()
        .filter(|e| e.category == LogCategory::Error)
        .count();
    assert_eq!(failures, 1);

    // A late identity is a no-op: the listener is gone.
    device.send_line(DEVICE_SIGNATURE);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(session.state(), SessionState::Disconnected);
    assert!(!events.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_unexpected_identity_fails_connect() {
    let (session, device) = new_session();
    let responder = spawn_responder(device, "other_pedal-v2.0");

    let err = session.connect().await.unwrap_err();
    match err {
        ConnectionError::UnexpectedIdentity(identity) => {
            assert_eq!(identity, "other_pedal-v2.0");
        }
        other => panic!("expected UnexpectedIdentity, got {other:?}"),
    }
    assert_eq!(session.state(), SessionState::Disconnected);
    assert!(!session.events().is_connected());

    let _device = responder.await.unwrap();
}

#[tokio::test]
async fn test_send_command_when_disconnected() {
    let (session, mut device) = new_session();

    let err = session.send_command("INFO").await.unwrap_err();
    assert!(matches!(err, SendError::NotConnected));

    // No write attempt was made.
    assert!(device.try_recv().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_second_connect_rejected_while_active() {
    let (session, device) = new_session();
    let responder = spawn_responder(device, DEVICE_SIGNATURE);
    session.connect().await.unwrap();

    let err = session.connect().await.unwrap_err();
    assert!(matches!(err, ConnectionError::AlreadyConnected));
    assert_eq!(session.state(), SessionState::Ready);

    let _device = responder.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_twice_is_safe() {
    let (session, device) = new_session();
    let responder = spawn_responder(device, DEVICE_SIGNATURE);
    session.connect().await.unwrap();
    let _device = responder.await.unwrap();

    session.disconnect().await.unwrap();
    assert_eq!(session.state(), SessionState::Disconnected);
    assert!(!session.events().is_connected());

    // Second call is a no-op: no new teardown side effects.
    let entries = session.events().log_history().len();
    session.disconnect().await.unwrap();
    assert_eq!(session.events().log_history().len(), entries);
}

#[tokio::test(start_paused = true)]
async fn test_send_command_reaches_device_and_logs() {
    let (session, device) = new_session();
    let responder = spawn_responder(device, DEVICE_SIGNATURE);
    session.connect().await.unwrap();
    let mut device = responder.await.unwrap();

    session.send_command("BANK 2").await.unwrap();
    assert_eq!(device.recv_line().await.unwrap(), "BANK 2");
    assert!(
        session
            .events()
            .log_history()
            .iter()
            .any(|e| e.category == LogCategory::Send && e.message == "→ BANK 2")
    );
}

#[tokio::test(start_paused = true)]
async fn test_switch_and_bank_events_surface() {
    let (session, device) = new_session();
    let events = session.events();
    let mut rx = events.subscribe_events();
    let responder = spawn_responder(device, DEVICE_SIGNATURE);

    session.connect().await.unwrap();
    let device = responder.await.unwrap();

    // One stream split across chunks, inside "NOTE".
    device.send(&b"SWITCH 3: NO"[..]);
    device.send(&b"TE 60\nBANK 1: Lead\n"[..]);

    let first = rx.recv().await.unwrap();
    assert_eq!(
        first,
        DeviceEvent::SwitchConfig {
            switch: 3,
            action: SwitchAction::Note { value: 60 },
        }
    );
    let second = rx.recv().await.unwrap();
    assert_eq!(
        second,
        DeviceEvent::BankName {
            index: 1,
            name: "Lead".to_string(),
        }
    );

    assert!(
        events
            .log_history()
            .iter()
            .any(|e| e.category == LogCategory::Receive && e.message == "← SWITCH 3: NOTE 60")
    );
}

#[tokio::test(start_paused = true)]
async fn test_end_of_stream_leaves_session_state() {
    let (session, device) = new_session();
    let responder = spawn_responder(device, DEVICE_SIGNATURE);
    session.connect().await.unwrap();
    let device = responder.await.unwrap();

    // Device side goes away: the read loop sees end of stream and
    // exits quietly, but the session is not auto-disconnected.
    drop(device);
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(session.state(), SessionState::Ready);
    assert!(
        !session
            .events()
            .log_history()
            .iter()
            .any(|e| e.category == LogCategory::Error)
    );

    session.disconnect().await.unwrap();
    assert_eq!(session.state(), SessionState::Disconnected);
}

// Scripted transport for failure injection: the reader waits until the
// handshake command is written, then replays its script.

struct ScriptedPort {
    script: Vec<Result<Bytes, TransportError>>,
    close_result: Result<(), TransportError>,
}

struct ScriptedOpener {
    port: Mutex<Option<ScriptedPort>>,
}

impl ScriptedOpener {
    fn new(script: Vec<Result<Bytes, TransportError>>) -> Self {
        Self::with_close(script, Ok(()))
    }

    fn with_close(
        script: Vec<Result<Bytes, TransportError>>,
        close_result: Result<(), TransportError>,
    ) -> Self {
        Self {
            port: Mutex::new(Some(ScriptedPort {
                script,
                close_result,
            })),
        }
    }
}

#[async_trait]
impl PortOpener for ScriptedOpener {
    async fn open(&self, _baud_rate: u32) -> Result<OpenedPort, TransportError> {
        let port = self
            .port
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| TransportError::OpenFailed("already opened".into()))?;
        let written = Arc::new(Notify::new());
        Ok(OpenedPort {
            reader: Box::new(ScriptedReader {
                script: port.script.into(),
                gate: Arc::clone(&written),
                gated: true,
            }),
            writer: Box::new(NotifyWriter { written }),
            port: Box::new(ScriptedHandle {
                close_result: Some(port.close_result),
            }),
        })
    }
}

struct ScriptedReader {
    script: VecDeque<Result<Bytes, TransportError>>,
    gate: Arc<Notify>,
    gated: bool,
}

#[async_trait]
impl ReadHalf for ScriptedReader {
    async fn read_chunk(&mut self) -> Result<Bytes, TransportError> {
        if self.gated {
            self.gate.notified().await;
            self.gated = false;
        }
        self.script.pop_front().unwrap_or_else(|| Ok(Bytes::new()))
    }
}

struct NotifyWriter {
    written: Arc<Notify>,
}

#[async_trait]
impl WriteHalf for NotifyWriter {
    async fn write_chunk(&mut self, _data: &[u8]) -> Result<(), TransportError> {
        self.written.notify_one();
        Ok(())
    }
}

struct ScriptedHandle {
    close_result: Option<Result<(), TransportError>>,
}

#[async_trait]
impl PortHandle for ScriptedHandle {
    async fn close(&mut self) -> Result<(), TransportError> {
        self.close_result.take().unwrap_or(Ok(()))
    }
}

#[tokio::test(start_paused = true)]
async fn test_read_failure_is_logged_once_and_loop_exits() {
    let opener = ScriptedOpener::new(vec![
        Ok(Bytes::from_static(b"foot_switch_pro-v1.0\n")),
        Err(TransportError::Io("device unplugged".into())),
    ]);
    let session = DeviceSession::new(opener);

    session.connect().await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    // The failure is surfaced to the log, the loop stops, and the
    // session is left for the application to disconnect.
    let errors: Vec<_> = session
        .events()
        .log_history()
        .into_iter()
        .filter(|e| e.category == LogCategory::Error)
        .collect();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].message.contains("device unplugged"));
    assert_eq!(session.state(), SessionState::Ready);

    session.disconnect().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_close_failure_reported_after_full_teardown() {
    let opener = ScriptedOpener::with_close(
        vec![Ok(Bytes::from_static(b"foot_switch_pro-v1.0\n"))],
        Err(TransportError::Io("close failed".into())),
    );
    let session = DeviceSession::new(opener);
    session.connect().await.unwrap();

    let err = session.disconnect().await.unwrap_err();
    assert!(err.to_string().contains("close failed"));

    // State is reset despite the failing step.
    assert_eq!(session.state(), SessionState::Disconnected);
    assert!(!session.events().is_connected());
    assert!(
        session
            .events()
            .log_history()
            .iter()
            .any(|e| e.category == LogCategory::Error && e.message.contains("Disconnect failed"))
    );
}

#[tokio::test(start_paused = true)]
async fn test_open_failure_surfaces_transport_error() {
    let opener = ScriptedOpener::new(vec![]);
    // Consume the single port so connect sees an open failure.
    let _taken = opener.open(9600).await.unwrap();

    let session = DeviceSession::new(opener);
    let err = session.connect().await.unwrap_err();
    assert!(matches!(err, ConnectionError::Transport(_)));
    assert_eq!(session.state(), SessionState::Disconnected);
}
