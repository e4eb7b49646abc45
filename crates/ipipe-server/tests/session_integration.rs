//! Integration tests for the server session lifecycle.
//!
//! # Purpose
//!
//! These tests drive `Session` and `InputPipeServer` through their *public*
//! API with the recording `MockDeviceProvider`, the same way the binary
//! drives them with a real provider.  They verify:
//!
//! - The happy path: descriptor packets, then `IPIPE_CREATE`, then events.
//! - Every session-fatal protocol violation closes the session and leaves no
//!   device behind.
//! - Unknown packet types are ignored without side effects.
//! - A real TCP connection ends in a destroyed device once the client hangs up.
//!
//! # Packet flow under test
//!
//! ```text
//! Client                                   Server session
//! ──────                                   ──────────────
//! IPIPE_DEVICE_NAME "joy0"         ──▶     Building (name = joy0)
//! IPIPE_DEVICE_ID   1,2,3,4        ──▶     Building (id = 1,2,3,4)
//! IPIPE_CREATE                     ──▶     Active   (device created)
//! IPIPE_EVENT ...                  ──▶     Active   (event injected)
//! <close>                          ──▶     Closed   (device destroyed)
//! ```

use std::sync::Arc;
use std::time::Duration;

use ipipe_core::{
    encode_message, encode_packet, AbsInfo, InputEvent, InputId, Message, ProtocolError,
};
use ipipe_server::application::session::{Session, SessionError, SessionState};
use ipipe_server::infrastructure::network::{InputPipeServer, ListenerConfig};
use ipipe_server::infrastructure::virtual_device::mock::MockDeviceProvider;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::oneshot;

fn bytes(msg: Message) -> Vec<u8> {
    encode_message(&msg).expect("encode")
}

fn joy0_announcement() -> Vec<u8> {
    let mut stream = bytes(Message::DeviceName("joy0".into()));
    stream.extend(bytes(Message::DeviceId(InputId {
        bustype: 1,
        vendor: 2,
        product: 3,
        version: 4,
    })));
    stream.extend(bytes(Message::Create));
    stream
}

fn button(value: i32) -> InputEvent {
    InputEvent {
        tv_sec: 1_700_000_000,
        tv_usec: 250_000,
        value,
        event_type: 1,
        code: 0x130,
    }
}

// ── Session lifecycle ─────────────────────────────────────────────────────────

#[test]
fn test_name_id_create_ends_active_with_matching_descriptor() {
    // Arrange
    let provider = Arc::new(MockDeviceProvider::new());
    let mut session = Session::new(provider.clone());

    // Act
    session.feed(&joy0_announcement()).expect("valid announcement");

    // Assert
    assert_eq!(session.state(), SessionState::Active);
    let created = provider.created();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].name.as_deref(), Some("joy0"));
    assert_eq!(
        created[0].id,
        Some(InputId {
            bustype: 1,
            vendor: 2,
            product: 3,
            version: 4
        })
    );
}

#[test]
fn test_events_are_injected_in_arrival_order_with_values_unchanged() {
    // Arrange
    let provider = Arc::new(MockDeviceProvider::new());
    let mut session = Session::new(provider.clone());
    session.feed(&joy0_announcement()).unwrap();
    let events: Vec<InputEvent> = (0..50).map(|i| button(i % 2)).collect();
    let stream: Vec<u8> = events
        .iter()
        .flat_map(|e| bytes(Message::Event(*e)))
        .collect();

    // Act: deliver in 7-byte chunks so packets straddle reads
    for chunk in stream.chunks(7) {
        session.feed(chunk).unwrap();
    }

    // Assert
    assert_eq!(provider.events(), events);
    assert_eq!(session.stats().events_injected, 50);
}

#[test]
fn test_event_before_create_closes_without_device() {
    let provider = Arc::new(MockDeviceProvider::new());
    let mut session = Session::new(provider.clone());

    let result = session.feed(&bytes(Message::Event(button(1))));

    assert_eq!(result, Err(SessionError::EventBeforeCreate));
    assert_eq!(session.state(), SessionState::Closed);
    assert!(provider.created().is_empty());
}

#[test]
fn test_second_create_fails_and_releases_device_once() {
    // Arrange
    let provider = Arc::new(MockDeviceProvider::new());
    let mut session = Session::new(provider.clone());
    session.feed(&joy0_announcement()).unwrap();

    // Act
    let result = session.feed(&bytes(Message::Create));
    session.close();

    // Assert
    assert_eq!(result, Err(SessionError::AlreadyCreated));
    assert_eq!(provider.created().len(), 1);
    assert_eq!(provider.destroyed(), 1);
}

#[test]
fn test_six_byte_device_id_is_malformed() {
    let provider = Arc::new(MockDeviceProvider::new());
    let mut session = Session::new(provider);

    let result = session.feed(&encode_packet(0x0202, &[0, 1, 0, 2, 0, 3]).unwrap());

    assert!(matches!(
        result,
        Err(SessionError::Protocol(ProtocolError::MalformedPayload { .. }))
    ));
    assert_eq!(session.state(), SessionState::Closed);
}

#[test]
fn test_unknown_type_leaves_state_and_descriptor_unchanged() {
    // Arrange
    let provider = Arc::new(MockDeviceProvider::new());
    let mut session = Session::new(provider);
    session
        .feed(&bytes(Message::DeviceName("joy0".into())))
        .unwrap();
    let before = session.descriptor().clone();

    // Act
    let result = session.feed(&encode_packet(0xFFFF, b"from the future").unwrap());

    // Assert
    assert_eq!(result, Ok(1));
    assert_eq!(session.state(), SessionState::Building);
    assert_eq!(session.descriptor(), &before);
    assert_eq!(session.stats().unknown_ignored, 1);
}

#[test]
fn test_repeated_absinfo_keeps_last_values() {
    // Arrange
    let provider = Arc::new(MockDeviceProvider::new());
    let mut session = Session::new(provider.clone());
    let first = AbsInfo {
        axis: 1,
        max: 255,
        min: 0,
        fuzz: 0,
        flat: 0,
    };
    let second = AbsInfo {
        axis: 1,
        max: 1023,
        min: -1023,
        fuzz: 4,
        flat: 16,
    };
    let mut stream = bytes(Message::DeviceAbsInfo(first));
    stream.extend(bytes(Message::DeviceAbsInfo(second)));
    stream.extend(bytes(Message::Create));

    // Act
    session.feed(&stream).unwrap();

    // Assert
    let created = provider.created();
    assert_eq!(created[0].axes.len(), 1);
    assert_eq!(created[0].axis(1), Some(&second));
}

#[test]
fn test_device_field_after_create_is_fatal() {
    let provider = Arc::new(MockDeviceProvider::new());
    let mut session = Session::new(provider.clone());
    session.feed(&joy0_announcement()).unwrap();

    let result = session.feed(&bytes(Message::DeviceFfEffectsMax(16)));

    assert_eq!(
        result,
        Err(SessionError::UnexpectedAfterCreate {
            packet: "IPIPE_DEVICE_FF_EFFECTS_MAX"
        })
    );
    assert_eq!(provider.destroyed(), 1);
}

#[test]
fn test_creation_failure_leaves_nothing_registered() {
    let provider = Arc::new(MockDeviceProvider {
        fail_creation: true,
        ..Default::default()
    });
    let mut session = Session::new(provider.clone());

    let result = session.feed(&joy0_announcement());

    assert!(matches!(result, Err(SessionError::DeviceCreationFailed(_))));
    assert_eq!(session.state(), SessionState::Closed);
    assert!(!session.has_device());
    assert_eq!(provider.log.live_devices(), 0);
}

#[test]
fn test_injection_failure_closes_and_releases() {
    let provider = Arc::new(MockDeviceProvider {
        fail_injection: true,
        ..Default::default()
    });
    let mut session = Session::new(provider.clone());
    session.feed(&joy0_announcement()).unwrap();

    let result = session.feed(&bytes(Message::Event(button(1))));

    assert!(matches!(result, Err(SessionError::InjectionFailed(_))));
    assert_eq!(provider.destroyed(), 1);
}

#[test]
fn test_dropping_an_active_session_releases_its_device() {
    let provider = Arc::new(MockDeviceProvider::new());
    let mut session = Session::new(provider.clone());
    session.feed(&joy0_announcement()).unwrap();

    drop(session);

    assert_eq!(provider.destroyed(), 1);
    assert_eq!(provider.log.live_devices(), 0);
}

#[test]
fn test_sessions_are_independent() {
    // Arrange: two clients share one provider
    let provider = Arc::new(MockDeviceProvider::new());
    let mut good = Session::new(provider.clone());
    let mut bad = Session::new(provider.clone());

    // Act
    good.feed(&joy0_announcement()).unwrap();
    let bad_result = bad.feed(&bytes(Message::Event(button(1))));
    good.feed(&bytes(Message::Event(button(1)))).unwrap();

    // Assert
    assert!(bad_result.is_err());
    assert_eq!(good.state(), SessionState::Active);
    assert_eq!(provider.events(), vec![button(1)]);
}

// ── TCP end to end ────────────────────────────────────────────────────────────

/// Polls `condition` until it holds or two seconds pass.
async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

#[tokio::test]
async fn test_tcp_client_creates_injects_and_tears_down() {
    // Arrange: listener on an ephemeral loopback port
    let provider = Arc::new(MockDeviceProvider::new());
    let config = ListenerConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        ..Default::default()
    };
    let server = InputPipeServer::bind(&config, provider.clone())
        .await
        .expect("bind");
    let addr = server.local_addr().unwrap();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server_task = tokio::spawn(server.run(async {
        let _ = stop_rx.await;
    }));

    // Act: announce, stream two events, hang up
    let mut client = TcpStream::connect(addr).await.expect("connect");
    client.write_all(&joy0_announcement()).await.unwrap();
    client
        .write_all(&bytes(Message::Event(button(1))))
        .await
        .unwrap();
    client
        .write_all(&bytes(Message::Event(button(0))))
        .await
        .unwrap();
    client.shutdown().await.unwrap();
    drop(client);

    // Assert
    assert!(eventually(|| provider.destroyed() == 1).await, "device never torn down");
    assert_eq!(provider.events(), vec![button(1), button(0)]);
    assert_eq!(provider.created()[0].name.as_deref(), Some("joy0"));

    stop_tx.send(()).unwrap();
    server_task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_shutdown_releases_devices_of_open_connections() {
    // Arrange
    let provider = Arc::new(MockDeviceProvider::new());
    let config = ListenerConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        ..Default::default()
    };
    let server = InputPipeServer::bind(&config, provider.clone()).await.unwrap();
    let addr = server.local_addr().unwrap();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server_task = tokio::spawn(server.run(async {
        let _ = stop_rx.await;
    }));

    let mut client = TcpStream::connect(addr).await.unwrap();
    client.write_all(&joy0_announcement()).await.unwrap();
    assert!(eventually(|| provider.created().len() == 1).await);

    // Act: stop the server while the client is still connected
    stop_tx.send(()).unwrap();
    server_task.await.unwrap().unwrap();

    // Assert
    assert_eq!(provider.destroyed(), 1);
    drop(client);
}
