//! Integration tests for the client's forwarding pipeline.
//!
//! # Purpose
//!
//! These tests run the client exactly as `main.rs` wires it (input source →
//! `DeviceStreamer` → `ClientConnection`) against a server on a loopback
//! port.  They verify:
//!
//! - End to end against a real `ipipe-server` listener: the server builds a
//!   device matching the client's descriptor, receives every event in order,
//!   and destroys the device when the client finishes.
//! - Reconnection: when the server drops the connection, the client connects
//!   again and repeats the whole announcement, because the new connection is
//!   a brand-new server session.
//!
//! ```text
//! MockInputSource ─▶ DeviceStreamer ─▶ ClientConnection ═TCP═▶ server
//! ```

use std::sync::Arc;
use std::time::Duration;

use ipipe_client::application::stream_device::DeviceStreamer;
use ipipe_client::infrastructure::input_capture::{mock::MockInputSource, InputSource};
use ipipe_client::infrastructure::network::{ClientConnection, ClientConnectionConfig};
use ipipe_core::{
    AbsInfo, CapabilityBits, DeviceDescriptor, FrameReader, InputEvent, InputId,
    CATEGORY_EVENT_TYPES,
};
use ipipe_server::infrastructure::network::{InputPipeServer, ListenerConfig};
use ipipe_server::infrastructure::virtual_device::mock::MockDeviceProvider;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::time::{sleep, timeout};

const CREATE: u16 = 0x0301;

fn joystick() -> DeviceDescriptor {
    let mut descriptor = DeviceDescriptor {
        name: Some("Test Joystick".into()),
        id: Some(InputId {
            bustype: 3,
            vendor: 0x1234,
            product: 0x5678,
            version: 1,
        }),
        ff_effects_max: Some(0),
        ..Default::default()
    };
    descriptor.set_capability(CapabilityBits::from_indices(CATEGORY_EVENT_TYPES, [0u16, 1, 3]));
    descriptor.set_capability(CapabilityBits::from_indices(1, [0x120u16, 0x121]));
    for axis in 0..2 {
        descriptor.set_axis(AbsInfo {
            axis,
            max: 1023,
            min: 0,
            fuzz: 2,
            flat: 8,
        });
    }
    descriptor
}

fn trigger(value: i32, usec: u32) -> InputEvent {
    InputEvent {
        tv_sec: 42,
        tv_usec: usec,
        value,
        event_type: 1,
        code: 0x120,
    }
}

/// Polls `condition` until it holds or two seconds pass.
async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Reads packets from `socket` up to and including `IPIPE_CREATE`.
async fn read_announcement(socket: &mut TcpStream) -> Vec<u16> {
    let mut reader = FrameReader::new();
    let mut types = Vec::new();
    let mut buf = [0u8; 512];
    loop {
        while let Some(packet) = reader.next_packet().expect("well-formed stream") {
            types.push(packet.packet_type);
            if packet.packet_type == CREATE {
                return types;
            }
        }
        let n = socket.read(&mut buf).await.expect("read");
        assert!(n > 0, "connection closed before IPIPE_CREATE");
        reader.push(&buf[..n]);
    }
}

// ── End to end ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_client_and_server_recreate_device_and_events() {
    // Arrange: server with a recording provider
    let provider = Arc::new(MockDeviceProvider::new());
    let server = InputPipeServer::bind(
        &ListenerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            ..Default::default()
        },
        provider.clone(),
    )
    .await
    .unwrap();
    let addr = server.local_addr().unwrap();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server_task = tokio::spawn(server.run(async {
        let _ = stop_rx.await;
    }));

    // Arrange: client
    let source = MockInputSource::new(joystick());
    let events = source.start().unwrap();
    let mut streamer = DeviceStreamer::new(source.descriptor()).unwrap();
    let connection = ClientConnection::new(ClientConnectionConfig {
        server_addr: addr.to_string(),
        reconnect: false,
        ..Default::default()
    });
    let client_task = tokio::spawn(async move { connection.run(&mut streamer, events).await });

    // Act
    let sent: Vec<InputEvent> = (0..20).map(|i| trigger(i % 2, i as u32)).collect();
    for event in &sent {
        source.inject_event(*event).unwrap();
    }
    assert!(eventually(|| provider.events().len() == sent.len()).await);
    source.stop();
    client_task.await.unwrap().unwrap();

    // Assert
    assert!(eventually(|| provider.destroyed() == 1).await, "device never released");
    let created = provider.created();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0], joystick());
    assert_eq!(provider.events(), sent);

    stop_tx.send(()).unwrap();
    server_task.await.unwrap().unwrap();
}

// ── Reconnection ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_client_reannounces_after_server_drops_connection() {
    // Arrange: a bare listener standing in for the server
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let source = MockInputSource::new(joystick());
    let events = source.start().unwrap();
    let mut streamer = DeviceStreamer::new(source.descriptor()).unwrap();
    let connection = ClientConnection::new(ClientConnectionConfig {
        server_addr: listener.local_addr().unwrap().to_string(),
        reconnect: true,
        reconnect_interval: Duration::from_millis(20),
    });
    let client_task = tokio::spawn(async move { connection.run(&mut streamer, events).await });

    // Act: first session is dropped right after the announcement
    let (mut first, _) = timeout(Duration::from_secs(2), listener.accept())
        .await
        .expect("first connection")
        .unwrap();
    let first_announcement = read_announcement(&mut first).await;
    drop(first);

    // Keep events flowing so the client notices the dead socket.
    let mut usec = 0;
    let mut second = timeout(Duration::from_secs(5), async {
        loop {
            tokio::select! {
                accepted = listener.accept() => break accepted.unwrap().0,
                _ = sleep(Duration::from_millis(5)) => {
                    usec += 1;
                    let _ = source.inject_event(trigger(1, usec));
                }
            }
        }
    })
    .await
    .expect("client reconnected");
    let second_announcement = read_announcement(&mut second).await;

    source.stop();
    let result = timeout(Duration::from_secs(2), client_task)
        .await
        .expect("client finished")
        .unwrap();

    // Assert
    assert_eq!(first_announcement, second_announcement);
    assert_eq!(first_announcement.first(), Some(&0x0201));
    assert_eq!(first_announcement.last(), Some(&CREATE));
    assert!(result.is_ok());
}
