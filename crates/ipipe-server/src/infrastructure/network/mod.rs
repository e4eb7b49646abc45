//! Network infrastructure for the server.
//!
//! Architecture:
//! - `InputPipeServer` owns the TCP listener and accepts clients until the
//!   shutdown future resolves.
//! - Every accepted connection gets its own [`Session`] and its own Tokio
//!   task running [`serve_connection`].  Sessions share nothing except the
//!   device provider, so one misbehaving client cannot affect another.
//! - The protocol is one-way: the server only reads.  A session error is
//!   answered by dropping the connection.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use ipipe_core::protocol::{DEFAULT_PORT, MAX_PAYLOAD_LEN};
use thiserror::Error;
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    net::TcpListener,
    task::JoinSet,
};
use tracing::{debug, error, info, warn};

use crate::application::device_registry::VirtualDeviceProvider;
use crate::application::session::{Session, SessionError, SessionStats};

/// Size of the per-connection read buffer.
pub const READ_BUF_SIZE: usize = 4096;

/// Errors that can occur in the server network layer.
#[derive(Debug, Error)]
pub enum ServerNetworkError {
    /// The listening socket could not be bound.
    #[error("failed to bind {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    /// An I/O error occurred on the listening socket.
    #[error("listener I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Listener settings.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    pub bind_addr: SocketAddr,
    /// Largest payload a session accepts before it is dropped.
    pub max_payload_len: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            max_payload_len: MAX_PAYLOAD_LEN,
        }
    }
}

/// Accepts clients and runs one session per connection.
pub struct InputPipeServer {
    listener: TcpListener,
    provider: Arc<dyn VirtualDeviceProvider>,
    max_payload_len: usize,
}

impl InputPipeServer {
    /// Binds the listening socket.
    ///
    /// # Errors
    ///
    /// Returns [`ServerNetworkError::BindFailed`] if the address is in use or
    /// not permitted.
    pub async fn bind(
        config: &ListenerConfig,
        provider: Arc<dyn VirtualDeviceProvider>,
    ) -> Result<Self, ServerNetworkError> {
        let listener = TcpListener::bind(config.bind_addr)
            .await
            .map_err(|source| ServerNetworkError::BindFailed {
                addr: config.bind_addr,
                source,
            })?;
        info!("listening on {}", config.bind_addr);
        Ok(Self {
            listener,
            provider,
            max_payload_len: config.max_payload_len,
        })
    }

    /// Address actually bound (useful when binding port 0 in tests).
    ///
    /// # Errors
    ///
    /// Propagates the OS error from `getsockname`.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerNetworkError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts connections until `shutdown` resolves.
    ///
    /// On shutdown every connection task is aborted; dropping a task drops its
    /// session, which destroys that session's device.
    ///
    /// # Errors
    ///
    /// Currently never fails; accept errors are logged and retried.
    pub async fn run<F>(self, shutdown: F) -> Result<(), ServerNetworkError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!(active = connections.len(), "listener shutting down");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let session = Session::with_max_payload_len(
                            Arc::clone(&self.provider),
                            self.max_payload_len,
                        );
                        info!(%peer, session = %session.id(), "client connected");
                        connections.spawn(serve_connection(stream, peer, session));
                    }
                    Err(e) => warn!("accept failed: {e}"),
                },
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = joined {
                        error!("connection task failed: {e}");
                    }
                }
            }
        }

        connections.abort_all();
        while connections.join_next().await.is_some() {}
        Ok(())
    }
}

/// Drives one session from a byte stream until EOF or a session error.
///
/// Generic over the reader so tests can substitute an in-memory stream.
///
/// # Errors
///
/// - [`SessionError::ConnectionLost`] if reading fails.
/// - Any error returned by [`Session::feed`].
///
/// In every case the session is Closed when this returns.
pub async fn serve_connection<R>(
    mut stream: R,
    peer: SocketAddr,
    mut session: Session,
) -> Result<SessionStats, SessionError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_BUF_SIZE];
    loop {
        let n = match stream.read(&mut buf).await {
            Ok(0) => {
                info!(%peer, session = %session.id(), "client disconnected");
                session.close();
                return Ok(session.stats());
            }
            Ok(n) => n,
            Err(e) => {
                warn!(%peer, session = %session.id(), "read failed: {e}");
                return Err(session.connection_lost());
            }
        };

        match session.feed(&buf[..n]) {
            Ok(dispatched) => debug!(%peer, bytes = n, dispatched, "chunk processed"),
            Err(e) => {
                warn!(%peer, session = %session.id(), error = %e, "dropping connection");
                return Err(e);
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use ipipe_core::{encode_message, InputEvent, Message, ProtocolError};
    use tokio_test::io::Builder;

    use super::*;
    use crate::infrastructure::virtual_device::mock::MockDeviceProvider;

    fn peer() -> SocketAddr {
        "192.0.2.10:50000".parse().unwrap()
    }

    fn bytes(msg: Message) -> Vec<u8> {
        encode_message(&msg).unwrap()
    }

    fn rel_x(value: i32) -> InputEvent {
        InputEvent {
            tv_sec: 3,
            tv_usec: 4,
            value,
            event_type: 2,
            code: 0,
        }
    }

    #[test]
    fn test_listener_config_default_port_is_7192() {
        let cfg = ListenerConfig::default();
        assert_eq!(cfg.bind_addr.port(), 7192);
        assert_eq!(cfg.max_payload_len, 65535);
    }

    #[tokio::test]
    async fn test_serve_connection_injects_until_eof_then_destroys() {
        // Arrange: name, create and one event split awkwardly across reads
        let mut stream = bytes(Message::DeviceName("mouse".into()));
        stream.extend(bytes(Message::Create));
        stream.extend(bytes(Message::Event(rel_x(-3))));
        let (a, rest) = stream.split_at(3);
        let (b, c) = rest.split_at(11);
        let reader = Builder::new().read(a).read(b).read(c).build();
        let provider = Arc::new(MockDeviceProvider::new());
        let session = Session::new(provider.clone());

        // Act
        let stats = serve_connection(reader, peer(), session).await.unwrap();

        // Assert
        assert_eq!(stats.events_injected, 1);
        assert_eq!(stats.packets_handled, 3);
        assert_eq!(provider.events(), vec![rel_x(-3)]);
        assert_eq!(provider.created()[0].name.as_deref(), Some("mouse"));
        assert_eq!(provider.destroyed(), 1);
    }

    #[tokio::test]
    async fn test_eof_while_building_creates_nothing() {
        let reader = Builder::new()
            .read(&bytes(Message::DeviceName("half".into())))
            .build();
        let provider = Arc::new(MockDeviceProvider::new());

        let stats = serve_connection(reader, peer(), Session::new(provider.clone()))
            .await
            .unwrap();

        assert_eq!(stats.packets_handled, 1);
        assert!(provider.created().is_empty());
        assert_eq!(provider.destroyed(), 0);
    }

    #[tokio::test]
    async fn test_read_error_is_connection_lost_and_device_released() {
        // Arrange
        let reader = Builder::new()
            .read(&bytes(Message::Create))
            .read_error(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "reset by peer",
            ))
            .build();
        let provider = Arc::new(MockDeviceProvider::new());

        // Act
        let result = serve_connection(reader, peer(), Session::new(provider.clone())).await;

        // Assert
        assert_eq!(result, Err(SessionError::ConnectionLost));
        assert_eq!(provider.created().len(), 1);
        assert_eq!(provider.destroyed(), 1);
    }

    #[tokio::test]
    async fn test_protocol_violation_drops_connection() {
        let reader = Builder::new()
            .read(&bytes(Message::Event(rel_x(1))))
            .build();
        let provider = Arc::new(MockDeviceProvider::new());

        let result = serve_connection(reader, peer(), Session::new(provider.clone())).await;

        assert_eq!(result, Err(SessionError::EventBeforeCreate));
        assert!(provider.events().is_empty());
    }

    #[tokio::test]
    async fn test_oversized_frame_drops_connection() {
        let reader = Builder::new().read(&[0x02, 0x01, 0x01, 0x00]).build();
        let provider = Arc::new(MockDeviceProvider::new());
        let session = Session::with_max_payload_len(provider.clone(), 64);

        let result = serve_connection(reader, peer(), session).await;

        assert_eq!(
            result,
            Err(SessionError::Protocol(ProtocolError::FrameTooLarge {
                declared: 256,
                limit: 64
            }))
        );
    }
}
