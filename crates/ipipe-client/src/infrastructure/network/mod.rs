//! Network infrastructure for the client.
//!
//! Architecture:
//! - `StreamSink` adapts any Tokio `AsyncWrite` (a `TcpStream` in production)
//!   to the application layer's [`PacketSink`].
//! - `ClientConnection` owns the reconnect loop: connect, hand the socket to
//!   the [`DeviceStreamer`], and on failure wait and try again.  Every new
//!   connection is a brand-new server session, so the device is announced
//!   again each time.
//! - Events captured while no connection exists are discarded rather than
//!   replayed late.

use std::time::Duration;

use async_trait::async_trait;
use ipipe_core::protocol::DEFAULT_PORT;
use ipipe_core::InputEvent;
use thiserror::Error;
use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    net::TcpStream,
    sync::mpsc,
    time,
};
use tracing::{debug, info, warn};

use crate::application::stream_device::{
    drain_stale, DeviceStreamer, PacketSink, StreamEnd, StreamError,
};

/// Errors that can occur in the client network layer.
#[derive(Debug, Error)]
pub enum ClientNetworkError {
    /// TCP connection to the server failed.
    #[error("failed to connect to server at {addr}: {source}")]
    ConnectFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    /// The established connection failed or the device could not be encoded.
    #[error(transparent)]
    Stream(#[from] StreamError),
}

/// Configuration for the client's network connection.
#[derive(Debug, Clone)]
pub struct ClientConnectionConfig {
    /// `host:port` of the server.
    pub server_addr: String,
    /// Whether to reconnect after a failed or dropped connection.
    pub reconnect: bool,
    /// Delay between connection attempts.
    pub reconnect_interval: Duration,
}

impl Default for ClientConnectionConfig {
    fn default() -> Self {
        Self {
            server_addr: format!("127.0.0.1:{DEFAULT_PORT}"),
            reconnect: true,
            reconnect_interval: Duration::from_secs(5),
        }
    }
}

/// A [`PacketSink`] over any async byte writer.
pub struct StreamSink<W> {
    writer: W,
}

impl<W> StreamSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[async_trait]
impl<W> PacketSink for StreamSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.writer.write_all(bytes).await?;
        self.writer.flush().await
    }
}

/// Connects to the server and keeps the device streaming across reconnects.
pub struct ClientConnection {
    config: ClientConnectionConfig,
}

impl ClientConnection {
    pub fn new(config: ClientConnectionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClientConnectionConfig {
        &self.config
    }

    /// Opens one TCP connection to the server.
    ///
    /// # Errors
    ///
    /// [`ClientNetworkError::ConnectFailed`] if the server is unreachable.
    pub async fn connect(&self) -> Result<StreamSink<TcpStream>, ClientNetworkError> {
        let stream = TcpStream::connect(&self.config.server_addr)
            .await
            .map_err(|source| ClientNetworkError::ConnectFailed {
                addr: self.config.server_addr.clone(),
                source,
            })?;
        // Events are tiny and latency matters more than throughput.
        if let Err(e) = stream.set_nodelay(true) {
            debug!("could not disable Nagle: {e}");
        }
        Ok(StreamSink::new(stream))
    }

    /// Streams `events` to the server until the source closes.
    ///
    /// Returns `Ok(())` once the input source closes.  With reconnect enabled,
    /// connection failures are logged and retried indefinitely.
    ///
    /// # Errors
    ///
    /// - With reconnect disabled, the first connect or transport failure.
    /// - [`StreamError::Protocol`] in any mode, since a descriptor that cannot
    ///   be encoded will not encode on the next attempt either.
    pub async fn run(
        &self,
        streamer: &mut DeviceStreamer,
        mut events: mpsc::Receiver<InputEvent>,
    ) -> Result<(), ClientNetworkError> {
        let mut attempt: u64 = 0;
        loop {
            attempt += 1;
            let err = match self.connect().await {
                Ok(mut sink) => {
                    info!(server = %self.config.server_addr, attempt, "connected");
                    match streamer.stream(&mut sink, &mut events).await {
                        Ok(StreamEnd::SourceClosed) => {
                            info!(forwarded = streamer.forwarded(), "input source closed");
                            return Ok(());
                        }
                        Err(e @ StreamError::Protocol(_)) => return Err(e.into()),
                        Err(e) => ClientNetworkError::from(e),
                    }
                }
                Err(e) => e,
            };

            if !self.config.reconnect {
                return Err(err);
            }
            warn!(
                retry_in = ?self.config.reconnect_interval,
                "{err}"
            );
            time::sleep(self.config.reconnect_interval).await;

            match drain_stale(&mut events) {
                Some(0) => {}
                Some(dropped) => debug!(dropped, "discarded events captured while disconnected"),
                None => {
                    info!("input source closed while disconnected");
                    return Ok(());
                }
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
