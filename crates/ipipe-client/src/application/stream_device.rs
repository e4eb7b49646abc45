//! DeviceStreamer: one connection's worth of client work.
//!
//! # Flow (for beginners)
//!
//! ```text
//!  InputSource ──events──▶ DeviceStreamer ──bytes──▶ PacketSink (TCP)
//!                              │
//!                              ├─ 1. announcement (DEVICE_* … CREATE)
//!                              └─ 2. one IPIPE_EVENT per captured event
//! ```
//!
//! The streamer never reads from the sink; the protocol is one-way.  A
//! transport failure ends the current connection and the caller decides
//! whether to reconnect.  Because the server treats every connection as a
//! fresh session, [`DeviceStreamer::stream`] always starts by announcing.

use async_trait::async_trait;
use bytes::BytesMut;
use ipipe_core::{DeviceDescriptor, InputEvent, ProtocolError};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::application::announce_device::encode_announcement;
use crate::application::forward_events::EventForwarder;

/// Upper bound on bytes coalesced into one write when events queue up.
pub const MAX_WRITE_BATCH: usize = 16 * 1024;

/// Where encoded packets go.  Implemented over TCP in the infrastructure
/// layer and mocked in tests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PacketSink: Send {
    /// Writes all of `bytes` or fails.
    async fn send(&mut self, bytes: &[u8]) -> std::io::Result<()>;
}

/// Why a streaming run stopped with an error.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The device description could not be encoded.  Reconnecting will not help.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// The sink failed; the connection is gone.
    #[error("transport failed: {0}")]
    Transport(#[from] std::io::Error),
}

/// Why a streaming run stopped without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// The input source closed its channel.
    SourceClosed,
}

/// Announces one device and forwards its events.
pub struct DeviceStreamer {
    descriptor: DeviceDescriptor,
    announcement: Vec<u8>,
    forwarder: EventForwarder,
}

impl DeviceStreamer {
    /// Pre-encodes the announcement for `descriptor`.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::OversizedPayload`] if the descriptor cannot be encoded.
    pub fn new(descriptor: DeviceDescriptor) -> Result<Self, ProtocolError> {
        let announcement = encode_announcement(&descriptor)?;
        Ok(Self {
            descriptor,
            announcement,
            forwarder: EventForwarder::new(),
        })
    }

    pub fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    /// Total events forwarded across all connections.
    pub fn forwarded(&self) -> u64 {
        self.forwarder.forwarded()
    }

    /// Sends the device announcement, ending with `IPIPE_CREATE`.
    ///
    /// # Errors
    ///
    /// [`StreamError::Transport`] if the sink fails.
    pub async fn announce<S>(&self, sink: &mut S) -> Result<(), StreamError>
    where
        S: PacketSink + ?Sized,
    {
        sink.send(&self.announcement).await?;
        info!(
            device = self.descriptor.display_name(),
            bytes = self.announcement.len(),
            "device announced"
        );
        Ok(())
    }

    /// Announces, then forwards events until `events` closes or `sink` fails.
    ///
    /// Events that are already queued when one arrives are written together,
    /// still one packet per event and in capture order.
    ///
    /// # Errors
    ///
    /// See [`StreamError`].
    pub async fn stream<S>(
        &mut self,
        sink: &mut S,
        events: &mut mpsc::Receiver<InputEvent>,
    ) -> Result<StreamEnd, StreamError>
    where
        S: PacketSink + ?Sized,
    {
        self.announce(sink).await?;

        let mut batch = BytesMut::with_capacity(MAX_WRITE_BATCH);
        while let Some(event) = events.recv().await {
            batch.clear();
            self.forwarder.forward_into(&event, &mut batch)?;
            while batch.len() < MAX_WRITE_BATCH {
                match events.try_recv() {
                    Ok(next) => self.forwarder.forward_into(&next, &mut batch)?,
                    Err(_) => break,
                }
            }
            sink.send(&batch).await?;
            debug!(bytes = batch.len(), "events written");
        }

        Ok(StreamEnd::SourceClosed)
    }
}

/// Discards events that queued up while no connection existed.
///
/// Returns how many were dropped, or `None` if the source has closed.
pub fn drain_stale(events: &mut mpsc::Receiver<InputEvent>) -> Option<usize> {
    let mut dropped = 0;
    loop {
        match events.try_recv() {
            Ok(_) => dropped += 1,
            Err(mpsc::error::TryRecvError::Empty) => return Some(dropped),
            Err(mpsc::error::TryRecvError::Disconnected) => {
                return if dropped == 0 { None } else { Some(dropped) }
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
