//! Session: the per-connection protocol state machine on the server.
//!
//! # Lifecycle (for beginners)
//!
//! Every client connection gets its own `Session`.  A session moves through
//! three states and never goes backwards:
//!
//! ```text
//!            DEVICE_* packets          EVENT packets
//!              ┌──────┐                 ┌──────┐
//!              ▼      │                 ▼      │
//!  ──▶  Building ─────┴── CREATE ──▶  Active ──┴── close / error ──▶ Closed
//!          │                                                           ▲
//!          └──────────────────── close / error ────────────────────────┘
//! ```
//!
//! - **Building**: `IPIPE_DEVICE_*` packets fill in a [`DescriptorBuilder`].
//!   Events are not allowed yet.
//! - **Active**: `IPIPE_CREATE` froze the descriptor and a virtual device
//!   exists.  Only events are allowed now.
//! - **Closed**: the device (if any) has been destroyed.  Nothing else
//!   happens on this session.
//!
//! Unknown packet types are logged and skipped in any state except Closed.
//! Every error returned by [`Session::feed`] or [`Session::handle_packet`]
//! closes the session before it is returned; the transport only has to drop
//! the connection.

use std::sync::Arc;

use ipipe_core::{
    decode_message, ApplyOutcome, DescriptorBuilder, DeviceDescriptor, FrameReader, Message, Packet,
    PacketType, ProtocolError,
};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::device_registry::{DeviceError, DeviceRegistry, VirtualDeviceProvider};
use crate::application::inject_events::EventInjector;

// ── Errors ────────────────────────────────────────────────────────────────────

/// Everything that can end a session.  All variants are session-fatal.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("a virtual device already exists for this session")]
    AlreadyCreated,

    #[error("virtual device creation failed: {0}")]
    DeviceCreationFailed(#[source] DeviceError),

    #[error("IPIPE_EVENT received before IPIPE_CREATE")]
    EventBeforeCreate,

    #[error("{packet} received after the device was created")]
    UnexpectedAfterCreate { packet: &'static str },

    #[error("no virtual device to inject into")]
    DeviceNotReady,

    #[error("event injection failed: {0}")]
    InjectionFailed(#[source] DeviceError),

    #[error("connection lost")]
    ConnectionLost,

    #[error("session is closed")]
    SessionClosed,
}

// ── State ─────────────────────────────────────────────────────────────────────

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Building,
    Active,
    Closed,
}

/// What a successfully handled packet did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    DescriptorUpdated,
    DeviceCreated,
    EventInjected,
    Ignored,
}

/// Counters reported when a session ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub packets_handled: u64,
    pub events_injected: u64,
    pub unknown_ignored: u64,
}

// ── Session ───────────────────────────────────────────────────────────────────

/// Protocol state for one client connection.
pub struct Session {
    id: Uuid,
    state: SessionState,
    reader: FrameReader,
    builder: DescriptorBuilder,
    registry: DeviceRegistry,
    injector: EventInjector,
    packets_handled: u64,
    unknown_ignored: u64,
}

impl Session {
    /// Starts a session in the Building state with the default frame limit.
    pub fn new(provider: Arc<dyn VirtualDeviceProvider>) -> Self {
        Self::with_reader(provider, FrameReader::new())
    }

    /// Starts a session whose frame reader rejects payloads above `limit`.
    pub fn with_max_payload_len(provider: Arc<dyn VirtualDeviceProvider>, limit: usize) -> Self {
        Self::with_reader(provider, FrameReader::with_max_payload_len(limit))
    }

    fn with_reader(provider: Arc<dyn VirtualDeviceProvider>, reader: FrameReader) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: SessionState::Building,
            reader,
            builder: DescriptorBuilder::new(),
            registry: DeviceRegistry::new(provider),
            injector: EventInjector::new(),
            packets_handled: 0,
            unknown_ignored: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The descriptor accumulated so far (frozen once Active).
    pub fn descriptor(&self) -> &DeviceDescriptor {
        self.builder.descriptor()
    }

    /// Whether a virtual device currently exists for this session.
    pub fn has_device(&self) -> bool {
        self.registry.is_created()
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            packets_handled: self.packets_handled,
            events_injected: self.injector.injected(),
            unknown_ignored: self.unknown_ignored,
        }
    }

    /// Feeds raw transport bytes and dispatches every complete packet.
    ///
    /// Returns the number of packets dispatched.  Bytes of a trailing partial
    /// packet stay buffered for the next call.
    ///
    /// # Errors
    ///
    /// The first error encountered; the session is Closed when it returns.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<usize, SessionError> {
        if self.state == SessionState::Closed {
            return Err(SessionError::SessionClosed);
        }

        self.reader.push(bytes);
        let mut dispatched = 0;
        loop {
            let packet = match self.reader.next_packet() {
                Ok(Some(packet)) => packet,
                Ok(None) => return Ok(dispatched),
                Err(e) => return Err(self.fail(e.into())),
            };
            self.handle_packet(&packet)?;
            dispatched += 1;
        }
    }

    /// Dispatches one complete packet according to the current state.
    ///
    /// # Errors
    ///
    /// See [`SessionError`]; the session is Closed when an error is returned.
    pub fn handle_packet(&mut self, packet: &Packet) -> Result<Dispatch, SessionError> {
        if self.state == SessionState::Closed {
            return Err(SessionError::SessionClosed);
        }
        self.packets_handled += 1;

        let result = match (self.state, packet.known_type()) {
            (_, None) => {
                self.unknown_ignored += 1;
                debug!(
                    session = %self.id,
                    packet_type = format_args!("0x{:04X}", packet.packet_type),
                    len = packet.payload.len(),
                    "ignoring unknown packet type"
                );
                Ok(Dispatch::Ignored)
            }
            (SessionState::Building, Some(PacketType::Event)) => Err(SessionError::EventBeforeCreate),
            (SessionState::Building, Some(PacketType::Create)) => self.create_device(packet),
            (SessionState::Building, Some(_)) => self.apply_descriptor(packet),
            (SessionState::Active, Some(PacketType::Event)) => self
                .injector
                .inject(&mut self.registry, packet)
                .map(|_| Dispatch::EventInjected),
            (SessionState::Active, Some(PacketType::Create)) => Err(SessionError::AlreadyCreated),
            (SessionState::Active, Some(other)) => Err(SessionError::UnexpectedAfterCreate {
                packet: other.name(),
            }),
            (SessionState::Closed, Some(_)) => Err(SessionError::SessionClosed),
        };

        result.map_err(|e| self.fail(e))
    }

    /// Tears the session down.  Idempotent; the device is destroyed once.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.state = SessionState::Closed;
        self.registry.release();

        let stats = self.stats();
        info!(
            session = %self.id,
            device = self.builder.descriptor().display_name(),
            packets = stats.packets_handled,
            events = stats.events_injected,
            unknown = stats.unknown_ignored,
            "session closed"
        );
    }

    /// Records that the transport went away and closes the session.
    pub fn connection_lost(&mut self) -> SessionError {
        self.fail(SessionError::ConnectionLost)
    }

    // ── Private helpers ───────────────────────────────────────────────────────

    fn apply_descriptor(&mut self, packet: &Packet) -> Result<Dispatch, SessionError> {
        match self.builder.apply(packet)? {
            ApplyOutcome::Merged => Ok(Dispatch::DescriptorUpdated),
            ApplyOutcome::NotDescriptor => Ok(Dispatch::Ignored),
        }
    }

    fn create_device(&mut self, packet: &Packet) -> Result<Dispatch, SessionError> {
        // Validates the (empty) payload before anything is frozen.
        match decode_message(packet)? {
            Message::Create => {}
            _ => return Ok(Dispatch::Ignored),
        }

        let descriptor = self.builder.freeze();
        if descriptor.is_empty() {
            warn!(session = %self.id, "creating a device from an empty descriptor");
        }
        self.registry.create(descriptor)?;
        self.state = SessionState::Active;

        info!(
            session = %self.id,
            device = self.builder.descriptor().display_name(),
            "session active"
        );
        Ok(Dispatch::DeviceCreated)
    }

    fn fail(&mut self, err: SessionError) -> SessionError {
        warn!(session = %self.id, error = %err, "session failed");
        self.close();
        err
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("descriptor", self.builder.descriptor())
            .field("has_device", &self.registry.is_created())
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
