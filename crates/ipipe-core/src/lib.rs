//! # ipipe-core
//!
//! Shared library for Input Pipe containing the wire protocol, the packet
//! codec, and the device descriptor model.
//!
//! This crate is used by both the client and the server.  It has no
//! dependencies on OS input APIs or network sockets.
//!
//! # Architecture overview (for beginners)
//!
//! Input Pipe is network transparency for an input layer: a *client* reads
//! events from a local keyboard, mouse, or joystick and streams them to a
//! *server*, which creates an equivalent virtual device and replays the
//! events into it.  One TCP connection carries exactly one device.
//!
//! A connection has two phases:
//!
//! 1. **Describe** – the client sends `IPIPE_DEVICE_*` packets (name, id,
//!    capability bitmaps, axis calibration), then a zero-length
//!    `IPIPE_CREATE`.
//! 2. **Stream** – every captured event becomes one `IPIPE_EVENT` packet.
//!
//! This crate defines:
//!
//! - **`protocol`** – How bytes travel over the network.  Packets are a
//!   4-byte envelope plus payload; [`protocol::FrameReader`] reassembles
//!   them from arbitrary socket reads.
//!
//! - **`domain`** – The [`DeviceDescriptor`] both ends agree on and the
//!   [`DescriptorBuilder`] that accumulates it from packets.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `ipipe_core::Packet` instead of `ipipe_core::protocol::codec::Packet`.
pub use domain::descriptor::{ApplyOutcome, DescriptorBuilder, DeviceDescriptor};
pub use protocol::codec::{decode_message, encode_message, encode_packet, Packet, ProtocolError};
pub use protocol::frame::FrameReader;
pub use protocol::messages::{
    AbsInfo, CapabilityBits, InputEvent, InputId, Message, PacketType, CATEGORY_EVENT_TYPES,
};
