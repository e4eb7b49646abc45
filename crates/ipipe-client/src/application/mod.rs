//! Application layer use cases for the client.
//!
//! # What use cases does the client have?
//!
//! - **`announce_device`** – Turns the local device's descriptor into the
//!   `IPIPE_DEVICE_*` packets plus the closing `IPIPE_CREATE`, sent once at
//!   the start of every connection.
//!
//! - **`forward_events`** – Wraps each captured event in exactly one
//!   `IPIPE_EVENT` packet.  No buffering, coalescing, or filtering.
//!
//! - **`stream_device`** – Runs one connection's worth of work: announce,
//!   then forward events until the source ends or the transport fails.  The
//!   transport is reached through the `PacketSink` trait so the use case can
//!   be tested without sockets.

pub mod announce_device;
pub mod forward_events;
pub mod stream_device;
