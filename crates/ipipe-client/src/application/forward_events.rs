//! EventForwarder: one captured event in, one `IPIPE_EVENT` packet out.
//!
//! Event ordering is preserved by construction: the forwarder never holds an
//! event back, and the single TCP stream delivers packets in the order they
//! were written.

use bytes::BytesMut;
use ipipe_core::protocol::{encode_packet_into, encode_payload};
use ipipe_core::{encode_message, InputEvent, Message, PacketType, ProtocolError};

/// Encodes captured events and counts them.
#[derive(Debug, Default)]
pub struct EventForwarder {
    forwarded: u64,
}

impl EventForwarder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encodes `event` as a complete `IPIPE_EVENT` packet.
    ///
    /// # Errors
    ///
    /// Only if the codec rejects the payload, which a fixed-size event never
    /// triggers in practice.
    pub fn forward(&mut self, event: &InputEvent) -> Result<Vec<u8>, ProtocolError> {
        let bytes = encode_message(&Message::Event(*event))?;
        self.forwarded += 1;
        Ok(bytes)
    }

    /// Appends the `IPIPE_EVENT` packet for `event` to `out`.
    ///
    /// Used when several events are already queued, so they go out in one
    /// write while still being one packet each.
    ///
    /// # Errors
    ///
    /// As for [`forward`](Self::forward).
    pub fn forward_into(
        &mut self,
        event: &InputEvent,
        out: &mut BytesMut,
    ) -> Result<(), ProtocolError> {
        let payload = encode_payload(&Message::Event(*event));
        encode_packet_into(PacketType::Event.into(), &payload, out)?;
        self.forwarded += 1;
        Ok(())
    }

    /// Number of events encoded so far.
    pub fn forwarded(&self) -> u64 {
        self.forwarded
    }
}
