//! Push-based frame reassembler for an incoming packet stream.
//!
//! # Why a reassembler? (for beginners)
//!
//! TCP is a *byte stream*, not a message stream.  One `read()` on a socket
//! may return half a packet, exactly one packet, or three and a bit.  The
//! `FrameReader` hides that: the transport pushes whatever bytes it received
//! and then asks for complete packets until none are left.
//!
//! ```text
//! socket read ──push()──▶ [ buffered bytes ] ──next_packet()──▶ Packet
//!                                          └──▶ Ok(None) = wait for more
//! ```
//!
//! A partial packet is never consumed.  If only 3 of the 4 header bytes are
//! present, or the header is present but the payload is not, the buffer is
//! left exactly as it was and the next call resumes from the same place.

use bytes::{Buf, BytesMut};
use tracing::trace;

use crate::protocol::codec::{read_header, Packet, ProtocolError};
use crate::protocol::messages::{HEADER_SIZE, MAX_PAYLOAD_LEN};

/// Incremental packet decoder fed by arbitrary-sized chunks.
#[derive(Debug)]
pub struct FrameReader {
    buf: BytesMut,
    max_payload_len: usize,
}

impl FrameReader {
    /// Creates a reader that accepts any payload the length field can express.
    pub fn new() -> Self {
        Self::with_max_payload_len(MAX_PAYLOAD_LEN)
    }

    /// Creates a reader that rejects payloads longer than `limit` bytes.
    pub fn with_max_payload_len(limit: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(HEADER_SIZE + 64),
            max_payload_len: limit,
        }
    }

    /// Appends freshly received bytes to the internal buffer.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Yields the next complete packet, if one is buffered.
    ///
    /// * `Ok(Some(packet))`: a whole packet was buffered and has been consumed.
    /// * `Ok(None)`: incomplete; push more bytes and call again.
    /// * `Err(FrameTooLarge)`: the header declares a payload above the
    ///   configured limit.  The stream cannot be resynchronised and the
    ///   session must be torn down.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::FrameTooLarge`] as described above.
    pub fn next_packet(&mut self) -> Result<Option<Packet>, ProtocolError> {
        let Some((packet_type, payload_len)) = read_header(&self.buf) else {
            return Ok(None);
        };

        if payload_len > self.max_payload_len {
            return Err(ProtocolError::FrameTooLarge {
                declared: payload_len,
                limit: self.max_payload_len,
            });
        }

        if self.buf.len() < HEADER_SIZE + payload_len {
            trace!(
                buffered = self.buf.len(),
                needed = HEADER_SIZE + payload_len,
                "partial packet buffered"
            );
            return Ok(None);
        }

        self.buf.advance(HEADER_SIZE);
        let payload = self.buf.split_to(payload_len).freeze();
        Ok(Some(Packet::new(packet_type, payload)))
    }

    /// Number of bytes received but not yet returned as packets.
    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }

    pub fn max_payload_len(&self) -> usize {
        self.max_payload_len
    }
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
