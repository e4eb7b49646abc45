//! Binary codec for Input Pipe packets.
//!
//! Wire format:
//! ```text
//! [type:2][length:2][payload:length]
//! ```
//! Envelope size: 4 bytes. All multi-byte integers are big-endian.
//!
//! The envelope layer ([`encode_packet`], [`decode_packet`]) knows nothing
//! about payload contents.  The message layer ([`encode_message`],
//! [`decode_message`]) converts between raw [`Packet`]s and typed
//! [`Message`]s and enforces the fixed payload sizes.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::protocol::messages::{
    bitmap_len, AbsInfo, CapabilityBits, InputEvent, InputId, Message, PacketType,
    ABSINFO_PAYLOAD_LEN, BITS_HEADER_LEN, DEVICE_ID_PAYLOAD_LEN, EVENT_PAYLOAD_LEN,
    FF_EFFECTS_MAX_PAYLOAD_LEN, HEADER_SIZE, MAX_PAYLOAD_LEN,
};

/// Errors that can occur while framing or parsing packets.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A received header declares a payload above the configured limit.
    #[error("frame too large: declared payload of {declared} bytes exceeds limit of {limit}")]
    FrameTooLarge { declared: usize, limit: usize },

    /// A payload handed to the encoder does not fit in the 16-bit length field.
    #[error("oversized payload: {len} bytes (max {MAX_PAYLOAD_LEN})")]
    OversizedPayload { len: usize },

    /// A known packet type arrived with a payload of the wrong shape.
    #[error("malformed {packet} payload: {reason}")]
    MalformedPayload { packet: &'static str, reason: String },

    /// A device field arrived after the descriptor was handed to device creation.
    #[error("device descriptor is frozen; {packet} rejected")]
    DescriptorFrozen { packet: &'static str },
}

/// One framed packet with its payload still undecoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub packet_type: u16,
    pub payload: Bytes,
}

impl Packet {
    pub fn new(packet_type: u16, payload: impl Into<Bytes>) -> Self {
        Self {
            packet_type,
            payload: payload.into(),
        }
    }

    /// Returns the known packet type, or `None` for codes this build ignores.
    pub fn known_type(&self) -> Option<PacketType> {
        PacketType::try_from(self.packet_type).ok()
    }
}

// ── Envelope ──────────────────────────────────────────────────────────────────

/// Frames `payload` behind a 4-byte envelope.
///
/// # Errors
///
/// Returns [`ProtocolError::OversizedPayload`] if `payload` is longer than
/// 65535 bytes.
///
/// # Examples
///
/// ```rust
/// use ipipe_core::protocol::{decode_packet, encode_packet};
///
/// let bytes = encode_packet(0x0201, b"joy0").unwrap();
/// assert_eq!(&bytes[..4], &[0x02, 0x01, 0x00, 0x04]);
/// let (packet, consumed) = decode_packet(&bytes).unwrap();
/// assert_eq!(packet.packet_type, 0x0201);
/// assert_eq!(&packet.payload[..], b"joy0");
/// assert_eq!(consumed, bytes.len());
/// ```
pub fn encode_packet(packet_type: u16, payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    encode_packet_into(packet_type, payload, &mut buf)?;
    Ok(buf.to_vec())
}

/// Appends one framed packet to `buf`.
///
/// Nothing is written when the payload is oversized.
///
/// # Errors
///
/// Returns [`ProtocolError::OversizedPayload`] if `payload` is longer than
/// 65535 bytes.
pub fn encode_packet_into(
    packet_type: u16,
    payload: &[u8],
    buf: &mut BytesMut,
) -> Result<(), ProtocolError> {
    let len = u16::try_from(payload.len())
        .map_err(|_| ProtocolError::OversizedPayload { len: payload.len() })?;
    buf.reserve(HEADER_SIZE + payload.len());
    buf.put_u16(packet_type);
    buf.put_u16(len);
    buf.put_slice(payload);
    Ok(())
}

/// Decodes one packet from the front of `bytes`.
///
/// Returns the packet together with the number of bytes it occupied, or
/// `None` when `bytes` does not yet hold a complete packet.  Use
/// [`crate::protocol::FrameReader`] when bytes arrive incrementally.
pub fn decode_packet(bytes: &[u8]) -> Option<(Packet, usize)> {
    let (packet_type, payload_len) = read_header(bytes)?;
    let total = HEADER_SIZE + payload_len;
    if bytes.len() < total {
        return None;
    }
    let payload = Bytes::copy_from_slice(&bytes[HEADER_SIZE..total]);
    Some((Packet::new(packet_type, payload), total))
}

/// Reads `(type, length)` from a buffer holding at least a full envelope.
pub(crate) fn read_header(bytes: &[u8]) -> Option<(u16, usize)> {
    if bytes.len() < HEADER_SIZE {
        return None;
    }
    let packet_type = u16::from_be_bytes([bytes[0], bytes[1]]);
    let payload_len = usize::from(u16::from_be_bytes([bytes[2], bytes[3]]));
    Some((packet_type, payload_len))
}

// ── Messages ──────────────────────────────────────────────────────────────────

/// Encodes a typed [`Message`] into a framed packet.
///
/// # Errors
///
/// Returns [`ProtocolError::OversizedPayload`] if the payload (e.g. a very
/// long device name) does not fit the length field.
pub fn encode_message(msg: &Message) -> Result<Vec<u8>, ProtocolError> {
    let payload = encode_payload(msg);
    encode_packet(msg.packet_type(), &payload)
}

/// Serialises the payload of `msg` without the envelope.
pub fn encode_payload(msg: &Message) -> Vec<u8> {
    let mut buf = BytesMut::new();
    match msg {
        Message::Event(e) => encode_event(&mut buf, e),
        Message::DeviceName(name) => buf.put_slice(name.as_bytes()),
        Message::DeviceId(id) => encode_input_id(&mut buf, id),
        Message::DeviceFfEffectsMax(max) => buf.put_u32(*max),
        Message::DeviceAbsInfo(info) => encode_absinfo(&mut buf, info),
        Message::DeviceBits(bits) => encode_bits(&mut buf, bits),
        Message::Create => {} // empty payload
        Message::Unknown { payload, .. } => buf.put_slice(payload),
    }
    buf.to_vec()
}

/// Decodes the payload of `packet` according to its type.
///
/// Unknown packet types are not an error: they come back as
/// [`Message::Unknown`] so the caller can ignore them.
///
/// # Errors
///
/// Returns [`ProtocolError::MalformedPayload`] when a known packet type
/// carries a payload of the wrong size or shape.
pub fn decode_message(packet: &Packet) -> Result<Message, ProtocolError> {
    let p = &packet.payload[..];
    let Some(packet_type) = packet.known_type() else {
        return Ok(Message::Unknown {
            packet_type: packet.packet_type,
            payload: p.to_vec(),
        });
    };

    match packet_type {
        PacketType::Event => decode_event(p).map(Message::Event),
        PacketType::DeviceName => Ok(Message::DeviceName(decode_name(p))),
        PacketType::DeviceId => decode_input_id(p).map(Message::DeviceId),
        PacketType::DeviceFfEffectsMax => {
            require_exact_len(p, FF_EFFECTS_MAX_PAYLOAD_LEN, packet_type)?;
            Ok(Message::DeviceFfEffectsMax(read_u32(p, 0)))
        }
        PacketType::DeviceAbsInfo => decode_absinfo(p).map(Message::DeviceAbsInfo),
        PacketType::DeviceBits => decode_bits(p).map(Message::DeviceBits),
        PacketType::Create => {
            require_exact_len(p, 0, packet_type)?;
            Ok(Message::Create)
        }
    }
}

// ── Per-packet encode helpers ─────────────────────────────────────────────────

fn encode_event(buf: &mut BytesMut, e: &InputEvent) {
    buf.put_u32(e.tv_sec);
    buf.put_u32(e.tv_usec);
    buf.put_i32(e.value);
    buf.put_u16(e.event_type);
    buf.put_u16(e.code);
}

fn encode_input_id(buf: &mut BytesMut, id: &InputId) {
    buf.put_u16(id.bustype);
    buf.put_u16(id.vendor);
    buf.put_u16(id.product);
    buf.put_u16(id.version);
}

fn encode_absinfo(buf: &mut BytesMut, info: &AbsInfo) {
    buf.put_u32(info.axis);
    buf.put_i32(info.max);
    buf.put_i32(info.min);
    buf.put_i32(info.fuzz);
    buf.put_i32(info.flat);
}

fn encode_bits(buf: &mut BytesMut, bits: &CapabilityBits) {
    buf.put_u16(bits.category());
    buf.put_u16(bits.count());
    buf.put_slice(bits.bitmap());
}

// ── Per-packet decode helpers ─────────────────────────────────────────────────

fn decode_event(p: &[u8]) -> Result<InputEvent, ProtocolError> {
    require_exact_len(p, EVENT_PAYLOAD_LEN, PacketType::Event)?;
    Ok(InputEvent {
        tv_sec: read_u32(p, 0),
        tv_usec: read_u32(p, 4),
        value: read_i32(p, 8),
        event_type: read_u16(p, 12),
        code: read_u16(p, 14),
    })
}

/// Device names are not terminated on the wire, but C clients commonly
/// include one or more trailing NULs; those are dropped.
fn decode_name(p: &[u8]) -> String {
    let end = p.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    String::from_utf8_lossy(&p[..end]).into_owned()
}

fn decode_input_id(p: &[u8]) -> Result<InputId, ProtocolError> {
    require_exact_len(p, DEVICE_ID_PAYLOAD_LEN, PacketType::DeviceId)?;
    Ok(InputId {
        bustype: read_u16(p, 0),
        vendor: read_u16(p, 2),
        product: read_u16(p, 4),
        version: read_u16(p, 6),
    })
}

fn decode_absinfo(p: &[u8]) -> Result<AbsInfo, ProtocolError> {
    require_exact_len(p, ABSINFO_PAYLOAD_LEN, PacketType::DeviceAbsInfo)?;
    Ok(AbsInfo {
        axis: read_u32(p, 0),
        max: read_i32(p, 4),
        min: read_i32(p, 8),
        fuzz: read_i32(p, 12),
        flat: read_i32(p, 16),
    })
}

fn decode_bits(p: &[u8]) -> Result<CapabilityBits, ProtocolError> {
    if p.len() < BITS_HEADER_LEN {
        return Err(malformed(
            PacketType::DeviceBits,
            format!("need at least {BITS_HEADER_LEN} bytes, got {}", p.len()),
        ));
    }
    let category = read_u16(p, 0);
    let count = read_u16(p, 2);
    let expected = BITS_HEADER_LEN + bitmap_len(count);
    if p.len() != expected {
        return Err(malformed(
            PacketType::DeviceBits,
            format!("{count} bits need {expected} bytes, got {}", p.len()),
        ));
    }
    CapabilityBits::from_raw(category, count, p[BITS_HEADER_LEN..].to_vec())
        .ok_or_else(|| malformed(PacketType::DeviceBits, "bitmap length mismatch".into()))
}

// ── Low-level helpers ─────────────────────────────────────────────────────────

fn require_exact_len(p: &[u8], needed: usize, packet: PacketType) -> Result<(), ProtocolError> {
    if p.len() != needed {
        return Err(malformed(
            packet,
            format!("expected exactly {needed} bytes, got {}", p.len()),
        ));
    }
    Ok(())
}

fn malformed(packet: PacketType, reason: String) -> ProtocolError {
    ProtocolError::MalformedPayload {
        packet: packet.name(),
        reason,
    }
}

// Callers check the payload length first, so these index in bounds.

fn read_u16(buf: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([buf[offset], buf[offset + 1]])
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

fn read_i32(buf: &[u8], offset: usize) -> i32 {
    i32::from_be_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

// ── Tests ─────────────────────────────────────────────────────────────────────
