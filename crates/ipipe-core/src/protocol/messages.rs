//! All Input Pipe packet types and their typed payloads.
//!
//! Every packet is a 4-byte envelope (`type:u16`, `length:u16`) followed by
//! `length` payload bytes.  The payload layouts below mirror the kernel's
//! input structures without depending on any particular kernel version.
//! Every multi-byte integer is big-endian on the wire.

use serde::{Deserialize, Serialize};

// ── Protocol constants ────────────────────────────────────────────────────────

/// Size of the packet envelope in bytes.
pub const HEADER_SIZE: usize = 4;

/// Largest payload the 16-bit length field can describe.
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;

/// TCP port the server listens on unless configured otherwise.
pub const DEFAULT_PORT: u16 = 7192;

/// Exact payload size of an `IPIPE_EVENT` packet:
/// `tv_sec:u32, tv_usec:u32, value:i32, type:u16, code:u16`.
pub const EVENT_PAYLOAD_LEN: usize = 16;

/// Exact payload size of an `IPIPE_DEVICE_ID` packet.
pub const DEVICE_ID_PAYLOAD_LEN: usize = 8;

/// Exact payload size of an `IPIPE_DEVICE_FF_EFFECTS_MAX` packet.
pub const FF_EFFECTS_MAX_PAYLOAD_LEN: usize = 4;

/// Exact payload size of an `IPIPE_DEVICE_ABSINFO` packet.
pub const ABSINFO_PAYLOAD_LEN: usize = 20;

/// Fixed prefix of an `IPIPE_DEVICE_BITS` payload: `category:u16` + `count:u16`.
pub const BITS_HEADER_LEN: usize = 4;

/// `DEVICE_BITS` category holding the bitmap of supported event types.
pub const CATEGORY_EVENT_TYPES: u16 = 0;

// ── Packet type codes ─────────────────────────────────────────────────────────

/// Every packet type code this build understands.
///
/// Codes outside this set are legal on the wire and are ignored by the
/// receiver, which lets newer clients talk to older servers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum PacketType {
    // Streaming (0x01xx), valid only after a device exists
    Event = 0x0101,
    // Device characteristics (0x02xx), valid only before creation
    DeviceName = 0x0201,
    DeviceId = 0x0202,
    DeviceFfEffectsMax = 0x0203,
    DeviceAbsInfo = 0x0204,
    DeviceBits = 0x0205,
    // Lifecycle (0x03xx)
    Create = 0x0301,
}

impl PacketType {
    /// Returns `true` for the `IPIPE_DEVICE_*` family that fills in the
    /// pending device descriptor.
    pub fn is_device_field(self) -> bool {
        matches!(
            self,
            PacketType::DeviceName
                | PacketType::DeviceId
                | PacketType::DeviceFfEffectsMax
                | PacketType::DeviceAbsInfo
                | PacketType::DeviceBits
        )
    }

    /// Wire name of the packet type, used in errors and log lines.
    pub fn name(self) -> &'static str {
        match self {
            PacketType::Event => "IPIPE_EVENT",
            PacketType::DeviceName => "IPIPE_DEVICE_NAME",
            PacketType::DeviceId => "IPIPE_DEVICE_ID",
            PacketType::DeviceFfEffectsMax => "IPIPE_DEVICE_FF_EFFECTS_MAX",
            PacketType::DeviceAbsInfo => "IPIPE_DEVICE_ABSINFO",
            PacketType::DeviceBits => "IPIPE_DEVICE_BITS",
            PacketType::Create => "IPIPE_CREATE",
        }
    }
}

impl TryFrom<u16> for PacketType {
    type Error = ();

    fn try_from(value: u16) -> Result<Self, ()> {
        match value {
            0x0101 => Ok(PacketType::Event),
            0x0201 => Ok(PacketType::DeviceName),
            0x0202 => Ok(PacketType::DeviceId),
            0x0203 => Ok(PacketType::DeviceFfEffectsMax),
            0x0204 => Ok(PacketType::DeviceAbsInfo),
            0x0205 => Ok(PacketType::DeviceBits),
            0x0301 => Ok(PacketType::Create),
            _ => Err(()),
        }
    }
}

impl From<PacketType> for u16 {
    fn from(packet_type: PacketType) -> u16 {
        packet_type as u16
    }
}

// ── Per-packet payload structs ────────────────────────────────────────────────

/// A single input event as captured on the client (`IPIPE_EVENT`).
///
/// `event_type` and `code` are opaque pass-through values; both ends agree
/// on their meaning out of band.  The timestamp is the capture-side wall
/// clock and is never rewritten by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputEvent {
    pub tv_sec: u32,
    pub tv_usec: u32,
    pub value: i32,
    pub event_type: u16,
    pub code: u16,
}

/// Device identity (`IPIPE_DEVICE_ID`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct InputId {
    pub bustype: u16,
    pub vendor: u16,
    pub product: u16,
    pub version: u16,
}

/// Calibration record for one absolute axis (`IPIPE_DEVICE_ABSINFO`).
///
/// Note the wire order is `axis, max, min, fuzz, flat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct AbsInfo {
    pub axis: u32,
    pub max: i32,
    pub min: i32,
    #[serde(default)]
    pub fuzz: i32,
    #[serde(default)]
    pub flat: i32,
}

/// Capability bitmap for one category (`IPIPE_DEVICE_BITS`).
///
/// Bit `k` is stored in byte `k / 8` at bit position `k % 8`, least
/// significant bit first.  The bitmap is always exactly `ceil(count / 8)`
/// bytes long.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CapabilityBits {
    category: u16,
    count: u16,
    bitmap: Vec<u8>,
}

impl CapabilityBits {
    /// Creates an all-clear bitmap of `count` bits for `category`.
    pub fn new(category: u16, count: u16) -> Self {
        Self {
            category,
            count,
            bitmap: vec![0u8; bitmap_len(count)],
        }
    }

    /// Builds a bitmap with exactly the given indices set.
    ///
    /// The bit count is the smallest that covers the highest index.
    pub fn from_indices(category: u16, indices: impl IntoIterator<Item = u16>) -> Self {
        let mut bits = Self::new(category, 0);
        for index in indices {
            bits.set(index);
        }
        bits
    }

    /// Wraps an already-sized bitmap.
    ///
    /// Returns `None` when `bitmap.len()` is not `ceil(count / 8)`.
    pub fn from_raw(category: u16, count: u16, bitmap: Vec<u8>) -> Option<Self> {
        if bitmap.len() != bitmap_len(count) {
            return None;
        }
        Some(Self {
            category,
            count,
            bitmap,
        })
    }

    pub fn category(&self) -> u16 {
        self.category
    }

    /// Number of capability indices the bitmap covers.
    pub fn count(&self) -> u16 {
        self.count
    }

    pub fn bitmap(&self) -> &[u8] {
        &self.bitmap
    }

    /// Sets bit `index`, growing the bitmap if it does not cover it yet.
    ///
    /// Indices at `u16::MAX` cannot be represented (the count would
    /// overflow) and are ignored.
    pub fn set(&mut self, index: u16) {
        let Some(needed) = index.checked_add(1) else {
            return;
        };
        if needed > self.count {
            self.count = needed;
            self.bitmap.resize(bitmap_len(needed), 0);
        }
        self.bitmap[usize::from(index / 8)] |= 1 << (index % 8);
    }

    /// Returns `true` when bit `index` is set.  Out-of-range indices are clear.
    pub fn is_set(&self, index: u16) -> bool {
        if index >= self.count {
            return false;
        }
        self.bitmap[usize::from(index / 8)] & (1 << (index % 8)) != 0
    }

    /// Iterates the indices of every set bit in ascending order.
    pub fn iter_set(&self) -> impl Iterator<Item = u16> + '_ {
        (0..self.count).filter(move |&i| self.is_set(i))
    }
}

/// Number of bitmap bytes needed for `count` bits.
pub fn bitmap_len(count: u16) -> usize {
    usize::from(count).div_ceil(8)
}

// ── Typed message ─────────────────────────────────────────────────────────────

/// A packet with its payload decoded according to its type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Event(InputEvent),
    DeviceName(String),
    DeviceId(InputId),
    DeviceFfEffectsMax(u32),
    DeviceAbsInfo(AbsInfo),
    DeviceBits(CapabilityBits),
    Create,
    /// A packet type this build does not know; carried through untouched.
    Unknown { packet_type: u16, payload: Vec<u8> },
}

impl Message {
    /// Returns the numeric packet type code for this message.
    pub fn packet_type(&self) -> u16 {
        match self {
            Message::Event(_) => PacketType::Event.into(),
            Message::DeviceName(_) => PacketType::DeviceName.into(),
            Message::DeviceId(_) => PacketType::DeviceId.into(),
            Message::DeviceFfEffectsMax(_) => PacketType::DeviceFfEffectsMax.into(),
            Message::DeviceAbsInfo(_) => PacketType::DeviceAbsInfo.into(),
            Message::DeviceBits(_) => PacketType::DeviceBits.into(),
            Message::Create => PacketType::Create.into(),
            Message::Unknown { packet_type, .. } => *packet_type,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_type_codes_match_wire_values() {
        assert_eq!(u16::from(PacketType::Event), 0x0101);
        assert_eq!(u16::from(PacketType::DeviceName), 0x0201);
        assert_eq!(u16::from(PacketType::DeviceId), 0x0202);
        assert_eq!(u16::from(PacketType::DeviceFfEffectsMax), 0x0203);
        assert_eq!(u16::from(PacketType::DeviceAbsInfo), 0x0204);
        assert_eq!(u16::from(PacketType::DeviceBits), 0x0205);
        assert_eq!(u16::from(PacketType::Create), 0x0301);
    }

    #[test]
    fn test_packet_type_try_from_rejects_unknown_code() {
        assert_eq!(PacketType::try_from(0xFFFF), Err(()));
        assert_eq!(PacketType::try_from(0x0206), Err(()));
    }

    #[test]
    fn test_only_device_packets_are_device_fields() {
        assert!(PacketType::DeviceName.is_device_field());
        assert!(PacketType::DeviceBits.is_device_field());
        assert!(!PacketType::Event.is_device_field());
        assert!(!PacketType::Create.is_device_field());
    }

    #[test]
    fn test_bitmap_len_rounds_up() {
        assert_eq!(bitmap_len(0), 0);
        assert_eq!(bitmap_len(1), 1);
        assert_eq!(bitmap_len(8), 1);
        assert_eq!(bitmap_len(9), 2);
        assert_eq!(bitmap_len(u16::MAX), 8192);
    }

    #[test]
    fn test_capability_bits_set_grows_and_reads_back() {
        // Arrange
        let mut bits = CapabilityBits::new(1, 4);

        // Act
        bits.set(2);
        bits.set(17);

        // Assert
        assert_eq!(bits.count(), 18);
        assert_eq!(bits.bitmap().len(), 3);
        assert!(bits.is_set(2));
        assert!(bits.is_set(17));
        assert!(!bits.is_set(3));
        assert!(!bits.is_set(400));
        assert_eq!(bits.iter_set().collect::<Vec<_>>(), vec![2, 17]);
    }

    #[test]
    fn test_capability_bits_use_lsb_first_layout() {
        let bits = CapabilityBits::from_indices(3, [0, 9]);
        assert_eq!(bits.bitmap(), &[0b0000_0001, 0b0000_0010]);
    }

    #[test]
    fn test_capability_bits_from_raw_rejects_wrong_length() {
        assert!(CapabilityBits::from_raw(1, 9, vec![0]).is_none());
        assert!(CapabilityBits::from_raw(1, 9, vec![0, 0]).is_some());
    }

    #[test]
    fn test_message_packet_type_for_unknown_is_preserved() {
        let msg = Message::Unknown {
            packet_type: 0xFFFF,
            payload: vec![1, 2, 3],
        };
        assert_eq!(msg.packet_type(), 0xFFFF);
        assert_eq!(Message::Create.packet_type(), 0x0301);
    }
}
