//! The pending device descriptor and the builder that fills it in.
//!
//! # Lifecycle (for beginners)
//!
//! Before a virtual device can exist on the server, the client describes it
//! one field at a time with `IPIPE_DEVICE_*` packets:
//!
//! ```text
//! DEVICE_NAME("joy0")      ─┐
//! DEVICE_ID(3, 0x46d, ..)   │  DescriptorBuilder::apply() merges each one
//! DEVICE_BITS(..)           │  into the pending DeviceDescriptor
//! DEVICE_ABSINFO(axis 0)   ─┘
//! CREATE                   ──▶ DescriptorBuilder::freeze() hands it over
//! ```
//!
//! Every field is optional; an empty descriptor is still a valid creation
//! request.  Once frozen, the builder rejects further device fields because
//! the identity of a live device cannot change.
//!
//! The same type is used on the client to *produce* the packet sequence, see
//! [`DeviceDescriptor::to_messages`].

use std::collections::BTreeMap;

use tracing::debug;

use crate::protocol::codec::{decode_message, Packet, ProtocolError};
use crate::protocol::messages::{AbsInfo, CapabilityBits, InputId, Message, PacketType};

/// Everything the server needs to know to create a matching virtual device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub name: Option<String>,
    pub id: Option<InputId>,
    pub ff_effects_max: Option<u32>,
    /// Calibration records keyed by axis id.
    pub axes: BTreeMap<u32, AbsInfo>,
    /// Capability bitmaps keyed by category.
    pub capabilities: BTreeMap<u16, CapabilityBits>,
}

impl DeviceDescriptor {
    /// Returns `true` when no field has been set.
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.id.is_none()
            && self.ff_effects_max.is_none()
            && self.axes.is_empty()
            && self.capabilities.is_empty()
    }

    /// Name for log lines; unnamed devices are common and legal.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<unnamed>")
    }

    pub fn axis(&self, axis: u32) -> Option<&AbsInfo> {
        self.axes.get(&axis)
    }

    pub fn capability(&self, category: u16) -> Option<&CapabilityBits> {
        self.capabilities.get(&category)
    }

    /// Inserts or replaces the calibration record for `info.axis`.
    pub fn set_axis(&mut self, info: AbsInfo) {
        self.axes.insert(info.axis, info);
    }

    /// Inserts or replaces the bitmap for `bits.category()`.
    pub fn set_capability(&mut self, bits: CapabilityBits) {
        self.capabilities.insert(bits.category(), bits);
    }

    /// The `IPIPE_DEVICE_*` messages that describe this device, in the order
    /// a client sends them: name, id, force-feedback maximum, capability
    /// bitmaps, then axis calibration.
    ///
    /// `IPIPE_CREATE` is not included; the caller sends it once the
    /// description is complete.
    pub fn to_messages(&self) -> Vec<Message> {
        let mut messages = Vec::with_capacity(3 + self.capabilities.len() + self.axes.len());
        if let Some(name) = &self.name {
            messages.push(Message::DeviceName(name.clone()));
        }
        if let Some(id) = self.id {
            messages.push(Message::DeviceId(id));
        }
        if let Some(max) = self.ff_effects_max {
            messages.push(Message::DeviceFfEffectsMax(max));
        }
        messages.extend(self.capabilities.values().cloned().map(Message::DeviceBits));
        messages.extend(self.axes.values().copied().map(Message::DeviceAbsInfo));
        messages
    }
}

/// What [`DescriptorBuilder::apply`] did with a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The packet was a device field and has been merged.
    Merged,
    /// The packet is not a device field; the descriptor is untouched.
    NotDescriptor,
}

/// Accumulates `IPIPE_DEVICE_*` packets into a [`DeviceDescriptor`].
#[derive(Debug, Default)]
pub struct DescriptorBuilder {
    descriptor: DeviceDescriptor,
    frozen: bool,
}

impl DescriptorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The descriptor as accumulated so far.
    pub fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Decodes `packet` and merges it if it is a device field.
    ///
    /// Packets of any other type, known or unknown, are left alone and
    /// reported as [`ApplyOutcome::NotDescriptor`].
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::MalformedPayload`] for a device field of the
    /// wrong size, and [`ProtocolError::DescriptorFrozen`] for any device
    /// field applied after [`freeze`](Self::freeze).
    pub fn apply(&mut self, packet: &Packet) -> Result<ApplyOutcome, ProtocolError> {
        match packet.known_type() {
            Some(t) if t.is_device_field() => {
                self.ensure_mutable(t)?;
                let msg = decode_message(packet)?;
                self.apply_message(&msg)
            }
            _ => Ok(ApplyOutcome::NotDescriptor),
        }
    }

    /// Merges an already-decoded message.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::DescriptorFrozen`] for a device field applied
    /// after [`freeze`](Self::freeze).
    pub fn apply_message(&mut self, msg: &Message) -> Result<ApplyOutcome, ProtocolError> {
        if let Ok(t) = PacketType::try_from(msg.packet_type()) {
            if t.is_device_field() {
                self.ensure_mutable(t)?;
            }
        }

        let d = &mut self.descriptor;
        match msg {
            Message::DeviceName(name) => {
                debug!(name = %name, "descriptor: name");
                d.name = Some(name.clone());
            }
            Message::DeviceId(id) => {
                debug!(?id, "descriptor: id");
                d.id = Some(*id);
            }
            Message::DeviceFfEffectsMax(max) => {
                debug!(max, "descriptor: ff effects max");
                d.ff_effects_max = Some(*max);
            }
            Message::DeviceAbsInfo(info) => {
                debug!(axis = info.axis, min = info.min, max = info.max, "descriptor: absinfo");
                d.set_axis(*info);
            }
            Message::DeviceBits(bits) => {
                debug!(category = bits.category(), count = bits.count(), "descriptor: bits");
                d.set_capability(bits.clone());
            }
            Message::Event(_) | Message::Create | Message::Unknown { .. } => {
                return Ok(ApplyOutcome::NotDescriptor);
            }
        }
        Ok(ApplyOutcome::Merged)
    }

    /// Freezes the builder and returns the finalized descriptor.
    ///
    /// Calling it again returns the same descriptor.
    pub fn freeze(&mut self) -> DeviceDescriptor {
        self.frozen = true;
        self.descriptor.clone()
    }

    fn ensure_mutable(&self, packet_type: PacketType) -> Result<(), ProtocolError> {
        if self.frozen {
            return Err(ProtocolError::DescriptorFrozen {
                packet: packet_type.name(),
            });
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
