//! Device announcement: the packets a client sends before any event.
//!
//! ```text
//! IPIPE_DEVICE_NAME          (if known)
//! IPIPE_DEVICE_ID            (if known)
//! IPIPE_DEVICE_FF_EFFECTS_MAX(if known)
//! IPIPE_DEVICE_BITS  × n     (one per capability category)
//! IPIPE_DEVICE_ABSINFO × m   (one per absolute axis)
//! IPIPE_CREATE
//! ```
//!
//! Every new connection is a new server session, so the whole announcement
//! is repeated after each reconnect.

use ipipe_core::{encode_message, DeviceDescriptor, Message, ProtocolError};

/// The full message sequence for `descriptor`, ending with `Create`.
pub fn announcement(descriptor: &DeviceDescriptor) -> Vec<Message> {
    let mut messages = descriptor.to_messages();
    messages.push(Message::Create);
    messages
}

/// The announcement encoded as one contiguous byte buffer.
///
/// # Errors
///
/// [`ProtocolError::OversizedPayload`] if the name or a capability bitmap does
/// not fit in one packet.
pub fn encode_announcement(descriptor: &DeviceDescriptor) -> Result<Vec<u8>, ProtocolError> {
    let mut out = Vec::new();
    for message in announcement(descriptor) {
        out.extend(encode_message(&message)?);
    }
    Ok(out)
}
