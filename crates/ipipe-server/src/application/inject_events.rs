//! EventInjector: decodes `IPIPE_EVENT` packets and replays them into the
//! session's virtual device.
//!
//! Events are passed through untouched: no remapping, filtering, or
//! synthetic `SYN_REPORT` insertion.  The client already forwards the
//! kernel's sync events, so the device sees exactly the stream the remote
//! device produced.

use ipipe_core::{decode_message, InputEvent, Message, Packet, ProtocolError};
use tracing::trace;

use crate::application::device_registry::DeviceRegistry;
use crate::application::session::SessionError;

/// Injects forwarded events and counts how many reached a device.
#[derive(Debug, Default)]
pub struct EventInjector {
    injected: u64,
}

impl EventInjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Injects the event carried by `packet` into the registry's device.
    ///
    /// # Errors
    ///
    /// - [`SessionError::DeviceNotReady`] if no device has been created yet.
    /// - [`SessionError::Protocol`] if the payload is not a well-formed event.
    /// - [`SessionError::InjectionFailed`] if the device rejects the event.
    pub fn inject(
        &mut self,
        registry: &mut DeviceRegistry,
        packet: &Packet,
    ) -> Result<InputEvent, SessionError> {
        let device = registry.device_mut().ok_or(SessionError::DeviceNotReady)?;

        let event = match decode_message(packet)? {
            Message::Event(event) => event,
            other => {
                return Err(ProtocolError::MalformedPayload {
                    packet: "IPIPE_EVENT",
                    reason: format!("expected an event packet, got 0x{:04X}", other.packet_type()),
                }
                .into())
            }
        };

        device.emit(&event).map_err(SessionError::InjectionFailed)?;
        self.injected += 1;

        trace!(
            event_type = event.event_type,
            code = event.code,
            value = event.value,
            "event injected"
        );
        Ok(event)
    }

    /// Number of events successfully injected so far.
    pub fn injected(&self) -> u64 {
        self.injected
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
