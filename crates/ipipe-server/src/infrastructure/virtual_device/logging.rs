//! A provider whose devices log through `tracing` instead of reaching the OS.

use std::sync::atomic::{AtomicU64, Ordering};

use ipipe_core::{DeviceDescriptor, InputEvent};
use tracing::{debug, info};

use crate::application::device_registry::{DeviceError, VirtualDevice, VirtualDeviceProvider};

/// Hands out numbered logging devices.
#[derive(Debug, Default)]
pub struct LoggingDeviceProvider {
    next_id: AtomicU64,
}

impl LoggingDeviceProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VirtualDeviceProvider for LoggingDeviceProvider {
    fn create_device(
        &self,
        descriptor: &DeviceDescriptor,
    ) -> Result<Box<dyn VirtualDevice>, DeviceError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        info!(
            device = id,
            name = descriptor.display_name(),
            id = ?descriptor.id,
            ff_effects_max = ?descriptor.ff_effects_max,
            axes = descriptor.axes.len(),
            "logging device created"
        );
        Ok(Box::new(LoggingDevice {
            id,
            name: descriptor.display_name().to_string(),
            emitted: 0,
        }))
    }
}

struct LoggingDevice {
    id: u64,
    name: String,
    emitted: u64,
}

impl VirtualDevice for LoggingDevice {
    fn emit(&mut self, event: &InputEvent) -> Result<(), DeviceError> {
        self.emitted += 1;
        debug!(
            device = self.id,
            tv_sec = event.tv_sec,
            tv_usec = event.tv_usec,
            event_type = event.event_type,
            code = event.code,
            value = event.value,
            "event"
        );
        Ok(())
    }

    fn destroy(&mut self) {
        info!(
            device = self.id,
            name = %self.name,
            events = self.emitted,
            "logging device destroyed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_devices_accept_events() {
        let provider = LoggingDeviceProvider::new();
        let mut device = provider.create_device(&DeviceDescriptor::default()).unwrap();

        let result = device.emit(&InputEvent {
            tv_sec: 1,
            tv_usec: 0,
            value: 5,
            event_type: 2,
            code: 0,
        });

        assert!(result.is_ok());
        device.destroy();
    }

    #[test]
    fn test_device_numbers_increase() {
        let provider = LoggingDeviceProvider::new();
        provider.create_device(&DeviceDescriptor::default()).unwrap();
        provider.create_device(&DeviceDescriptor::default()).unwrap();
        assert_eq!(provider.next_id.load(Ordering::Relaxed), 2);
    }
}
