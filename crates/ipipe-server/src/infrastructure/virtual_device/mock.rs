//! Recording virtual-device provider for tests.
//!
//! # Why a recording provider?
//!
//! Real virtual devices need kernel support and elevated permissions, and the
//! events they produce land in the host's input stack where a test cannot see
//! them.  `MockDeviceProvider` keeps everything in memory instead: every
//! created descriptor, every injected event, and every teardown is pushed into
//! a shared [`DeviceLog`] that tests inspect afterwards.
//!
//! # Usage in tests
//!
//! ```ignore
//! let provider = Arc::new(MockDeviceProvider::new());
//! let mut session = Session::new(provider.clone());
//! session.feed(&bytes)?;
//!
//! assert_eq!(provider.log.events.lock().unwrap().len(), 2);
//! ```
//!
//! # Failure flags
//!
//! Set `fail_creation` or `fail_injection` to simulate a provider that
//! refuses to create devices or a device that rejects writes.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use ipipe_core::{DeviceDescriptor, InputEvent};

use crate::application::device_registry::{DeviceError, VirtualDevice, VirtualDeviceProvider};

/// Everything the mock provider and its devices observed.
#[derive(Debug, Default)]
pub struct DeviceLog {
    /// Descriptors passed to `create_device`, in call order.
    pub created: Mutex<Vec<DeviceDescriptor>>,
    /// Events emitted into any device, in arrival order.
    pub events: Mutex<Vec<InputEvent>>,
    /// Number of `destroy` calls across all devices.
    pub destroyed: AtomicUsize,
}

impl DeviceLog {
    /// Number of devices created and not yet destroyed.
    pub fn live_devices(&self) -> usize {
        let created = self.created.lock().map(|c| c.len()).unwrap_or(0);
        created.saturating_sub(self.destroyed.load(Ordering::SeqCst))
    }
}

/// A provider that records instead of touching the OS.
#[derive(Debug, Default)]
pub struct MockDeviceProvider {
    pub log: Arc<DeviceLog>,
    /// When `true`, `create_device` returns `DeviceError::PermissionDenied`.
    pub fail_creation: bool,
    /// When `true`, devices reject every event with `DeviceError::Platform`.
    pub fail_injection: bool,
}

impl MockDeviceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events injected so far.
    pub fn events(&self) -> Vec<InputEvent> {
        self.log.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Snapshot of the descriptors devices were created from.
    pub fn created(&self) -> Vec<DeviceDescriptor> {
        self.log.created.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn destroyed(&self) -> usize {
        self.log.destroyed.load(Ordering::SeqCst)
    }
}

impl VirtualDeviceProvider for MockDeviceProvider {
    fn create_device(
        &self,
        descriptor: &DeviceDescriptor,
    ) -> Result<Box<dyn VirtualDevice>, DeviceError> {
        if self.fail_creation {
            return Err(DeviceError::PermissionDenied("mock provider refuses".into()));
        }
        self.log
            .created
            .lock()
            .map_err(|_| DeviceError::Platform("device log poisoned".into()))?
            .push(descriptor.clone());
        Ok(Box::new(MockDevice {
            log: Arc::clone(&self.log),
            fail_injection: self.fail_injection,
            destroyed: false,
        }))
    }
}

struct MockDevice {
    log: Arc<DeviceLog>,
    fail_injection: bool,
    destroyed: bool,
}

impl VirtualDevice for MockDevice {
    fn emit(&mut self, event: &InputEvent) -> Result<(), DeviceError> {
        if self.destroyed {
            return Err(DeviceError::Destroyed);
        }
        if self.fail_injection {
            return Err(DeviceError::Platform("mock device rejects events".into()));
        }
        self.log
            .events
            .lock()
            .map_err(|_| DeviceError::Platform("device log poisoned".into()))?
            .push(*event);
        Ok(())
    }

    fn destroy(&mut self) {
        if !self.destroyed {
            self.destroyed = true;
            self.log.destroyed.fetch_add(1, Ordering::SeqCst);
        }
    }
}
