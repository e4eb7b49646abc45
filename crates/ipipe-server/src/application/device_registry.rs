//! DeviceRegistry: owns the one virtual device a session may create.
//!
//! The registry sits between the session state machine and the external
//! [`VirtualDeviceProvider`], which wraps whatever OS facility actually
//! creates devices (uinput on Linux, a test double in tests).  The provider
//! hands back a capability-bearing [`VirtualDevice`] handle rather than a
//! raw resource id, so nothing above this module knows which OS it runs on.
//!
//! Invariants:
//! - At most one device per registry (one registry per session).
//! - A failed creation leaves nothing registered.
//! - A created device is destroyed exactly once, by [`DeviceRegistry::release`]
//!   or on drop, whichever comes first.

use std::sync::Arc;

use ipipe_core::{DeviceDescriptor, InputEvent};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::application::session::SessionError;

/// Errors reported by a virtual-device provider or handle.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("resources exhausted: {0}")]
    ResourceExhausted(String),
    #[error("platform error: {0}")]
    Platform(String),
    #[error("device has already been destroyed")]
    Destroyed,
}

/// Creates virtual input devices from finalized descriptors.
///
/// Implementations shared between sessions must serialise concurrent
/// `create_device` calls themselves.
#[cfg_attr(test, mockall::automock)]
pub trait VirtualDeviceProvider: Send + Sync {
    /// Creates a device matching `descriptor` and returns its handle.
    fn create_device(
        &self,
        descriptor: &DeviceDescriptor,
    ) -> Result<Box<dyn VirtualDevice>, DeviceError>;
}

/// A live virtual input device.
#[cfg_attr(test, mockall::automock)]
pub trait VirtualDevice: Send {
    /// Injects one event exactly as received.
    fn emit(&mut self, event: &InputEvent) -> Result<(), DeviceError>;

    /// Tears the device down.  Called exactly once by the registry.
    fn destroy(&mut self);
}

/// Holds the session's device handle, if one has been created.
pub struct DeviceRegistry {
    provider: Arc<dyn VirtualDeviceProvider>,
    device: Option<Box<dyn VirtualDevice>>,
    descriptor: Option<DeviceDescriptor>,
}

impl DeviceRegistry {
    pub fn new(provider: Arc<dyn VirtualDeviceProvider>) -> Self {
        Self {
            provider,
            device: None,
            descriptor: None,
        }
    }

    /// Materialises `descriptor` into a live device.
    ///
    /// # Errors
    ///
    /// - [`SessionError::AlreadyCreated`] if this registry already holds a device.
    /// - [`SessionError::DeviceCreationFailed`] if the provider refuses.
    pub fn create(&mut self, descriptor: DeviceDescriptor) -> Result<(), SessionError> {
        if self.device.is_some() {
            return Err(SessionError::AlreadyCreated);
        }

        let device = self
            .provider
            .create_device(&descriptor)
            .map_err(SessionError::DeviceCreationFailed)?;

        info!(
            name = descriptor.display_name(),
            axes = descriptor.axes.len(),
            categories = descriptor.capabilities.len(),
            "virtual device created"
        );
        self.device = Some(device);
        self.descriptor = Some(descriptor);
        Ok(())
    }

    pub fn is_created(&self) -> bool {
        self.device.is_some()
    }

    /// Descriptor of the live device, if any.
    pub fn descriptor(&self) -> Option<&DeviceDescriptor> {
        self.descriptor.as_ref()
    }

    /// Mutable access to the live device handle, if any.
    pub fn device_mut(&mut self) -> Option<&mut Box<dyn VirtualDevice>> {
        self.device.as_mut()
    }

    /// Destroys the held device.  Returns `true` if there was one.
    ///
    /// Safe to call repeatedly; only the first call reaches the provider.
    pub fn release(&mut self) -> bool {
        match self.device.take() {
            Some(mut device) => {
                device.destroy();
                debug!(
                    name = self.descriptor.as_ref().map_or("<unnamed>", |d| d.display_name()),
                    "virtual device released"
                );
                true
            }
            None => false,
        }
    }
}

impl Drop for DeviceRegistry {
    fn drop(&mut self) {
        if self.release() {
            warn!("virtual device released on drop without explicit teardown");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
