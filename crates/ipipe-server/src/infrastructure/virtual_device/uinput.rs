//! uinput-backed virtual devices (Linux).
//!
//! # How does uinput work? (for beginners)
//!
//! `/dev/uinput` lets a user-space program create an input device that the
//! rest of the system cannot tell apart from real hardware.  The program
//! declares the device's name, identity, and capabilities, then writes
//! events into it:
//!
//! ```text
//! DeviceDescriptor ──▶ VirtualDeviceBuilder ──▶ /dev/input/eventN
//!   name, id            .name() .input_id()
//!   bits[KEY]           .with_keys()
//!   bits[REL]           .with_relative_axes()
//!   bits[SW]            .with_switches()
//!   axes                .with_absolute_axis()
//! ```
//!
//! The kernel delivers events to readers one *report* at a time: everything
//! up to and including a `SYN_REPORT`.  `evdev`'s `emit` always appends its
//! own `SYN_REPORT`, so forwarded events are held in a [`ReportBuffer`] and
//! written together when the client's `SYN_REPORT` arrives.  The report a
//! reader sees is the same one the client's device produced.
//!
//! Dropping the `evdev` handle closes the uinput file, which removes the
//! device.

use evdev::uinput::{VirtualDevice as UinputDevice, VirtualDeviceBuilder};
use evdev::{
    AbsInfo as UinputAbsInfo, AbsoluteAxisType, AttributeSet, BusType, EventType, Key,
    RelativeAxisType, SwitchType, UinputAbsSetup,
};
use ipipe_core::{DeviceDescriptor, InputEvent};
use tracing::{debug, info, warn};

use crate::application::device_registry::{DeviceError, VirtualDevice, VirtualDeviceProvider};

const SYN_REPORT: u16 = 0;

/// Creates one uinput device per session.
#[derive(Debug, Default)]
pub struct UinputDeviceProvider;

impl UinputDeviceProvider {
    pub fn new() -> Self {
        Self
    }
}

impl VirtualDeviceProvider for UinputDeviceProvider {
    fn create_device(
        &self,
        descriptor: &DeviceDescriptor,
    ) -> Result<Box<dyn VirtualDevice>, DeviceError> {
        let handle = build(descriptor).map_err(device_error)?;
        info!(
            name = descriptor.display_name(),
            id = ?descriptor.id,
            axes = descriptor.axes.len(),
            "uinput device created"
        );
        Ok(Box::new(UinputVirtualDevice {
            name: descriptor.display_name().to_string(),
            handle: Some(handle),
            report: ReportBuffer::default(),
        }))
    }
}

fn build(descriptor: &DeviceDescriptor) -> std::io::Result<UinputDevice> {
    let mut builder = VirtualDeviceBuilder::new()?.name(descriptor.display_name());
    if let Some(id) = descriptor.id {
        builder = builder.input_id(evdev::InputId::new(
            BusType(id.bustype),
            id.vendor,
            id.product,
            id.version,
        ));
    }

    if let Some(bits) = descriptor.capability(EventType::KEY.0) {
        let mut keys = AttributeSet::<Key>::new();
        for code in bits.iter_set() {
            keys.insert(Key::new(code));
        }
        builder = builder.with_keys(&keys)?;
    }
    if let Some(bits) = descriptor.capability(EventType::RELATIVE.0) {
        let mut axes = AttributeSet::<RelativeAxisType>::new();
        for code in bits.iter_set() {
            axes.insert(RelativeAxisType(code));
        }
        builder = builder.with_relative_axes(&axes)?;
    }
    if let Some(bits) = descriptor.capability(EventType::SWITCH.0) {
        let mut switches = AttributeSet::<SwitchType>::new();
        for code in bits.iter_set() {
            switches.insert(SwitchType(code));
        }
        builder = builder.with_switches(&switches)?;
    }
    for axis in descriptor.axes.values() {
        let Ok(code) = u16::try_from(axis.axis) else {
            warn!(axis = axis.axis, "skipping absolute axis outside the kernel range");
            continue;
        };
        let info = UinputAbsInfo::new(0, axis.min, axis.max, axis.fuzz, axis.flat, 0);
        let setup = UinputAbsSetup::new(AbsoluteAxisType(code), info);
        builder = builder.with_absolute_axis(&setup)?;
    }

    builder.build()
}

fn device_error(e: std::io::Error) -> DeviceError {
    match e.kind() {
        std::io::ErrorKind::PermissionDenied | std::io::ErrorKind::NotFound => {
            DeviceError::PermissionDenied(format!("/dev/uinput: {e}"))
        }
        _ => DeviceError::Platform(e.to_string()),
    }
}

struct UinputVirtualDevice {
    name: String,
    handle: Option<UinputDevice>,
    report: ReportBuffer,
}

impl VirtualDevice for UinputVirtualDevice {
    fn emit(&mut self, event: &InputEvent) -> Result<(), DeviceError> {
        let Some(handle) = self.handle.as_mut() else {
            return Err(DeviceError::Destroyed);
        };
        let Some(report) = self.report.push(event) else {
            return Ok(());
        };
        let raw: Vec<evdev::InputEvent> = report
            .iter()
            .map(|e| evdev::InputEvent::new(EventType(e.event_type), e.code, e.value))
            .collect();
        handle.emit(&raw).map_err(device_error)
    }

    fn destroy(&mut self) {
        if self.handle.take().is_some() {
            debug!(
                name = %self.name,
                pending = self.report.pending(),
                "uinput device destroyed"
            );
        }
    }
}

/// Collects forwarded events into kernel reports.
///
/// Events are held until a `SYN_REPORT` (type 0, code 0) arrives; the
/// `SYN_REPORT` itself is not part of the returned report because the
/// writer adds its own.
#[derive(Debug, Default)]
pub struct ReportBuffer {
    pending: Vec<InputEvent>,
}

impl ReportBuffer {
    /// Adds `event`; returns the finished report when `event` ends one.
    pub fn push(&mut self, event: &InputEvent) -> Option<Vec<InputEvent>> {
        if event.event_type == EventType::SYNCHRONIZATION.0 && event.code == SYN_REPORT {
            return Some(std::mem::take(&mut self.pending));
        }
        self.pending.push(*event);
        None
    }

    /// Events waiting for the next `SYN_REPORT`.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
