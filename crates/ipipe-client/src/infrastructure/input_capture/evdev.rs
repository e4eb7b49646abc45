//! Linux evdev input source.
//!
//! # How does evdev work? (for beginners)
//!
//! Every input device on Linux shows up as a character device such as
//! `/dev/input/event3`.  Besides the event stream, the kernel answers
//! questions about the device itself: its name, its bus/vendor/product
//! identity, which event types and codes it can produce, and the range of
//! every absolute axis.  The `evdev` crate wraps both halves:
//!
//! ```text
//! Device::open(path)
//!  ├─ name(), input_id()                  ─▶ DEVICE_NAME, DEVICE_ID
//!  ├─ supported_events() / _keys() / ...  ─▶ DEVICE_BITS per category
//!  ├─ get_abs_state()                     ─▶ DEVICE_ABSINFO per axis
//!  └─ fetch_events()  (blocking)          ─▶ EVENT, one per record
//! ```
//!
//! [`EvdevSource::open`] asks those questions once, so the announcement the
//! server receives describes the real device.  The client configuration can
//! still override individual fields afterwards (see
//! [`EvdevSource::with_descriptor`]).
//!
//! Reading blocks, so it happens on a dedicated thread.  `stop()` only takes
//! effect once the next batch of events arrives (or the device disappears),
//! because a blocking read on a device node cannot be interrupted portably.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::UNIX_EPOCH;

use evdev::{Device, EventType};
use ipipe_core::{
    AbsInfo, CapabilityBits, DeviceDescriptor, InputEvent, InputId, CATEGORY_EVENT_TYPES,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{CaptureError, InputSource, EVENT_CHANNEL_CAPACITY};

// Kernel bitmap sizes (`EV_CNT`, `KEY_CNT`, ... in `input-event-codes.h`).
const EV_CNT: u16 = 0x20;
const KEY_CNT: u16 = 0x300;
const REL_CNT: u16 = 0x10;
const ABS_CNT: u16 = 0x40;
const SW_CNT: u16 = 0x11;

/// Reads events from a `/dev/input/event*` node.
pub struct EvdevSource {
    path: PathBuf,
    descriptor: DeviceDescriptor,
    /// The handle opened by [`EvdevSource::open`], until the first `start`.
    device: Mutex<Option<Device>>,
    running: Arc<AtomicBool>,
}

impl EvdevSource {
    /// Opens `path` and reads the device's own description.
    ///
    /// # Errors
    ///
    /// [`CaptureError::Open`] if the node does not exist or is not readable.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CaptureError> {
        let path = path.into();
        let device = open_device(&path)?;
        let descriptor = describe(&device);
        info!(
            path = %path.display(),
            device = descriptor.display_name(),
            axes = descriptor.axes.len(),
            "input device opened"
        );
        Ok(Self {
            path,
            descriptor,
            device: Mutex::new(Some(device)),
            running: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Replaces the announced description, typically with the queried one
    /// after configuration overrides have been applied.
    pub fn with_descriptor(mut self, descriptor: DeviceDescriptor) -> Self {
        self.descriptor = descriptor;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The handle kept from `open`, or a fresh one after a previous run.
    fn take_device(&self) -> Result<Device, CaptureError> {
        let cached = self.device.lock().ok().and_then(|mut slot| slot.take());
        match cached {
            Some(device) => Ok(device),
            None => open_device(&self.path),
        }
    }
}

impl InputSource for EvdevSource {
    fn descriptor(&self) -> DeviceDescriptor {
        self.descriptor.clone()
    }

    fn start(&self) -> Result<mpsc::Receiver<InputEvent>, CaptureError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(CaptureError::AlreadyStarted);
        }

        let device = match self.take_device() {
            Ok(device) => device,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let running = Arc::clone(&self.running);
        let path = self.path.clone();
        let spawned = std::thread::Builder::new()
            .name("evdev-capture".to_string())
            .spawn(move || read_loop(device, tx, running, path));
        if let Err(e) = spawned {
            self.running.store(false, Ordering::SeqCst);
            return Err(CaptureError::Spawn(e));
        }

        info!(path = %self.path.display(), "capturing input");
        Ok(rx)
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

fn open_device(path: &Path) -> Result<Device, CaptureError> {
    Device::open(path).map_err(|source| CaptureError::Open {
        path: path.to_path_buf(),
        source,
    })
}

fn read_loop(
    mut device: Device,
    tx: mpsc::Sender<InputEvent>,
    running: Arc<AtomicBool>,
    path: PathBuf,
) {
    'capture: while running.load(Ordering::SeqCst) {
        let events = match device.fetch_events() {
            Ok(events) => events,
            Err(e) => {
                warn!(path = %path.display(), "reading input device failed: {e}");
                break;
            }
        };
        for event in events {
            if tx.blocking_send(convert_event(&event)).is_err() {
                break 'capture;
            }
        }
    }
    running.store(false, Ordering::SeqCst);
    debug!(path = %path.display(), "capture thread exiting");
}

// ── Conversions ───────────────────────────────────────────────────────────────

/// Converts one evdev event.  Timestamps are truncated to the 32-bit wire
/// fields.
pub fn convert_event(event: &evdev::InputEvent) -> InputEvent {
    let since_epoch = event
        .timestamp()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    InputEvent {
        tv_sec: since_epoch.as_secs() as u32,
        tv_usec: since_epoch.subsec_micros(),
        value: event.value(),
        event_type: event.event_type().0,
        code: event.code(),
    }
}

pub fn convert_id(id: evdev::InputId) -> InputId {
    InputId {
        bustype: id.bus_type().0,
        vendor: id.vendor(),
        product: id.product(),
        version: id.version(),
    }
}

/// A bitmap sized like the kernel's, with `codes` set.
pub fn capability_bits(
    category: u16,
    count: u16,
    codes: impl IntoIterator<Item = u16>,
) -> CapabilityBits {
    let mut bits = CapabilityBits::new(category, count);
    for code in codes {
        bits.set(code);
    }
    bits
}

/// Queries everything the server needs to rebuild `device`.
fn describe(device: &Device) -> DeviceDescriptor {
    let mut descriptor = DeviceDescriptor {
        name: device.name().map(str::to_owned),
        id: Some(convert_id(device.input_id())),
        ..Default::default()
    };

    descriptor.set_capability(capability_bits(
        CATEGORY_EVENT_TYPES,
        EV_CNT,
        device.supported_events().iter().map(|t| t.0),
    ));
    if let Some(keys) = device.supported_keys() {
        descriptor.set_capability(capability_bits(
            EventType::KEY.0,
            KEY_CNT,
            keys.iter().map(|k| k.code()),
        ));
    }
    if let Some(rel) = device.supported_relative_axes() {
        descriptor.set_capability(capability_bits(
            EventType::RELATIVE.0,
            REL_CNT,
            rel.iter().map(|r| r.0),
        ));
    }
    if let Some(switches) = device.supported_switches() {
        descriptor.set_capability(capability_bits(
            EventType::SWITCH.0,
            SW_CNT,
            switches.iter().map(|s| s.0),
        ));
    }
    if let Some(abs) = device.supported_absolute_axes() {
        descriptor.set_capability(capability_bits(
            EventType::ABSOLUTE.0,
            ABS_CNT,
            abs.iter().map(|a| a.0),
        ));
        match device.get_abs_state() {
            Ok(state) => {
                for axis in abs.iter() {
                    if let Some(info) = state.get(usize::from(axis.0)) {
                        descriptor.set_axis(AbsInfo {
                            axis: u32::from(axis.0),
                            max: info.maximum,
                            min: info.minimum,
                            fuzz: info.fuzz,
                            flat: info.flat,
                        });
                    }
                }
            }
            Err(e) => warn!("could not read absolute axis ranges: {e}"),
        }
    }

    descriptor
}

// ── Tests ─────────────────────────────────────────────────────────────────────
