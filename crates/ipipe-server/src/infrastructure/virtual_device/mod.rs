//! Implementations of [`VirtualDeviceProvider`](crate::application::device_registry::VirtualDeviceProvider).
//!
//! - **`uinput`** (Linux) – Creates kernel input devices through
//!   `/dev/uinput` with the `evdev` crate.  The binary's default.
//! - **`logging`** – Creates "devices" that only report what they receive
//!   through `tracing`.  Used on hosts without a kernel virtual-input
//!   facility, and handy when debugging a client.
//! - **`mock`** – Records every creation, event, and teardown in memory so
//!   tests can assert on exactly what a session did.

pub mod logging;
pub mod mock;
#[cfg(target_os = "linux")]
pub mod uinput;
