//! Domain layer: the device model shared by client and server.
//!
//! This module contains only pure Rust types with no I/O.
//!
//! # Sub-modules
//!
//! - **`descriptor`** – The pending device descriptor both ends build: the
//!   client produces `IPIPE_DEVICE_*` packets from it, the server
//!   accumulates them back into it before creating a virtual device.

pub mod descriptor;

pub use descriptor::{ApplyOutcome, DescriptorBuilder, DeviceDescriptor};
