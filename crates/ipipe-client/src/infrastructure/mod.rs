//! Infrastructure layer for the client.
//!
//! Contains OS-facing adapters: input capture, the TCP connection to the
//! server, and on-disk configuration.
//!
//! **Dependency rule**: this layer may depend on `application` and `ipipe_core`,
//! but MUST NOT be imported by the `application` layer.
//!
//! # Sub-modules
//!
//! - **`input_capture`** – `InputSource` implementations.  On Linux the
//!   evdev source reads `/dev/input/event*`; a `MockInputSource` is provided
//!   for tests.
//!
//! - **`network`** – TCP connection to the server with automatic
//!   reconnection; every reconnect re-announces the device.
//!
//! - **`storage`** – Loads and writes `client.toml`.

pub mod input_capture;
pub mod network;
pub mod storage;
