//! ipipe-client library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does ipipe-client do? (for beginners)
//!
//! The *client* runs on the machine the input device is physically plugged
//! into.  It makes that device appear on another machine (the server):
//!
//! 1. Opens the local device (on Linux, a `/dev/input/event*` node).
//! 2. Connects to the server over TCP (port 7192 by default).
//! 3. Describes the device: name, ids, axis ranges, supported keys/buttons,
//!    then sends `IPIPE_CREATE` so the server builds a matching virtual device.
//! 4. Forwards every captured event as one `IPIPE_EVENT` packet.
//! 5. If the connection drops, reconnects and starts again from step 3.

/// Application layer: announcement, event forwarding, streaming use case.
pub mod application;

/// Infrastructure layer: input capture, network, configuration.
pub mod infrastructure;
