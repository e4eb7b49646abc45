//! ipipe-server library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does ipipe-server do? (for beginners)
//!
//! The *server* is the machine that ends up "owning" a remote input device.
//! A client somewhere else opens one of its own keyboards, mice, or
//! joysticks and connects here over TCP.  For every connection the server:
//!
//! 1. Collects the device description (`IPIPE_DEVICE_*` packets): name, USB
//!    ids, axis ranges, and which keys/buttons/axes exist.
//! 2. On `IPIPE_CREATE`, asks the OS for a virtual device that looks exactly
//!    like that description.
//! 3. Replays every `IPIPE_EVENT` into the virtual device, so local programs
//!    see the remote device as if it were plugged in here.
//! 4. Destroys the virtual device when the connection ends.

/// Application layer: session state machine, device registry, event injection.
pub mod application;

/// Infrastructure layer: TCP listener, device providers, configuration.
pub mod infrastructure;
