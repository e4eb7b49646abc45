//! Application layer for the server.
//!
//! # What does the server have to do?
//!
//! - **`session`** – The per-connection state machine.  It turns a raw byte
//!   stream into packets, accumulates the device descriptor, creates the
//!   device on `IPIPE_CREATE`, and tears everything down on close or error.
//!
//! - **`device_registry`** – Owns the one virtual device a session may
//!   create.  The OS facility that really creates devices is reached through
//!   the `VirtualDeviceProvider` trait, injected at construction time.
//!
//! - **`inject_events`** – Decodes `IPIPE_EVENT` packets and writes them into
//!   the session's device unchanged.

pub mod device_registry;
pub mod inject_events;
pub mod session;
