//! Infrastructure layer for the server.
//!
//! Contains the adapters around the application layer: the TCP listener,
//! the virtual-device providers, and on-disk configuration.
//!
//! **Dependency rule**: this layer may depend on `application` and `ipipe_core`,
//! but MUST NOT be imported by the `application` layer.
//!
//! # Sub-modules
//!
//! - **`network`** – Accepts clients on TCP port 7192 and runs one session
//!   task per connection.
//!
//! - **`virtual_device`** – `VirtualDeviceProvider` implementations: a
//!   tracing-backed provider for headless hosts and a recording provider for
//!   tests.
//!
//! - **`storage`** – Loads `server.toml`.

pub mod network;
pub mod storage;
pub mod virtual_device;
