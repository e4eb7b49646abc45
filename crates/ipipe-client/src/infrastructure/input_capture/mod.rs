//! Input capture: where the client's events come from.
//!
//! An [`InputSource`] describes one local device and, once started, delivers
//! its events on a bounded Tokio channel.  Sources that read from blocking
//! OS handles do so on their own thread and push into the channel.
//!
//! - **`evdev`** (Linux) – describes and reads a `/dev/input/event*` node
//!   through the `evdev` crate.
//! - **`mock`** – events are injected by test code.

use ipipe_core::{DeviceDescriptor, InputEvent};
use tokio::sync::mpsc;

#[cfg(target_os = "linux")]
pub mod evdev;
pub mod mock;

/// Capacity of the channel between a source and the streamer.
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Errors that can occur while setting up or feeding input capture.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// The device node could not be opened.
    #[error("failed to open input device {path}: {source}")]
    Open {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// `start` was called on a source that is already running.
    #[error("input source is already running")]
    AlreadyStarted,
    /// An event was offered to a source that is not running.
    #[error("input source is not running")]
    NotStarted,
    /// The capture thread could not be spawned.
    #[error("failed to spawn capture thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// A local input device whose events are forwarded.
pub trait InputSource: Send {
    /// The description sent to the server before any event.
    fn descriptor(&self) -> DeviceDescriptor;

    /// Starts capturing.  Events arrive on the returned receiver until
    /// [`stop`](Self::stop) is called or the device goes away, at which point
    /// the channel closes.
    fn start(&self) -> Result<mpsc::Receiver<InputEvent>, CaptureError>;

    /// Stops capturing.
    fn stop(&self);
}
