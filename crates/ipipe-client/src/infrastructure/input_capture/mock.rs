//! Mock input source for unit testing.
//!
//! Allows tests to inject synthetic [`InputEvent`]s without opening a real
//! device node.

use std::sync::{Arc, Mutex};

use ipipe_core::{DeviceDescriptor, InputEvent};
use tokio::sync::mpsc::{self, Sender};

use super::{CaptureError, InputSource, EVENT_CHANNEL_CAPACITY};

/// A mock implementation of [`InputSource`] that allows tests to inject events.
pub struct MockInputSource {
    descriptor: DeviceDescriptor,
    sender: Arc<Mutex<Option<Sender<InputEvent>>>>,
}

impl MockInputSource {
    /// Creates a new mock input source describing `descriptor`.
    pub fn new(descriptor: DeviceDescriptor) -> Self {
        Self {
            descriptor,
            sender: Arc::new(Mutex::new(None)),
        }
    }

    /// Injects a synthetic event, as if captured from hardware.
    ///
    /// # Errors
    ///
    /// [`CaptureError::NotStarted`] before `start()`, after `stop()`, or once
    /// the receiver has been dropped.
    pub fn inject_event(&self, event: InputEvent) -> Result<(), CaptureError> {
        let guard = self.sender.lock().map_err(|_| CaptureError::NotStarted)?;
        match guard.as_ref() {
            Some(sender) => sender.try_send(event).map_err(|_| CaptureError::NotStarted),
            None => Err(CaptureError::NotStarted),
        }
    }

    pub fn is_running(&self) -> bool {
        self.sender.lock().map(|s| s.is_some()).unwrap_or(false)
    }
}

impl Default for MockInputSource {
    fn default() -> Self {
        Self::new(DeviceDescriptor::default())
    }
}

impl InputSource for MockInputSource {
    fn descriptor(&self) -> DeviceDescriptor {
        self.descriptor.clone()
    }

    fn start(&self) -> Result<mpsc::Receiver<InputEvent>, CaptureError> {
        let mut guard = self.sender.lock().map_err(|_| CaptureError::NotStarted)?;
        if guard.is_some() {
            return Err(CaptureError::AlreadyStarted);
        }
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        *guard = Some(tx);
        Ok(rx)
    }

    fn stop(&self) {
        // Dropping the sender closes the channel.
        if let Ok(mut guard) = self.sender.lock() {
            *guard = None;
        }
    }
}
