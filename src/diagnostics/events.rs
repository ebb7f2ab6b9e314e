//! Out-of-band event channel for transport state changes and errors.
//!
//! `play` already returns its own error, but failures that happen later on a
//! decoder worker have no caller to return to. Those travel through here.

use std::fmt;
use std::sync::{Arc, Mutex};

use log::error;

use crate::error::PlaybackError;
use crate::playback::transport::TransportState;

/// Something the caller may want to react to.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The transport moved to a new state.
    StateChanged(TransportState),
    /// An operation or a background decoder failed.
    Error(PlaybackError),
}

/// Callback invoked for every [`TransportEvent`].
pub type EventHandler = Arc<dyn Fn(TransportEvent) + Send + Sync>;

/// Cloneable handle that delivers events to the registered handler.
#[derive(Clone, Default)]
pub struct EventSink {
    handler: Arc<Mutex<Option<EventHandler>>>,
}

impl EventSink {
    /// Create a sink with no handler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the registered handler.
    pub fn set_handler(&self, handler: EventHandler) {
        *self.handler.lock().unwrap() = Some(handler);
    }

    /// Remove the registered handler.
    pub fn clear_handler(&self) {
        *self.handler.lock().unwrap() = None;
    }

    /// Deliver `event`. Errors are always logged as well.
    pub fn emit(&self, event: TransportEvent) {
        if let TransportEvent::Error(err) = &event {
            error!("{}", err);
        }

        // Call outside the lock so a handler may re-register itself.
        let handler = self.handler.lock().unwrap().clone();
        if let Some(handler) = handler {
            handler(event);
        }
    }

    /// Shorthand for emitting an error.
    pub fn error(&self, err: impl Into<PlaybackError>) {
        self.emit(TransportEvent::Error(err.into()));
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registered = self.handler.lock().map(|h| h.is_some()).unwrap_or(false);
        f.debug_struct("EventSink")
            .field("handler", &registered)
            .finish()
    }
}
