//! User-facing transport that plays a local track and a mix track together.

mod controls;

use std::sync::{Arc, Mutex};

use crate::diagnostics::events::EventSink;
use crate::diagnostics::reporter::Reporter;
use crate::playback::engine::{AudioEngine, EngineLease};
use crate::playback::graph::MixGraph;
use crate::playback::settings::PlaybackSettings;

/// Lifecycle state of a [`Transport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    /// Nothing has been played yet.
    Idle,
    Playing,
    Paused,
    Stopped,
}

/// One playing pair of tracks.
///
/// Field order matters: the graph is detached before the engine reference is
/// returned.
struct Session {
    graph: MixGraph,
    _lease: EngineLease,
}

struct TransportInner {
    state: TransportState,
    session: Option<Session>,
}

/// Plays two files in lockstep through a shared [`AudioEngine`].
///
/// All methods take `&self`; a transport may be shared between threads.
/// Dropping it stops playback.
pub struct Transport {
    engine: Arc<AudioEngine>,
    settings: PlaybackSettings,
    events: EventSink,
    inner: Arc<Mutex<TransportInner>>,
    reporter: Mutex<Option<Reporter>>,
}

impl Transport {
    /// Create a transport on the process-wide system output.
    pub fn new() -> Self {
        Self::with_engine(AudioEngine::shared())
    }

    /// Create a transport on `engine` with default settings.
    pub fn with_engine(engine: Arc<AudioEngine>) -> Self {
        Self::with_settings(engine, PlaybackSettings::default())
    }

    pub fn with_settings(engine: Arc<AudioEngine>, settings: PlaybackSettings) -> Self {
        Self {
            engine,
            settings: settings.sanitized(),
            events: EventSink::new(),
            inner: Arc::new(Mutex::new(TransportInner {
                state: TransportState::Idle,
                session: None,
            })),
            reporter: Mutex::new(None),
        }
    }

    pub fn engine(&self) -> &Arc<AudioEngine> {
        &self.engine
    }

    pub fn settings(&self) -> &PlaybackSettings {
        &self.settings
    }
}

impl Default for Transport {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        if let Some(reporter) = self.reporter.lock().unwrap().take() {
            reporter.stop();
        }
        self.stop();
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("state", &self.state())
            .field("engine", &self.engine)
            .field("settings", &self.settings)
            .finish()
    }
}
