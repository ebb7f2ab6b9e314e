//! Transport and lifecycle operations for `Transport`.
//!
//! Every operation changes state under one lock and performs teardown (joining
//! decoder threads, releasing the engine) after the lock is dropped. State
//! change events are emitted last, so a handler may call back into the
//! transport.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use log::{debug, info};

use crate::audio::format::AudioFormat;
use crate::diagnostics::events::{EventHandler, TransportEvent};
use crate::diagnostics::reporter::{Report, ReportSource, Reporter};
use crate::error::PlaybackError;
use crate::playback::graph::{MixGraph, SlotPositions};
use crate::track::AudioSource;

use super::{Session, Transport, TransportInner, TransportState};

impl Transport {
    /// Play `local` with `mix` summed on top, both from the first sample.
    ///
    /// Any current session, playing or paused, is replaced. The new session is
    /// fully built before the old one is torn down, so on error the previous
    /// session and state are left exactly as they were. Errors are returned
    /// and also emitted as [`TransportEvent::Error`].
    ///
    /// # Arguments
    ///
    /// * `local` - Primary track.
    /// * `mix` - Track summed on top of the primary.
    pub fn play(&self, local: impl AsRef<Path>, mix: impl AsRef<Path>) -> Result<(), PlaybackError> {
        let local = local.as_ref();
        let mix = mix.as_ref();
        info!("play requested: {} + {}", local.display(), mix.display());

        let session = match self.open_session(local, mix) {
            Ok(session) => session,
            Err(err) => {
                self.events.error(err.clone());
                return Err(err);
            }
        };

        let (previous, changed) = {
            let mut inner = self.inner.lock().unwrap();
            let previous = inner.session.replace(session);
            let changed = inner.state != TransportState::Playing;
            inner.state = TransportState::Playing;
            (previous, changed)
        };

        if let Some(previous) = previous {
            debug!("replacing active session");
            drop(previous);
        }
        if changed {
            self.events
                .emit(TransportEvent::StateChanged(TransportState::Playing));
        }
        Ok(())
    }

    fn open_session(&self, local: &Path, mix: &Path) -> Result<Session, PlaybackError> {
        let buffer_frames = self.settings.decode_buffer_frames;
        let local = AudioSource::open_with(local, buffer_frames)?;
        let mix = AudioSource::open_with(mix, buffer_frames)?;

        let mut graph = MixGraph::new(self.settings, self.events.clone());
        graph.attach(local, mix)?;

        let lease = self.engine.acquire()?;
        let start_frame = graph.frames_for_ms(self.settings.start_delay_ms);
        let node = graph.schedule_start(start_frame)?;
        lease.connect(node)?;

        Ok(Session {
            graph,
            _lease: lease,
        })
    }

    /// Suspend both tracks on the same sample. No-op unless playing.
    pub fn pause(&self) {
        let changed = {
            let mut inner = self.inner.lock().unwrap();
            if inner.state == TransportState::Playing {
                if let Some(session) = &inner.session {
                    session.graph.pause();
                }
                inner.state = TransportState::Paused;
                true
            } else {
                debug!("pause ignored while {:?}", inner.state);
                false
            }
        };

        if changed {
            info!("playback paused");
            self.events
                .emit(TransportEvent::StateChanged(TransportState::Paused));
        }
    }

    /// Continue a paused session from the sample it was paused on.
    ///
    /// Unlike [`Transport::play`], which always restarts from the beginning.
    /// No-op unless paused.
    pub fn resume(&self) {
        let changed = {
            let mut inner = self.inner.lock().unwrap();
            if inner.state == TransportState::Paused {
                if let Some(session) = &inner.session {
                    session.graph.resume();
                }
                inner.state = TransportState::Playing;
                true
            } else {
                debug!("resume ignored while {:?}", inner.state);
                false
            }
        };

        if changed {
            info!("playback resumed");
            self.events
                .emit(TransportEvent::StateChanged(TransportState::Playing));
        }
    }

    /// Stop playback, close both files and return the engine reference.
    ///
    /// Idempotent; a transport that never played stays idle.
    pub fn stop(&self) {
        let (session, changed) = {
            let mut inner = self.inner.lock().unwrap();
            if inner.state == TransportState::Idle {
                debug!("stop ignored while idle");
                return;
            }
            let changed = inner.state != TransportState::Stopped;
            inner.state = TransportState::Stopped;
            (inner.session.take(), changed)
        };

        if let Some(session) = session {
            drop(session);
            info!("playback stopped");
        }
        if changed {
            self.events
                .emit(TransportEvent::StateChanged(TransportState::Stopped));
        }
    }

    pub fn state(&self) -> TransportState {
        self.inner.lock().unwrap().state
    }

    pub fn is_playing(&self) -> bool {
        self.state() == TransportState::Playing
    }

    pub fn is_paused(&self) -> bool {
        self.state() == TransportState::Paused
    }

    /// Frames of each track consumed by the output.
    pub fn positions(&self) -> SlotPositions {
        self.with_graph(|graph| graph.positions())
            .unwrap_or_default()
    }

    /// Time played of the local track.
    pub fn position(&self) -> Duration {
        let inner = self.inner.lock().unwrap();
        Duration::from_secs_f64(played_seconds(&inner))
    }

    /// Return `true` once both tracks of the session have played out.
    ///
    /// The transport stays [`TransportState::Playing`] until stopped or
    /// replaced.
    pub fn is_finished(&self) -> bool {
        self.with_graph(|graph| graph.is_finished())
            .unwrap_or(false)
    }

    /// Format both tracks are summed in, while a session exists.
    pub fn mixing_format(&self) -> Option<AudioFormat> {
        self.with_graph(|graph| graph.mixing_format()).flatten()
    }

    /// Block the current thread until the session plays out or leaves `Playing`.
    pub fn sleep_until_end(&self) {
        while self.is_playing() && !self.is_finished() {
            thread::sleep(Duration::from_millis(100));
        }
    }

    /// Register the handler for state changes and errors.
    pub fn on_event(&self, handler: impl Fn(TransportEvent) + Send + Sync + 'static) {
        let handler: EventHandler = Arc::new(handler);
        self.events.set_handler(handler);
    }

    /// Remove the event handler.
    pub fn clear_event_handler(&self) {
        self.events.clear_handler();
    }

    /// Call `report` every `interval` whenever the transport snapshot changes.
    ///
    /// Replaces any previous reporting callback.
    pub fn set_reporting(&self, report: impl Fn(Report) + Send + 'static, interval: Duration) {
        let inner = self.inner.clone();
        let source: ReportSource = Arc::new(move || snapshot(&inner.lock().unwrap()));
        let report: Arc<Mutex<dyn Fn(Report) + Send>> = Arc::new(Mutex::new(report));

        let reporter = Reporter::new(source, report, interval);
        reporter.start();
        if let Some(previous) = self.reporter.lock().unwrap().replace(reporter) {
            previous.stop();
        }
    }

    /// Stop the reporting thread, if any.
    pub fn stop_reporting(&self) {
        if let Some(reporter) = self.reporter.lock().unwrap().take() {
            reporter.stop();
        }
    }

    fn with_graph<T>(&self, read: impl FnOnce(&MixGraph) -> T) -> Option<T> {
        let inner = self.inner.lock().unwrap();
        inner.session.as_ref().map(|session| read(&session.graph))
    }
}

fn played_seconds(inner: &TransportInner) -> f64 {
    inner
        .session
        .as_ref()
        .and_then(|session| {
            let format = session.graph.mixing_format()?;
            Some(session.graph.positions().primary as f64 / format.sample_rate as f64)
        })
        .unwrap_or(0.0)
}

fn snapshot(inner: &TransportInner) -> Report {
    let (positions, finished) = inner
        .session
        .as_ref()
        .map(|session| (session.graph.positions(), session.graph.is_finished()))
        .unwrap_or_default();

    Report {
        state: inner.state,
        time: played_seconds(inner),
        primary_frames: positions.primary,
        mix_frames: positions.mix,
        finished,
    }
}
