//! Output hardware backends the engine drives.

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{error, info, warn};
use rodio::mixer::Mixer;
use rodio::{OutputStream, OutputStreamBuilder, Source};

use crate::error::EngineError;
use crate::playback::graph::MixSource;

const OUTPUT_STREAM_OPEN_RETRIES: usize = 20;
const OUTPUT_STREAM_OPEN_RETRY_MS: u64 = 100;

/// A device (or stand-in) the mixed output is routed to.
///
/// `open` and `close` are paired by the engine's reference count; `connect`
/// is only called while open.
pub trait OutputBackend: Send {
    /// Start the output session.
    fn open(&mut self) -> Result<(), EngineError>;

    /// Route a mix node to the output.
    fn connect(&mut self, source: MixSource) -> Result<(), EngineError>;

    /// Tear the output session down.
    fn close(&mut self);
}

struct RodioSession {
    mixer: Mixer,
    shutdown: mpsc::Sender<()>,
    thread: JoinHandle<()>,
}

/// Default system output through `rodio`.
///
/// The device stream is not `Send`, so it lives on a dedicated thread for the
/// whole session and only its mixer handle is passed back.
#[derive(Default)]
pub struct RodioOutput {
    session: Option<RodioSession>,
}

impl RodioOutput {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OutputBackend for RodioOutput {
    fn open(&mut self) -> Result<(), EngineError> {
        if self.session.is_some() {
            return Ok(());
        }

        let (ready_tx, ready_rx) = mpsc::channel::<Result<Mixer, String>>();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let thread = thread::Builder::new()
            .name("duet-output".to_string())
            .spawn(move || {
                let stream = match open_output_stream_with_retry() {
                    Ok(stream) => stream,
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };
                if ready_tx.send(Ok(stream.mixer().clone())).is_err() {
                    return;
                }
                // Held until the sender side is dropped by `close`.
                let _ = shutdown_rx.recv();
                drop(stream);
            })
            .map_err(|err| EngineError::HardwareUnavailable(err.to_string()))?;

        let mixer = match ready_rx.recv() {
            Ok(Ok(mixer)) => mixer,
            Ok(Err(reason)) => {
                let _ = thread.join();
                return Err(EngineError::HardwareUnavailable(reason));
            }
            Err(_) => {
                let _ = thread.join();
                return Err(EngineError::HardwareUnavailable(
                    "output thread exited before the stream opened".to_string(),
                ));
            }
        };

        info!("output stream opened");
        self.session = Some(RodioSession {
            mixer,
            shutdown: shutdown_tx,
            thread,
        });
        Ok(())
    }

    fn connect(&mut self, source: MixSource) -> Result<(), EngineError> {
        let session = self.session.as_ref().ok_or(EngineError::NotRunning)?;
        session.mixer.add(source);
        Ok(())
    }

    fn close(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        drop(session.shutdown);
        if session.thread.join().is_err() {
            warn!("output thread panicked during join");
        }
        info!("output stream closed");
    }
}

fn open_output_stream_with_retry() -> Result<OutputStream, String> {
    let mut last_error = String::new();
    for attempt in 1..=OUTPUT_STREAM_OPEN_RETRIES {
        match OutputStreamBuilder::open_default_stream() {
            Ok(stream) => return Ok(stream),
            Err(err) => {
                last_error = err.to_string();
                if attempt == OUTPUT_STREAM_OPEN_RETRIES {
                    error!(
                        "failed to open default output stream after {} attempts: {}",
                        OUTPUT_STREAM_OPEN_RETRIES, err
                    );
                    break;
                }
                warn!(
                    "open_default_stream attempt {}/{} failed: {}",
                    attempt, OUTPUT_STREAM_OPEN_RETRIES, err
                );
                thread::sleep(Duration::from_millis(OUTPUT_STREAM_OPEN_RETRY_MS));
            }
        }
    }
    Err(last_error)
}

#[derive(Default)]
struct OfflineState {
    open: bool,
    opens: usize,
    closes: usize,
    sources: Vec<MixSource>,
    failure: Option<String>,
}

/// Output without hardware: connected nodes are pulled by [`OfflineOutput::render`].
///
/// Clones share the same session, so a caller can keep a handle after
/// handing the backend to an engine.
#[derive(Clone, Default)]
pub struct OfflineOutput {
    state: Arc<Mutex<OfflineState>>,
}

impl OfflineOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend whose `open` always fails with `reason`.
    pub fn failing(reason: impl Into<String>) -> Self {
        let output = Self::default();
        output.state.lock().unwrap().failure = Some(reason.into());
        output
    }

    /// Pull `frames` frames from every connected node and sum them.
    ///
    /// Nodes that have ended are disconnected.
    pub fn render(&self, frames: usize) -> Vec<f32> {
        let mut state = self.state.lock().unwrap();
        let mut out = Vec::new();
        state.sources.retain_mut(|source| {
            let wanted = frames * source.channels() as usize;
            if out.len() < wanted {
                out.resize(wanted, 0.0);
            }
            for slot in out.iter_mut().take(wanted) {
                match source.next() {
                    Some(sample) => *slot += sample,
                    None => return false,
                }
            }
            true
        });
        out
    }

    /// Number of connected nodes still producing audio.
    pub fn live_sources(&self) -> usize {
        let mut state = self.state.lock().unwrap();
        state.sources.retain(|source| source.is_active());
        state.sources.len()
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().unwrap().open
    }

    /// Times the session was opened.
    pub fn open_count(&self) -> usize {
        self.state.lock().unwrap().opens
    }

    /// Times the session was closed.
    pub fn close_count(&self) -> usize {
        self.state.lock().unwrap().closes
    }
}

impl OutputBackend for OfflineOutput {
    fn open(&mut self) -> Result<(), EngineError> {
        let mut state = self.state.lock().unwrap();
        if let Some(reason) = &state.failure {
            return Err(EngineError::HardwareUnavailable(reason.clone()));
        }
        state.open = true;
        state.opens += 1;
        Ok(())
    }

    fn connect(&mut self, source: MixSource) -> Result<(), EngineError> {
        let mut state = self.state.lock().unwrap();
        if !state.open {
            return Err(EngineError::NotRunning);
        }
        state.sources.push(source);
        Ok(())
    }

    fn close(&mut self) {
        let mut state = self.state.lock().unwrap();
        state.open = false;
        state.closes += 1;
        state.sources.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failing_backend_reports_hardware_unavailable() {
        let mut output = OfflineOutput::failing("device busy");
        assert_eq!(
            output.open(),
            Err(EngineError::HardwareUnavailable("device busy".to_string()))
        );
        assert!(!output.is_open());
        assert_eq!(output.open_count(), 0);
    }

    #[test]
    fn open_close_are_counted_across_clones() {
        let handle = OfflineOutput::new();
        let mut backend = handle.clone();
        backend.open().unwrap();
        assert!(handle.is_open());
        backend.close();
        assert!(!handle.is_open());
        assert_eq!(handle.open_count(), 1);
        assert_eq!(handle.close_count(), 1);
    }

    #[test]
    fn render_without_sources_is_empty() {
        let output = OfflineOutput::new();
        assert!(output.render(128).is_empty());
        assert_eq!(output.live_sources(), 0);
    }
}
