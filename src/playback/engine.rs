//! Reference-counted lifecycle of the shared audio output.
//!
//! Every active playback session holds an [`EngineLease`]. The output device
//! is opened when the first lease is taken and closed when the last one is
//! returned, so sessions never start or stop the device behind each other's
//! back.

use std::sync::{Arc, Mutex, OnceLock};

use log::{debug, info};

use crate::error::EngineError;
use crate::playback::graph::MixSource;
use crate::playback::output::{OutputBackend, RodioOutput};

struct EngineState {
    backend: Box<dyn OutputBackend>,
    references: usize,
    running: bool,
}

/// Shared output engine.
pub struct AudioEngine {
    state: Mutex<EngineState>,
}

impl AudioEngine {
    /// Create an isolated engine driving `backend`.
    pub fn new(backend: impl OutputBackend + 'static) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(EngineState {
                backend: Box::new(backend),
                references: 0,
                running: false,
            }),
        })
    }

    /// Process-wide engine on the default system output.
    pub fn shared() -> Arc<Self> {
        static SHARED: OnceLock<Arc<AudioEngine>> = OnceLock::new();
        SHARED.get_or_init(|| AudioEngine::new(RodioOutput::new())).clone()
    }

    /// Take a reference, starting the output if this is the first one.
    pub fn acquire(self: &Arc<Self>) -> Result<EngineLease, EngineError> {
        let mut state = self.state.lock().unwrap();
        if state.references == 0 && !state.running {
            state.backend.open()?;
            state.running = true;
            info!("audio engine started");
        }
        state.references += 1;
        debug!("audio engine references: {}", state.references);

        Ok(EngineLease {
            engine: Arc::clone(self),
        })
    }

    fn release(&self) {
        let mut state = self.state.lock().unwrap();
        state.references = state.references.saturating_sub(1);
        debug!("audio engine references: {}", state.references);
        if state.references == 0 && state.running {
            state.backend.close();
            state.running = false;
            info!("audio engine stopped");
        }
    }

    fn connect(&self, source: MixSource) -> Result<(), EngineError> {
        let mut state = self.state.lock().unwrap();
        if !state.running {
            return Err(EngineError::NotRunning);
        }
        state.backend.connect(source)
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().unwrap().running
    }

    /// Number of outstanding leases.
    pub fn reference_count(&self) -> usize {
        self.state.lock().unwrap().references
    }
}

impl std::fmt::Debug for AudioEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock().unwrap();
        f.debug_struct("AudioEngine")
            .field("references", &state.references)
            .field("running", &state.running)
            .finish()
    }
}

/// One reference to a running [`AudioEngine`].
///
/// Dropping the lease returns the reference exactly once.
#[derive(Debug)]
pub struct EngineLease {
    engine: Arc<AudioEngine>,
}

impl EngineLease {
    /// Route a mix node to the engine's output.
    pub fn connect(&self, source: MixSource) -> Result<(), EngineError> {
        self.engine.connect(source)
    }

    pub fn engine(&self) -> &Arc<AudioEngine> {
        &self.engine
    }

    /// Return the reference now instead of on drop.
    pub fn release(self) {}
}

impl Drop for EngineLease {
    fn drop(&mut self) {
        self.engine.release();
    }
}
