//! # Duet Audio
//!
//! Dual-track playback: a local track and a mix track are decoded on their own
//! threads, converted to a common format and summed sample-for-sample into
//! one output. Both tracks start, pause and stop on the same sample.
//!
//! ```no_run
//! use duet_audio::Transport;
//!
//! let transport = Transport::new();
//! transport.play("vocals.wav", "backing.mp3")?;
//! transport.sleep_until_end();
//! transport.stop();
//! # Ok::<(), duet_audio::PlaybackError>(())
//! ```

pub mod audio;
pub mod diagnostics;
pub mod error;
pub mod playback;
mod tools;
pub mod track;

pub use audio::format::{AudioFormat, SampleRepr};
pub use diagnostics::events::{EventSink, TransportEvent};
pub use diagnostics::reporter::Report;
pub use error::{DecodeError, EngineError, GraphError, PlaybackError};
pub use playback::engine::{AudioEngine, EngineLease};
pub use playback::graph::{MixGraph, MixSource, SlotPositions};
pub use playback::output::{OfflineOutput, OutputBackend, RodioOutput};
pub use playback::settings::PlaybackSettings;
pub use playback::transport::{Transport, TransportState};
pub use track::{AudioSource, FormatConverter};
