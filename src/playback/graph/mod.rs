//! Two-track mix graph: decoder workers, staging rings and the summing node.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{info, warn};

use crate::audio::buffer::TrackSlot;
use crate::audio::format::{negotiate_mixing_format, AudioFormat};
use crate::diagnostics::events::EventSink;
use crate::error::GraphError;
use crate::playback::settings::PlaybackSettings;
use crate::track::{spawn_decode_worker, AudioSource, DecodeWorkerArgs, FormatConverter};

mod mix_source;
mod track_mix;

pub use mix_source::MixSource;

/// State shared by the graph, its decoder workers and the callback node.
#[derive(Debug)]
pub(crate) struct GraphShared {
    pub(crate) primary: Arc<TrackSlot>,
    pub(crate) mix: Arc<TrackSlot>,
    pub(crate) paused: AtomicBool,
    pub(crate) stopped: AtomicBool,
    pub(crate) ended: AtomicBool,
}

/// Frames of each track consumed by the output so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotPositions {
    pub primary: u64,
    pub mix: u64,
}

impl SlotPositions {
    /// Absolute difference between the two tracks, in frames.
    pub fn drift(&self) -> u64 {
        self.primary.abs_diff(self.mix)
    }
}

#[derive(Debug)]
struct Attached {
    shared: Arc<GraphShared>,
    mixing_format: AudioFormat,
    abort: Arc<AtomicBool>,
    workers: Vec<JoinHandle<AudioSource>>,
    scheduled: bool,
}

/// Routes two sources through a summing stage into one output node.
///
/// Each attached source gets its own decoder thread that converts into the
/// mixing format and keeps a bounded ring filled ahead of the callback. The
/// node returned by [`MixGraph::schedule_start`] consumes both rings in
/// lockstep, so the tracks can only ever start, pause and stop together.
#[derive(Debug)]
pub struct MixGraph {
    settings: PlaybackSettings,
    events: EventSink,
    attached: Option<Attached>,
}

impl MixGraph {
    pub fn new(settings: PlaybackSettings, events: EventSink) -> Self {
        Self {
            settings: settings.sanitized(),
            events,
            attached: None,
        }
    }

    /// Connect `primary` and `mix` to the summing stage.
    ///
    /// Any previously attached pair is detached first. On error nothing is
    /// spawned and both sources are dropped.
    pub fn attach(&mut self, primary: AudioSource, mix: AudioSource) -> Result<(), GraphError> {
        let mixing_format = negotiate_mixing_format(&primary.format(), &mix.format())?;
        let chunk = self.settings.resample_chunk_frames;
        let primary_converter = FormatConverter::new(primary.format(), mixing_format, chunk)?;
        let mix_converter = FormatConverter::new(mix.format(), mixing_format, chunk)?;

        self.detach();

        let channels = mixing_format.channels as usize;
        let capacity = mixing_format
            .samples_for_ms(self.settings.track_buffer_ms)
            .max(self.settings.block_frames * channels * 2);
        let shared = Arc::new(GraphShared {
            primary: Arc::new(TrackSlot::new(capacity, channels)),
            mix: Arc::new(TrackSlot::new(capacity, channels)),
            paused: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            ended: AtomicBool::new(false),
        });
        let abort = Arc::new(AtomicBool::new(false));

        info!(
            "mix graph attached: {} + {} -> {} Hz / {} ch",
            primary.path().display(),
            mix.path().display(),
            mixing_format.sample_rate,
            mixing_format.channels
        );

        let workers = vec![
            spawn_decode_worker(DecodeWorkerArgs {
                source: primary,
                converter: primary_converter,
                slot: shared.primary.clone(),
                abort: abort.clone(),
                events: self.events.clone(),
                label: "local",
            }),
            spawn_decode_worker(DecodeWorkerArgs {
                source: mix,
                converter: mix_converter,
                slot: shared.mix.clone(),
                abort: abort.clone(),
                events: self.events.clone(),
                label: "mix",
            }),
        ];

        self.attached = Some(Attached {
            shared,
            mixing_format,
            abort,
            workers,
            scheduled: false,
        });
        Ok(())
    }

    /// Build the output node; both tracks begin at output frame `at_frame`.
    pub fn schedule_start(&mut self, at_frame: u64) -> Result<MixSource, GraphError> {
        let attached = self.attached.as_mut().ok_or(GraphError::NotAttached)?;
        if attached.scheduled {
            return Err(GraphError::AlreadyScheduled);
        }
        attached.scheduled = true;
        Ok(MixSource::new(
            attached.shared.clone(),
            attached.mixing_format,
            self.settings.block_frames,
            at_frame,
        ))
    }

    /// Suspend both tracks at the next block boundary.
    pub fn pause(&self) {
        if let Some(attached) = &self.attached {
            attached.shared.paused.store(true, Ordering::Release);
        }
    }

    /// Continue both tracks from where they were paused.
    pub fn resume(&self) {
        if let Some(attached) = &self.attached {
            attached.shared.paused.store(false, Ordering::Release);
        }
    }

    /// Stop the node, join the decoder workers and release both files.
    pub fn detach(&mut self) {
        let Some(attached) = self.attached.take() else {
            return;
        };

        attached.shared.stopped.store(true, Ordering::Release);
        attached.abort.store(true, Ordering::SeqCst);
        attached.shared.primary.wake();
        attached.shared.mix.wake();

        for worker in attached.workers {
            drop(join_worker(worker));
        }

        attached.shared.primary.clear();
        attached.shared.mix.clear();
        info!("mix graph detached");
    }

    pub fn is_attached(&self) -> bool {
        self.attached.is_some()
    }

    /// Format both tracks are summed in, while attached.
    pub fn mixing_format(&self) -> Option<AudioFormat> {
        self.attached.as_ref().map(|attached| attached.mixing_format)
    }

    pub fn positions(&self) -> SlotPositions {
        self.attached
            .as_ref()
            .map(|attached| SlotPositions {
                primary: attached.shared.primary.frames_played(),
                mix: attached.shared.mix.frames_played(),
            })
            .unwrap_or_default()
    }

    /// Return `true` once both tracks have played out.
    pub fn is_finished(&self) -> bool {
        self.attached
            .as_ref()
            .map(|attached| attached.shared.ended.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    /// Output frames covering `ms` in the mixing format.
    pub fn frames_for_ms(&self, ms: f32) -> u64 {
        self.mixing_format()
            .map(|format| format.frames_for_ms(ms))
            .unwrap_or(0)
    }

    #[cfg(test)]
    pub(crate) fn shared(&self) -> Option<Arc<GraphShared>> {
        self.attached.as_ref().map(|attached| attached.shared.clone())
    }
}

/// Join a decoder thread unless it is the calling thread.
///
/// An event handler running on a decoder thread may stop playback; that
/// thread exits on its own once the handler returns.
fn join_worker<T>(worker: JoinHandle<T>) -> Option<T> {
    if worker.thread().id() == thread::current().id() {
        warn!("mix graph detached from its own decoder thread; skipping join");
        return None;
    }
    match worker.join() {
        Ok(source) => Some(source),
        Err(_) => {
            warn!("decoder thread panicked before detach");
            None
        }
    }
}

impl Drop for MixGraph {
    fn drop(&mut self) {
        self.detach();
    }
}
