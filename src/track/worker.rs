//! Decoder worker that keeps one track slot filled ahead of the callback.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::debug;

use crate::audio::buffer::TrackSlot;
use crate::diagnostics::events::EventSink;
use crate::error::DecodeError;

use super::buffer::{mark_track_as_finished, push_samples};
use super::resample::FormatConverter;
use super::source::AudioSource;

/// Arguments required to buffer a single track into its slot.
pub struct DecodeWorkerArgs {
    pub source: AudioSource,
    pub converter: FormatConverter,
    pub slot: Arc<TrackSlot>,
    pub abort: Arc<AtomicBool>,
    pub events: EventSink,
    pub label: &'static str,
}

/// How a decoder loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FillOutcome {
    /// Every buffer and the converter tail were staged.
    Drained,
    Aborted,
    /// An error was emitted and the track cut short.
    Failed,
}

/// Spawn a decoder thread that buffers audio for a single track.
///
/// The thread hands the source back when it exits so the caller controls
/// when the file handle is closed.
pub fn spawn_decode_worker(args: DecodeWorkerArgs) -> JoinHandle<AudioSource> {
    let DecodeWorkerArgs {
        mut source,
        converter,
        slot,
        abort,
        events,
        label,
    } = args;

    thread::spawn(move || {
        let outcome = fill_slot(
            source.produce_buffers(),
            converter,
            &slot,
            &abort,
            &events,
            label,
        );
        if outcome == FillOutcome::Aborted {
            debug!("{} decoder aborted at frame {}", label, source.position());
        }
        source
    })
}

/// Convert and stage `buffers` into `slot` until they run out, fail or abort.
///
/// The slot is always marked finished on return. Failures are reported
/// through `events`.
pub(crate) fn fill_slot(
    buffers: impl Iterator<Item = Result<Vec<f32>, DecodeError>>,
    mut converter: FormatConverter,
    slot: &TrackSlot,
    abort: &AtomicBool,
    events: &EventSink,
    label: &str,
) -> FillOutcome {
    let mut outcome = FillOutcome::Drained;

    for buffer in buffers {
        if abort.load(Ordering::SeqCst) {
            outcome = FillOutcome::Aborted;
            break;
        }

        let samples = match buffer {
            Ok(samples) => samples,
            Err(err) => {
                slot.mark_finished();
                events.error(err);
                outcome = FillOutcome::Failed;
                break;
            }
        };

        let converted = match converter.process(&samples) {
            Ok(converted) => converted,
            Err(err) => {
                slot.mark_finished();
                events.error(err);
                outcome = FillOutcome::Failed;
                break;
            }
        };

        if !push_samples(slot, &converted, abort) {
            outcome = FillOutcome::Aborted;
            break;
        }
    }

    if outcome == FillOutcome::Drained {
        match converter.flush() {
            Ok(tail) => {
                if !push_samples(slot, &tail, abort) {
                    outcome = FillOutcome::Aborted;
                }
            }
            Err(err) => {
                slot.mark_finished();
                events.error(err);
                outcome = FillOutcome::Failed;
            }
        }
    }

    match outcome {
        FillOutcome::Drained => mark_track_as_finished(slot, label),
        _ => slot.mark_finished(),
    }
    outcome
}
