//! Ring-buffer helpers for track sample delivery.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::audio::buffer::TrackSlot;

/// How long a worker sleeps on a full ring before re-checking abort.
const FULL_RING_WAIT: Duration = Duration::from_millis(5);

/// Frames staged per lock, so the audio callback rarely finds the ring taken.
const PUSH_BATCH_FRAMES: usize = 128;

/// Push samples into a track slot, blocking while it is full.
///
/// The ring lock is released after every batch of [`PUSH_BATCH_FRAMES`].
///
/// # Returns
///
/// `false` if `abort` was raised before every sample was staged.
pub fn push_samples(slot: &TrackSlot, samples: &[f32], abort: &AtomicBool) -> bool {
    let channels = slot.channels();
    let mut offset = 0usize;

    while offset < samples.len() {
        if abort.load(Ordering::SeqCst) {
            return false;
        }

        let mut ring = slot.samples();
        let free = ring.max_len().saturating_sub(ring.len());
        let take = batch_len(free, samples.len() - offset, channels);

        if take == 0 {
            drop(slot.wait_for_space(ring, FULL_RING_WAIT));
            continue;
        }

        for sample in samples[offset..offset + take].iter().copied() {
            ring.push(sample);
        }
        offset += take;
    }

    true
}

/// Samples to stage under one lock: whole frames, at most one batch.
fn batch_len(free: usize, left: usize, channels: usize) -> usize {
    let free = free - free % channels;
    free.min(left).min(PUSH_BATCH_FRAMES * channels)
}

/// Record a slot as finished and log it once.
pub fn mark_track_as_finished(slot: &TrackSlot, label: &str) {
    if slot.is_finished() {
        return;
    }
    slot.mark_finished();
    log::info!("track finished: {}", label);
}
