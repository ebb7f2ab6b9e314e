//! Shared ring buffers used for per-track audio staging.
//!
//! A decoder worker fills a [`TrackSlot`] ahead of time; the audio callback
//! drains it. The callback only ever uses [`TrackSlot::try_samples`] so it is
//! never parked behind a decoder holding the lock.

use dasp_ring_buffer::Bounded;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, TryLockError};
use std::time::Duration;

/// Bounded interleaved sample storage for one track.
pub type TrackRing = Bounded<Vec<f32>>;

/// Staging state shared between one decoder worker and the audio callback.
#[derive(Debug)]
pub struct TrackSlot {
    samples: Mutex<TrackRing>,
    space_available: Condvar,
    finished: AtomicBool,
    frames_played: AtomicU64,
    channels: usize,
}

impl TrackSlot {
    /// Create an empty slot holding at most `capacity` interleaved samples.
    pub fn new(capacity: usize, channels: usize) -> Self {
        let channels = channels.max(1);
        // Keep whole frames so a pop never splits one.
        let capacity = (capacity.max(channels) / channels) * channels;
        Self {
            samples: Mutex::new(Bounded::from(vec![0.0; capacity])),
            space_available: Condvar::new(),
            finished: AtomicBool::new(false),
            frames_played: AtomicU64::new(0),
            channels,
        }
    }

    /// Interleaved channel count of the staged samples.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Lock the ring for writing, waiting as long as needed.
    pub fn samples(&self) -> MutexGuard<'_, TrackRing> {
        self.samples.lock().unwrap()
    }

    /// Lock the ring only if it is free right now.
    pub fn try_samples(&self) -> Option<MutexGuard<'_, TrackRing>> {
        match self.samples.try_lock() {
            Ok(guard) => Some(guard),
            Err(TryLockError::WouldBlock) => None,
            Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
        }
    }

    /// Release `guard` and sleep until space may be available or `timeout` passes.
    pub fn wait_for_space<'a>(
        &'a self,
        guard: MutexGuard<'a, TrackRing>,
        timeout: Duration,
    ) -> MutexGuard<'a, TrackRing> {
        let (guard, _) = self.space_available.wait_timeout(guard, timeout).unwrap();
        guard
    }

    /// Wake any worker waiting for space.
    pub fn wake(&self) {
        self.space_available.notify_all();
    }

    /// Remaining capacity in interleaved samples.
    pub fn remaining_space(&self) -> usize {
        let ring = self.samples();
        ring.max_len().saturating_sub(ring.len())
    }

    /// Number of interleaved samples currently staged.
    pub fn buffered_samples(&self) -> usize {
        self.samples().len()
    }

    /// Return `true` once the worker has pushed its last sample.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Record end of stream for this slot.
    pub fn mark_finished(&self) {
        self.finished.store(true, Ordering::Release);
    }

    /// Frames consumed by the audio callback so far.
    pub fn frames_played(&self) -> u64 {
        self.frames_played.load(Ordering::Acquire)
    }

    /// Advance the consumed-frames counter.
    pub fn advance(&self, frames: u64) {
        self.frames_played.fetch_add(frames, Ordering::AcqRel);
    }

    /// Drop all staged samples.
    pub fn clear(&self) {
        self.samples().drain().for_each(drop);
    }
}
