//! The node the audio callback pulls the summed output from.

use rodio::Source;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use crate::audio::format::AudioFormat;

use super::track_mix::{mix_block, BlockOutcome};
use super::GraphShared;

/// Summed output bus of a [`MixGraph`](super::MixGraph).
///
/// This runs on the output device's real-time callback. It owns a block buffer
/// allocated up front and only touches the track rings through `try_lock`, so
/// a call to `next` never allocates, performs I/O or waits on a decoder.
///
/// Output begins with silence until the scheduled start frame. Pause takes
/// effect at the next block boundary, so both tracks stop on the same sample.
pub struct MixSource {
    shared: Arc<GraphShared>,
    block: Vec<f32>,
    cursor: usize,
    filled: usize,
    block_frames: usize,
    channels: u16,
    sample_rate: u32,
    start_frame: u64,
    frames_rendered: u64,
}

impl MixSource {
    pub(super) fn new(
        shared: Arc<GraphShared>,
        format: AudioFormat,
        block_frames: usize,
        start_frame: u64,
    ) -> Self {
        let block_frames = block_frames.max(1);
        Self {
            shared,
            block: vec![0.0; block_frames * format.channels as usize],
            cursor: 0,
            filled: 0,
            block_frames,
            channels: format.channels,
            sample_rate: format.sample_rate,
            start_frame,
            frames_rendered: 0,
        }
    }

    /// Output frames produced so far, silence included.
    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    /// Output frame at which both tracks begin.
    pub fn start_frame(&self) -> u64 {
        self.start_frame
    }

    /// Return `false` once the graph was detached or both tracks played out.
    pub fn is_active(&self) -> bool {
        !self.shared.stopped.load(Ordering::Acquire) && !self.shared.ended.load(Ordering::Acquire)
    }

    fn refill(&mut self) -> bool {
        if self.shared.stopped.load(Ordering::Acquire) {
            return false;
        }

        let channels = self.channels as usize;
        let frames = if self.frames_rendered < self.start_frame {
            let lead_in = (self.start_frame - self.frames_rendered) as usize;
            self.silence(lead_in.min(self.block_frames))
        } else if self.shared.paused.load(Ordering::Acquire) {
            self.silence(self.block_frames)
        } else {
            match mix_block(
                &mut self.block,
                &self.shared.primary,
                &self.shared.mix,
                channels,
                self.block_frames,
            ) {
                BlockOutcome::Mixed(frames) => frames,
                BlockOutcome::Silence(frames) => self.silence(frames),
                BlockOutcome::Ended => {
                    self.shared.ended.store(true, Ordering::Release);
                    return false;
                }
            }
        };

        self.frames_rendered += frames as u64;
        self.filled = frames * channels;
        self.cursor = 0;
        true
    }

    fn silence(&mut self, frames: usize) -> usize {
        let samples = frames * self.channels as usize;
        self.block[..samples].fill(0.0);
        frames
    }
}

impl Iterator for MixSource {
    type Item = f32;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.filled && !self.refill() {
            return None;
        }
        let sample = self.block[self.cursor];
        self.cursor += 1;
        Some(sample)
    }
}

impl Source for MixSource {
    fn current_span_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}

impl std::fmt::Debug for MixSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MixSource")
            .field("channels", &self.channels)
            .field("sample_rate", &self.sample_rate)
            .field("start_frame", &self.start_frame)
            .field("frames_rendered", &self.frames_rendered)
            .finish()
    }
}
