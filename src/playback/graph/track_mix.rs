//! Per-block track mixing run on the audio callback.
//!
//! Nothing here allocates, blocks or logs.

use crate::audio::buffer::{TrackRing, TrackSlot};

/// Result of one attempt to fill an output block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum BlockOutcome {
    /// Neither track advanced; emit this many frames of silence.
    Silence(usize),
    /// Both tracks advanced; this many frames were summed.
    Mixed(usize),
    /// Both tracks are drained.
    Ended,
}

/// Sum the next block of both tracks into `out`.
///
/// Tracks only move together: if either unfinished track has less than a full
/// block staged, or a ring is momentarily locked by its decoder, the block is
/// silence and no track advances. A finished track contributes what it has
/// left, then silence.
pub(super) fn mix_block(
    out: &mut [f32],
    primary: &TrackSlot,
    mix: &TrackSlot,
    channels: usize,
    block_frames: usize,
) -> BlockOutcome {
    let block_frames = block_frames.min(out.len() / channels);

    let Some(mut primary_ring) = primary.try_samples() else {
        return BlockOutcome::Silence(block_frames);
    };
    let Some(mut mix_ring) = mix.try_samples() else {
        return BlockOutcome::Silence(block_frames);
    };

    // Read finished before lengths: a finished flag means the ring is final.
    let primary_done = primary.is_finished();
    let mix_done = mix.is_finished();
    let primary_frames = primary_ring.len() / channels;
    let mix_frames = mix_ring.len() / channels;

    let primary_ready = primary_done || primary_frames >= block_frames;
    let mix_ready = mix_done || mix_frames >= block_frames;
    if !primary_ready || !mix_ready {
        return BlockOutcome::Silence(block_frames);
    }

    let frames = if primary_done && mix_done {
        primary_frames.max(mix_frames).min(block_frames)
    } else {
        block_frames
    };
    if frames == 0 {
        return BlockOutcome::Ended;
    }

    let samples = frames * channels;
    let out = &mut out[..samples];
    out.fill(0.0);

    let taken = drain_into(&mut primary_ring, out, primary_frames.min(frames) * channels);
    primary.advance((taken / channels) as u64);
    let taken = drain_into(&mut mix_ring, out, mix_frames.min(frames) * channels);
    mix.advance((taken / channels) as u64);

    for sample in out.iter_mut() {
        *sample = sample.clamp(-1.0, 1.0);
    }

    BlockOutcome::Mixed(frames)
}

fn drain_into(ring: &mut TrackRing, out: &mut [f32], take: usize) -> usize {
    let mut taken = 0;
    for sample in out.iter_mut().take(take) {
        match ring.pop() {
            Some(value) => {
                *sample += value;
                taken += 1;
            }
            None => break,
        }
    }
    taken
}
