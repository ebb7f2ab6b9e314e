//! Sample format conversion helpers for track decoding.

use symphonia::core::audio::{AudioBufferRef, Signal};

/// Convert an unsigned 8-bit sample to `f32`.
pub fn convert_unsigned_8bit_to_f32(sample: u8) -> f32 {
    (sample as i16 - 128) as f32 / 128.0
}

/// Convert a signed 8-bit sample to `f32`.
pub fn convert_signed_8bit_to_f32(sample: i8) -> f32 {
    sample as f32 / 128.0
}

/// Convert a signed 24-bit sample stored in an `i32` to `f32`.
pub fn convert_signed_24bit_to_f32(sample: i32) -> f32 {
    // The 24-bit sample occupies the least significant bits of the i32.
    let shifted_sample = sample << 8 >> 8;
    shifted_sample as f32 / 2f32.powi(23)
}

/// Convert an unsigned 24-bit sample stored in a `u32` to `f32`.
pub fn convert_unsigned_24bit_to_f32(sample: u32) -> f32 {
    let shifted_sample = (sample & 0x00ff_ffff) as i32 - (1 << 23);
    shifted_sample as f32 / 2f32.powi(23)
}

/// Convert a signed 16-bit sample to `f32`.
pub fn convert_signed_16bit_to_f32(sample: i16) -> f32 {
    sample as f32 / 2f32.powi(15)
}

/// Convert an unsigned 16-bit sample to `f32`.
pub fn convert_unsigned_16bit_to_f32(sample: u16) -> f32 {
    let shifted_sample = sample as i32 - (1 << 15);
    shifted_sample as f32 / 2f32.powi(15)
}

/// Convert a signed 32-bit sample to `f32`.
pub fn convert_signed_32bit_to_f32(sample: i32) -> f32 {
    sample as f32 / 2f32.powi(31)
}

/// Convert an unsigned 32-bit sample to `f32`.
pub fn convert_unsigned_32bit_to_f32(sample: u32) -> f32 {
    ((sample as i64) - (1i64 << 31)) as f32 / 2f32.powi(31)
}

/// Extract samples for a single channel from a decoded packet.
pub fn process_channel(decoded: &AudioBufferRef<'_>, channel: usize) -> Vec<f32> {
    match decoded {
        AudioBufferRef::U8(buf) => buf
            .chan(channel)
            .iter()
            .copied()
            .map(convert_unsigned_8bit_to_f32)
            .collect(),
        AudioBufferRef::S8(buf) => buf
            .chan(channel)
            .iter()
            .copied()
            .map(convert_signed_8bit_to_f32)
            .collect(),
        AudioBufferRef::U16(buf) => buf
            .chan(channel)
            .iter()
            .copied()
            .map(convert_unsigned_16bit_to_f32)
            .collect(),
        AudioBufferRef::S16(buf) => buf
            .chan(channel)
            .iter()
            .copied()
            .map(convert_signed_16bit_to_f32)
            .collect(),
        AudioBufferRef::U24(buf) => buf
            .chan(channel)
            .iter()
            .map(|s| convert_unsigned_24bit_to_f32(s.0))
            .collect(),
        AudioBufferRef::S24(buf) => buf
            .chan(channel)
            .iter()
            .map(|s| convert_signed_24bit_to_f32(s.0))
            .collect(),
        AudioBufferRef::U32(buf) => buf
            .chan(channel)
            .iter()
            .copied()
            .map(convert_unsigned_32bit_to_f32)
            .collect(),
        AudioBufferRef::S32(buf) => buf
            .chan(channel)
            .iter()
            .copied()
            .map(convert_signed_32bit_to_f32)
            .collect(),
        AudioBufferRef::F32(buf) => buf.chan(channel).to_vec(),
        AudioBufferRef::F64(buf) => buf.chan(channel).iter().map(|s| *s as f32).collect(),
    }
}

/// Append a decoded packet to `out` as interleaved `f32` samples.
pub fn append_interleaved(decoded: &AudioBufferRef<'_>, channels: usize, out: &mut Vec<f32>) {
    let planes: Vec<Vec<f32>> = (0..channels)
        .map(|channel| process_channel(decoded, channel))
        .collect();
    let frames = planes.iter().map(Vec::len).min().unwrap_or(0);

    out.reserve(frames * channels);
    for frame in 0..frames {
        for plane in &planes {
            out.push(plane[frame]);
        }
    }
}

/// Map interleaved samples between channel layouts into per-channel planes.
///
/// Mono input is copied into every output channel; otherwise channels are
/// copied by index and output channels without a source stay silent.
pub fn remap_to_planes(interleaved: &[f32], from_channels: usize, to_channels: usize) -> Vec<Vec<f32>> {
    let from_channels = from_channels.max(1);
    let frames = interleaved.len() / from_channels;
    let mut planes = vec![Vec::with_capacity(frames); to_channels];

    for frame in interleaved.chunks_exact(from_channels) {
        for (channel, plane) in planes.iter_mut().enumerate() {
            let sample = if from_channels == 1 {
                frame[0]
            } else {
                frame.get(channel).copied().unwrap_or(0.0)
            };
            plane.push(sample);
        }
    }

    planes
}

/// Interleave per-channel planes, skipping the first `skip_frames` frames.
pub fn interleave_planes(planes: &[Vec<f32>], skip_frames: usize, out: &mut Vec<f32>) {
    let frames = planes.iter().map(Vec::len).min().unwrap_or(0);
    if frames <= skip_frames {
        return;
    }
    out.reserve((frames - skip_frames) * planes.len());
    for frame in skip_frames..frames {
        for plane in planes {
            out.push(plane[frame]);
        }
    }
}
