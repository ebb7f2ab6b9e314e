//! Native and mixing formats.

use symphonia::core::sample::SampleFormat;

use crate::error::GraphError;

/// Lowest sample rate the mix graph accepts.
pub const MIN_SAMPLE_RATE: u32 = 1_000;
/// Highest sample rate the mix graph accepts.
pub const MAX_SAMPLE_RATE: u32 = 384_000;
/// Highest channel count the mix graph accepts.
pub const MAX_CHANNELS: u16 = 8;

/// Sample representation as stored in the source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleRepr {
    U8,
    U16,
    U24,
    U32,
    S8,
    S16,
    S24,
    S32,
    F32,
    F64,
    /// The container did not declare a representation.
    Unknown,
}

impl SampleRepr {
    /// Bit depth of one sample, if known.
    pub fn bits(&self) -> Option<u32> {
        match self {
            Self::U8 | Self::S8 => Some(8),
            Self::U16 | Self::S16 => Some(16),
            Self::U24 | Self::S24 => Some(24),
            Self::U32 | Self::S32 | Self::F32 => Some(32),
            Self::F64 => Some(64),
            Self::Unknown => None,
        }
    }
}

impl From<SampleFormat> for SampleRepr {
    fn from(value: SampleFormat) -> Self {
        match value {
            SampleFormat::U8 => Self::U8,
            SampleFormat::U16 => Self::U16,
            SampleFormat::U24 => Self::U24,
            SampleFormat::U32 => Self::U32,
            SampleFormat::S8 => Self::S8,
            SampleFormat::S16 => Self::S16,
            SampleFormat::S24 => Self::S24,
            SampleFormat::S32 => Self::S32,
            SampleFormat::F32 => Self::F32,
            SampleFormat::F64 => Self::F64,
        }
    }
}

/// Sample rate, channel count and representation of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub sample_repr: SampleRepr,
}

impl AudioFormat {
    /// Interleaved `f32` format used on the summing bus.
    pub fn float(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            sample_repr: SampleRepr::F32,
        }
    }

    /// Check that the mix graph can convert this format.
    pub fn validate(&self) -> Result<(), GraphError> {
        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&self.sample_rate) {
            return Err(GraphError::FormatUnsupported(format!(
                "sample rate {} Hz outside {}..={} Hz",
                self.sample_rate, MIN_SAMPLE_RATE, MAX_SAMPLE_RATE
            )));
        }
        if self.channels == 0 || self.channels > MAX_CHANNELS {
            return Err(GraphError::FormatUnsupported(format!(
                "{} channels (supported: 1..={})",
                self.channels, MAX_CHANNELS
            )));
        }
        Ok(())
    }

    /// Number of interleaved samples covering `ms` milliseconds.
    pub fn samples_for_ms(&self, ms: f32) -> usize {
        self.frames_for_ms(ms) as usize * self.channels as usize
    }

    /// Number of frames covering `ms` milliseconds.
    pub fn frames_for_ms(&self, ms: f32) -> u64 {
        ((self.sample_rate as f32 * ms.max(0.0)) / 1000.0).round() as u64
    }
}

/// Pick the format both tracks are converted into before summation.
///
/// The mixing format takes the highest sample rate and the highest channel
/// count of the two sources and always carries interleaved `f32` samples.
pub fn negotiate_mixing_format(
    primary: &AudioFormat,
    mix: &AudioFormat,
) -> Result<AudioFormat, GraphError> {
    primary.validate()?;
    mix.validate()?;

    Ok(AudioFormat::float(
        primary.sample_rate.max(mix.sample_rate),
        primary.channels.max(mix.channels),
    ))
}
