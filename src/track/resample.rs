//! Per-source conversion into the mixing format.

use std::fmt;

use rubato::{FastFixedIn, PolynomialDegree, Resampler};

use crate::audio::format::AudioFormat;
use crate::error::GraphError;

use super::convert::{interleave_planes, remap_to_planes};

const MAX_FLUSH_CALLS: usize = 8;

/// Converts one source's interleaved samples into the mixing format.
///
/// Channel layout is mapped first, then the sample rate is converted with a
/// fixed-input rubato resampler. The resampler's startup delay is dropped so a
/// converted track lines up with an unconverted one.
pub struct FormatConverter {
    source: AudioFormat,
    target: AudioFormat,
    resampler: Option<FastFixedIn<f32>>,
    queued: Vec<Vec<f32>>,
    delay_frames: usize,
    frames_in: u64,
    frames_out: u64,
}

impl FormatConverter {
    /// Build a converter from `source` into `target`.
    ///
    /// # Arguments
    ///
    /// * `chunk_frames` - Input frames handed to the resampler per call.
    pub fn new(
        source: AudioFormat,
        target: AudioFormat,
        chunk_frames: usize,
    ) -> Result<Self, GraphError> {
        source.validate()?;
        target.validate()?;

        let resampler = if source.sample_rate != target.sample_rate {
            let ratio = target.sample_rate as f64 / source.sample_rate as f64;
            let resampler = FastFixedIn::<f32>::new(
                ratio,
                1.0,
                PolynomialDegree::Linear,
                chunk_frames.max(16),
                target.channels as usize,
            )
            .map_err(|err| {
                GraphError::FormatUnsupported(format!(
                    "cannot resample {} Hz to {} Hz: {}",
                    source.sample_rate, target.sample_rate, err
                ))
            })?;
            Some(resampler)
        } else {
            None
        };

        let delay_frames = resampler.as_ref().map(|r| r.output_delay()).unwrap_or(0);

        Ok(Self {
            source,
            target,
            resampler,
            queued: vec![Vec::new(); target.channels as usize],
            delay_frames,
            frames_in: 0,
            frames_out: 0,
        })
    }

    /// Return `true` when samples pass through unchanged.
    pub fn is_passthrough(&self) -> bool {
        self.resampler.is_none() && self.source.channels == self.target.channels
    }

    /// Format the converter produces.
    pub fn target(&self) -> AudioFormat {
        self.target
    }

    /// Convert one interleaved buffer in the source format.
    ///
    /// The resampler works on fixed chunks, so output may lag input until
    /// [`FormatConverter::flush`] is called at end of stream.
    pub fn process(&mut self, interleaved: &[f32]) -> Result<Vec<f32>, GraphError> {
        if self.is_passthrough() {
            return Ok(interleaved.to_vec());
        }

        let planes = remap_to_planes(
            interleaved,
            self.source.channels as usize,
            self.target.channels as usize,
        );

        let Some(resampler) = self.resampler.as_mut() else {
            let mut out = Vec::with_capacity(interleaved.len());
            interleave_planes(&planes, 0, &mut out);
            return Ok(out);
        };

        for (queue, plane) in self.queued.iter_mut().zip(planes) {
            queue.extend(plane);
        }

        let mut out = Vec::new();
        loop {
            let needed = resampler.input_frames_next();
            if self.queued.first().map(Vec::len).unwrap_or(0) < needed {
                break;
            }
            let chunk: Vec<Vec<f32>> = self
                .queued
                .iter_mut()
                .map(|queue| queue.drain(..needed).collect())
                .collect();
            let resampled = resampler
                .process(&chunk, None)
                .map_err(|err| GraphError::FormatUnsupported(err.to_string()))?;
            self.frames_in += needed as u64;
            push_trimmed(&resampled, &mut self.delay_frames, &mut out);
        }
        self.frames_out += (out.len() / self.target.channels as usize) as u64;

        Ok(out)
    }

    /// Emit whatever the resampler still holds at end of stream.
    pub fn flush(&mut self) -> Result<Vec<f32>, GraphError> {
        let Some(resampler) = self.resampler.as_mut() else {
            return Ok(Vec::new());
        };

        let ratio = self.target.sample_rate as f64 / self.source.sample_rate as f64;
        let remaining = self.queued.first().map(Vec::len).unwrap_or(0);
        self.frames_in += remaining as u64;
        let expected_total = (self.frames_in as f64 * ratio).round() as u64;
        let wanted = expected_total.saturating_sub(self.frames_out) as usize;

        let channels = self.target.channels as usize;
        let mut tail: Option<Vec<Vec<f32>>> =
            (remaining > 0).then(|| self.queued.iter_mut().map(std::mem::take).collect());
        let mut out = Vec::new();
        let mut attempts = 0;
        while out.len() < wanted * channels && attempts < MAX_FLUSH_CALLS {
            attempts += 1;
            let resampled = match tail.take() {
                Some(tail) => resampler.process_partial(Some(tail.as_slice()), None),
                None => resampler.process_partial(None::<&[Vec<f32>]>, None),
            }
            .map_err(|err| GraphError::FormatUnsupported(err.to_string()))?;
            push_trimmed(&resampled, &mut self.delay_frames, &mut out);
        }
        out.truncate(wanted * channels);
        self.frames_out += (out.len() / channels.max(1)) as u64;

        Ok(out)
    }
}

impl fmt::Debug for FormatConverter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormatConverter")
            .field("source", &self.source)
            .field("target", &self.target)
            .field("resampling", &self.resampler.is_some())
            .finish()
    }
}

fn push_trimmed(planes: &[Vec<f32>], delay_frames: &mut usize, out: &mut Vec<f32>) {
    let frames = planes.iter().map(Vec::len).min().unwrap_or(0);
    let skip = (*delay_frames).min(frames);
    *delay_frames -= skip;
    interleave_planes(planes, skip, out);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_formats_pass_through() {
        let format = AudioFormat::float(44_100, 2);
        let mut converter = FormatConverter::new(format, format, 256).unwrap();
        assert!(converter.is_passthrough());
        assert_eq!(converter.process(&[0.1, 0.2]).unwrap(), vec![0.1, 0.2]);
        assert!(converter.flush().unwrap().is_empty());
    }

    #[test]
    fn mono_is_upmixed_without_resampling() {
        let mut converter = FormatConverter::new(
            AudioFormat::float(48_000, 1),
            AudioFormat::float(48_000, 2),
            256,
        )
        .unwrap();
        assert!(!converter.is_passthrough());
        assert_eq!(
            converter.process(&[0.5, -0.5]).unwrap(),
            vec![0.5, 0.5, -0.5, -0.5]
        );
    }

    #[test]
    fn resampling_preserves_duration() {
        let mut converter = FormatConverter::new(
            AudioFormat::float(24_000, 1),
            AudioFormat::float(48_000, 1),
            256,
        )
        .unwrap();

        let input = vec![0.25_f32; 24_000];
        let mut output = Vec::new();
        for chunk in input.chunks(1000) {
            output.extend(converter.process(chunk).unwrap());
        }
        output.extend(converter.flush().unwrap());

        let expected = 48_000_i64;
        assert!(
            (output.len() as i64 - expected).abs() <= 512,
            "got {} frames",
            output.len()
        );
        // A constant signal stays constant once the filter settles.
        let middle = output[output.len() / 2];
        assert!((middle - 0.25).abs() < 0.01, "middle sample {}", middle);
    }

    #[test]
    fn rejects_unsupported_rate() {
        let result = FormatConverter::new(
            AudioFormat::float(500, 1),
            AudioFormat::float(48_000, 1),
            256,
        );
        assert!(matches!(result, Err(GraphError::FormatUnsupported(_))));
    }
}
