//! One decodable audio file exposed as a lazy sequence of sample buffers.

use std::collections::VecDeque;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, warn};
use symphonia::core::audio::AudioBufferRef;
use symphonia::core::codecs::Decoder;
use symphonia::core::errors::Error;
use symphonia::core::formats::FormatReader;

use crate::audio::format::{AudioFormat, SampleRepr};
use crate::error::DecodeError;
use crate::tools::decode::open_file;

use super::convert::{append_interleaved, interleave_planes, remap_to_planes};

/// Frames per buffer when no size is requested.
pub const DEFAULT_BUFFER_FRAMES: usize = 1024;

/// A decodable audio file.
///
/// The file handle stays open for the lifetime of the source. Buffers are
/// decoded on demand by [`AudioSource::produce_buffers`]; the sequence can only
/// be restarted from the beginning with [`AudioSource::rewind`].
pub struct AudioSource {
    path: PathBuf,
    format: AudioFormat,
    frames_total: Option<u64>,
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    buffer_frames: usize,
    pending: VecDeque<f32>,
    scratch: Vec<f32>,
    position: u64,
    exhausted: bool,
}

impl AudioSource {
    /// Open `path` with the default buffer size.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DecodeError> {
        Self::open_with(path, DEFAULT_BUFFER_FRAMES)
    }

    /// Open `path`, producing buffers of `buffer_frames` frames.
    pub fn open_with(path: impl AsRef<Path>, buffer_frames: usize) -> Result<Self, DecodeError> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(DecodeError::EmptyPath);
        }

        let opened = open_file(path)?;
        let codec_params = opened
            .reader
            .tracks()
            .iter()
            .find(|track| track.id == opened.track_id)
            .map(|track| track.codec_params.clone())
            .ok_or_else(|| DecodeError::unsupported(path, "selected track vanished"))?;

        let sample_repr = codec_params
            .sample_format
            .map(SampleRepr::from)
            .unwrap_or_else(|| match codec_params.bits_per_sample {
                Some(8) => SampleRepr::S8,
                Some(16) => SampleRepr::S16,
                Some(24) => SampleRepr::S24,
                Some(32) => SampleRepr::S32,
                _ => SampleRepr::Unknown,
            });

        let mut source = Self {
            path: path.to_path_buf(),
            format: AudioFormat {
                sample_rate: codec_params.sample_rate.unwrap_or(0),
                channels: codec_params
                    .channels
                    .map(|channels| channels.count() as u16)
                    .unwrap_or(0),
                sample_repr,
            },
            frames_total: codec_params.n_frames,
            reader: opened.reader,
            decoder: opened.decoder,
            track_id: opened.track_id,
            buffer_frames: buffer_frames.max(1),
            pending: VecDeque::new(),
            scratch: Vec::new(),
            position: 0,
            exhausted: false,
        };

        if source.format.sample_rate == 0 || source.format.channels == 0 {
            source.learn_format_from_first_packet()?;
        }

        debug!(
            "opened {}: {} Hz, {} ch, {:?}",
            source.path.display(),
            source.format.sample_rate,
            source.format.channels,
            source.format.sample_repr
        );

        Ok(source)
    }

    /// Path the source was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Native format of the decoded samples.
    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Bit depth of the stored samples, if the container declares it.
    pub fn bits_per_sample(&self) -> Option<u32> {
        self.format.sample_repr.bits()
    }

    /// Frames per produced buffer.
    pub fn buffer_frames(&self) -> usize {
        self.buffer_frames
    }

    /// Frames produced since open or the last rewind.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Declared stream length, when the container provides one.
    pub fn duration(&self) -> Option<Duration> {
        let frames = self.frames_total?;
        if self.format.sample_rate == 0 {
            return None;
        }
        Some(Duration::from_secs_f64(
            frames as f64 / self.format.sample_rate as f64,
        ))
    }

    /// Lazily decode the remaining audio as fixed-size interleaved buffers.
    pub fn produce_buffers(&mut self) -> Buffers<'_> {
        Buffers { source: self }
    }

    /// Restart decoding from the first frame.
    pub fn rewind(&mut self) -> Result<(), DecodeError> {
        let opened = open_file(&self.path)?;
        self.reader = opened.reader;
        self.decoder = opened.decoder;
        self.track_id = opened.track_id;
        self.pending.clear();
        self.position = 0;
        self.exhausted = false;
        Ok(())
    }

    fn learn_format_from_first_packet(&mut self) -> Result<(), DecodeError> {
        loop {
            let packet = match self.reader.next_packet() {
                Ok(packet) => packet,
                Err(Error::IoError(err)) if err.kind() == ErrorKind::UnexpectedEof => {
                    return Err(DecodeError::unsupported(&self.path, "no decodable audio"));
                }
                Err(err) => return Err(DecodeError::unsupported(&self.path, err)),
            };
            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    if decoded.frames() == 0 {
                        continue;
                    }
                    self.format.sample_rate = spec.rate;
                    self.format.channels = spec.channels.count() as u16;
                    stage_decoded(
                        &decoded,
                        self.format.channels as usize,
                        &mut self.scratch,
                        &mut self.pending,
                    );
                    return Ok(());
                }
                Err(Error::DecodeError(err)) => {
                    warn!("decode error in {}: {}", self.path.display(), err);
                }
                Err(err) => return Err(DecodeError::unsupported(&self.path, err)),
            }
        }
    }

    /// Decode one packet into `pending`. Returns `false` at end of stream.
    fn decode_next(&mut self) -> Result<bool, DecodeError> {
        loop {
            let packet = match self.reader.next_packet() {
                Ok(packet) => packet,
                Err(Error::IoError(err)) if err.kind() == ErrorKind::UnexpectedEof => {
                    return Ok(false);
                }
                Err(Error::ResetRequired) => {
                    warn!("{}: stream reset required, ending track", self.path.display());
                    return Ok(false);
                }
                Err(err) => return Err(DecodeError::stream(&self.path, err)),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    if decoded.frames() == 0 {
                        continue;
                    }
                    stage_decoded(
                        &decoded,
                        self.format.channels as usize,
                        &mut self.scratch,
                        &mut self.pending,
                    );
                    return Ok(true);
                }
                Err(Error::DecodeError(err)) => {
                    warn!("decode error in {}: {}", self.path.display(), err);
                }
                Err(Error::IoError(err)) if err.kind() == ErrorKind::UnexpectedEof => {
                    return Ok(false);
                }
                Err(err) => return Err(DecodeError::stream(&self.path, err)),
            }
        }
    }

    fn next_buffer(&mut self) -> Option<Result<Vec<f32>, DecodeError>> {
        let channels = (self.format.channels as usize).max(1);
        let wanted = self.buffer_frames * channels;

        while self.pending.len() < wanted && !self.exhausted {
            match self.decode_next() {
                Ok(true) => {}
                Ok(false) => self.exhausted = true,
                Err(err) => {
                    self.exhausted = true;
                    return Some(Err(err));
                }
            }
        }

        let available = self.pending.len() - self.pending.len() % channels;
        let take = wanted.min(available);
        if take == 0 {
            self.pending.clear();
            return None;
        }

        let buffer: Vec<f32> = self.pending.drain(..take).collect();
        self.position += (take / channels) as u64;
        Some(Ok(buffer))
    }
}

impl fmt::Debug for AudioSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioSource")
            .field("path", &self.path)
            .field("format", &self.format)
            .field("position", &self.position)
            .finish()
    }
}

/// Lazy sequence of decoded buffers borrowed from an [`AudioSource`].
///
/// Ends with `None` at end of file. A stream failure is yielded once as
/// `Some(Err(_))` and ends the sequence.
pub struct Buffers<'a> {
    source: &'a mut AudioSource,
}

impl Iterator for Buffers<'_> {
    type Item = Result<Vec<f32>, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.source.next_buffer()
    }
}

fn stage_decoded(
    decoded: &AudioBufferRef<'_>,
    channels: usize,
    scratch: &mut Vec<f32>,
    pending: &mut VecDeque<f32>,
) {
    let decoded_channels = decoded.spec().channels.count();
    scratch.clear();

    if decoded_channels == channels {
        append_interleaved(decoded, channels, scratch);
        pending.extend(scratch.drain(..));
        return;
    }

    // Layout changed mid-stream; fold it back onto the declared layout.
    append_interleaved(decoded, decoded_channels, scratch);
    let planes = remap_to_planes(scratch, decoded_channels, channels);
    scratch.clear();
    interleave_planes(&planes, 0, scratch);
    pending.extend(scratch.drain(..));
}
