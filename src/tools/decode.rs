//! Symphonia helpers for opening and decoding audio files.

use std::fs::File;
use std::io::ErrorKind;
use std::path::Path;

use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::DecodeError;

/// Reader and decoder for the first decodable track of a file.
pub struct OpenedFile {
    pub reader: Box<dyn FormatReader>,
    pub decoder: Box<dyn Decoder>,
    pub track_id: u32,
}

/// Open a file and return a decoder plus format reader.
///
/// This is a convenience wrapper around [`get_reader`] and [`get_decoder`].
pub fn open_file(path: &Path) -> Result<OpenedFile, DecodeError> {
    let reader = get_reader(path)?;
    let (decoder, track_id) = get_decoder(path, reader.as_ref())?;

    Ok(OpenedFile {
        reader,
        decoder,
        track_id,
    })
}

/// Build a Symphonia `FormatReader` for the given file path.
///
/// The file extension is tried as a probe hint first, then a hint-less probe.
pub fn get_reader(path: &Path) -> Result<Box<dyn FormatReader>, DecodeError> {
    // Fail on the file itself before probing so the error names the real cause.
    open_source(path)?;

    let mut last_reason = String::from("no matching container");
    for hint in probe_hints(path) {
        let src = open_source(path)?;
        let mss = MediaSourceStream::new(Box::new(src), Default::default());

        let mut probe_hint = Hint::new();
        if let Some(extension) = hint.as_deref() {
            probe_hint.with_extension(extension);
        }

        let meta_opts: MetadataOptions = Default::default();
        let fmt_opts: FormatOptions = Default::default();

        match symphonia::default::get_probe().format(&probe_hint, mss, &fmt_opts, &meta_opts) {
            Ok(probed) => return Ok(probed.format),
            Err(err) => last_reason = err.to_string(),
        }
    }

    Err(DecodeError::unsupported(path, last_reason))
}

/// Build a decoder for the first audio track with a known codec.
pub fn get_decoder(
    path: &Path,
    format: &dyn FormatReader,
) -> Result<(Box<dyn Decoder>, u32), DecodeError> {
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| DecodeError::unsupported(path, "no supported audio tracks"))?;

    let dec_opts: DecoderOptions = Default::default();
    let decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &dec_opts)
        .map_err(|err| DecodeError::unsupported(path, err))?;

    Ok((decoder, track.id))
}

fn open_source(path: &Path) -> Result<File, DecodeError> {
    File::open(path).map_err(|err| match err.kind() {
        ErrorKind::NotFound => DecodeError::NotFound {
            path: path.display().to_string(),
        },
        _ => DecodeError::unreadable(path, err),
    })
}

fn probe_hints(path: &Path) -> Vec<Option<String>> {
    let mut hints = Vec::new();
    if let Some(ext) = path.extension().and_then(|ext| ext.to_str()) {
        let ext = ext.to_lowercase();
        if matches!(ext.as_str(), "aiff" | "aif" | "aifc") {
            hints.push(Some("aiff".to_string()));
        } else {
            hints.push(Some(ext));
        }
    }
    // Always try without a hint as a fallback.
    hints.push(None);
    hints
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_not_found() {
        let path = std::env::temp_dir().join("duet-audio-definitely-missing.wav");
        assert!(matches!(
            get_reader(&path),
            Err(DecodeError::NotFound { .. })
        ));
    }

    #[test]
    fn hints_fall_back_to_none() {
        assert_eq!(
            probe_hints(Path::new("take.WAV")),
            vec![Some("wav".to_string()), None]
        );
        assert_eq!(probe_hints(Path::new("noext")), vec![None]);
        assert_eq!(
            probe_hints(Path::new("loop.aif")),
            vec![Some("aiff".to_string()), None]
        );
    }

    #[test]
    fn garbage_is_unsupported() {
        let path = std::env::temp_dir().join(format!(
            "duet-audio-garbage-{}.wav",
            std::process::id()
        ));
        std::fs::write(&path, b"definitely not audio").unwrap();
        let result = open_file(&path);
        let _ = std::fs::remove_file(&path);
        assert!(matches!(result, Err(DecodeError::Unsupported { .. })));
    }
}
