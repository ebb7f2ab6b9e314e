//! Buffering and scheduling configuration.

use serde::{Deserialize, Serialize};

/// Tunables for a playback session.
///
/// Missing JSON fields fall back to [`PlaybackSettings::default`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackSettings {
    /// Frames the audio callback mixes per block. Both tracks advance together
    /// one block at a time.
    pub block_frames: usize,
    /// Frames per buffer decoded from each source.
    pub decode_buffer_frames: usize,
    /// Audio staged ahead of the callback for each track (ms).
    pub track_buffer_ms: f32,
    /// Delay between connecting the graph and the scheduled start (ms).
    pub start_delay_ms: f32,
    /// Input frames per resampler call.
    pub resample_chunk_frames: usize,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            block_frames: 512,
            decode_buffer_frames: 1024,
            track_buffer_ms: 2000.0,
            start_delay_ms: 50.0,
            resample_chunk_frames: 1024,
        }
    }
}

impl PlaybackSettings {
    /// Parse settings from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<Self>(json).map(|settings| settings.sanitized())
    }

    /// Serialize settings to pretty JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Clamp every value into a usable range.
    pub fn sanitized(self) -> Self {
        let block_frames = self.block_frames.clamp(16, 16_384);
        Self {
            block_frames,
            decode_buffer_frames: self.decode_buffer_frames.clamp(64, 65_536),
            track_buffer_ms: self.track_buffer_ms.max(50.0),
            start_delay_ms: self.start_delay_ms.max(0.0),
            resample_chunk_frames: self.resample_chunk_frames.clamp(64, 16_384),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let settings = PlaybackSettings::from_json(r#"{ "block_frames": 256 }"#).unwrap();
        assert_eq!(settings.block_frames, 256);
        assert_eq!(settings.track_buffer_ms, 2000.0);
        assert_eq!(settings.start_delay_ms, 50.0);
    }

    #[test]
    fn values_are_sanitized() {
        let settings = PlaybackSettings::from_json(
            r#"{ "block_frames": 0, "track_buffer_ms": 1.0, "start_delay_ms": -10.0 }"#,
        )
        .unwrap();
        assert_eq!(settings.block_frames, 16);
        assert_eq!(settings.track_buffer_ms, 50.0);
        assert_eq!(settings.start_delay_ms, 0.0);
    }

    #[test]
    fn json_round_trip() {
        let settings = PlaybackSettings::default();
        let json = settings.to_json().unwrap();
        assert_eq!(PlaybackSettings::from_json(&json).unwrap(), settings);
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(PlaybackSettings::from_json("{ block_frames: }").is_err());
    }
}
