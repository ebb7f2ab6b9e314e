#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use duet_audio::{AudioEngine, OfflineOutput, PlaybackSettings, Transport};

/// Write a WAV holding `frames` frames of the constant `value`.
pub fn write_wav(
    dir: &Path,
    name: &str,
    sample_rate: u32,
    channels: u16,
    frames: usize,
    value: f32,
) -> PathBuf {
    let path = dir.join(name);
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec).unwrap();
    let sample = (value * i16::MAX as f32) as i16;
    for _ in 0..frames * channels as usize {
        writer.write_sample(sample).unwrap();
    }
    writer.finalize().unwrap();
    path
}

pub fn offline_transport() -> (Transport, OfflineOutput) {
    let output = OfflineOutput::new();
    let transport = Transport::with_engine(AudioEngine::new(output.clone()));
    (transport, output)
}

pub fn offline_transport_with(settings: PlaybackSettings) -> (Transport, OfflineOutput) {
    let output = OfflineOutput::new();
    let transport = Transport::with_settings(AudioEngine::new(output.clone()), settings);
    (transport, output)
}

/// Pull output until `done` holds, failing after a few seconds.
pub fn render_until(
    output: &OfflineOutput,
    mut done: impl FnMut() -> bool,
    mut each: impl FnMut(&[f32]),
) -> Vec<f32> {
    let deadline = Instant::now() + Duration::from_secs(10);
    let mut rendered = Vec::new();
    while !done() {
        assert!(Instant::now() < deadline, "render timed out");
        let block = output.render(256);
        each(&block);
        rendered.extend_from_slice(&block);
        std::thread::sleep(Duration::from_millis(1));
    }
    rendered
}

/// Pull output until the transport's session plays out.
pub fn render_to_end(transport: &Transport, output: &OfflineOutput) -> Vec<f32> {
    render_until(output, || transport.is_finished(), |_| {})
}
