mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use duet_audio::{
    AudioEngine, AudioFormat, DecodeError, EngineError, GraphError, OfflineOutput,
    PlaybackError, PlaybackSettings, SlotPositions, Transport, TransportEvent, TransportState,
};

use common::{offline_transport, offline_transport_with, render_to_end, render_until, write_wav};

fn record_events(transport: &Transport) -> Arc<Mutex<Vec<TransportEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    transport.on_event(move |event| sink.lock().unwrap().push(event));
    events
}

#[test]
fn play_sums_both_tracks_after_the_start_delay() {
    let dir = tempfile::tempdir().unwrap();
    let local = write_wav(dir.path(), "local.wav", 8000, 1, 4000, 0.25);
    let mix = write_wav(dir.path(), "mix.wav", 8000, 1, 4000, 0.25);
    let (transport, output) = offline_transport();

    transport.play(&local, &mix).unwrap();
    assert_eq!(transport.state(), TransportState::Playing);
    assert_eq!(transport.mixing_format(), Some(AudioFormat::float(8000, 1)));
    assert_eq!(output.live_sources(), 1);

    let rendered = render_to_end(&transport, &output);
    let first_sound = rendered.iter().position(|s| *s != 0.0).unwrap();
    // 50 ms at 8 kHz.
    assert!(first_sound >= 400);
    assert!(rendered.iter().all(|s| *s == 0.0 || (*s - 0.5).abs() < 0.01));

    assert_eq!(transport.positions(), SlotPositions { primary: 4000, mix: 4000 });
    assert_eq!(transport.position(), Duration::from_millis(500));
    assert!(transport.is_finished());
    assert_eq!(transport.state(), TransportState::Playing);
}

#[test]
fn tracks_never_drift_apart() {
    let dir = tempfile::tempdir().unwrap();
    let local = write_wav(dir.path(), "local.wav", 8000, 2, 8000, 0.1);
    let mix = write_wav(dir.path(), "mix.wav", 8000, 2, 8000, 0.2);
    let (transport, output) = offline_transport();

    transport.play(&local, &mix).unwrap();
    render_until(
        &output,
        || transport.is_finished(),
        |_| assert_eq!(transport.positions().drift(), 0),
    );
    assert_eq!(transport.positions(), SlotPositions { primary: 8000, mix: 8000 });
}

#[test]
fn shorter_track_falls_silent_while_the_other_continues() {
    let dir = tempfile::tempdir().unwrap();
    let local = write_wav(dir.path(), "local.wav", 8000, 1, 4000, 0.2);
    let mix = write_wav(dir.path(), "mix.wav", 8000, 1, 1000, 0.2);
    let (transport, output) = offline_transport();

    transport.play(&local, &mix).unwrap();
    let rendered = render_to_end(&transport, &output);

    assert_eq!(transport.positions(), SlotPositions { primary: 4000, mix: 1000 });
    assert!(rendered.iter().any(|s| (*s - 0.4).abs() < 0.01));
    assert!(rendered.iter().any(|s| (*s - 0.2).abs() < 0.01));
}

#[test]
fn pause_holds_both_tracks_and_play_restarts_from_zero() {
    let dir = tempfile::tempdir().unwrap();
    let local = write_wav(dir.path(), "local.wav", 8000, 1, 16_000, 0.25);
    let mix = write_wav(dir.path(), "mix.wav", 8000, 1, 16_000, 0.25);
    let (transport, output) = offline_transport();

    transport.play(&local, &mix).unwrap();
    render_until(&output, || transport.positions().primary > 0, |_| {});

    transport.pause();
    assert_eq!(transport.state(), TransportState::Paused);
    let held = transport.positions();
    let paused = output.render(4096);
    assert!(paused[512..].iter().all(|s| *s == 0.0));
    assert_eq!(transport.positions(), held);
    assert_eq!(held.drift(), 0);

    transport.play(&local, &mix).unwrap();
    assert_eq!(transport.state(), TransportState::Playing);
    assert_eq!(transport.positions(), SlotPositions::default());
    assert_eq!(output.live_sources(), 1);
}

#[test]
fn resume_continues_from_the_paused_sample() {
    let dir = tempfile::tempdir().unwrap();
    let local = write_wav(dir.path(), "local.wav", 8000, 1, 6000, 0.25);
    let mix = write_wav(dir.path(), "mix.wav", 8000, 1, 6000, 0.25);
    let (transport, output) = offline_transport();

    transport.play(&local, &mix).unwrap();
    render_until(&output, || transport.positions().primary > 0, |_| {});
    transport.pause();
    let held = transport.positions();
    output.render(2048);

    transport.resume();
    assert_eq!(transport.state(), TransportState::Playing);
    assert_eq!(transport.positions(), held);

    render_to_end(&transport, &output);
    assert_eq!(transport.positions(), SlotPositions { primary: 6000, mix: 6000 });
}

#[test]
fn stop_is_idempotent_and_releases_the_engine_once() {
    let dir = tempfile::tempdir().unwrap();
    let local = write_wav(dir.path(), "local.wav", 8000, 1, 80_000, 0.1);
    let mix = write_wav(dir.path(), "mix.wav", 8000, 1, 80_000, 0.1);
    let (transport, output) = offline_transport();
    let events = record_events(&transport);

    transport.play(&local, &mix).unwrap();
    assert_eq!(transport.engine().reference_count(), 1);
    assert!(output.is_open());

    transport.stop();
    transport.stop();

    assert_eq!(transport.state(), TransportState::Stopped);
    assert_eq!(transport.engine().reference_count(), 0);
    assert!(!output.is_open());
    assert_eq!(output.close_count(), 1);
    assert_eq!(output.live_sources(), 0);
    assert_eq!(transport.positions(), SlotPositions::default());
    assert_eq!(
        *events.lock().unwrap(),
        vec![
            TransportEvent::StateChanged(TransportState::Playing),
            TransportEvent::StateChanged(TransportState::Stopped),
        ]
    );

    transport.pause();
    assert_eq!(transport.state(), TransportState::Stopped);
}

#[test]
fn missing_file_leaves_the_current_session_playing() {
    let dir = tempfile::tempdir().unwrap();
    let local = write_wav(dir.path(), "local.wav", 8000, 1, 80_000, 0.1);
    let mix = write_wav(dir.path(), "mix.wav", 8000, 1, 80_000, 0.1);
    let missing = dir.path().join("missing.wav");
    let (transport, output) = offline_transport();

    transport.play(&local, &mix).unwrap();
    let events = record_events(&transport);

    let err = transport.play(&local, &missing).unwrap_err();
    assert!(matches!(err, PlaybackError::Decode(DecodeError::NotFound { .. })));
    assert_eq!(transport.state(), TransportState::Playing);
    assert_eq!(transport.engine().reference_count(), 1);
    assert_eq!(output.live_sources(), 1);
    assert_eq!(*events.lock().unwrap(), vec![TransportEvent::Error(err)]);
}

#[test]
fn failure_from_idle_stays_idle() {
    let dir = tempfile::tempdir().unwrap();
    let mix = write_wav(dir.path(), "mix.wav", 8000, 1, 800, 0.1);
    let (transport, output) = offline_transport();

    let err = transport.play(dir.path().join("nope.wav"), &mix).unwrap_err();
    assert!(matches!(err, PlaybackError::Decode(DecodeError::NotFound { .. })));
    assert_eq!(transport.state(), TransportState::Idle);
    assert_eq!(output.open_count(), 0);
}

#[test]
fn unsupported_sample_rate_is_rejected_before_the_engine_starts() {
    let dir = tempfile::tempdir().unwrap();
    let local = write_wav(dir.path(), "low.wav", 500, 1, 250, 0.1);
    let mix = write_wav(dir.path(), "mix.wav", 8000, 1, 800, 0.1);
    let (transport, output) = offline_transport();
    let events = record_events(&transport);

    let err = transport.play(&local, &mix).unwrap_err();
    assert!(matches!(
        err,
        PlaybackError::Graph(GraphError::FormatUnsupported(_))
    ));
    assert_eq!(transport.state(), TransportState::Idle);
    assert_eq!(transport.engine().reference_count(), 0);
    assert_eq!(output.open_count(), 0);
    assert_eq!(output.live_sources(), 0);
    assert_eq!(*events.lock().unwrap(), vec![TransportEvent::Error(err)]);
}

#[test]
fn replaying_tears_down_the_previous_session() {
    let dir = tempfile::tempdir().unwrap();
    let local = write_wav(dir.path(), "local.wav", 8000, 1, 80_000, 0.1);
    let mix = write_wav(dir.path(), "mix.wav", 8000, 1, 80_000, 0.1);
    let (transport, output) = offline_transport();

    transport.play(&local, &mix).unwrap();
    transport.play(&local, &mix).unwrap();

    assert_eq!(output.live_sources(), 1);
    assert_eq!(transport.engine().reference_count(), 1);
    assert_eq!(output.open_count(), 1);
    assert_eq!(output.close_count(), 0);
}

#[test]
fn unavailable_hardware_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let local = write_wav(dir.path(), "local.wav", 8000, 1, 800, 0.1);
    let mix = write_wav(dir.path(), "mix.wav", 8000, 1, 800, 0.1);
    let transport = Transport::with_engine(AudioEngine::new(OfflineOutput::failing("device busy")));
    let events = record_events(&transport);

    let err = transport.play(&local, &mix).unwrap_err();
    assert_eq!(
        err,
        PlaybackError::Engine(EngineError::HardwareUnavailable("device busy".to_string()))
    );
    assert_eq!(transport.state(), TransportState::Idle);
    assert_eq!(transport.engine().reference_count(), 0);
    assert_eq!(*events.lock().unwrap(), vec![TransportEvent::Error(err)]);
}

#[test]
fn differing_formats_are_mixed_at_the_highest_rate_and_channel_count() {
    let dir = tempfile::tempdir().unwrap();
    let local = write_wav(dir.path(), "local.wav", 22_050, 1, 11_025, 0.2);
    let mix = write_wav(dir.path(), "mix.wav", 44_100, 2, 22_050, 0.2);
    let (transport, output) = offline_transport();

    transport.play(&local, &mix).unwrap();
    assert_eq!(transport.mixing_format(), Some(AudioFormat::float(44_100, 2)));

    let rendered = render_to_end(&transport, &output);
    let positions = transport.positions();
    assert!(positions.primary.abs_diff(22_050) <= 512);
    assert_eq!(positions.mix, 22_050);
    assert!(rendered.iter().any(|s| (*s - 0.4).abs() < 0.02));
}

#[test]
fn settings_shape_the_start_delay() {
    let dir = tempfile::tempdir().unwrap();
    let local = write_wav(dir.path(), "local.wav", 8000, 1, 2000, 0.25);
    let mix = write_wav(dir.path(), "mix.wav", 8000, 1, 2000, 0.25);
    let settings =
        PlaybackSettings::from_json(r#"{ "start_delay_ms": 0.0, "block_frames": 128 }"#).unwrap();
    let (transport, output) = offline_transport_with(settings);

    transport.play(&local, &mix).unwrap();
    let rendered = render_to_end(&transport, &output);
    let sound = rendered.iter().filter(|s| **s != 0.0).count();
    assert_eq!(sound, 2000);
}

#[test]
fn reporter_sees_playback_progress() {
    let dir = tempfile::tempdir().unwrap();
    let local = write_wav(dir.path(), "local.wav", 8000, 1, 4000, 0.1);
    let mix = write_wav(dir.path(), "mix.wav", 8000, 1, 4000, 0.1);
    let (transport, output) = offline_transport();

    let reports = Arc::new(Mutex::new(Vec::new()));
    let sink = reports.clone();
    transport.set_reporting(
        move |report| sink.lock().unwrap().push(report),
        Duration::from_millis(1),
    );

    transport.play(&local, &mix).unwrap();
    render_to_end(&transport, &output);
    std::thread::sleep(Duration::from_millis(50));
    transport.stop_reporting();

    let reports = reports.lock().unwrap();
    assert!(reports.iter().any(|report| report.state == TransportState::Playing));
    let last = reports.last().unwrap();
    assert!(last.finished);
    assert_eq!(last.primary_frames, 4000);
    assert_eq!(last.mix_frames, 4000);
}

#[test]
fn dropping_the_transport_releases_the_engine() {
    let dir = tempfile::tempdir().unwrap();
    let local = write_wav(dir.path(), "local.wav", 8000, 1, 80_000, 0.1);
    let mix = write_wav(dir.path(), "mix.wav", 8000, 1, 80_000, 0.1);
    let output = OfflineOutput::new();
    let engine = AudioEngine::new(output.clone());

    let transport = Transport::with_engine(engine.clone());
    transport.play(&local, &mix).unwrap();
    assert_eq!(engine.reference_count(), 1);

    drop(transport);
    assert_eq!(engine.reference_count(), 0);
    assert!(!output.is_open());
}
