// Integration tests driving runs end to end over loopback UDP
//
// Each test:
// 1. Starts a lifecycle on an OS-assigned port
// 2. Sends DiRT Rally 2.0 packets from a separate socket
// 3. Waits for the lifecycle to classify the run
// 4. Processes the run into a temporary storage directory

use std::{
    net::{SocketAddr, UdpSocket},
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use tempfile::TempDir;
use timetrial::{
    AggregationPolicy, DirtRally2, GameSettings, JsonLinesStorage, JsonSettings, RunDetails,
    RunLifecycle, RunState, RunStorage, SettingsStore,
    game::dirt_rally2::{DirtRally2Field, encode_packet},
};

fn settings() -> GameSettings {
    GameSettings {
        udp_port: 0,
        ..Default::default()
    }
}

fn packet(lap_time: f32, last_lap_time: f32, laps_completed: f32) -> Vec<u8> {
    encode_packet(&[
        (DirtRally2Field::LapTime, lap_time),
        (DirtRally2Field::LastLapTime, last_lap_time),
        (DirtRally2Field::LapsCompleted, laps_completed),
        (DirtRally2Field::TotalLaps, 1.),
        (DirtRally2Field::TrackLength, 8251.67),
        (DirtRally2Field::PosZ, 2100.),
        (DirtRally2Field::MaxRpm, 890.12),
        (DirtRally2Field::IdleRpm, 167.55),
        (DirtRally2Field::MaxGears, 5.),
    ])
}

/// Keep sending `payload` until the lifecycle reaches `state` or the deadline passes.
/// Sending repeatedly makes sure the poller sees the packet at least once.
fn send_until(
    sender: &UdpSocket,
    addr: SocketAddr,
    payload: &[u8],
    lifecycle: &RunLifecycle,
    state: RunState,
) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        sender.send_to(payload, addr).unwrap();
        if lifecycle.state() == state {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

fn drive_run(
    lifecycle: &mut RunLifecycle,
    details: Option<RunDetails>,
    last_lap_time: f32,
    laps_completed: f32,
    expected: RunState,
) {
    let addr = lifecycle.start_run(details).unwrap();
    let sender = UdpSocket::bind("127.0.0.1:0").unwrap();

    assert!(send_until(&sender, addr, &packet(0., 0., 0.), lifecycle, RunState::WaitingForStart));
    assert!(send_until(&sender, addr, &packet(12.5, 0., 0.), lifecycle, RunState::Running));
    assert!(send_until(
        &sender,
        addr,
        &packet(0., last_lap_time, laps_completed),
        lifecycle,
        expected
    ));
}

#[test]
fn test_finished_run_is_saved() {
    let dir = TempDir::new().unwrap();
    let mut storage = JsonLinesStorage::new(dir.path().to_path_buf()).unwrap();
    let mut lifecycle = RunLifecycle::with_settings(Arc::new(DirtRally2), settings());

    drive_run(&mut lifecycle, None, 187.25, 1., RunState::Finished);

    let result = lifecycle.run_result().unwrap();
    assert_eq!(result.segment_times, vec![187.25]);
    assert_eq!(result.car_name, "Mini Cooper S");
    assert_eq!(result.car_class, "H1 (FWD)");
    assert_eq!(result.track_name, "Argentina, Valle de los puentes");
    assert!(result.started_at.is_some());
    assert!(lifecycle.local_addr().is_none());

    let saved = lifecycle
        .process_run(AggregationPolicy::All, None, &mut storage)
        .unwrap()
        .unwrap();
    assert_eq!(saved.segment_times, vec![187.25]);
    assert_eq!(lifecycle.state(), RunState::Idle);

    let rows = storage.runs("DirtRally2").unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].runtime_seconds, 187.25);
    assert_eq!(
        storage.saved_tracks("DirtRally2").unwrap(),
        vec!["Argentina, Valle de los puentes".to_string()]
    );
}

#[test]
fn test_incomplete_run_is_aborted() {
    let mut lifecycle = RunLifecycle::with_settings(Arc::new(DirtRally2), settings());
    drive_run(&mut lifecycle, None, 0., 0., RunState::Aborted);

    assert!(lifecycle.run_result().is_some());
    assert!(lifecycle.abort_cause().is_none());
}

#[test]
fn test_edits_replace_detected_identity() {
    let dir = TempDir::new().unwrap();
    let mut storage = JsonLinesStorage::new(dir.path().to_path_buf()).unwrap();
    let mut lifecycle = RunLifecycle::with_settings(Arc::new(DirtRally2), settings());

    let details = RunDetails {
        track_conditions: Some("Dry".to_string()),
        tags: Some(["Weekly".to_string()].into()),
        ..Default::default()
    };
    drive_run(&mut lifecycle, Some(details), 95., 1., RunState::Finished);

    let edits = RunDetails {
        car_name: Some("Lancia Fulvia HF".to_string()),
        ..Default::default()
    };
    let saved = lifecycle
        .process_run(AggregationPolicy::Best, Some(edits), &mut storage)
        .unwrap()
        .unwrap();
    assert_eq!(saved.car_name, "Lancia Fulvia HF");
    assert_eq!(saved.track_conditions, "Dry");
    assert_eq!(saved.segment_times, vec![95.]);

    assert_eq!(storage.saved_track_conditions("DirtRally2").unwrap(), vec!["Dry".to_string()]);
    assert_eq!(storage.saved_tags("DirtRally2").unwrap(), vec!["weekly".to_string()]);
}

#[test]
fn test_restart_after_processing_starts_fresh() {
    let dir = TempDir::new().unwrap();
    let mut storage = JsonLinesStorage::new(dir.path().to_path_buf()).unwrap();
    let mut lifecycle = RunLifecycle::with_settings(Arc::new(DirtRally2), settings());

    drive_run(&mut lifecycle, None, 50., 1., RunState::Finished);
    lifecycle
        .process_run(AggregationPolicy::All, None, &mut storage)
        .unwrap();

    lifecycle.start_run(None).unwrap();
    assert_eq!(lifecycle.state(), RunState::WaitingForStart);
    let progress = lifecycle.run_progress().unwrap();
    assert!(progress.segment_times.is_empty());
    assert!(progress.car_name.is_empty());
    lifecycle.stop_run().unwrap();

    lifecycle
        .process_run(AggregationPolicy::Discard, None, &mut storage)
        .unwrap();
    drive_run(&mut lifecycle, None, 61., 1., RunState::Finished);
    assert_eq!(lifecycle.run_result().unwrap().segment_times, vec![61.]);
}

#[test]
fn test_lifecycle_writes_default_settings() {
    let dir = TempDir::new().unwrap();
    let mut store = JsonSettings::new(dir.path().join("settings.json"));

    let lifecycle = RunLifecycle::new(Arc::new(DirtRally2), &mut store).unwrap();
    assert_eq!(lifecycle.settings().udp_port, 20777);
    assert_eq!(lifecycle.settings().udp_buffer_size, 1024);

    let stored = store.read_setting("game_settings").unwrap().unwrap();
    assert_eq!(stored["DirtRally2"]["udp_port"], 20777);
    assert_eq!(stored["DirtRally2"]["udp_buffer_size"], 1024);
}
