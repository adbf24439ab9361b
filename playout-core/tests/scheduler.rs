mod common;

use std::path::{Path, PathBuf};
use std::time::Duration;

use common::*;
use playout_core::config::{
    EncoderSection, OverrideSection, PathsSection, PlayoutConfig, SchedulerSection, StreamSection,
    SupervisorSection,
};
use playout_core::{ConflictPolicy, OverrideFile, SchedulerLoop};
use tempfile::TempDir;
use tokio::sync::watch;

fn config(dir: &Path, encoder_binary: &str, gapless: bool) -> PlayoutConfig {
    PlayoutConfig {
        paths: PathsSection {
            database: dir.join("catalog.sqlite"),
            content_dir: dir.join("content"),
            logs_dir: dir.join("logs"),
            temp_dir: dir.join("tmp"),
            override_file: dir.join("override.json"),
            analytics_file: dir.join("analytics.json"),
            artifact_path: None,
        },
        stream: StreamSection {
            rtmp_url: "rtmp://127.0.0.1:1935/live/test".to_string(),
            ffmpeg_binary: PathBuf::from(encoder_binary),
        },
        encoder: EncoderSection {
            preset: "fast".to_string(),
            crf: 23,
            maxrate: "2000k".to_string(),
            bufsize: "4000k".to_string(),
            audio_bitrate: "128k".to_string(),
            log_level: "warning".to_string(),
        },
        scheduler: SchedulerSection {
            cycle_seconds: 1,
            gapless,
            queue_size: 3,
            refresh_probability: 0.0,
            conflict_tie_break: ConflictPolicy::MostRecentStart,
            analytics_flush_cycles: 1,
        },
        supervisor: SupervisorSection {
            graceful_timeout_seconds: 2,
            staleness_seconds: 45,
            startup_grace_seconds: 60,
        },
        r#override: OverrideSection {
            default_playlist_id: Some(1),
            arm_on_signal: false,
        },
    }
}

fn media_file(dir: &Path, name: &str) -> String {
    let content = dir.join("content");
    std::fs::create_dir_all(&content).unwrap();
    let path = content.join(name);
    std::fs::write(&path, b"fixture").unwrap();
    path.to_string_lossy().to_string()
}

/// Playlist 1 (medium, two videos) airs all day; playlist 2 (high, one
/// video) exists for override targets.
fn seed(dir: &Path) {
    let (_, path) = init_catalog(dir);
    let conn = connect(&path);
    insert_playlist(&conn, 1, "daytime", "medium", false, true, true);
    insert_playlist(&conn, 2, "special", "high", false, true, true);
    insert_video(&conn, 1, &media_file(dir, "a.mp4"), "A", true);
    insert_video(&conn, 2, &media_file(dir, "b.mp4"), "B", true);
    insert_video(&conn, 3, &media_file(dir, "c.mp4"), "C", true);
    attach_video(&conn, 1, 1, 0);
    attach_video(&conn, 1, 2, 1);
    attach_video(&conn, 2, 3, 0);
    // Lexicographic HH:MM window covering every minute of every day.
    insert_entry(&conn, 1, 1, None, "00:00", "24:00");
}

fn shutdown_handle() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

#[tokio::test]
async fn natural_end_advances_through_the_playlist() {
    let dir = TempDir::new().unwrap();
    seed(dir.path());
    let (_tx, rx) = shutdown_handle();
    let mut scheduler = SchedulerLoop::new(config(dir.path(), "true", false), rx).unwrap();

    scheduler.run_cycle().await.unwrap();
    assert_eq!(scheduler.current_playlist(), Some(1));
    let first = scheduler.current_video().unwrap().id;
    assert_eq!(scheduler.analytics().streams_started, 1);

    tokio::time::sleep(Duration::from_millis(500)).await;
    scheduler.run_cycle().await.unwrap();
    let second = scheduler.current_video().unwrap().id;
    assert_ne!(first, second);
    assert_eq!(scheduler.analytics().streams_started, 2);
    assert_eq!(scheduler.analytics().schedule_switches, 0);
}

#[tokio::test]
async fn crash_retries_the_same_video() {
    let dir = TempDir::new().unwrap();
    seed(dir.path());
    let (_tx, rx) = shutdown_handle();
    let mut scheduler = SchedulerLoop::new(config(dir.path(), "false", false), rx).unwrap();

    scheduler.run_cycle().await.unwrap();
    let first = scheduler.current_video().unwrap().id;

    tokio::time::sleep(Duration::from_millis(500)).await;
    scheduler.run_cycle().await.unwrap();
    assert_eq!(scheduler.current_video().unwrap().id, first);
    assert_eq!(scheduler.analytics().streams_started, 2);
}

#[tokio::test]
async fn override_file_switches_playlists_and_back() {
    let dir = TempDir::new().unwrap();
    seed(dir.path());
    let cfg = config(dir.path(), "true", false);
    let override_path = cfg.paths.override_file.clone();
    let (_tx, rx) = shutdown_handle();
    let mut scheduler = SchedulerLoop::new(cfg, rx).unwrap();

    scheduler.run_cycle().await.unwrap();
    assert_eq!(scheduler.current_playlist(), Some(1));

    let armed = OverrideFile {
        armed: true,
        playlist_id: Some(2),
    };
    std::fs::write(&override_path, serde_json::to_vec(&armed).unwrap()).unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    scheduler.run_cycle().await.unwrap();
    assert_eq!(scheduler.current_playlist(), Some(2));
    assert_eq!(scheduler.analytics().emergency_overrides, 1);
    assert_eq!(scheduler.analytics().schedule_switches, 1);

    let cleared = OverrideFile {
        armed: false,
        playlist_id: None,
    };
    std::fs::write(&override_path, serde_json::to_vec(&cleared).unwrap()).unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    scheduler.run_cycle().await.unwrap();
    assert_eq!(scheduler.current_playlist(), Some(1));
    assert_eq!(scheduler.analytics().emergency_overrides, 1);
    assert_eq!(scheduler.analytics().schedule_switches, 2);
}

#[tokio::test]
async fn signal_armed_override_holds_until_file_clears_it() {
    let dir = TempDir::new().unwrap();
    seed(dir.path());
    let cfg = config(dir.path(), "true", false);
    let override_path = cfg.paths.override_file.clone();
    let (_tx, rx) = shutdown_handle();
    let mut scheduler = SchedulerLoop::new(cfg, rx).unwrap();

    scheduler.run_cycle().await.unwrap();
    assert_eq!(scheduler.current_playlist(), Some(1));

    // Arm through the shared cell, the same write the SIGUSR1 handler
    // performs.
    scheduler.override_cell().arm(2);
    tokio::time::sleep(Duration::from_millis(500)).await;
    scheduler.run_cycle().await.unwrap();
    assert_eq!(scheduler.current_playlist(), Some(2));
    assert_eq!(scheduler.analytics().emergency_overrides, 1);

    // No flag file on disk: the armed state must hold, not decay.
    tokio::time::sleep(Duration::from_millis(500)).await;
    scheduler.run_cycle().await.unwrap();
    assert_eq!(scheduler.current_playlist(), Some(2));

    let cleared = OverrideFile {
        armed: false,
        playlist_id: None,
    };
    std::fs::write(&override_path, serde_json::to_vec(&cleared).unwrap()).unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    scheduler.run_cycle().await.unwrap();
    assert_eq!(scheduler.current_playlist(), Some(1));
    assert_eq!(scheduler.analytics().emergency_overrides, 1);
}

#[tokio::test]
async fn missing_media_is_skipped_not_fatal() {
    let dir = TempDir::new().unwrap();
    let (_, db) = init_catalog(dir.path());
    let conn = connect(&db);
    insert_playlist(&conn, 1, "daytime", "medium", false, true, true);
    insert_video(&conn, 1, "/nonexistent/gone.mp4", "Gone", true);
    insert_video(&conn, 2, &media_file(dir.path(), "here.mp4"), "Here", true);
    attach_video(&conn, 1, 1, 0);
    attach_video(&conn, 1, 2, 1);
    insert_entry(&conn, 1, 1, None, "00:00", "24:00");

    let (_tx, rx) = shutdown_handle();
    let mut scheduler = SchedulerLoop::new(config(dir.path(), "true", false), rx).unwrap();

    scheduler.run_cycle().await.unwrap();
    assert!(scheduler.current_video().is_none());
    assert_eq!(scheduler.analytics().streams_started, 0);
    assert_eq!(scheduler.analytics().errors, 1);

    scheduler.run_cycle().await.unwrap();
    assert_eq!(scheduler.current_video().unwrap().id, 2);
    assert_eq!(scheduler.analytics().streams_started, 1);
}

#[tokio::test]
async fn gapless_mode_writes_a_concat_manifest() {
    let dir = TempDir::new().unwrap();
    seed(dir.path());
    let (_tx, rx) = shutdown_handle();
    let mut scheduler = SchedulerLoop::new(config(dir.path(), "true", true), rx).unwrap();

    scheduler.run_cycle().await.unwrap();
    assert_eq!(scheduler.analytics().streams_started, 1);

    let manifest = dir.path().join("tmp/playlist.txt");
    let body = std::fs::read_to_string(manifest).unwrap();
    // Queue of three over a two-video playlist wraps around.
    assert_eq!(body.lines().count(), 3);
    assert!(body.lines().all(|line| line.starts_with("file '")));
}

#[tokio::test]
async fn shutdown_stops_the_loop_and_flushes_analytics() {
    let dir = TempDir::new().unwrap();
    seed(dir.path());
    let cfg = config(dir.path(), "true", false);
    let analytics_path = cfg.paths.analytics_file.clone();
    let (tx, rx) = shutdown_handle();
    let scheduler = SchedulerLoop::new(cfg, rx).unwrap();

    let handle = tokio::spawn(scheduler.run());
    tokio::time::sleep(Duration::from_millis(300)).await;
    tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("loop should stop promptly")
        .unwrap()
        .unwrap();

    let body = std::fs::read_to_string(analytics_path).unwrap();
    assert!(body.contains("streams_started"));
}

#[tokio::test]
async fn unreachable_catalog_is_a_startup_error() {
    let dir = TempDir::new().unwrap();
    let (_tx, rx) = shutdown_handle();
    let result = SchedulerLoop::new(config(dir.path(), "true", false), rx);
    assert!(result.is_err());
}
