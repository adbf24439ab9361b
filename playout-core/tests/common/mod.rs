#![allow(dead_code)]

use std::path::{Path, PathBuf};

use playout_core::CatalogStore;
use rusqlite::{params, Connection};

pub fn init_catalog(dir: &Path) -> (CatalogStore, PathBuf) {
    let path = dir.join("catalog.sqlite");
    let store = CatalogStore::builder()
        .path(&path)
        .create_if_missing(true)
        .build()
        .expect("create store");
    store.initialize().expect("initialize catalog");
    (store, path)
}

pub fn connect(path: &Path) -> Connection {
    Connection::open(path).expect("open catalog for seeding")
}

pub fn insert_playlist(
    conn: &Connection,
    id: i64,
    name: &str,
    priority: &str,
    shuffle: bool,
    looped: bool,
    active: bool,
) {
    conn.execute(
        "INSERT INTO playlists (id, name, priority, shuffle_enabled, loop_enabled, is_active)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![id, name, priority, shuffle, looped, active],
    )
    .expect("insert playlist");
}

pub fn insert_video(conn: &Connection, id: i64, file_path: &str, display_name: &str, active: bool) {
    conn.execute(
        "INSERT INTO videos (id, filename, file_path, display_name, duration_s, is_active)
         VALUES (?1, ?2, ?3, ?4, 60, ?5)",
        params![id, display_name, file_path, display_name, active],
    )
    .expect("insert video");
}

pub fn attach_video(conn: &Connection, playlist_id: i64, video_id: i64, sort_order: i64) {
    conn.execute(
        "INSERT INTO playlist_videos (playlist_id, video_id, sort_order) VALUES (?1, ?2, ?3)",
        params![playlist_id, video_id, sort_order],
    )
    .expect("attach video");
}

pub fn insert_entry(
    conn: &Connection,
    id: i64,
    playlist_id: i64,
    day_of_week: Option<i64>,
    start: &str,
    end: &str,
) {
    conn.execute(
        "INSERT INTO schedule (id, playlist_id, day_of_week, start_time, end_time, is_active)
         VALUES (?1, ?2, ?3, ?4, ?5, 1)",
        params![id, playlist_id, day_of_week, start, end],
    )
    .expect("insert schedule entry");
}
