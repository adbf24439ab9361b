use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use thiserror::Error;

use crate::sqlite::configure_connection;

const CATALOG_SCHEMA: &str = include_str!("../../sql/catalog.sql");

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to open catalog database {path}: {source}")]
    Open {
        source: rusqlite::Error,
        path: PathBuf,
    },
    #[error("failed to execute statement on catalog database: {0}")]
    Execute(#[from] rusqlite::Error),
    #[error("catalog path not configured")]
    MissingStore,
    #[error("invalid priority tier: {0}")]
    InvalidPriority(String),
    #[error("playlist not found: {0}")]
    PlaylistNotFound(i64),
}

pub type CatalogResult<T> = Result<T, CatalogError>;

/// Playlist priority tier. Ordered high > medium > low.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PriorityTier {
    High,
    Medium,
    Low,
}

impl PriorityTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriorityTier::High => "high",
            PriorityTier::Medium => "medium",
            PriorityTier::Low => "low",
        }
    }

    pub fn rank(&self) -> u8 {
        match self {
            PriorityTier::High => 3,
            PriorityTier::Medium => 2,
            PriorityTier::Low => 1,
        }
    }
}

impl std::fmt::Display for PriorityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PriorityTier {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            other => Err(CatalogError::InvalidPriority(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Video {
    pub id: i64,
    pub file_path: String,
    pub display_name: String,
    pub duration_s: Option<i64>,
    pub resolution: Option<String>,
    pub file_size: Option<i64>,
}

impl Video {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            file_path: row.get("file_path")?,
            display_name: row.get("display_name")?,
            duration_s: row.get("duration_s")?,
            resolution: row.get("resolution")?,
            file_size: row.get("file_size")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Playlist {
    pub id: i64,
    pub name: String,
    pub priority: PriorityTier,
    pub shuffle_enabled: bool,
    pub loop_enabled: bool,
}

impl Playlist {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            priority: row
                .get::<_, String>("priority")?
                .parse()
                .unwrap_or(PriorityTier::Medium),
            shuffle_enabled: row.get("shuffle_enabled")?,
            loop_enabled: row.get("loop_enabled")?,
        })
    }
}

/// A time window binding a playlist to a day-of-week (0 = Sunday) or,
/// when `day_of_week` is `None`, to every day. `[start, end)` is
/// half-open; times are HH:MM strings so they compare lexicographically
/// the same way the catalog store compares them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleEntry {
    pub id: i64,
    pub playlist_id: i64,
    pub day_of_week: Option<u8>,
    pub start_time: String,
    pub end_time: String,
}

/// Schedule entry joined with the playlist fields conflict resolution
/// needs.
#[derive(Debug, Clone)]
pub struct ScheduledSlot {
    pub entry: ScheduleEntry,
    pub playlist_name: String,
    pub priority: PriorityTier,
}

impl ScheduledSlot {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            entry: ScheduleEntry {
                id: row.get("id")?,
                playlist_id: row.get("playlist_id")?,
                day_of_week: row.get("day_of_week")?,
                start_time: row.get("start_time")?,
                end_time: row.get("end_time")?,
            },
            playlist_name: row.get("name")?,
            priority: row
                .get::<_, String>("priority")?
                .parse()
                .unwrap_or(PriorityTier::Medium),
        })
    }
}

#[derive(Debug, Clone)]
pub struct CatalogStoreBuilder {
    path: Option<PathBuf>,
    read_only: bool,
    create_if_missing: bool,
}

impl Default for CatalogStoreBuilder {
    fn default() -> Self {
        Self {
            path: None,
            read_only: false,
            create_if_missing: true,
        }
    }
}

impl CatalogStoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path(mut self, path: impl AsRef<Path>) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn read_only(mut self, value: bool) -> Self {
        self.read_only = value;
        self
    }

    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    pub fn build(self) -> CatalogResult<CatalogStore> {
        let path = self.path.ok_or(CatalogError::MissingStore)?;
        let mut flags = if self.read_only {
            OpenFlags::SQLITE_OPEN_READ_ONLY
        } else {
            OpenFlags::SQLITE_OPEN_READ_WRITE
        };
        if !self.read_only && self.create_if_missing {
            flags |= OpenFlags::SQLITE_OPEN_CREATE;
        }
        Ok(CatalogStore { path, flags })
    }
}

/// Read-only window onto the persisted video/playlist/schedule store.
/// The scheduling core never writes catalog rows; `initialize` exists
/// for the CLI and for test fixtures.
#[derive(Debug, Clone)]
pub struct CatalogStore {
    path: PathBuf,
    flags: OpenFlags,
}

impl CatalogStore {
    pub fn builder() -> CatalogStoreBuilder {
        CatalogStoreBuilder::new()
    }

    pub fn new(path: impl AsRef<Path>) -> CatalogResult<Self> {
        CatalogStoreBuilder::new().path(path).build()
    }

    fn open(&self) -> CatalogResult<Connection> {
        let conn = Connection::open_with_flags(&self.path, self.flags).map_err(|source| {
            CatalogError::Open {
                source,
                path: self.path.clone(),
            }
        })?;
        configure_connection(&conn).map_err(|source| CatalogError::Open {
            source,
            path: self.path.clone(),
        })?;
        Ok(conn)
    }

    pub fn initialize(&self) -> CatalogResult<()> {
        let conn = self.open()?;
        conn.execute_batch(CATALOG_SCHEMA)?;
        Ok(())
    }

    pub fn playlist(&self, id: i64) -> CatalogResult<Playlist> {
        let conn = self.open()?;
        conn.query_row(
            "SELECT id, name, priority, shuffle_enabled, loop_enabled
             FROM playlists WHERE id = ?1",
            [id],
            Playlist::from_row,
        )
        .optional()?
        .ok_or(CatalogError::PlaylistNotFound(id))
    }

    /// Usable members of a playlist in broadcast order: explicit
    /// `sort_order`, tie-broken by display name.
    pub fn playlist_videos(&self, playlist_id: i64) -> CatalogResult<Vec<Video>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT v.id, v.file_path, v.display_name, v.duration_s, v.resolution, v.file_size
             FROM videos v
             JOIN playlist_videos pv ON pv.video_id = v.id
             WHERE pv.playlist_id = ?1 AND v.is_active = 1
             ORDER BY pv.sort_order, v.display_name",
        )?;
        let mut rows = stmt.query([playlist_id])?;
        let mut videos = Vec::new();
        while let Some(row) = rows.next()? {
            videos.push(Video::from_row(row)?);
        }
        Ok(videos)
    }

    /// Active schedule entries whose window contains `hhmm` and whose
    /// day matches `day` or repeats daily. Overlap is expected; the
    /// resolver decides the winner.
    pub fn entries_at(&self, day: u8, hhmm: &str) -> CatalogResult<Vec<ScheduledSlot>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT s.id, s.playlist_id, s.day_of_week, s.start_time, s.end_time,
                    p.name, p.priority
             FROM schedule s
             JOIN playlists p ON p.id = s.playlist_id
             WHERE s.is_active = 1 AND p.is_active = 1
               AND s.start_time <= ?2 AND s.end_time > ?2
               AND (s.day_of_week = ?1 OR s.day_of_week IS NULL)
             ORDER BY s.id",
        )?;
        let mut rows = stmt.query(params![day, hhmm])?;
        let mut slots = Vec::new();
        while let Some(row) = rows.next()? {
            slots.push(ScheduledSlot::from_row(row)?);
        }
        Ok(slots)
    }

    /// Active playlists ordered by priority rank, then name for a
    /// stable fallback order.
    pub fn active_playlists(&self) -> CatalogResult<Vec<Playlist>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, priority, shuffle_enabled, loop_enabled
             FROM playlists
             WHERE is_active = 1
             ORDER BY
                 CASE priority
                     WHEN 'high' THEN 3
                     WHEN 'medium' THEN 2
                     WHEN 'low' THEN 1
                     ELSE 0
                 END DESC,
                 name",
        )?;
        let mut rows = stmt.query([])?;
        let mut playlists = Vec::new();
        while let Some(row) = rows.next()? {
            playlists.push(Playlist::from_row(row)?);
        }
        Ok(playlists)
    }
}
