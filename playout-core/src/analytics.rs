use std::io;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Monotonic session counters. Owned by the scheduler loop; flushed on
/// a timer and at shutdown, never on the hot path of a cycle decision.
#[derive(Debug)]
pub struct AnalyticsCounters {
    pub streams_started: u64,
    pub schedule_switches: u64,
    pub emergency_overrides: u64,
    pub errors: u64,
    session_start: DateTime<Utc>,
}

impl Default for AnalyticsCounters {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalyticsCounters {
    pub fn new() -> Self {
        Self {
            streams_started: 0,
            schedule_switches: 0,
            emergency_overrides: 0,
            errors: 0,
            session_start: Utc::now(),
        }
    }

    pub fn session_start(&self) -> DateTime<Utc> {
        self.session_start
    }

    pub fn snapshot(&self, current_playlist: Option<i64>) -> AnalyticsSnapshot {
        let now = Utc::now();
        AnalyticsSnapshot {
            session_start: self.session_start,
            session_end: now,
            uptime_seconds: (now - self.session_start).num_seconds(),
            streams_started: self.streams_started,
            schedule_switches: self.schedule_switches,
            emergency_overrides: self.emergency_overrides,
            errors: self.errors,
            current_playlist,
        }
    }

    /// Writes the snapshot for external consumption. Failures are the
    /// caller's to log; they never abort a cycle.
    pub async fn flush(&self, path: &Path, current_playlist: Option<i64>) -> io::Result<()> {
        let snapshot = self.snapshot(current_playlist);
        let body = serde_json::to_vec_pretty(&snapshot)
            .map_err(|error| io::Error::new(io::ErrorKind::InvalidData, error))?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, body).await
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsSnapshot {
    pub session_start: DateTime<Utc>,
    pub session_end: DateTime<Utc>,
    pub uptime_seconds: i64,
    pub streams_started: u64,
    pub schedule_switches: u64,
    pub emergency_overrides: u64,
    pub errors: u64,
    pub current_playlist: Option<i64>,
}
