use std::io;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;

use crate::schedule::ConflictPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read playout config {path}: {source}")]
    Read { source: io::Error, path: PathBuf },
    #[error("invalid playout config {path}: {source}")]
    Invalid {
        source: toml::de::Error,
        path: PathBuf,
    },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, Deserialize)]
pub struct PlayoutConfig {
    pub paths: PathsSection,
    pub stream: StreamSection,
    pub encoder: EncoderSection,
    pub scheduler: SchedulerSection,
    pub supervisor: SupervisorSection,
    pub r#override: OverrideSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathsSection {
    pub database: PathBuf,
    pub content_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub override_file: PathBuf,
    pub analytics_file: PathBuf,
    /// Output artifact the encoder is expected to keep fresh while
    /// streaming (e.g. the HLS playlist). Absent means no liveness
    /// side-channel is available.
    pub artifact_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamSection {
    pub rtmp_url: String,
    pub ffmpeg_binary: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EncoderSection {
    pub preset: String,
    pub crf: u8,
    pub maxrate: String,
    pub bufsize: String,
    pub audio_bitrate: String,
    pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerSection {
    pub cycle_seconds: u64,
    pub gapless: bool,
    pub queue_size: usize,
    pub refresh_probability: f64,
    pub conflict_tie_break: ConflictPolicy,
    pub analytics_flush_cycles: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SupervisorSection {
    pub graceful_timeout_seconds: u64,
    pub staleness_seconds: u64,
    pub startup_grace_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OverrideSection {
    pub default_playlist_id: Option<i64>,
    pub arm_on_signal: bool,
}

pub fn load_playout_config<P: AsRef<Path>>(path: P) -> Result<PlayoutConfig> {
    load_toml(path)
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Invalid {
        source,
        path: path.to_path_buf(),
    })
}
