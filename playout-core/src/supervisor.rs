use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::{PathsSection, SupervisorSection};
use crate::encoder::EncoderJob;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("encoder input missing: {0}")]
    MissingInput(PathBuf),
    #[error("failed to spawn encoder {program}: {source}")]
    Spawn {
        source: std::io::Error,
        program: String,
    },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Idle,
    Starting,
    Running,
    StoppingGraceful,
    StoppingForced,
    Ended,
}

/// Per-cycle classification of the supervised encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamHealth {
    /// No encoder process exists.
    Idle,
    /// Alive and, where an artifact is configured, producing fresh
    /// output.
    Healthy,
    /// Exited with success: clean end-of-input, advance to the next
    /// video.
    NaturalEnd,
    /// Exited with failure: retry the same video, do not advance.
    Crashed { code: Option<i32> },
    /// Alive but the output artifact is missing or stale: force-stop
    /// and restart.
    Hung,
}

#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub graceful_timeout: Duration,
    /// Liveness side-channel: artifact the encoder must keep fresh.
    /// Staleness detection is a heuristic, not a guarantee.
    pub artifact_path: Option<PathBuf>,
    pub staleness: Duration,
    /// No staleness verdicts until the process has had this long to
    /// produce its first artifact.
    pub startup_grace: Duration,
}

impl SupervisorSettings {
    pub fn from_config(supervisor: &SupervisorSection, paths: &PathsSection) -> Self {
        Self {
            graceful_timeout: Duration::from_secs(supervisor.graceful_timeout_seconds),
            artifact_path: paths.artifact_path.clone(),
            staleness: Duration::from_secs(supervisor.staleness_seconds),
            startup_grace: Duration::from_secs(supervisor.startup_grace_seconds),
        }
    }
}

#[derive(Debug)]
struct SupervisedProcess {
    child: Child,
    pid: i32,
    label: String,
    started_at: Instant,
}

/// Owns the lifecycle of the single external encoder process. At most
/// one child is alive at any time; starting a new one fully stops the
/// old one first.
#[derive(Debug)]
pub struct ProcessSupervisor {
    settings: SupervisorSettings,
    state: SupervisorState,
    current: Option<SupervisedProcess>,
}

impl ProcessSupervisor {
    pub fn new(settings: SupervisorSettings) -> Self {
        Self {
            settings,
            state: SupervisorState::Idle,
            current: None,
        }
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.current.is_some()
    }

    /// Launches the encoder for `job` in a fresh process group. Fails
    /// fast without touching any live child when the input path does
    /// not exist.
    pub async fn start(&mut self, job: &EncoderJob) -> Result<(), SupervisorError> {
        if !job.input.exists() {
            return Err(SupervisorError::MissingInput(job.input.clone()));
        }
        if self.current.is_some() {
            self.stop().await?;
        }
        self.state = SupervisorState::Starting;
        let mut command = Command::new(&job.program);
        command
            .args(&job.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        #[cfg(unix)]
        command.process_group(0);
        let child = match command.spawn() {
            Ok(child) => child,
            Err(source) => {
                self.state = SupervisorState::Idle;
                return Err(SupervisorError::Spawn {
                    source,
                    program: job.program.to_string_lossy().to_string(),
                });
            }
        };
        let pid = child.id().map(|id| id as i32).unwrap_or(0);
        info!(label = %job.label, pid, "encoder started");
        self.current = Some(SupervisedProcess {
            child,
            pid,
            label: job.label.clone(),
            started_at: Instant::now(),
        });
        // Health is verified on the next check, not at spawn time.
        self.state = SupervisorState::Running;
        Ok(())
    }

    /// Polls the encoder once and classifies its health. A terminated
    /// child is reaped here and the supervisor transitions to `Ended`.
    pub fn check(&mut self) -> StreamHealth {
        let Some(process) = self.current.as_mut() else {
            self.state = SupervisorState::Idle;
            return StreamHealth::Idle;
        };
        match process.child.try_wait() {
            Ok(Some(status)) => {
                let label = process.label.clone();
                let code = status.code();
                self.current = None;
                self.state = SupervisorState::Ended;
                if status.success() {
                    info!(%label, "encoder finished input, natural end");
                    StreamHealth::NaturalEnd
                } else {
                    warn!(%label, ?code, "encoder crashed");
                    StreamHealth::Crashed { code }
                }
            }
            Ok(None) => {
                if artifact_is_fresh(&self.settings, process.started_at) {
                    StreamHealth::Healthy
                } else {
                    warn!(label = %process.label, "output artifact stale, encoder appears hung");
                    StreamHealth::Hung
                }
            }
            Err(error) => {
                warn!(%error, "failed to poll encoder, will retry next cycle");
                StreamHealth::Healthy
            }
        }
    }

    /// Graceful stop: SIGTERM to the process group, bounded wait, then
    /// SIGKILL of the group and an unconditional reap. Always leaves
    /// the supervisor `Idle` with no zombie behind.
    pub async fn stop(&mut self) -> Result<(), SupervisorError> {
        let Some(mut process) = self.current.take() else {
            self.state = SupervisorState::Idle;
            return Ok(());
        };
        self.state = SupervisorState::StoppingGraceful;
        info!(label = %process.label, pid = process.pid, "stopping encoder");
        signal_group(process.pid, GRACEFUL);
        match timeout(self.settings.graceful_timeout, process.child.wait()).await {
            Ok(Ok(status)) => {
                debug!(code = ?status.code(), "encoder exited after terminate");
            }
            Ok(Err(error)) => {
                warn!(%error, "wait failed after terminate");
            }
            Err(_) => {
                warn!(label = %process.label, "graceful stop timed out, killing process group");
                self.state = SupervisorState::StoppingForced;
                signal_group(process.pid, FORCED);
                let _ = process.child.start_kill();
                let _ = process.child.wait().await;
            }
        }
        self.state = SupervisorState::Idle;
        Ok(())
    }

    /// Immediate SIGKILL of the process group, skipping the graceful
    /// window. For encoders already classified as hung, where waiting
    /// out the terminate timeout would only prolong dead air.
    pub async fn stop_forced(&mut self) -> Result<(), SupervisorError> {
        let Some(mut process) = self.current.take() else {
            self.state = SupervisorState::Idle;
            return Ok(());
        };
        self.state = SupervisorState::StoppingForced;
        warn!(label = %process.label, pid = process.pid, "force stopping encoder");
        signal_group(process.pid, FORCED);
        let _ = process.child.start_kill();
        let _ = process.child.wait().await;
        self.state = SupervisorState::Idle;
        Ok(())
    }
}

#[cfg(unix)]
const GRACEFUL: i32 = libc::SIGTERM;
#[cfg(unix)]
const FORCED: i32 = libc::SIGKILL;
#[cfg(not(unix))]
const GRACEFUL: i32 = 0;
#[cfg(not(unix))]
const FORCED: i32 = 0;

/// Signals the whole process group so children the encoder spawned go
/// down with it.
#[cfg(unix)]
fn signal_group(pid: i32, signal: i32) {
    if pid <= 0 {
        return;
    }
    unsafe {
        libc::kill(-pid, signal);
    }
}

#[cfg(not(unix))]
fn signal_group(_pid: i32, _signal: i32) {}

fn artifact_is_fresh(settings: &SupervisorSettings, started_at: Instant) -> bool {
    let Some(path) = &settings.artifact_path else {
        return true;
    };
    if started_at.elapsed() < settings.startup_grace {
        return true;
    }
    let Ok(metadata) = std::fs::metadata(path) else {
        return false;
    };
    match metadata.modified() {
        Ok(modified) => modified
            .elapsed()
            .map(|age| age <= settings.staleness)
            .unwrap_or(true),
        Err(_) => true,
    }
}
