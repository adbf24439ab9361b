use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use rand::Rng;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::analytics::AnalyticsCounters;
use crate::catalog::{CatalogError, CatalogStore, Video};
use crate::config::PlayoutConfig;
use crate::cursor::PlaylistCursor;
use crate::encoder::{write_concat_manifest, EncoderSettings};
use crate::overrides::{OverrideCell, OverrideController};
use crate::schedule::{Resolution, ResolutionSource, ScheduleResolver};
use crate::supervisor::{
    ProcessSupervisor, StreamHealth, SupervisorError, SupervisorSettings, SupervisorState,
};

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),
    #[error("supervisor error: {0}")]
    Supervisor(#[from] SupervisorError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// What a cycle does once health and the target playlist are known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CycleAction {
    StartNext,
    RetrySame,
    ForceRestart,
    Switch,
    Monitor,
}

/// A playlist switch takes precedence over every health verdict: the
/// old process is stopped and the new playlist starts from its first
/// video. Otherwise natural end advances, crash and hang retry the
/// same content without advancing.
fn decide(health: StreamHealth, target_changed: bool) -> CycleAction {
    if target_changed {
        return CycleAction::Switch;
    }
    match health {
        StreamHealth::NaturalEnd | StreamHealth::Idle => CycleAction::StartNext,
        StreamHealth::Crashed { .. } => CycleAction::RetrySame,
        StreamHealth::Hung => CycleAction::ForceRestart,
        StreamHealth::Healthy => CycleAction::Monitor,
    }
}

/// Per-playlist session state: single writer, threaded through the
/// loop explicitly.
#[derive(Debug)]
struct PlaySession {
    playlist_id: i64,
    cursor: PlaylistCursor,
    /// Last video handed to the supervisor, retained for crash retry.
    current: Option<Video>,
    /// Concat manifest and its segment count, gapless mode only.
    manifest: Option<(PathBuf, usize)>,
}

/// The top-level control loop: resolves the target playlist each
/// cycle, drives the process supervisor, and keeps the output channel
/// alive through crashes, hangs, and schedule edits.
pub struct SchedulerLoop {
    config: PlayoutConfig,
    catalog: CatalogStore,
    resolver: ScheduleResolver,
    supervisor: ProcessSupervisor,
    encoder: EncoderSettings,
    overrides: OverrideController,
    analytics: AnalyticsCounters,
    session: Option<PlaySession>,
    override_was_armed: bool,
    shutdown: watch::Receiver<bool>,
    cycles: u64,
}

impl SchedulerLoop {
    /// Wires the loop from config. An unreachable catalog is a fatal
    /// startup error; everything after this point is survivable.
    pub fn new(
        config: PlayoutConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Self, SchedulerError> {
        let catalog = CatalogStore::builder()
            .path(&config.paths.database)
            .read_only(true)
            .build()?;
        catalog.active_playlists()?;
        let resolver = ScheduleResolver::new(catalog.clone(), config.scheduler.conflict_tie_break);
        let supervisor = ProcessSupervisor::new(SupervisorSettings::from_config(
            &config.supervisor,
            &config.paths,
        ));
        let encoder = EncoderSettings::new(config.stream.clone(), config.encoder.clone());
        let overrides = OverrideController::new(
            Arc::new(OverrideCell::new()),
            config.paths.override_file.clone(),
            config.r#override.default_playlist_id,
        );
        Ok(Self {
            config,
            catalog,
            resolver,
            supervisor,
            encoder,
            overrides,
            analytics: AnalyticsCounters::new(),
            session: None,
            override_was_armed: false,
            shutdown,
            cycles: 0,
        })
    }

    pub fn analytics(&self) -> &AnalyticsCounters {
        &self.analytics
    }

    pub fn current_playlist(&self) -> Option<i64> {
        self.session.as_ref().map(|session| session.playlist_id)
    }

    pub fn current_video(&self) -> Option<&Video> {
        self.session.as_ref().and_then(|session| session.current.as_ref())
    }

    pub fn supervisor_state(&self) -> SupervisorState {
        self.supervisor.state()
    }

    pub fn override_cell(&self) -> Arc<OverrideCell> {
        self.overrides.cell()
    }

    /// Runs until the shutdown flag flips, then stops the encoder
    /// gracefully and flushes final analytics. No single bad cycle
    /// terminates the loop.
    pub async fn run(mut self) -> Result<(), SchedulerError> {
        info!("scheduler loop starting");
        #[cfg(unix)]
        if self.config.r#override.arm_on_signal {
            crate::overrides::spawn_signal_watcher(
                self.overrides.cell(),
                self.config.r#override.default_playlist_id,
            )?;
        }
        let cycle = Duration::from_secs(self.config.scheduler.cycle_seconds.max(1));
        let flush_every = self.config.scheduler.analytics_flush_cycles.max(1);

        while !*self.shutdown.borrow() {
            if let Err(error) = self.run_cycle().await {
                error!(%error, "scheduler cycle failed");
                self.analytics.errors += 1;
            }
            self.cycles += 1;
            if self.cycles % flush_every == 0 {
                self.flush_analytics().await;
            }
            // The sleep is interruptible so shutdown latency stays
            // sub-second regardless of the cycle interval.
            tokio::select! {
                _ = tokio::time::sleep(cycle) => {}
                _ = self.shutdown.changed() => {}
            }
        }

        info!("shutdown requested, stopping encoder");
        if let Err(error) = self.supervisor.stop().await {
            warn!(%error, "failed to stop encoder during shutdown");
        }
        self.flush_analytics().await;
        info!("scheduler loop stopped");
        Ok(())
    }

    /// One decision cycle. Public so operational tooling and tests can
    /// drive the loop deterministically.
    pub async fn run_cycle(&mut self) -> Result<(), SchedulerError> {
        if let Err(error) = self.overrides.poll_file() {
            warn!(%error, "override config unreadable, keeping previous state");
            self.analytics.errors += 1;
        }

        let armed = self.overrides.target();
        if armed.is_some() && !self.override_was_armed {
            self.analytics.emergency_overrides += 1;
        }
        self.override_was_armed = armed.is_some();

        let resolution = match armed {
            Some(playlist_id) => {
                warn!(playlist_id, "emergency override active");
                Resolution {
                    playlist_id,
                    source: ResolutionSource::Override,
                }
            }
            None => match self.resolver.resolve(Local::now())? {
                Some(resolution) => resolution,
                None => {
                    warn!("no playlist available for streaming");
                    return Ok(());
                }
            },
        };

        let health = self.supervisor.check();
        let target_changed = self
            .session
            .as_ref()
            .map(|session| session.playlist_id != resolution.playlist_id)
            .unwrap_or(true);

        match decide(health, target_changed) {
            CycleAction::Switch => {
                info!(
                    playlist_id = resolution.playlist_id,
                    source = ?resolution.source,
                    "switching playlist"
                );
                self.switch_to(resolution).await
            }
            CycleAction::StartNext => self.start_next().await,
            CycleAction::RetrySame => {
                warn!("retrying same content after crash");
                self.restart_current().await
            }
            CycleAction::ForceRestart => {
                self.supervisor.stop_forced().await?;
                self.restart_current().await
            }
            CycleAction::Monitor => {
                if self.config.scheduler.gapless {
                    self.maybe_refresh_queue()
                } else {
                    Ok(())
                }
            }
        }
    }

    async fn switch_to(&mut self, resolution: Resolution) -> Result<(), SchedulerError> {
        self.supervisor.stop().await?;
        let playlist = self.catalog.playlist(resolution.playlist_id)?;
        let videos = self.catalog.playlist_videos(playlist.id)?;
        let cursor = PlaylistCursor::new(&playlist, videos);
        info!(
            playlist_id = playlist.id,
            name = %playlist.name,
            videos = cursor.len(),
            "loaded playlist"
        );
        if self.session.is_some() {
            self.analytics.schedule_switches += 1;
        }
        self.session = Some(PlaySession {
            playlist_id: playlist.id,
            cursor,
            current: None,
            manifest: None,
        });
        self.start_next().await
    }

    async fn start_next(&mut self) -> Result<(), SchedulerError> {
        if self.config.scheduler.gapless {
            return self.start_queue().await;
        }
        let (playlist_id, video) = match self.session.as_mut() {
            Some(session) => (session.playlist_id, session.cursor.next()),
            None => return Ok(()),
        };
        let Some(video) = video else {
            warn!(playlist_id, "no videos available in playlist");
            return Ok(());
        };
        self.launch_video(video).await
    }

    async fn restart_current(&mut self) -> Result<(), SchedulerError> {
        if self.config.scheduler.gapless {
            if let Some((manifest, segments)) =
                self.session.as_ref().and_then(|session| session.manifest.clone())
            {
                let job = self.encoder.concat_job(&manifest, segments);
                self.supervisor.start(&job).await?;
                self.analytics.streams_started += 1;
                return Ok(());
            }
            return self.start_queue().await;
        }
        match self
            .session
            .as_ref()
            .and_then(|session| session.current.clone())
        {
            Some(video) => self.launch_video(video).await,
            None => self.start_next().await,
        }
    }

    async fn launch_video(&mut self, video: Video) -> Result<(), SchedulerError> {
        let job = self.encoder.file_job(&video);
        match self.supervisor.start(&job).await {
            Ok(()) => {
                self.analytics.streams_started += 1;
                if let Some(session) = self.session.as_mut() {
                    session.current = Some(video);
                }
                Ok(())
            }
            // Missing media is a content problem: skip it, keep the
            // cursor advanced so one bad row cannot wedge the channel.
            Err(SupervisorError::MissingInput(path)) => {
                warn!(path = %path.display(), "video file missing, skipping");
                self.analytics.errors += 1;
                if let Some(session) = self.session.as_mut() {
                    session.current = None;
                }
                Ok(())
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn start_queue(&mut self) -> Result<(), SchedulerError> {
        let queue_size = self.config.scheduler.queue_size.max(1);
        let manifest = self.manifest_path();
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        let paths = session.cursor.lookahead(queue_size);
        if paths.is_empty() {
            warn!(
                playlist_id = session.playlist_id,
                "no videos available for gapless queue"
            );
            return Ok(());
        }
        write_concat_manifest(&manifest, &paths)?;
        session.manifest = Some((manifest.clone(), paths.len()));
        session.current = None;
        let job = self.encoder.concat_job(&manifest, paths.len());
        self.supervisor.start(&job).await?;
        self.analytics.streams_started += 1;
        info!(segments = paths.len(), "gapless queue started");
        Ok(())
    }

    /// Occasional queue rebuild for variety. Rewrites the manifest in
    /// place; the running encoder is never interrupted.
    fn maybe_refresh_queue(&mut self) -> Result<(), SchedulerError> {
        let probability = self.config.scheduler.refresh_probability.clamp(0.0, 1.0);
        if probability <= 0.0 || !rand::thread_rng().gen_bool(probability) {
            return Ok(());
        }
        let queue_size = self.config.scheduler.queue_size.max(1);
        let default_manifest = self.manifest_path();
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        session.cursor.refresh(&mut rand::thread_rng());
        let paths = session.cursor.lookahead(queue_size);
        if paths.is_empty() {
            return Ok(());
        }
        let manifest = session
            .manifest
            .as_ref()
            .map(|(path, _)| path.clone())
            .unwrap_or(default_manifest);
        write_concat_manifest(&manifest, &paths)?;
        session.manifest = Some((manifest, paths.len()));
        info!(segments = paths.len(), "refreshed gapless queue for variety");
        Ok(())
    }

    fn manifest_path(&self) -> PathBuf {
        self.config.paths.temp_dir.join("playlist.txt")
    }

    async fn flush_analytics(&mut self) {
        let current = self.current_playlist();
        if let Err(error) = self
            .analytics
            .flush(&self.config.paths.analytics_file, current)
            .await
        {
            warn!(%error, "failed to write analytics snapshot");
            self.analytics.errors += 1;
        }
    }
}
