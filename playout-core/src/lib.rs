pub mod analytics;
pub mod catalog;
pub mod config;
pub mod cursor;
pub mod encoder;
pub mod overrides;
pub mod schedule;
pub mod scheduler;
pub mod sqlite;
pub mod supervisor;

pub use analytics::{AnalyticsCounters, AnalyticsSnapshot};
pub use catalog::{
    CatalogError, CatalogStore, CatalogStoreBuilder, Playlist, PriorityTier, ScheduleEntry,
    ScheduledSlot, Video,
};
pub use config::{load_playout_config, ConfigError, PlayoutConfig};
pub use cursor::PlaylistCursor;
pub use encoder::{write_concat_manifest, EncoderJob, EncoderSettings};
pub use overrides::{OverrideCell, OverrideController, OverrideError, OverrideFile};
pub use schedule::{ConflictPolicy, Resolution, ResolutionSource, ScheduleResolver, TimeContext};
pub use scheduler::{SchedulerError, SchedulerLoop};
pub use supervisor::{
    ProcessSupervisor, StreamHealth, SupervisorError, SupervisorSettings, SupervisorState,
};
