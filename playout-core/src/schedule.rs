use chrono::{DateTime, Datelike, TimeZone, Timelike};
use serde::Deserialize;
use tracing::{debug, info};

use crate::catalog::{CatalogError, CatalogStore, Playlist, PriorityTier, ScheduledSlot};

/// Tie-break among same-tier overlapping entries. Most-recent-start
/// mirrors the historical behavior; it is a policy choice, not a
/// correctness rule, so it stays configurable. Both variants fall back
/// to lowest entry id for full determinism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    MostRecentStart,
    LowestEntryId,
}

impl Default for ConflictPolicy {
    fn default() -> Self {
        ConflictPolicy::MostRecentStart
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeContext {
    Morning,
    Afternoon,
    Evening,
    LateNight,
}

impl TimeContext {
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            6..=11 => TimeContext::Morning,
            12..=17 => TimeContext::Afternoon,
            18..=21 => TimeContext::Evening,
            _ => TimeContext::LateNight,
        }
    }

    /// Priority tier the fallback prefers at this time of day.
    pub fn preferred_tier(&self) -> PriorityTier {
        match self {
            TimeContext::Morning => PriorityTier::Medium,
            TimeContext::Afternoon => PriorityTier::High,
            TimeContext::Evening => PriorityTier::Medium,
            TimeContext::LateNight => PriorityTier::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeContext::Morning => "morning",
            TimeContext::Afternoon => "afternoon",
            TimeContext::Evening => "evening",
            TimeContext::LateNight => "late night",
        }
    }
}

/// Where a resolution came from, for switch-logging and assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionSource {
    Entry(i64),
    Fallback(TimeContext),
    Override,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub playlist_id: i64,
    pub source: ResolutionSource,
}

/// Weekday numbering used everywhere in the schedule table: 0 = Sunday.
pub fn weekday_index(weekday: chrono::Weekday) -> u8 {
    weekday.num_days_from_sunday() as u8
}

/// Decides which playlist should be airing at a given instant from the
/// schedule table, with priority conflict resolution and a time-of-day
/// fallback when nothing is scheduled.
#[derive(Debug)]
pub struct ScheduleResolver {
    catalog: CatalogStore,
    policy: ConflictPolicy,
}

impl ScheduleResolver {
    pub fn new(catalog: CatalogStore, policy: ConflictPolicy) -> Self {
        Self { catalog, policy }
    }

    /// Resolves the target playlist for `now`. `Ok(None)` means the
    /// catalog holds no usable playlist at all; the caller logs and
    /// retries next cycle.
    pub fn resolve<Tz: TimeZone>(
        &self,
        now: DateTime<Tz>,
    ) -> Result<Option<Resolution>, CatalogError> {
        let day = weekday_index(now.weekday());
        let hhmm = format!("{:02}:{:02}", now.hour(), now.minute());
        let slots = self.catalog.entries_at(day, &hhmm)?;
        if let Some(winner) = pick_winner(&slots, self.policy) {
            debug!(
                entry_id = winner.entry.id,
                playlist = %winner.playlist_name,
                priority = %winner.priority,
                "schedule entry selected"
            );
            return Ok(Some(Resolution {
                playlist_id: winner.entry.playlist_id,
                source: ResolutionSource::Entry(winner.entry.id),
            }));
        }

        let context = TimeContext::from_hour(now.hour());
        let playlists = self.catalog.active_playlists()?;
        let Some(choice) = pick_fallback(&playlists, context) else {
            return Ok(None);
        };
        info!(
            context = context.as_str(),
            playlist = %choice.name,
            priority = %choice.priority,
            "fallback playlist selected"
        );
        Ok(Some(Resolution {
            playlist_id: choice.id,
            source: ResolutionSource::Fallback(context),
        }))
    }
}

/// Highest tier wins outright; within that tier the configured policy
/// breaks the tie, then lowest entry id. Identical inputs always yield
/// the identical winner.
fn pick_winner(slots: &[ScheduledSlot], policy: ConflictPolicy) -> Option<&ScheduledSlot> {
    let top = slots.iter().map(|slot| slot.priority.rank()).max()?;
    slots
        .iter()
        .filter(|slot| slot.priority.rank() == top)
        .min_by(|a, b| match policy {
            ConflictPolicy::MostRecentStart => b
                .entry
                .start_time
                .cmp(&a.entry.start_time)
                .then_with(|| a.entry.id.cmp(&b.entry.id)),
            ConflictPolicy::LowestEntryId => a.entry.id.cmp(&b.entry.id),
        })
}

fn pick_fallback(playlists: &[Playlist], context: TimeContext) -> Option<&Playlist> {
    let preferred = context.preferred_tier();
    playlists.iter().min_by(|a, b| {
        let key = |p: &Playlist| (p.priority != preferred, std::cmp::Reverse(p.priority.rank()));
        key(a).cmp(&key(b)).then_with(|| a.name.cmp(&b.name))
    })
}
