use std::path::PathBuf;

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::catalog::{Playlist, Video};

/// Iteration state over one playlist session. Holds a snapshot of the
/// playlist's usable videos; rebuilt whenever the active playlist
/// changes. The index is normalized on every access, so it never
/// produces an out-of-range read.
#[derive(Debug)]
pub struct PlaylistCursor {
    playlist_id: i64,
    shuffle: bool,
    looped: bool,
    videos: Vec<Video>,
    index: usize,
}

impl PlaylistCursor {
    pub fn new(playlist: &Playlist, videos: Vec<Video>) -> Self {
        Self::with_rng(playlist, videos, &mut rand::thread_rng())
    }

    /// Seedable constructor so tests can assert on shuffled order.
    pub fn with_rng<R: Rng>(playlist: &Playlist, mut videos: Vec<Video>, rng: &mut R) -> Self {
        if playlist.shuffle_enabled && videos.len() > 1 {
            videos.shuffle(rng);
            info!(
                playlist_id = playlist.id,
                count = videos.len(),
                "shuffled playlist"
            );
        }
        Self {
            playlist_id: playlist.id,
            shuffle: playlist.shuffle_enabled,
            looped: playlist.loop_enabled,
            videos,
            index: 0,
        }
    }

    pub fn playlist_id(&self) -> i64 {
        self.playlist_id
    }

    pub fn len(&self) -> usize {
        self.videos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.videos.is_empty()
    }

    pub fn position(&self) -> usize {
        self.index
    }

    /// Next video to play, advancing the cursor. Exhaustion wraps to
    /// the start when the playlist loops, otherwise yields `None`;
    /// an empty playlist always yields `None`.
    pub fn next(&mut self) -> Option<Video> {
        if self.videos.is_empty() {
            return None;
        }
        if self.index >= self.videos.len() {
            if !self.looped {
                debug!(playlist_id = self.playlist_id, "playlist ended, loop disabled");
                return None;
            }
            info!(
                playlist_id = self.playlist_id,
                "playlist loop: restarting from beginning"
            );
            self.index = 0;
        }
        let video = self.videos[self.index].clone();
        self.index += 1;
        Some(video)
    }

    /// Next `n` on-disk file paths for a gapless concat manifest,
    /// wrapping around the playlist. Missing files are skipped with a
    /// warning so one bad row cannot starve the queue. The base index
    /// advances by one so successive rebuilds walk the playlist.
    pub fn lookahead(&mut self, n: usize) -> Vec<PathBuf> {
        if self.videos.is_empty() {
            return Vec::new();
        }
        let len = self.videos.len();
        let mut paths = Vec::with_capacity(n);
        for offset in 0..n {
            let video = &self.videos[(self.index + offset) % len];
            let path = PathBuf::from(&video.file_path);
            if path.exists() {
                paths.push(path);
            } else {
                warn!(path = %path.display(), "skipping missing video file");
            }
        }
        self.index = (self.index + 1) % len;
        paths
    }

    /// Queue-variety refresh for gapless mode: reshuffles the snapshot
    /// when the playlist is marked shuffleable. Does not touch any
    /// running encoder; the caller rebuilds the manifest afterwards.
    pub fn refresh<R: Rng>(&mut self, rng: &mut R) {
        if self.shuffle && self.videos.len() > 1 {
            self.videos.shuffle(rng);
            self.index %= self.videos.len();
            debug!(playlist_id = self.playlist_id, "reshuffled playlist snapshot");
        }
    }
}
