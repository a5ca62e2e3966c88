//! Playback position bookkeeping.

use std::time::Duration;
use tokio::time::Instant;

use crate::model::{ChatId, Checkpoint, Track};

/// Live playback state for one chat.
///
/// Tracks elapsed time through monotonic instants rather than a counter:
/// `started_at` is adjusted on resume so that
/// `(paused ? paused_at : now) - started_at + base_offset` is always the
/// effective position. Created on the first successful play, destroyed on
/// stop or queue drain.
#[derive(Debug, Clone)]
pub struct PlaybackState {
    chat_id: ChatId,
    track: Track,
    /// Monotonic reference for the start of (the current stretch of) playback
    started_at: Instant,
    /// Set while paused
    paused_at: Option<Instant>,
    /// Position already consumed before `started_at` (resume seek)
    base_offset: Duration,
}

impl PlaybackState {
    /// Begin playing `track` from `offset` now.
    pub fn start(chat_id: ChatId, track: Track, offset: Duration) -> Self {
        Self {
            chat_id,
            track,
            started_at: Instant::now(),
            paused_at: None,
            base_offset: offset,
        }
    }

    /// Begin in the paused position (restart resume of a paused session).
    pub fn start_paused(chat_id: ChatId, track: Track, offset: Duration) -> Self {
        let now = Instant::now();
        Self {
            chat_id,
            track,
            started_at: now,
            paused_at: Some(now),
            base_offset: offset,
        }
    }

    pub fn chat_id(&self) -> ChatId {
        self.chat_id
    }

    pub fn track(&self) -> &Track {
        &self.track
    }

    pub fn is_paused(&self) -> bool {
        self.paused_at.is_some()
    }

    /// Effective elapsed playback time.
    pub fn elapsed(&self) -> Duration {
        let reference = self.paused_at.unwrap_or_else(Instant::now);
        reference.saturating_duration_since(self.started_at) + self.base_offset
    }

    /// Whole seconds of effective elapsed time.
    pub fn position_seconds(&self) -> u64 {
        self.elapsed().as_secs()
    }

    /// Mark paused now. No-op if already paused.
    pub fn pause(&mut self) {
        if self.paused_at.is_none() {
            self.paused_at = Some(Instant::now());
        }
    }

    /// Resume from pause, preserving the elapsed time. No-op if playing.
    pub fn resume(&mut self) {
        if let Some(paused_at) = self.paused_at.take() {
            // Shift the start reference forward by the pause gap
            self.started_at += paused_at.elapsed();
        }
    }

    /// Time left until the track should end, `None` for live/unknown.
    pub fn remaining(&self) -> Option<Duration> {
        if self.track.is_live() {
            return None;
        }
        let total = Duration::from_secs(u64::from(self.track.duration));
        Some(total.saturating_sub(self.elapsed()))
    }

    /// Snapshot for persistence.
    pub fn to_checkpoint(&self) -> Checkpoint {
        Checkpoint {
            chat_id: self.chat_id,
            track: self.track.clone(),
            position_seconds: self.position_seconds(),
            is_paused: self.is_paused(),
            saved_at_unix: chrono::Utc::now().timestamp(),
        }
    }

    /// Rebuild from a persisted snapshot, starting the clock now.
    pub fn from_checkpoint(cp: &Checkpoint) -> Self {
        let offset = Duration::from_secs(cp.position_seconds);
        if cp.is_paused {
            Self::start_paused(cp.chat_id, cp.track.clone(), offset)
        } else {
            Self::start(cp.chat_id, cp.track.clone(), offset)
        }
    }
}
