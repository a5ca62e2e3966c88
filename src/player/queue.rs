//! Per-chat play queue.

use rand::seq::SliceRandom;

use crate::model::{ChatId, LoopMode, Track};

/// The per-chat queue with current-position tracking.
///
/// Owned exclusively by the chat's actor; nothing else reads or writes it.
#[derive(Debug, Clone)]
pub struct ChatQueue {
    chat_id: ChatId,
    /// All tracks, played and pending
    tracks: Vec<Track>,
    /// Index of the current track (-1 = none)
    current: i32,
    /// Behavior at end of track
    loop_mode: LoopMode,
    /// Hard cap on queued tracks
    max_len: usize,
}

/// Outcome of [`ChatQueue::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// Added; 1-based position in the queue
    Added(usize),
    /// Rejected, queue is at its cap
    Full,
}

impl ChatQueue {
    /// Create an empty queue for a chat.
    pub fn new(chat_id: ChatId, max_len: usize) -> Self {
        Self {
            chat_id,
            tracks: Vec::new(),
            current: -1,
            loop_mode: LoopMode::Off,
            max_len,
        }
    }

    pub fn chat_id(&self) -> ChatId {
        self.chat_id
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn loop_mode(&self) -> LoopMode {
        self.loop_mode
    }

    pub fn set_loop_mode(&mut self, mode: LoopMode) {
        self.loop_mode = mode;
    }

    /// Current position as an index, if any track is current.
    pub fn current_index(&self) -> Option<usize> {
        if self.current >= 0 && (self.current as usize) < self.tracks.len() {
            Some(self.current as usize)
        } else {
            None
        }
    }

    /// The current track.
    pub fn current(&self) -> Option<&Track> {
        self.current_index().and_then(|i| self.tracks.get(i))
    }

    /// Append a track, enforcing the cap. Returns its 1-based position.
    pub fn add(&mut self, track: Track) -> AddOutcome {
        if self.tracks.len() >= self.max_len {
            return AddOutcome::Full;
        }
        self.tracks.push(track);
        AddOutcome::Added(self.tracks.len())
    }

    /// Advance to the next track per the loop mode and return it.
    ///
    /// Track-loop repeats the current entry; queue-loop wraps past the end;
    /// otherwise running off the end returns `None` and leaves the cursor at
    /// the last entry.
    pub fn advance(&mut self) -> Option<&Track> {
        self.advance_inner(true)
    }

    /// Advance for an explicit skip: identical to [`advance`], except
    /// track-loop does not pin the cursor - a skip always moves on.
    ///
    /// [`advance`]: Self::advance
    pub fn advance_skipping(&mut self) -> Option<&Track> {
        self.advance_inner(false)
    }

    fn advance_inner(&mut self, honor_track_loop: bool) -> Option<&Track> {
        if self.tracks.is_empty() {
            return None;
        }

        match self.loop_mode {
            LoopMode::Track if honor_track_loop && self.current >= 0 => {}
            LoopMode::Queue => {
                self.current += 1;
                if self.current as usize >= self.tracks.len() {
                    self.current = 0;
                }
            }
            _ => {
                self.current += 1;
                if self.current as usize >= self.tracks.len() {
                    self.current = self.tracks.len() as i32 - 1;
                    return None;
                }
            }
        }

        self.current()
    }

    /// Remove the track at `index`.
    ///
    /// Removing at or before the cursor shifts the cursor back so the
    /// remaining order is unaffected.
    pub fn remove(&mut self, index: usize) -> Option<Track> {
        if index >= self.tracks.len() {
            return None;
        }
        let track = self.tracks.remove(index);
        if index as i32 <= self.current {
            self.current = (self.current - 1).max(-1);
        }
        Some(track)
    }

    /// Move a track from one position to another, keeping the cursor on the
    /// same track it pointed at before.
    pub fn move_track(&mut self, from: usize, to: usize) -> bool {
        if from >= self.tracks.len() || to >= self.tracks.len() || from == to {
            return false;
        }
        let track = self.tracks.remove(from);
        self.tracks.insert(to, track);

        let pos = self.current;
        if pos >= 0 {
            let pos = pos as usize;
            if from == pos {
                self.current = to as i32;
            } else if from < pos && to >= pos {
                self.current -= 1;
            } else if from > pos && to <= pos {
                self.current += 1;
            }
        }
        true
    }

    /// Shuffle the tracks strictly after the cursor. History and the current
    /// track stay put.
    pub fn shuffle(&mut self) {
        let start = (self.current + 1).max(0) as usize;
        if start < self.tracks.len() {
            self.tracks[start..].shuffle(&mut rand::rng());
        }
    }

    /// Drop everything and reset the cursor.
    pub fn clear(&mut self) {
        self.tracks.clear();
        self.current = -1;
    }

    /// One page of the queue, 1-based, plus the total page count.
    ///
    /// An empty queue is a single empty page.
    pub fn page(&self, page: usize, page_size: usize) -> (Vec<Track>, usize) {
        let page_size = page_size.max(1);
        let total_pages = self.tracks.len().div_ceil(page_size).max(1);
        let page = page.clamp(1, total_pages);

        let start = (page - 1) * page_size;
        let end = (start + page_size).min(self.tracks.len());
        let slice = if start < self.tracks.len() {
            self.tracks[start..end].to_vec()
        } else {
            Vec::new()
        };
        (slice, total_pages)
    }

    /// All tracks, in order.
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Count of tracks strictly after the cursor.
    pub fn remaining(&self) -> usize {
        match self.current_index() {
            Some(i) => self.tracks.len() - i - 1,
            None if self.current < 0 => self.tracks.len(),
            None => 0,
        }
    }

    #[cfg(test)]
    fn cursor(&self) -> i32 {
        self.current
    }
}
