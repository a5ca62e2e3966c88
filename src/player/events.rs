//! Events emitted by chat actors.
//!
//! Actors never talk to the platform directly; every externally visible
//! effect leaves the engine as an [`OutboundEvent`] on the registry's event
//! channel, which the command facade consumes in order. That one-way channel
//! (facade submits commands in, engine emits events out) is what keeps the
//! per-chat FIFO of announcements and keyboard edits enforceable.

use crate::model::{ChatId, LoopMode, Track};
use crate::presence::PresenceError;
use crate::resolver::ResolveError;
use crate::transport::TransportError;

/// A user-surfaced playback failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlaybackIssue {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Presence(#[from] PresenceError),

    #[error("local file is gone: {path}")]
    MissingLocalFile { path: String },
}

/// Externally visible engine effects, in per-chat order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundEvent {
    /// A track started (or restarted after pause/seek); the facade posts or
    /// edits the chat's now-playing message.
    NowPlaying {
        chat_id: ChatId,
        track: Track,
        position_seconds: u64,
        paused: bool,
    },

    /// A track was appended behind the current one.
    AddedToQueue {
        chat_id: ChatId,
        track: Track,
        position: usize,
    },

    /// The queue is at its cap; the track was rejected.
    QueueFull { chat_id: ChatId, title: String },

    /// One page of the queue, for display.
    QueueView {
        chat_id: ChatId,
        now_playing: Option<Track>,
        entries: Vec<Track>,
        page: usize,
        total_pages: usize,
    },

    /// Playback paused.
    Paused { chat_id: ChatId },

    /// Playback resumed.
    Resumed {
        chat_id: ChatId,
        track: Track,
        position_seconds: u64,
    },

    /// Session torn down by an explicit stop.
    Stopped { chat_id: ChatId },

    /// Session ended because the queue ran dry.
    Drained { chat_id: ChatId },

    /// Loop mode changed.
    LoopModeSet { chat_id: ChatId, mode: LoopMode },

    /// Upcoming tracks reshuffled.
    Shuffled { chat_id: ChatId, upcoming: usize },

    /// A play attempt (or stream swap) failed; session state is unchanged
    /// unless a teardown event follows.
    PlayFailed {
        chat_id: ChatId,
        issue: PlaybackIssue,
    },
}

impl OutboundEvent {
    /// The chat this effect belongs to.
    pub fn chat_id(&self) -> ChatId {
        match self {
            Self::NowPlaying { chat_id, .. }
            | Self::AddedToQueue { chat_id, .. }
            | Self::QueueFull { chat_id, .. }
            | Self::QueueView { chat_id, .. }
            | Self::Paused { chat_id }
            | Self::Resumed { chat_id, .. }
            | Self::Stopped { chat_id }
            | Self::Drained { chat_id }
            | Self::LoopModeSet { chat_id, .. }
            | Self::Shuffled { chat_id, .. }
            | Self::PlayFailed { chat_id, .. } => *chat_id,
        }
    }
}
