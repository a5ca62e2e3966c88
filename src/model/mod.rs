//! Core data models for playback sessions.
//!
//! Defines the entities the engine owns per chat: [`Track`], the persisted
//! [`Checkpoint`] snapshot, and [`LoopMode`]. Checkpoints are serialized as
//! JSON documents into the state store under `state_<chat_id>` keys.

use serde::{Deserialize, Serialize};

/// Chat identifier on the messaging platform.
pub type ChatId = i64;

/// User identifier on the messaging platform.
pub type UserId = i64;

/// Message identifier within a chat.
pub type MessageId = i64;

/// Prefix for persisted playback-state keys.
pub const STATE_KEY_PREFIX: &str = "state_";

/// Build the storage key for a chat's checkpoint.
pub fn state_key(chat_id: ChatId) -> String {
    format!("{STATE_KEY_PREFIX}{chat_id}")
}

/// One playable audio item.
///
/// Immutable once constructed. `stream_url` is whatever the resolver handed
/// back and may expire; `source_url` is the stable, re-resolvable address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    /// Source-stable identifier (video id, or the file reference for uploads)
    pub id: String,
    /// Display title
    pub title: String,
    /// Duration in seconds; 0 = live or unknown
    pub duration: u32,
    /// Stable, human-visitable address used to refresh `stream_url`
    pub source_url: String,
    /// Direct media address handed to the voice transport (may expire)
    pub stream_url: String,
    /// Local path or platform file handle for uploaded audio
    pub file_ref: Option<String>,
    /// Who asked for it
    pub requester_id: UserId,
    /// Display form of the requester (mention or name)
    pub requester_display: String,
    /// Channel/uploader name, when the extractor reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploader: Option<String>,
    /// Thumbnail address, when the extractor reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
}

impl Track {
    /// Whether the track is live or of unknown length.
    ///
    /// Such tracks get no watchdog timer; only the transport's own
    /// end-of-stream signal advances past them.
    pub fn is_live(&self) -> bool {
        self.duration == 0
    }

    /// Whether the track plays from an uploaded/local file rather than a
    /// resolvable source.
    pub fn is_local(&self) -> bool {
        self.file_ref.is_some()
    }
}

/// Queue behavior when the current track finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopMode {
    /// Advance through the queue once
    #[default]
    Off,
    /// Repeat the current track
    Track,
    /// Wrap around to the start after the last track
    Queue,
}

impl std::str::FromStr for LoopMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "off" => Ok(Self::Off),
            "track" => Ok(Self::Track),
            "queue" => Ok(Self::Queue),
            other => Err(format!("unknown loop mode: {other}")),
        }
    }
}

/// Persisted snapshot of a chat's playback.
///
/// Written on a cadence and on every state transition while a session is
/// active; deleted on stop or queue drain. Readers ignore unknown fields;
/// records missing any required field are dropped during the startup scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub chat_id: ChatId,
    pub track: Track,
    pub position_seconds: u64,
    pub is_paused: bool,
    pub saved_at_unix: i64,
}

impl Checkpoint {
    /// Storage key this checkpoint lives under.
    pub fn key(&self) -> String {
        state_key(self.chat_id)
    }
}
