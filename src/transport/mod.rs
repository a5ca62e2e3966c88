//! Voice-call transport capability.
//!
//! The transport is the component that actually sits in the voice chat and
//! pushes audio: joining, swapping the source without leaving, pausing and
//! resuming. It is platform machinery supplied by the embedding bot; the
//! engine only depends on this trait.
//!
//! End-of-stream is a push signal, not a trait method: the transport's event
//! loop calls [`crate::player::PlayerRegistry::on_stream_end`] with the chat
//! that drained. The engine additionally runs its own watchdog timer per
//! track, so a lost signal stalls playback by at most a couple of seconds.

use async_trait::async_trait;

use crate::model::ChatId;

/// Transport errors the engine distinguishes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The chat has no live voice chat to join.
    #[error("no active voice chat in this chat")]
    NoActiveCall,

    /// The transport already sits in this chat's voice chat.
    ///
    /// The engine recovers by retrying as a stream change.
    #[error("already joined to this voice chat")]
    AlreadyJoined,

    /// Anything else the platform reported.
    #[error("voice transport failure: {0}")]
    Failure(String),
}

/// Capability over the platform's voice channel.
///
/// Operations are safe to invoke concurrently for distinct chats; the
/// transport routes internally by `chat_id`. `pause`/`resume`/`leave` are
/// idempotent where the underlying state already matches.
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    /// Join the live voice chat in `chat_id` and start streaming
    /// `stream_url` from `seek_seconds` in.
    async fn join(
        &self,
        chat_id: ChatId,
        stream_url: &str,
        seek_seconds: u64,
    ) -> Result<(), TransportError>;

    /// Replace the current source without leaving the call.
    async fn change_stream(
        &self,
        chat_id: ChatId,
        stream_url: &str,
        seek_seconds: u64,
    ) -> Result<(), TransportError>;

    /// Pause the current stream.
    async fn pause(&self, chat_id: ChatId) -> Result<(), TransportError>;

    /// Resume a paused stream.
    async fn resume(&self, chat_id: ChatId) -> Result<(), TransportError>;

    /// Leave the voice chat.
    async fn leave(&self, chat_id: ChatId) -> Result<(), TransportError>;
}
