//! Messaging-platform gateway capability.
//!
//! Everything the engine needs from the platform's two identities - the bot
//! (receives commands, posts messages, administers the chat) and the
//! assistant (the user account that participates in voice chats) - behind
//! one trait. Command parsing, localization, and actual inline-button
//! rendering stay on the embedding side; messages cross this boundary as
//! text plus a structured [`Controls`] layout.

use async_trait::async_trait;

use crate::model::{ChatId, MessageId};

/// Gateway errors the presence protocol distinguishes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlatformError {
    /// The bot lacks the administrative right for the operation.
    #[error("bot is not an administrator in this chat")]
    NotAdmin,

    /// The assistant's privacy settings block the invitation.
    #[error("assistant privacy settings forbid the invitation")]
    PrivacyRestricted,

    /// Anything else the platform reported.
    #[error("platform error: {0}")]
    Other(String),
}

/// Assistant membership in a chat, as seen by the bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    /// Not in the chat at all.
    NotMember,
    /// In the chat; flag says whether it may manage voice chats.
    Member { can_manage_voice: bool },
}

/// One inline control button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    /// Label shown to the user
    pub label: String,
    /// What pressing it means; routed back through the command facade
    pub action: ControlAction,
}

impl Button {
    pub fn new(label: impl Into<String>, action: ControlAction) -> Self {
        Self {
            label: label.into(),
            action,
        }
    }
}

/// Actions a control button can trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    Pause,
    Resume,
    Skip,
    Stop,
    /// Open (or navigate to) a page of the queue view
    QueuePage(usize),
    /// Return from the queue view to the player view
    PlayerView,
    /// Inert label (e.g. the "page 2/5" indicator)
    Noop,
}

/// Button rows attached to a message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Controls {
    pub rows: Vec<Vec<Button>>,
}

/// Bot + assistant operations on the messaging platform.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Post a message to a chat, optionally with controls.
    async fn send_message(
        &self,
        chat_id: ChatId,
        text: &str,
        controls: Option<Controls>,
    ) -> Result<MessageId, PlatformError>;

    /// Edit a previously posted message.
    async fn edit_message(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        text: &str,
        controls: Option<Controls>,
    ) -> Result<(), PlatformError>;

    /// The assistant's membership in `chat_id`.
    async fn assistant_membership(&self, chat_id: ChatId) -> Result<Membership, PlatformError>;

    /// The chat's public handle, if it has one.
    async fn chat_handle(&self, chat_id: ChatId) -> Result<Option<String>, PlatformError>;

    /// Assistant joins a chat by its public handle.
    async fn assistant_join_by_handle(&self, handle: &str) -> Result<(), PlatformError>;

    /// Bot creates a single-use invite link (requires the invite right).
    async fn create_invite_link(&self, chat_id: ChatId) -> Result<String, PlatformError>;

    /// Assistant joins a chat through an invite link.
    async fn assistant_join_by_invite(&self, link: &str) -> Result<(), PlatformError>;

    /// Bot revokes an invite link it created.
    async fn revoke_invite_link(&self, chat_id: ChatId, link: &str) -> Result<(), PlatformError>;

    /// Bot grants the assistant voice-chat management rights.
    async fn promote_assistant(&self, chat_id: ChatId) -> Result<(), PlatformError>;
}
