//! Assistant-presence protocol.
//!
//! The platform forbids the bot identity from sitting in voice chats, so a
//! second "assistant" user account does the listening. Before the first join
//! of a play attempt the engine runs [`Presence::ensure_ready`], which walks
//! the assistant into the chat and up to voice-chat-management rights:
//!
//! 1. already a member with the right - done;
//! 2. not a member - join by the chat's public handle, or have the bot mint
//!    an invite link, join it, and revoke it;
//! 3. member without the right - the bot promotes it.
//!
//! Every way this can fail maps to a distinguishable [`BlockedReason`] so
//! the facade can tell users what to fix.

use std::sync::Arc;

use crate::model::ChatId;
use crate::platform::{Gateway, Membership, PlatformError};

/// Why the assistant could not be made ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockedReason {
    /// The bot lacks the admin rights to invite or promote.
    BotNotAdmin,
    /// The assistant's privacy settings reject the invitation.
    AssistantPrivacyRestricted,
    /// The chat is private and no invite link could be produced.
    CannotInvite,
    /// The platform failed in some other way.
    Platform,
}

/// Presence errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PresenceError {
    #[error("assistant cannot be made ready: {reason:?} ({detail})")]
    Blocked {
        reason: BlockedReason,
        detail: String,
    },
}

impl PresenceError {
    fn blocked(reason: BlockedReason, detail: impl Into<String>) -> Self {
        Self::Blocked {
            reason,
            detail: detail.into(),
        }
    }

    /// The reason classification, for reason-specific user guidance.
    pub fn reason(&self) -> BlockedReason {
        match self {
            Self::Blocked { reason, .. } => *reason,
        }
    }
}

/// Ensures the assistant identity can manage the voice chat.
pub struct Presence {
    gateway: Arc<dyn Gateway>,
}

impl Presence {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self { gateway }
    }

    /// Make the assistant a member of `chat_id` with voice-chat-management
    /// rights, or report a distinguishable blocked reason.
    pub async fn ensure_ready(&self, chat_id: ChatId) -> Result<(), PresenceError> {
        let membership = self
            .gateway
            .assistant_membership(chat_id)
            .await
            .map_err(platform_blocked)?;

        match membership {
            Membership::Member {
                can_manage_voice: true,
            } => Ok(()),
            Membership::Member {
                can_manage_voice: false,
            } => self.promote(chat_id).await,
            Membership::NotMember => {
                self.bring_in(chat_id).await?;
                // Freshly joined members never hold rights yet
                self.promote(chat_id).await
            }
        }
    }

    async fn bring_in(&self, chat_id: ChatId) -> Result<(), PresenceError> {
        let handle = self
            .gateway
            .chat_handle(chat_id)
            .await
            .map_err(platform_blocked)?;

        if let Some(handle) = handle {
            tracing::info!("Assistant joining chat {} via public handle @{}", chat_id, handle);
            return self
                .gateway
                .assistant_join_by_handle(&handle)
                .await
                .map_err(join_blocked);
        }

        // Private chat: the bot mints an invite link, the assistant follows
        // it, and the link is revoked again either way.
        let link = match self.gateway.create_invite_link(chat_id).await {
            Ok(link) => link,
            Err(PlatformError::NotAdmin) => {
                return Err(PresenceError::blocked(
                    BlockedReason::BotNotAdmin,
                    "bot needs the invite-users right to bring the assistant in",
                ));
            }
            Err(e) => {
                return Err(PresenceError::blocked(
                    BlockedReason::CannotInvite,
                    e.to_string(),
                ));
            }
        };

        tracing::info!("Assistant joining chat {} via invite link", chat_id);
        let joined = self.gateway.assistant_join_by_invite(&link).await;

        if let Err(e) = self.gateway.revoke_invite_link(chat_id, &link).await {
            tracing::warn!("Failed to revoke invite link for chat {}: {}", chat_id, e);
        }

        joined.map_err(join_blocked)
    }

    async fn promote(&self, chat_id: ChatId) -> Result<(), PresenceError> {
        tracing::info!("Promoting assistant in chat {}", chat_id);
        match self.gateway.promote_assistant(chat_id).await {
            Ok(()) => Ok(()),
            Err(PlatformError::NotAdmin) => Err(PresenceError::blocked(
                BlockedReason::BotNotAdmin,
                "bot needs the promote-members right",
            )),
            Err(e) => Err(PresenceError::blocked(BlockedReason::Platform, e.to_string())),
        }
    }
}

fn platform_blocked(e: PlatformError) -> PresenceError {
    PresenceError::blocked(BlockedReason::Platform, e.to_string())
}

fn join_blocked(e: PlatformError) -> PresenceError {
    match e {
        PlatformError::PrivacyRestricted => PresenceError::blocked(
            BlockedReason::AssistantPrivacyRestricted,
            "assistant privacy settings reject chat invitations",
        ),
        PlatformError::NotAdmin => PresenceError::blocked(
            BlockedReason::BotNotAdmin,
            "bot lacks the rights to add the assistant",
        ),
        other => PresenceError::blocked(BlockedReason::Platform, other.to_string()),
    }
}
