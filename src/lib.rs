//! crescendo - the per-chat playback engine of a voice-chat music bot.
//!
//! Users in group chats ask for tracks; the engine resolves each query to a
//! playable stream, walks a second "assistant" identity into the voice chat
//! (bots cannot join one themselves), and streams the queue through a voice
//! transport - one sequential actor per chat, so every chat's queue, clock,
//! and watchdog have a single owner and commands take effect in order.
//! Sessions checkpoint to storage on a cadence and on every transition, and
//! a restart re-resolves and rejoins where each chat left off.
//!
//! The crate is the embeddable core: platform specifics stay behind the
//! [`transport::VoiceTransport`] and [`platform::Gateway`] traits that an
//! embedding bot implements. Wiring looks like:
//!
//! ```ignore
//! use crescendo::{Config, MusicService};
//!
//! let config = Config::load(Some(config_path.as_ref()));
//! let service = MusicService::start(config, my_transport, my_gateway).await?;
//!
//! // command handlers:
//! service.commands().play(chat_id, user_id, &user_name, "sunrise").await?;
//! // transport event loop:
//! service.on_stream_end(chat_id);
//! ```

pub mod config;
pub mod error;
pub mod facade;
pub mod model;
pub mod platform;
pub mod player;
pub mod presence;
pub mod resolver;
pub mod resume;
pub mod service;
pub mod storage;
#[cfg(test)]
pub mod test_utils;
pub mod transport;

pub use config::Config;
pub use error::{Error, Result};
pub use facade::CommandFacade;
pub use model::{ChatId, Checkpoint, LoopMode, Track, UserId};
pub use player::{OutboundEvent, PlayerRegistry};
pub use service::MusicService;
