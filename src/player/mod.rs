//! The per-chat playback engine.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       Command facade                         │
//! │   validates + rate limits, consumes engine events in order   │
//! └───────────────┬───────────────────────────────▲──────────────┘
//!                 │ Msg (per-chat mailbox)        │ OutboundEvent
//!                 ▼                               │
//! ┌──────────────────────────────────────────────────────────────┐
//! │  PlayerRegistry: chat_id → actor                             │
//! │   ┌───────────────┐  ┌───────────────┐  ┌───────────────┐    │
//! │   │ actor chat A  │  │ actor chat B  │  │ actor chat C  │    │
//! │   │ queue · clock │  │               │  │               │    │
//! │   │ watchdog ·ckpt│  │      ...      │  │      ...      │    │
//! │   └───────────────┘  └───────────────┘  └───────────────┘    │
//! └──────────────────────────────────────────────────────────────┘
//!          │ resolve / join / pause / set / delete
//!          ▼
//!   Resolver · VoiceTransport · Presence · StateStore (capabilities)
//! ```
//!
//! Each actor consumes its mailbox sequentially, so a chat's queue and
//! playback state are never touched from two flows at once and effects keep
//! submission order. Different chats run in parallel and share nothing but
//! the registry map and the capability objects.

mod actor;
pub mod events;
pub mod queue;
pub mod state;

pub use events::{OutboundEvent, PlaybackIssue};
pub use queue::{AddOutcome, ChatQueue};
pub use state::PlaybackState;

pub(crate) use actor::{Msg, PlayRequest};

/// Tracks per page in queue views.
pub(crate) const QUEUE_PAGE_SIZE: usize = 8;

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::model::{ChatId, Checkpoint, Track, UserId};
use crate::presence::Presence;
use crate::resolver::Resolver;
use crate::storage::StateStore;
use crate::transport::VoiceTransport;
use actor::PlayerActor;

/// Capabilities handed to every actor.
#[derive(Clone)]
pub(crate) struct Deps {
    pub config: Arc<Config>,
    pub storage: Arc<dyn StateStore>,
    pub resolver: Arc<dyn Resolver>,
    pub transport: Arc<dyn VoiceTransport>,
    pub presence: Arc<Presence>,
    pub events: mpsc::UnboundedSender<OutboundEvent>,
}

struct ActorHandle {
    tx: mpsc::UnboundedSender<Msg>,
    task: JoinHandle<()>,
    generation: u64,
}

struct RegistryInner {
    deps: Deps,
    actors: Mutex<HashMap<ChatId, ActorHandle>>,
    next_generation: Mutex<u64>,
}

/// Registry of per-chat playback actors.
///
/// Creates actors lazily on the first play (or resume) for a chat and drops
/// entries when actors exit. The map mutex guards only insert/lookup/remove
/// and is never held across I/O.
#[derive(Clone)]
pub struct PlayerRegistry {
    inner: Arc<RegistryInner>,
}

impl PlayerRegistry {
    /// Build the registry. The returned receiver carries every externally
    /// visible engine effect, in per-chat submission order.
    pub fn new(
        config: Arc<Config>,
        storage: Arc<dyn StateStore>,
        resolver: Arc<dyn Resolver>,
        transport: Arc<dyn VoiceTransport>,
        presence: Arc<Presence>,
    ) -> (Self, mpsc::UnboundedReceiver<OutboundEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let registry = Self {
            inner: Arc::new(RegistryInner {
                deps: Deps {
                    config,
                    storage,
                    resolver,
                    transport,
                    presence,
                    events: events_tx,
                },
                actors: Mutex::new(HashMap::new()),
                next_generation: Mutex::new(0),
            }),
        };
        (registry, events_rx)
    }

    /// Submit a play request, creating the chat's actor if needed.
    pub fn play(&self, chat_id: ChatId, query: String, requester_id: UserId, requester_display: String) {
        self.send_or_spawn(
            chat_id,
            Msg::Play(PlayRequest {
                query,
                requester_id,
                requester_display,
            }),
        );
    }

    /// Submit an uploaded/local track, creating the chat's actor if needed.
    pub fn play_local(&self, chat_id: ChatId, track: Track) {
        self.send_or_spawn(chat_id, Msg::PlayLocal { track });
    }

    /// Re-hydrate a session from a restart checkpoint.
    pub fn resume_session(&self, checkpoint: Checkpoint) {
        self.send_or_spawn(checkpoint.chat_id, Msg::ResumeSession { checkpoint });
    }

    /// Pause the chat's session. Returns false if no session exists.
    pub fn pause(&self, chat_id: ChatId) -> bool {
        self.send_existing(chat_id, Msg::Pause)
    }

    /// Resume the chat's paused session. Returns false if no session exists.
    pub fn resume(&self, chat_id: ChatId) -> bool {
        self.send_existing(chat_id, Msg::Resume)
    }

    /// Skip to the next track. Returns false if no session exists.
    pub fn skip(&self, chat_id: ChatId) -> bool {
        self.send_existing(chat_id, Msg::Skip)
    }

    /// Stop and tear down the chat's session. Returns false if none exists
    /// (a second stop is a no-op, not an error).
    pub fn stop(&self, chat_id: ChatId) -> bool {
        self.send_existing(chat_id, Msg::Stop)
    }

    /// Change the loop mode. Returns false if no session exists.
    pub fn set_loop(&self, chat_id: ChatId, mode: crate::model::LoopMode) -> bool {
        self.send_existing(chat_id, Msg::SetLoop(mode))
    }

    /// Shuffle the upcoming tracks. Returns false if no session exists.
    pub fn shuffle(&self, chat_id: ChatId) -> bool {
        self.send_existing(chat_id, Msg::Shuffle)
    }

    /// Request a queue page view. Returns false if no session exists.
    pub fn queue_page(&self, chat_id: ChatId, page: usize) -> bool {
        self.send_existing(chat_id, Msg::QueuePage { page })
    }

    /// Entry point for the transport's end-of-stream signal.
    pub fn on_stream_end(&self, chat_id: ChatId) {
        self.send_existing(chat_id, Msg::StreamEnded { track_id: None });
    }

    /// Re-announce the now-playing card. Returns false if no session exists.
    pub fn refresh(&self, chat_id: ChatId) -> bool {
        self.send_existing(chat_id, Msg::Refresh)
    }

    /// Whether a chat currently has an actor.
    pub fn is_active(&self, chat_id: ChatId) -> bool {
        self.inner.actors.lock().contains_key(&chat_id)
    }

    /// Chats with live actors.
    pub fn active_chats(&self) -> Vec<ChatId> {
        self.inner.actors.lock().keys().copied().collect()
    }

    /// Graceful process shutdown: every actor persists a final checkpoint
    /// and exits. Checkpoints are left in place for restart-resume.
    pub async fn shutdown(&self) {
        let handles: Vec<ActorHandle> = {
            let mut actors = self.inner.actors.lock();
            actors.drain().map(|(_, handle)| handle).collect()
        };

        for handle in &handles {
            let _ = handle.tx.send(Msg::Shutdown);
        }
        let tasks: Vec<JoinHandle<()>> = handles.into_iter().map(|h| h.task).collect();
        for result in futures::future::join_all(tasks).await {
            if let Err(e) = result {
                tracing::warn!("Actor task ended abnormally during shutdown: {}", e);
            }
        }
    }

    pub(crate) fn send_existing(&self, chat_id: ChatId, msg: Msg) -> bool {
        let actors = self.inner.actors.lock();
        match actors.get(&chat_id) {
            Some(handle) => handle.tx.send(msg).is_ok(),
            None => false,
        }
    }

    pub(crate) fn send_or_spawn(&self, chat_id: ChatId, msg: Msg) {
        let mut actors = self.inner.actors.lock();

        if let Some(handle) = actors.get(&chat_id) {
            match handle.tx.send(msg) {
                Ok(()) => return,
                // Actor exited but has not removed itself yet; replace it
                Err(mpsc::error::SendError(returned)) => {
                    actors.remove(&chat_id);
                    self.spawn_locked(&mut actors, chat_id, returned);
                    return;
                }
            }
        }
        self.spawn_locked(&mut actors, chat_id, msg);
    }

    fn spawn_locked(
        &self,
        actors: &mut HashMap<ChatId, ActorHandle>,
        chat_id: ChatId,
        first_msg: Msg,
    ) {
        let generation = {
            let mut next = self.inner.next_generation.lock();
            *next += 1;
            *next
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let actor = PlayerActor::new(chat_id, self.inner.deps.clone(), tx.clone());
        let _ = tx.send(first_msg);

        let weak: Weak<RegistryInner> = Arc::downgrade(&self.inner);
        let task = tokio::spawn(async move {
            actor.run(rx).await;
            // Deregister, unless a newer actor already took the slot
            if let Some(inner) = weak.upgrade() {
                let mut actors = inner.actors.lock();
                if actors
                    .get(&chat_id)
                    .is_some_and(|handle| handle.generation == generation)
                {
                    actors.remove(&chat_id);
                }
            }
        });

        tracing::debug!("Spawned actor for chat {}", chat_id);
        actors.insert(
            chat_id,
            ActorHandle {
                tx,
                task,
                generation,
            },
        );
    }
}
