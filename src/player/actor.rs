//! The per-chat playback actor.
//!
//! Exactly one logical actor exists per chat; it owns that chat's queue,
//! playback clock, watchdog timer, and checkpoint writes. All inputs - user
//! commands, the transport's end-of-stream signal, watchdog firings,
//! checkpoint ticks - funnel through one [`Msg`] mailbox consumed
//! sequentially, so per-chat effects keep strict FIFO order without locks.
//!
//! Resolution is the one piece of work that runs off this critical path: it
//! can block for seconds of network I/O, so it is spawned and reports back
//! through the mailbox, leaving the actor responsive (and the resolve
//! abortable) in the meantime.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::model::{ChatId, Checkpoint, LoopMode, Track, UserId, state_key};
use crate::player::events::OutboundEvent;
use crate::player::{Deps, QUEUE_PAGE_SIZE};
use crate::player::queue::{AddOutcome, ChatQueue};
use crate::player::state::PlaybackState;
use crate::resolver::{ResolveError, Resolver as _};
use crate::storage::{self, StateStore as _};
use crate::transport::{TransportError, VoiceTransport as _};

/// Slack added to the watchdog deadline beyond the track's nominal end.
const WATCHDOG_GRACE: Duration = Duration::from_secs(2);

/// A play request as submitted by a user.
#[derive(Debug, Clone)]
pub(crate) struct PlayRequest {
    pub query: String,
    pub requester_id: UserId,
    pub requester_display: String,
}

/// Mailbox messages.
#[derive(Debug)]
pub(crate) enum Msg {
    /// Resolve a query and play or enqueue the result
    Play(PlayRequest),
    /// Play or enqueue an already-constructed track (uploaded audio)
    PlayLocal { track: Track },
    /// Re-hydrate a session from a restart checkpoint
    ResumeSession { checkpoint: Checkpoint },
    Pause,
    Resume,
    Skip,
    Stop,
    SetLoop(LoopMode),
    Shuffle,
    QueuePage { page: usize },
    /// The current stream hit EOF. `track_id` is set by the watchdog so
    /// stale timers can be told apart from the transport's own signal.
    StreamEnded { track_id: Option<String> },
    /// Re-announce the now-playing card (e.g. "back to player" button)
    Refresh,
    /// Resolver task finished (internal)
    Resolved {
        request: PlayRequest,
        result: Result<crate::resolver::ResolvedTrack, ResolveError>,
    },
    /// Process is exiting: persist and stop without touching the checkpoint
    Shutdown,
}

/// Engine states, for guards and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Idle,
    Resolving,
    Joining,
    Playing,
    Paused,
    Stopping,
}

/// What a teardown announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TeardownKind {
    /// Explicit stop
    Stopped,
    /// Queue ran dry
    Drained,
    /// Stream swap failed mid-session; failure already announced
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Exit,
}

#[derive(Debug)]
struct Watchdog {
    track_id: String,
    deadline: Instant,
}

/// One chat's playback state machine.
pub(crate) struct PlayerActor {
    chat_id: ChatId,
    deps: Deps,
    queue: ChatQueue,
    playback: Option<PlaybackState>,
    status: Status,
    /// Whether the transport currently sits in this chat's voice chat
    in_call: bool,
    watchdog: Option<Watchdog>,
    /// Plays waiting for the in-flight resolve to finish, FIFO
    pending: VecDeque<PlayRequest>,
    resolve_task: Option<JoinHandle<()>>,
    /// Loopback sender for resolver completions and synthesized signals
    self_tx: mpsc::UnboundedSender<Msg>,
}

impl PlayerActor {
    pub(crate) fn new(chat_id: ChatId, deps: Deps, self_tx: mpsc::UnboundedSender<Msg>) -> Self {
        let max_queue = deps.config.playback.max_queue;
        Self {
            chat_id,
            deps,
            queue: ChatQueue::new(chat_id, max_queue),
            playback: None,
            status: Status::Idle,
            in_call: false,
            watchdog: None,
            pending: VecDeque::new(),
            resolve_task: None,
            self_tx,
        }
    }

    /// Consume the mailbox until stop, drain, or shutdown.
    pub(crate) async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Msg>) {
        let mut checkpoint = tokio::time::interval(self.deps.config.checkpoint_interval());
        checkpoint.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let watchdog_deadline = self.watchdog.as_ref().map(|w| w.deadline);

            tokio::select! {
                msg = rx.recv() => {
                    let Some(msg) = msg else { break };
                    if self.handle(msg).await == Flow::Exit {
                        break;
                    }
                }
                _ = tokio::time::sleep_until(watchdog_deadline.unwrap_or_else(Instant::now)),
                    if watchdog_deadline.is_some() =>
                {
                    if let Some(watchdog) = self.watchdog.take() {
                        tracing::debug!(
                            target: "player::watchdog",
                            "Watchdog fired for track {:?} in chat {}",
                            watchdog.track_id,
                            self.chat_id
                        );
                        let synthesized = Msg::StreamEnded { track_id: Some(watchdog.track_id) };
                        if self.handle(synthesized).await == Flow::Exit {
                            break;
                        }
                    }
                }
                _ = checkpoint.tick(), if self.playback.is_some() => {
                    self.write_checkpoint().await;
                }
            }
        }

        if let Some(task) = self.resolve_task.take() {
            task.abort();
        }
        tracing::debug!("Actor for chat {} exited", self.chat_id);
    }

    async fn handle(&mut self, msg: Msg) -> Flow {
        match msg {
            Msg::Play(request) => {
                if self.resolve_task.is_some() {
                    // A resolve is in flight; queue this one behind it
                    self.pending.push_back(request);
                } else {
                    self.spawn_resolve(request);
                }
                Flow::Continue
            }
            Msg::Resolved { request, result } => {
                self.resolve_task = None;
                match result {
                    Ok(resolved) => {
                        let track =
                            resolved.into_track(request.requester_id, request.requester_display);
                        self.accept_track(track).await;
                    }
                    Err(e) => {
                        tracing::info!("Resolve failed in chat {}: {}", self.chat_id, e);
                        self.emit_failed(e.into());
                        if self.status == Status::Resolving {
                            self.status = Status::Idle;
                        }
                    }
                }
                if let Some(next) = self.pending.pop_front() {
                    self.spawn_resolve(next);
                }
                self.maybe_exit()
            }
            Msg::PlayLocal { track } => {
                self.accept_track(track).await;
                self.maybe_exit()
            }
            Msg::ResumeSession { checkpoint } => self.resume_session(checkpoint).await,
            Msg::Pause => {
                self.do_pause().await;
                Flow::Continue
            }
            Msg::Resume => self.do_resume().await,
            Msg::Skip => self.do_skip().await,
            Msg::Stop => self.teardown(TeardownKind::Stopped).await,
            Msg::SetLoop(mode) => {
                self.queue.set_loop_mode(mode);
                self.emit(OutboundEvent::LoopModeSet {
                    chat_id: self.chat_id,
                    mode,
                });
                Flow::Continue
            }
            Msg::Shuffle => {
                self.queue.shuffle();
                self.emit(OutboundEvent::Shuffled {
                    chat_id: self.chat_id,
                    upcoming: self.queue.remaining(),
                });
                Flow::Continue
            }
            Msg::QueuePage { page } => {
                let (entries, total_pages) = self.queue.page(page, QUEUE_PAGE_SIZE);
                self.emit(OutboundEvent::QueueView {
                    chat_id: self.chat_id,
                    now_playing: self.queue.current().cloned(),
                    entries,
                    page: page.clamp(1, total_pages),
                    total_pages,
                });
                Flow::Continue
            }
            Msg::StreamEnded { track_id } => self.on_stream_ended(track_id).await,
            Msg::Refresh => {
                self.announce_now_playing();
                Flow::Continue
            }
            Msg::Shutdown => {
                if self.playback.is_some() {
                    // Leave the checkpoint behind; restart-resume consumes it
                    self.write_checkpoint().await;
                }
                Flow::Exit
            }
        }
    }

    fn spawn_resolve(&mut self, request: PlayRequest) {
        let resolver = self.deps.resolver.clone();
        let deadline = self.deps.config.resolve_timeout();
        let tx = self.self_tx.clone();
        let chat_id = self.chat_id;

        self.resolve_task = Some(tokio::spawn(async move {
            let result = match tokio::time::timeout(deadline, resolver.resolve(&request.query)).await
            {
                Ok(result) => result,
                Err(_) => Err(ResolveError::Unavailable(
                    "resolver deadline exceeded".to_string(),
                )),
            };
            // The actor may have torn down while we worked; that is fine
            if tx.send(Msg::Resolved { request, result }).is_err() {
                tracing::debug!("Actor for chat {} gone before resolve completed", chat_id);
            }
        }));

        if self.status == Status::Idle {
            self.status = Status::Resolving;
        }
    }

    /// A resolved (or uploaded) track arrives: enqueue behind an active
    /// session, or start one.
    async fn accept_track(&mut self, track: Track) {
        match self.queue.add(track.clone()) {
            AddOutcome::Full => {
                tracing::info!("Queue full in chat {}, rejecting {:?}", self.chat_id, track.title);
                self.emit(OutboundEvent::QueueFull {
                    chat_id: self.chat_id,
                    title: track.title,
                });
            }
            AddOutcome::Added(position) => {
                if self.playback.is_some() {
                    self.emit(OutboundEvent::AddedToQueue {
                        chat_id: self.chat_id,
                        track,
                        position,
                    });
                } else {
                    self.queue.advance();
                    self.start_current(Duration::ZERO, false).await;
                }
            }
        }
    }

    /// Join the voice chat and start the track under the queue cursor.
    async fn start_current(&mut self, offset: Duration, start_paused: bool) {
        let Some(track) = self.queue.current().cloned() else {
            return;
        };
        self.status = Status::Joining;

        if let Err(e) = self.deps.presence.ensure_ready(self.chat_id).await {
            tracing::warn!("Assistant not ready for chat {}: {}", self.chat_id, e);
            self.emit_failed(e.into());
            self.fail_current();
            return;
        }

        let stream_url = playable_url(&track);
        if let Err(e) = self.join_or_swap(&stream_url, offset.as_secs()).await {
            tracing::warn!("Could not start stream in chat {}: {}", self.chat_id, e);
            self.emit_failed(e.into());
            self.fail_current();
            return;
        }
        self.in_call = true;

        let mut playback = PlaybackState::start(self.chat_id, track, offset);
        if start_paused {
            match self.deps.transport.pause(self.chat_id).await {
                Ok(()) => playback.pause(),
                Err(e) => tracing::warn!(
                    "Could not re-pause resumed stream in chat {}: {}",
                    self.chat_id,
                    e
                ),
            }
        }

        self.status = if playback.is_paused() {
            Status::Paused
        } else {
            Status::Playing
        };
        self.playback = Some(playback);
        self.arm_watchdog();
        self.write_checkpoint().await;
        self.announce_now_playing();
    }

    /// `join`, falling back to a single `change_stream` when the transport
    /// is already in the call.
    async fn join_or_swap(&self, stream_url: &str, seek: u64) -> Result<(), TransportError> {
        if self.in_call {
            return self
                .deps
                .transport
                .change_stream(self.chat_id, stream_url, seek)
                .await;
        }
        match self.deps.transport.join(self.chat_id, stream_url, seek).await {
            Err(TransportError::AlreadyJoined) => {
                tracing::debug!(
                    "Transport already in chat {}, swapping stream instead",
                    self.chat_id
                );
                self.deps
                    .transport
                    .change_stream(self.chat_id, stream_url, seek)
                    .await
            }
            other => other,
        }
    }

    /// Drop the track that failed to start and return to idle.
    fn fail_current(&mut self) {
        if let Some(index) = self.queue.current_index() {
            self.queue.remove(index);
        }
        self.status = Status::Idle;
    }

    async fn do_pause(&mut self) {
        if self.status != Status::Playing {
            // Pause while paused (or with nothing playing) is a no-op
            return;
        }
        if let Err(e) = self.deps.transport.pause(self.chat_id).await {
            tracing::warn!("Pause failed in chat {}: {}", self.chat_id, e);
            self.emit_failed(e.into());
            return;
        }
        if let Some(playback) = self.playback.as_mut() {
            playback.pause();
        }
        self.status = Status::Paused;
        self.watchdog = None;
        self.write_checkpoint().await;
        self.emit(OutboundEvent::Paused {
            chat_id: self.chat_id,
        });
    }

    async fn do_resume(&mut self) -> Flow {
        if self.status != Status::Paused {
            return Flow::Continue;
        }

        // Resuming at or past the end of the track is just the end
        if let Some(playback) = &self.playback
            && playback.remaining() == Some(Duration::ZERO)
        {
            let track_id = playback.track().id.clone();
            self.status = Status::Playing;
            return self.on_stream_ended(Some(track_id)).await;
        }

        if let Err(e) = self.deps.transport.resume(self.chat_id).await {
            tracing::warn!("Resume failed in chat {}: {}", self.chat_id, e);
            self.emit_failed(e.into());
            return Flow::Continue;
        }

        let Some(playback) = self.playback.as_mut() else {
            return Flow::Continue;
        };
        playback.resume();
        let track = playback.track().clone();
        let position_seconds = playback.position_seconds();
        self.status = Status::Playing;
        self.arm_watchdog();
        self.write_checkpoint().await;
        self.emit(OutboundEvent::Resumed {
            chat_id: self.chat_id,
            track,
            position_seconds,
        });
        Flow::Continue
    }

    async fn do_skip(&mut self) -> Flow {
        if self.playback.is_none() {
            // Skip with nothing playing is a no-op
            return Flow::Continue;
        }
        self.watchdog = None;
        let next = self.queue.advance_skipping().cloned();
        match next {
            Some(track) => self.swap_to(track).await,
            None => self.teardown(TeardownKind::Drained).await,
        }
    }

    /// EOF from the transport (`track_id` = None) or the watchdog (Some).
    async fn on_stream_ended(&mut self, track_id: Option<String>) -> Flow {
        let Some(playback) = &self.playback else {
            tracing::debug!(
                "Ignoring end-of-stream for chat {} with no active session",
                self.chat_id
            );
            return Flow::Continue;
        };
        if let Some(id) = &track_id
            && playback.track().id != *id
        {
            // A stale watchdog from a track we already moved past
            tracing::debug!(
                target: "player::watchdog",
                "Ignoring stale end-of-track for {:?} in chat {}",
                id,
                self.chat_id
            );
            return Flow::Continue;
        }
        if self.status != Status::Playing {
            tracing::debug!(
                "Ignoring end-of-stream in chat {} while {:?}",
                self.chat_id,
                self.status
            );
            return Flow::Continue;
        }

        self.watchdog = None;
        let next = self.queue.advance().cloned();
        match next {
            Some(track) => self.swap_to(track).await,
            None => self.teardown(TeardownKind::Drained).await,
        }
    }

    /// Replace the running stream with `track` from its start.
    async fn swap_to(&mut self, track: Track) -> Flow {
        let stream_url = playable_url(&track);
        if let Err(e) = self
            .deps
            .transport
            .change_stream(self.chat_id, &stream_url, 0)
            .await
        {
            tracing::warn!("Stream swap failed in chat {}: {}", self.chat_id, e);
            self.emit_failed(e.into());
            return self.teardown(TeardownKind::Failed).await;
        }

        self.playback = Some(PlaybackState::start(self.chat_id, track, Duration::ZERO));
        self.status = Status::Playing;
        self.arm_watchdog();
        self.write_checkpoint().await;
        self.announce_now_playing();
        Flow::Continue
    }

    /// Re-hydrate a session from a restart checkpoint.
    async fn resume_session(&mut self, checkpoint: Checkpoint) -> Flow {
        let Checkpoint {
            track: mut stored_track,
            position_seconds,
            is_paused,
            ..
        } = checkpoint;
        let offset = Duration::from_secs(position_seconds);

        // A checkpoint at or past the end of a known-length track is over
        if stored_track.duration > 0 && position_seconds >= u64::from(stored_track.duration) {
            tracing::info!(
                "Checkpoint for chat {} is past the end of the track, dropping it",
                self.chat_id
            );
            self.delete_checkpoint().await;
            return Flow::Exit;
        }

        if !stored_track.is_local() {
            // Stream URLs expire; refresh from the stable source address
            let deadline = self.deps.config.resolve_timeout();
            let refreshed = match tokio::time::timeout(
                deadline,
                self.deps.resolver.resolve(&stored_track.source_url),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(ResolveError::Unavailable(
                    "resolver deadline exceeded".to_string(),
                )),
            };

            match refreshed {
                Ok(resolved) => stored_track.stream_url = resolved.stream_url,
                Err(e) => {
                    tracing::warn!(
                        "Could not refresh stream for chat {} on resume: {}",
                        self.chat_id,
                        e
                    );
                    self.emit_failed(e.into());
                    self.delete_checkpoint().await;
                    return Flow::Exit;
                }
            }
        }

        self.queue.add(stored_track);
        self.queue.advance();
        self.start_current(offset, is_paused).await;

        if self.playback.is_none() {
            // Join failed; the failure was announced, drop the stale record
            self.delete_checkpoint().await;
            return Flow::Exit;
        }
        Flow::Continue
    }

    /// Leave the call, clear state, delete the checkpoint, exit.
    async fn teardown(&mut self, kind: TeardownKind) -> Flow {
        self.status = Status::Stopping;
        self.watchdog = None;
        self.pending.clear();
        if let Some(task) = self.resolve_task.take() {
            task.abort();
        }

        if self.in_call {
            if let Err(e) = self.deps.transport.leave(self.chat_id).await {
                tracing::warn!("Failed to leave voice chat {}: {}", self.chat_id, e);
            }
            self.in_call = false;
        }

        self.queue.clear();
        self.playback = None;
        self.delete_checkpoint().await;

        match kind {
            TeardownKind::Stopped => self.emit(OutboundEvent::Stopped {
                chat_id: self.chat_id,
            }),
            TeardownKind::Drained => self.emit(OutboundEvent::Drained {
                chat_id: self.chat_id,
            }),
            TeardownKind::Failed => {}
        }
        Flow::Exit
    }

    /// Exit quietly once nothing is playing, queued, or in flight.
    fn maybe_exit(&self) -> Flow {
        let idle = self.playback.is_none()
            && self.status == Status::Idle
            && self.resolve_task.is_none()
            && self.pending.is_empty()
            && self.queue.is_empty();
        if idle { Flow::Exit } else { Flow::Continue }
    }

    /// (Re-)arm the end-of-track timer for the current playback.
    ///
    /// Live tracks get no timer; only the transport's signal advances them.
    fn arm_watchdog(&mut self) {
        self.watchdog = None;
        let Some(playback) = &self.playback else {
            return;
        };
        if playback.is_paused() {
            return;
        }
        let Some(remaining) = playback.remaining() else {
            return;
        };
        self.watchdog = Some(Watchdog {
            track_id: playback.track().id.clone(),
            deadline: Instant::now() + remaining + WATCHDOG_GRACE,
        });
    }

    fn announce_now_playing(&self) {
        let Some(playback) = &self.playback else {
            return;
        };
        self.emit(OutboundEvent::NowPlaying {
            chat_id: self.chat_id,
            track: playback.track().clone(),
            position_seconds: playback.position_seconds(),
            paused: playback.is_paused(),
        });
    }

    async fn write_checkpoint(&self) {
        let Some(playback) = &self.playback else {
            return;
        };
        let checkpoint = playback.to_checkpoint();
        let value = match serde_json::to_value(&checkpoint) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!("Could not serialize checkpoint for chat {}: {}", self.chat_id, e);
                return;
            }
        };

        let deadline = self.deps.config.storage_timeout();
        let key = checkpoint.key();
        let write = self.deps.storage.set(&key, &value);
        if let Err(e) = storage::with_deadline(deadline, write).await {
            // Not fatal: the next cadence tick retries
            tracing::warn!("Checkpoint write failed for chat {}: {}", self.chat_id, e);
        }
    }

    async fn delete_checkpoint(&self) {
        let deadline = self.deps.config.storage_timeout();
        let key = state_key(self.chat_id);
        let delete = self.deps.storage.delete(&key);
        if let Err(e) = storage::with_deadline(deadline, delete).await {
            tracing::warn!("Checkpoint delete failed for chat {}: {}", self.chat_id, e);
        }
    }

    fn emit(&self, event: OutboundEvent) {
        if self.deps.events.send(event).is_err() {
            tracing::debug!("Event channel closed; dropping effect for chat {}", self.chat_id);
        }
    }

    fn emit_failed(&self, issue: crate::player::events::PlaybackIssue) {
        self.emit(OutboundEvent::PlayFailed {
            chat_id: self.chat_id,
            issue,
        });
    }
}

/// The address the transport should stream: uploaded files play from their
/// local reference, everything else from the resolved stream URL.
fn playable_url(track: &Track) -> String {
    track
        .file_ref
        .clone()
        .unwrap_or_else(|| track.stream_url.clone())
}
