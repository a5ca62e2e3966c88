//! The command facade.
//!
//! The thin layer between the platform's command handlers and the engine:
//! it validates and rate limits requests on the way in, and on the way out
//! it consumes the engine's event stream and drives the gateway - posting
//! announcements and owning each chat's now-playing message (posted once,
//! then edited as the session moves).
//!
//! The facade never touches queue or playback state itself; everything goes
//! through the chat's mailbox, which is what keeps replies and keyboard
//! edits in submission order.

pub mod format;

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::Config;
use crate::error::Error;
use crate::model::{ChatId, LoopMode, MessageId, Track, UserId};
use crate::platform::{ControlAction, Gateway};
use crate::player::{OutboundEvent, PlayerRegistry};

/// Typed command surface over the playback engine.
pub struct CommandFacade {
    registry: PlayerRegistry,
    gateway: Arc<dyn Gateway>,
    limiter: RateLimiter,
    pump: JoinHandle<()>,
}

impl CommandFacade {
    /// Wire the facade to the engine's event stream and start the outbound
    /// pump.
    pub fn new(
        registry: PlayerRegistry,
        events: mpsc::UnboundedReceiver<OutboundEvent>,
        gateway: Arc<dyn Gateway>,
        config: Arc<Config>,
    ) -> Self {
        let pump = EventPump {
            gateway: gateway.clone(),
            now_playing: HashMap::new(),
        };
        let pump = tokio::spawn(pump.run(events));

        Self {
            registry,
            gateway,
            limiter: RateLimiter::new(config.rate_limit()),
            pump,
        }
    }

    /// `play <query>`: resolve and play or enqueue.
    pub async fn play(
        &self,
        chat_id: ChatId,
        requester_id: UserId,
        requester_display: &str,
        query: &str,
    ) -> crate::Result<()> {
        self.check_rate(chat_id, requester_id).await?;
        self.registry.play(
            chat_id,
            query.to_string(),
            requester_id,
            requester_display.to_string(),
        );
        Ok(())
    }

    /// Play or enqueue an uploaded audio file.
    pub async fn play_file(
        &self,
        chat_id: ChatId,
        requester_id: UserId,
        requester_display: &str,
        file_ref: &str,
        title: &str,
        duration: u32,
    ) -> crate::Result<()> {
        self.check_rate(chat_id, requester_id).await?;
        let track = Track {
            id: file_ref.to_string(),
            title: title.to_string(),
            duration,
            source_url: file_ref.to_string(),
            stream_url: file_ref.to_string(),
            file_ref: Some(file_ref.to_string()),
            requester_id,
            requester_display: requester_display.to_string(),
            uploader: None,
            thumbnail: None,
        };
        self.registry.play_local(chat_id, track);
        Ok(())
    }

    pub async fn pause(&self, chat_id: ChatId) {
        if !self.registry.pause(chat_id) {
            self.reply_nothing_playing(chat_id).await;
        }
    }

    pub async fn resume(&self, chat_id: ChatId) {
        if !self.registry.resume(chat_id) {
            self.reply_nothing_playing(chat_id).await;
        }
    }

    pub async fn skip(&self, chat_id: ChatId) {
        if !self.registry.skip(chat_id) {
            self.reply_nothing_playing(chat_id).await;
        }
    }

    /// Stop and tear the session down. A stop with nothing playing is a
    /// quiet confirmation, not an error.
    pub async fn stop(&self, chat_id: ChatId) {
        if !self.registry.stop(chat_id) {
            self.reply_nothing_playing(chat_id).await;
        }
    }

    pub async fn shuffle(&self, chat_id: ChatId) {
        if !self.registry.shuffle(chat_id) {
            self.reply_nothing_playing(chat_id).await;
        }
    }

    pub async fn set_loop(&self, chat_id: ChatId, mode: LoopMode) {
        if !self.registry.set_loop(chat_id, mode) {
            self.reply_nothing_playing(chat_id).await;
        }
    }

    /// `queue`: show a page of the queue.
    pub async fn queue(&self, chat_id: ChatId, page: usize) {
        if !self.registry.queue_page(chat_id, page) {
            self.reply_nothing_playing(chat_id).await;
        }
    }

    /// Dispatch a pressed control button.
    pub async fn handle_control(&self, chat_id: ChatId, action: ControlAction) {
        match action {
            ControlAction::Pause => self.pause(chat_id).await,
            ControlAction::Resume => self.resume(chat_id).await,
            ControlAction::Skip => self.skip(chat_id).await,
            ControlAction::Stop => self.stop(chat_id).await,
            ControlAction::QueuePage(page) => self.queue(chat_id, page).await,
            ControlAction::PlayerView => {
                if !self.registry.refresh(chat_id) {
                    self.reply_nothing_playing(chat_id).await;
                }
            }
            ControlAction::Noop => {}
        }
    }

    async fn check_rate(&self, chat_id: ChatId, requester_id: UserId) -> crate::Result<()> {
        match self.limiter.check(requester_id) {
            Ok(()) => Ok(()),
            Err(retry_in) => {
                self.reply(chat_id, &format::rate_limited_text(retry_in)).await;
                Err(Error::RateLimited { retry_in })
            }
        }
    }

    async fn reply_nothing_playing(&self, chat_id: ChatId) {
        self.reply(chat_id, "Nothing is playing here.").await;
    }

    async fn reply(&self, chat_id: ChatId, text: &str) {
        if let Err(e) = self.gateway.send_message(chat_id, text, None).await {
            tracing::debug!("Could not reply in chat {}: {}", chat_id, e);
        }
    }
}

impl Drop for CommandFacade {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

// ============================================================================
// Rate limiting
// ============================================================================

/// Per-requester minimum interval between play requests.
struct RateLimiter {
    min_interval: Duration,
    last_play: Mutex<HashMap<UserId, Instant>>,
}

impl RateLimiter {
    fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_play: Mutex::new(HashMap::new()),
        }
    }

    /// Ok to proceed, or how long the requester still has to wait.
    fn check(&self, requester_id: UserId) -> Result<(), Duration> {
        if self.min_interval.is_zero() {
            return Ok(());
        }
        let now = Instant::now();
        let mut last_play = self.last_play.lock();
        if let Some(last) = last_play.get(&requester_id) {
            let since = now.duration_since(*last);
            if since < self.min_interval {
                return Err(self.min_interval - since);
            }
        }
        last_play.insert(requester_id, now);
        Ok(())
    }
}

// ============================================================================
// Outbound event pump
// ============================================================================

/// Consumes engine events in order and renders them through the gateway.
struct EventPump {
    gateway: Arc<dyn Gateway>,
    /// The now-playing message per chat, edited in place across the session
    now_playing: HashMap<ChatId, MessageId>,
}

impl EventPump {
    async fn run(mut self, mut events: mpsc::UnboundedReceiver<OutboundEvent>) {
        while let Some(event) = events.recv().await {
            self.render(event).await;
        }
        tracing::debug!("Engine event stream closed, outbound pump exiting");
    }

    async fn render(&mut self, event: OutboundEvent) {
        let chat_id = event.chat_id();
        match event {
            OutboundEvent::NowPlaying {
                track,
                position_seconds,
                paused,
                ..
            } => {
                let text = format::now_playing_text(&track, position_seconds);
                self.upsert_card(chat_id, &text, format::player_controls(paused))
                    .await;
            }
            OutboundEvent::Resumed {
                track,
                position_seconds,
                ..
            } => {
                let text = format::now_playing_text(&track, position_seconds);
                self.upsert_card(chat_id, &text, format::player_controls(false))
                    .await;
            }
            OutboundEvent::AddedToQueue {
                track, position, ..
            } => {
                self.send(chat_id, &format::added_to_queue_text(&track, position), None)
                    .await;
            }
            OutboundEvent::QueueFull { .. } => {
                self.send(chat_id, "The queue is full, try again later.", None)
                    .await;
            }
            OutboundEvent::QueueView {
                now_playing,
                entries,
                page,
                total_pages,
                ..
            } => {
                let text = format::queue_view_text(
                    now_playing.as_ref(),
                    &entries,
                    page,
                    total_pages,
                    crate::player::QUEUE_PAGE_SIZE,
                );
                let controls = format::queue_controls(page, total_pages);
                self.upsert_card(chat_id, &text, controls).await;
            }
            OutboundEvent::Paused { .. } => {
                self.send(chat_id, "Paused.", None).await;
            }
            OutboundEvent::Stopped { .. } => {
                self.now_playing.remove(&chat_id);
                self.send(chat_id, "Stopped and left the voice chat.", None)
                    .await;
            }
            OutboundEvent::Drained { .. } => {
                self.now_playing.remove(&chat_id);
                self.send(chat_id, "Queue finished, leaving the voice chat.", None)
                    .await;
            }
            OutboundEvent::LoopModeSet { mode, .. } => {
                let label = match mode {
                    LoopMode::Off => "off",
                    LoopMode::Track => "track",
                    LoopMode::Queue => "queue",
                };
                self.send(chat_id, &format!("Loop mode: {label}."), None).await;
            }
            OutboundEvent::Shuffled { upcoming, .. } => {
                self.send(
                    chat_id,
                    &format!("Shuffled {upcoming} upcoming track(s)."),
                    None,
                )
                .await;
            }
            OutboundEvent::PlayFailed { issue, .. } => {
                self.send(chat_id, &format::describe_issue(&issue), None).await;
            }
        }
    }

    /// Post the chat's card, or edit it in place if one exists.
    async fn upsert_card(
        &mut self,
        chat_id: ChatId,
        text: &str,
        controls: crate::platform::Controls,
    ) {
        if let Some(&message_id) = self.now_playing.get(&chat_id) {
            match self
                .gateway
                .edit_message(chat_id, message_id, text, Some(controls.clone()))
                .await
            {
                Ok(()) => return,
                Err(e) => {
                    // Message may have been deleted; fall through to a fresh post
                    tracing::debug!("Card edit failed in chat {}: {}", chat_id, e);
                    self.now_playing.remove(&chat_id);
                }
            }
        }
        match self.gateway.send_message(chat_id, text, Some(controls)).await {
            Ok(message_id) => {
                self.now_playing.insert(chat_id, message_id);
            }
            Err(e) => tracing::debug!("Could not post card in chat {}: {}", chat_id, e),
        }
    }

    async fn send(
        &self,
        chat_id: ChatId,
        text: &str,
        controls: Option<crate::platform::Controls>,
    ) {
        if let Err(e) = self.gateway.send_message(chat_id, text, controls).await {
            tracing::debug!("Could not announce in chat {}: {}", chat_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presence::Presence;
    use crate::storage::MemoryStore;
    use crate::test_utils::{MockGateway, MockResolver, MockTransport, fixture_resolved};

    struct Harness {
        facade: CommandFacade,
        gateway: Arc<MockGateway>,
        resolver: Arc<MockResolver>,
    }

    fn harness() -> Harness {
        crate::test_utils::init_test_logging();
        let config = Arc::new(Config::default());
        let storage = Arc::new(MemoryStore::new());
        let resolver = Arc::new(MockResolver::new());
        let transport = Arc::new(MockTransport::new());
        let gateway = Arc::new(MockGateway::new());
        let presence = Arc::new(Presence::new(gateway.clone()));

        let (registry, events) = PlayerRegistry::new(
            config.clone(),
            storage,
            resolver.clone(),
            transport,
            presence,
        );
        let facade = CommandFacade::new(registry, events, gateway.clone(), config);
        Harness {
            facade,
            gateway,
            resolver,
        }
    }

    /// Spin the runtime until `check` passes or give up.
    async fn wait_until(mut check: impl FnMut() -> bool) {
        for _ in 0..500 {
            if check() {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("condition not reached");
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_posts_now_playing_card() {
        let h = harness();
        h.resolver.push_ok(fixture_resolved("song", 180));

        h.facade.play(100, 1, "Ada", "song").await.unwrap();

        wait_until(|| !h.gateway.messages().is_empty()).await;
        let messages = h.gateway.messages();
        assert!(messages[0].text.contains("Now playing: Track song"));
        assert!(messages[0].text.contains("Requested by Ada"));
        let controls = messages[0].controls.as_ref().unwrap();
        assert_eq!(controls.rows[0][0].action, ControlAction::Pause);
    }

    #[tokio::test(start_paused = true)]
    async fn test_enqueue_reports_position() {
        let h = harness();
        h.resolver.push_ok(fixture_resolved("one", 180));
        h.resolver.push_ok(fixture_resolved("two", 180));

        h.facade.play(100, 1, "Ada", "one").await.unwrap();
        wait_until(|| !h.gateway.messages().is_empty()).await;

        h.facade.play(100, 2, "Grace", "two").await.unwrap();
        wait_until(|| h.gateway.messages().len() >= 2).await;

        let messages = h.gateway.messages();
        assert!(messages[1].text.contains("Added to queue at position 2"));
        assert!(messages[1].text.contains("Track two"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_skip_edits_card_in_place() {
        let h = harness();
        h.resolver.push_ok(fixture_resolved("one", 180));
        h.resolver.push_ok(fixture_resolved("two", 180));

        h.facade.play(100, 1, "Ada", "one").await.unwrap();
        wait_until(|| !h.gateway.messages().is_empty()).await;
        h.facade.play(100, 2, "Grace", "two").await.unwrap();
        wait_until(|| h.gateway.messages().len() >= 2).await;

        h.facade.skip(100).await;
        wait_until(|| !h.gateway.edits().is_empty()).await;

        let edits = h.gateway.edits();
        let card_id = h.gateway.messages()[0].message_id;
        assert_eq!(edits[0].message_id, card_id);
        assert!(edits[0].text.contains("Now playing: Track two"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_rejects_rapid_plays() {
        let h = harness();

        h.facade.play(100, 1, "Ada", "first").await.unwrap();
        let err = h.facade.play(100, 1, "Ada", "second").await.unwrap_err();
        assert!(matches!(err, Error::RateLimited { .. }));

        // The user is told how long to wait
        wait_until(|| {
            h.gateway
                .messages()
                .iter()
                .any(|m| m.text.contains("wait"))
        })
        .await;

        // Another user is unaffected
        h.facade.play(100, 2, "Grace", "third").await.unwrap();

        // And the window expires
        tokio::time::advance(Duration::from_secs(3)).await;
        h.facade.play(100, 1, "Ada", "fourth").await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_controls_with_no_session() {
        let h = harness();
        h.facade.pause(100).await;
        wait_until(|| !h.gateway.messages().is_empty()).await;
        assert!(h.gateway.messages()[0].text.contains("Nothing is playing"));

        // Stop with nothing playing is quiet, not an error
        h.facade.stop(100).await;
        wait_until(|| h.gateway.messages().len() >= 2).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_control_button_dispatch() {
        let h = harness();
        h.resolver.push_ok(fixture_resolved("song", 180));

        h.facade.play(100, 1, "Ada", "song").await.unwrap();
        wait_until(|| !h.gateway.messages().is_empty()).await;

        h.facade.handle_control(100, ControlAction::Pause).await;
        wait_until(|| {
            h.gateway
                .messages()
                .iter()
                .any(|m| m.text.contains("Paused"))
        })
        .await;

        h.facade.handle_control(100, ControlAction::Stop).await;
        wait_until(|| {
            h.gateway
                .messages()
                .iter()
                .any(|m| m.text.contains("Stopped"))
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_button_renders_queue_view() {
        let h = harness();
        h.resolver.push_ok(fixture_resolved("one", 180));
        h.resolver.push_ok(fixture_resolved("two", 180));

        h.facade.play(100, 1, "Ada", "one").await.unwrap();
        wait_until(|| !h.gateway.messages().is_empty()).await;
        h.facade.play(100, 2, "Grace", "two").await.unwrap();
        wait_until(|| h.gateway.messages().len() >= 2).await;

        h.facade
            .handle_control(100, ControlAction::QueuePage(1))
            .await;
        wait_until(|| !h.gateway.edits().is_empty()).await;

        let edit = &h.gateway.edits()[0];
        assert!(edit.text.contains("Now playing: Track one"));
        assert!(edit.text.contains("2. Track two"));
        assert!(edit.text.contains("Page 1/1"));
    }
}
