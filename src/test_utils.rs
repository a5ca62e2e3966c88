//! Shared mock capabilities and fixtures for crescendo tests.
//!
//! Every external seam the engine depends on - resolver, voice transport,
//! platform gateway - has a scriptable mock here, so actor and facade tests
//! run entirely on the paused tokio clock.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::model::{ChatId, MessageId, Track};
use crate::platform::{Controls, Gateway, Membership, PlatformError};
use crate::player::OutboundEvent;
use crate::resolver::{ResolveError, ResolvedTrack, Resolver};
use crate::transport::{TransportError, VoiceTransport};

/// Install a log subscriber so `RUST_LOG=crescendo=debug cargo test` shows
/// engine traces. Safe to call from every test; only the first wins.
pub fn init_test_logging() {
    use tracing_subscriber::{EnvFilter, fmt};
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A plain 3-minute track with the given id.
pub fn fixture_track(id: &str) -> Track {
    Track {
        id: id.to_string(),
        title: format!("Track {id}"),
        duration: 180,
        source_url: format!("https://media.example/watch/{id}"),
        stream_url: format!("https://cdn.example/{id}.m4a"),
        file_ref: None,
        requester_id: 1,
        requester_display: "Tester".to_string(),
        uploader: None,
        thumbnail: None,
    }
}

/// A resolver result with the given id and duration.
pub fn fixture_resolved(id: &str, duration: u32) -> ResolvedTrack {
    ResolvedTrack {
        id: id.to_string(),
        title: format!("Track {id}"),
        duration,
        stream_url: format!("https://cdn.example/{id}.m4a"),
        source_url: format!("https://media.example/watch/{id}"),
        uploader: None,
        thumbnail: None,
    }
}

/// Receive the next engine event or panic.
pub async fn expect_event(rx: &mut mpsc::UnboundedReceiver<OutboundEvent>) -> OutboundEvent {
    tokio::time::timeout(Duration::from_secs(3600), rx.recv())
        .await
        .expect("no engine event within the wait window")
        .expect("event channel closed")
}

// ============================================================================
// Resolver
// ============================================================================

/// Scriptable resolver: queued results pop FIFO; an empty script resolves
/// the query itself as a 3-minute track.
#[derive(Default)]
pub struct MockResolver {
    results: Mutex<VecDeque<Result<ResolvedTrack, ResolveError>>>,
    delay: Mutex<Option<Duration>>,
}

impl MockResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_ok(&self, resolved: ResolvedTrack) {
        self.results.lock().push_back(Ok(resolved));
    }

    pub fn push_err(&self, error: ResolveError) {
        self.results.lock().push_back(Err(error));
    }

    /// Make every resolution take this long (virtual time).
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }
}

#[async_trait]
impl Resolver for MockResolver {
    async fn resolve(&self, query: &str) -> Result<ResolvedTrack, ResolveError> {
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let scripted = self.results.lock().pop_front();
        match scripted {
            Some(result) => result,
            None => Ok(fixture_resolved(query, 180)),
        }
    }
}

// ============================================================================
// Voice transport
// ============================================================================

/// One recorded transport invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Join {
        chat_id: ChatId,
        stream_url: String,
        seek: u64,
    },
    ChangeStream {
        chat_id: ChatId,
        stream_url: String,
        seek: u64,
    },
    Pause(ChatId),
    Resume(ChatId),
    Leave(ChatId),
}

/// Records every call; `join`/`change_stream` outcomes are scriptable.
#[derive(Default)]
pub struct MockTransport {
    calls: Mutex<Vec<TransportCall>>,
    join_results: Mutex<VecDeque<Result<(), TransportError>>>,
    change_results: Mutex<VecDeque<Result<(), TransportError>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_join_result(&self, result: Result<(), TransportError>) {
        self.join_results.lock().push_back(result);
    }

    pub fn push_change_result(&self, result: Result<(), TransportError>) {
        self.change_results.lock().push_back(result);
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl VoiceTransport for MockTransport {
    async fn join(
        &self,
        chat_id: ChatId,
        stream_url: &str,
        seek_seconds: u64,
    ) -> Result<(), TransportError> {
        self.calls.lock().push(TransportCall::Join {
            chat_id,
            stream_url: stream_url.to_string(),
            seek: seek_seconds,
        });
        self.join_results.lock().pop_front().unwrap_or(Ok(()))
    }

    async fn change_stream(
        &self,
        chat_id: ChatId,
        stream_url: &str,
        seek_seconds: u64,
    ) -> Result<(), TransportError> {
        self.calls.lock().push(TransportCall::ChangeStream {
            chat_id,
            stream_url: stream_url.to_string(),
            seek: seek_seconds,
        });
        self.change_results.lock().pop_front().unwrap_or(Ok(()))
    }

    async fn pause(&self, chat_id: ChatId) -> Result<(), TransportError> {
        self.calls.lock().push(TransportCall::Pause(chat_id));
        Ok(())
    }

    async fn resume(&self, chat_id: ChatId) -> Result<(), TransportError> {
        self.calls.lock().push(TransportCall::Resume(chat_id));
        Ok(())
    }

    async fn leave(&self, chat_id: ChatId) -> Result<(), TransportError> {
        self.calls.lock().push(TransportCall::Leave(chat_id));
        Ok(())
    }
}

// ============================================================================
// Platform gateway
// ============================================================================

/// A message posted through the mock gateway.
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub text: String,
    pub controls: Option<Controls>,
}

/// An edit applied through the mock gateway.
#[derive(Debug, Clone)]
pub struct EditedMessage {
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub text: String,
    pub controls: Option<Controls>,
}

/// Scriptable gateway: membership and invite behavior are configurable,
/// messages and administrative calls are recorded.
pub struct MockGateway {
    membership: Mutex<Membership>,
    chat_handle: Mutex<Option<String>>,
    invite_create_failure: Mutex<Option<PlatformError>>,
    invite_join_failure: Mutex<Option<PlatformError>>,
    handle_joins: Mutex<Vec<String>>,
    invite_joins: Mutex<usize>,
    revoked_links: Mutex<usize>,
    promotions: Mutex<usize>,
    messages: Mutex<Vec<SentMessage>>,
    edits: Mutex<Vec<EditedMessage>>,
    next_message_id: Mutex<MessageId>,
}

impl Default for MockGateway {
    fn default() -> Self {
        Self {
            membership: Mutex::new(Membership::Member {
                can_manage_voice: true,
            }),
            chat_handle: Mutex::new(None),
            invite_create_failure: Mutex::new(None),
            invite_join_failure: Mutex::new(None),
            handle_joins: Mutex::new(Vec::new()),
            invite_joins: Mutex::new(0),
            revoked_links: Mutex::new(0),
            promotions: Mutex::new(0),
            messages: Mutex::new(Vec::new()),
            edits: Mutex::new(Vec::new()),
            next_message_id: Mutex::new(1),
        }
    }
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_membership(&self, membership: Membership) {
        *self.membership.lock() = membership;
    }

    pub fn set_chat_handle(&self, handle: Option<String>) {
        *self.chat_handle.lock() = handle;
    }

    pub fn fail_invite_create_with(&self, error: PlatformError) {
        *self.invite_create_failure.lock() = Some(error);
    }

    pub fn fail_invite_join_with(&self, error: PlatformError) {
        *self.invite_join_failure.lock() = Some(error);
    }

    pub fn handle_joins(&self) -> Vec<String> {
        self.handle_joins.lock().clone()
    }

    pub fn invite_joins(&self) -> usize {
        *self.invite_joins.lock()
    }

    pub fn revoked_links(&self) -> usize {
        *self.revoked_links.lock()
    }

    pub fn promotions(&self) -> usize {
        *self.promotions.lock()
    }

    pub fn messages(&self) -> Vec<SentMessage> {
        self.messages.lock().clone()
    }

    pub fn edits(&self) -> Vec<EditedMessage> {
        self.edits.lock().clone()
    }
}

#[async_trait]
impl Gateway for MockGateway {
    async fn send_message(
        &self,
        chat_id: ChatId,
        text: &str,
        controls: Option<Controls>,
    ) -> Result<MessageId, PlatformError> {
        let message_id = {
            let mut next = self.next_message_id.lock();
            *next += 1;
            *next
        };
        self.messages.lock().push(SentMessage {
            chat_id,
            message_id,
            text: text.to_string(),
            controls,
        });
        Ok(message_id)
    }

    async fn edit_message(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        text: &str,
        controls: Option<Controls>,
    ) -> Result<(), PlatformError> {
        self.edits.lock().push(EditedMessage {
            chat_id,
            message_id,
            text: text.to_string(),
            controls,
        });
        Ok(())
    }

    async fn assistant_membership(&self, _chat_id: ChatId) -> Result<Membership, PlatformError> {
        Ok(*self.membership.lock())
    }

    async fn chat_handle(&self, _chat_id: ChatId) -> Result<Option<String>, PlatformError> {
        Ok(self.chat_handle.lock().clone())
    }

    async fn assistant_join_by_handle(&self, handle: &str) -> Result<(), PlatformError> {
        self.handle_joins.lock().push(handle.to_string());
        Ok(())
    }

    async fn create_invite_link(&self, chat_id: ChatId) -> Result<String, PlatformError> {
        if let Some(error) = self.invite_create_failure.lock().clone() {
            return Err(error);
        }
        Ok(format!("https://invite.example/{chat_id}"))
    }

    async fn assistant_join_by_invite(&self, _link: &str) -> Result<(), PlatformError> {
        if let Some(error) = self.invite_join_failure.lock().clone() {
            return Err(error);
        }
        *self.invite_joins.lock() += 1;
        Ok(())
    }

    async fn revoke_invite_link(&self, _chat_id: ChatId, _link: &str) -> Result<(), PlatformError> {
        *self.revoked_links.lock() += 1;
        Ok(())
    }

    async fn promote_assistant(&self, _chat_id: ChatId) -> Result<(), PlatformError> {
        *self.promotions.lock() += 1;
        Ok(())
    }
}
