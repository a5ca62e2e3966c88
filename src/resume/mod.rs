//! Restart resume.
//!
//! Runs once at process start, after storage is open: every persisted
//! checkpoint becomes a re-hydrated playback session. Malformed records and
//! file-backed tracks whose file vanished are dropped on the spot; healthy
//! ones get a best-effort announcement and an actor seeded at the saved
//! position (the actor itself refreshes the expired stream URL before
//! joining). A short stagger between resumes keeps a restart from hammering
//! the platform with simultaneous joins.

use std::path::Path;
use std::sync::Arc;

use crate::config::Config;
use crate::facade::format;
use crate::model::{Checkpoint, STATE_KEY_PREFIX};
use crate::platform::Gateway;
use crate::player::{PlaybackIssue, PlayerRegistry};
use crate::storage::{self, StateStore};

/// Scan storage and resume every valid checkpointed session.
///
/// Returns the number of sessions handed to the engine.
pub async fn resume_all(
    registry: &PlayerRegistry,
    store: &Arc<dyn StateStore>,
    gateway: &Arc<dyn Gateway>,
    config: &Config,
) -> usize {
    let entries = match storage::with_deadline(
        config.storage_timeout(),
        store.scan(STATE_KEY_PREFIX),
    )
    .await
    {
        Ok(entries) => entries,
        Err(e) => {
            tracing::error!("Could not scan persisted state, resuming nothing: {}", e);
            return 0;
        }
    };

    if entries.is_empty() {
        tracing::info!("No saved playback sessions to resume");
        return 0;
    }
    tracing::info!("Found {} saved playback session(s), resuming", entries.len());

    let mut resumed = 0;
    let total = entries.len();
    for (index, (key, value)) in entries.into_iter().enumerate() {
        let checkpoint: Checkpoint = match serde_json::from_value(value) {
            Ok(checkpoint) => checkpoint,
            Err(e) => {
                tracing::warn!("Dropping malformed checkpoint {:?}: {}", key, e);
                delete_record(store, config, &key).await;
                continue;
            }
        };

        // Uploaded audio has nothing to re-resolve: if the file is gone,
        // so is the session.
        if let Some(file_ref) = &checkpoint.track.file_ref
            && !Path::new(file_ref).exists()
        {
            tracing::warn!(
                "Local file {:?} for chat {} is gone, dropping its checkpoint",
                file_ref,
                checkpoint.chat_id
            );
            delete_record(store, config, &key).await;
            let issue = PlaybackIssue::MissingLocalFile {
                path: file_ref.clone(),
            };
            let text = format::describe_issue(&issue);
            if let Err(e) = gateway.send_message(checkpoint.chat_id, &text, None).await {
                tracing::debug!("Resume notice failed for chat {}: {}", checkpoint.chat_id, e);
            }
            continue;
        }

        // Best-effort heads-up; resuming proceeds regardless
        let announcement = format::resume_announcement(&checkpoint);
        if let Err(e) = gateway
            .send_message(checkpoint.chat_id, &announcement, None)
            .await
        {
            tracing::debug!(
                "Resume announcement failed for chat {}: {}",
                checkpoint.chat_id,
                e
            );
        }

        registry.resume_session(checkpoint);
        resumed += 1;

        if index + 1 < total {
            tokio::time::sleep(config.resume_stagger()).await;
        }
    }
    resumed
}

async fn delete_record(store: &Arc<dyn StateStore>, config: &Config, key: &str) {
    if let Err(e) = storage::with_deadline(config.storage_timeout(), store.delete(key)).await {
        tracing::warn!("Could not delete record {:?}: {}", key, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::state_key;
    use crate::player::{OutboundEvent, PlayerRegistry};
    use crate::presence::Presence;
    use crate::storage::MemoryStore;
    use crate::test_utils::{
        MockGateway, MockResolver, MockTransport, TransportCall, expect_event, fixture_resolved,
        fixture_track,
    };
    use serde_json::json;
    use tokio::sync::mpsc;

    struct Harness {
        registry: PlayerRegistry,
        events: mpsc::UnboundedReceiver<OutboundEvent>,
        store: Arc<dyn StateStore>,
        gateway: Arc<MockGateway>,
        gateway_dyn: Arc<dyn Gateway>,
        resolver: Arc<MockResolver>,
        transport: Arc<MockTransport>,
        config: Config,
    }

    fn harness() -> Harness {
        let config = Arc::new(Config::default());
        let store: Arc<dyn StateStore> = Arc::new(MemoryStore::new());
        let resolver = Arc::new(MockResolver::new());
        let transport = Arc::new(MockTransport::new());
        let gateway = Arc::new(MockGateway::new());
        let gateway_dyn: Arc<dyn Gateway> = gateway.clone();
        let presence = Arc::new(Presence::new(gateway_dyn.clone()));

        let (registry, events) = PlayerRegistry::new(
            config.clone(),
            store.clone(),
            resolver.clone(),
            transport.clone(),
            presence,
        );
        Harness {
            registry,
            events,
            store,
            gateway,
            gateway_dyn,
            resolver,
            transport,
            config: Config::default(),
        }
    }

    fn checkpoint(chat_id: i64, position: u64, paused: bool) -> Checkpoint {
        let mut track = fixture_track("saved");
        track.duration = 300;
        Checkpoint {
            chat_id,
            track,
            position_seconds: position,
            is_paused: paused,
            saved_at_unix: 1_700_000_000,
        }
    }

    async fn put(store: &Arc<dyn StateStore>, cp: &Checkpoint) {
        store
            .set(&cp.key(), &serde_json::to_value(cp).unwrap())
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_rejoins_at_saved_position() {
        let mut h = harness();
        put(&h.store, &checkpoint(100, 60, false)).await;
        // The stored stream URL is stale; the resolver hands back a fresh one
        let mut fresh = fixture_resolved("saved", 300);
        fresh.stream_url = "https://cdn.example/fresh.m4a".to_string();
        h.resolver.push_ok(fresh);

        let resumed = resume_all(&h.registry, &h.store, &h.gateway_dyn, &h.config).await;
        assert_eq!(resumed, 1);

        match expect_event(&mut h.events).await {
            OutboundEvent::NowPlaying {
                chat_id,
                track,
                position_seconds,
                paused,
            } => {
                assert_eq!(chat_id, 100);
                assert_eq!(track.id, "saved");
                assert_eq!(position_seconds, 60);
                assert!(!paused);
            }
            other => panic!("expected NowPlaying, got {other:?}"),
        }

        // Joined with the refreshed URL and the saved offset
        let calls = h.transport.calls();
        match &calls[0] {
            TransportCall::Join {
                chat_id,
                stream_url,
                seek,
            } => {
                assert_eq!(*chat_id, 100);
                assert_eq!(stream_url, "https://cdn.example/fresh.m4a");
                assert_eq!(*seek, 60);
            }
            other => panic!("expected Join, got {other:?}"),
        }

        // The chat was told about the restart
        assert!(
            h.gateway
                .messages()
                .iter()
                .any(|m| m.chat_id == 100 && m.text.contains("resuming"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_paused_checkpoint_resumes_paused() {
        let mut h = harness();
        put(&h.store, &checkpoint(100, 45, true)).await;
        h.resolver.push_ok(fixture_resolved("saved", 300));

        resume_all(&h.registry, &h.store, &h.gateway_dyn, &h.config).await;

        match expect_event(&mut h.events).await {
            OutboundEvent::NowPlaying {
                position_seconds,
                paused,
                ..
            } => {
                assert_eq!(position_seconds, 45);
                assert!(paused);
            }
            other => panic!("expected NowPlaying, got {other:?}"),
        }
        assert!(
            h.transport
                .calls()
                .iter()
                .any(|c| matches!(c, TransportCall::Pause(100)))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_checkpoint_is_deleted() {
        let h = harness();
        h.store
            .set("state_100", &json!({"chat_id": 100, "garbage": true}))
            .await
            .unwrap();

        let resumed =
            resume_all(&h.registry, &h.store, &h.gateway_dyn, &h.config).await;
        assert_eq!(resumed, 0);
        assert!(h.store.get("state_100").await.unwrap().is_none());
        assert!(!h.registry.is_active(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_local_file_is_dropped_and_announced() {
        let h = harness();
        let mut cp = checkpoint(100, 10, false);
        cp.track.file_ref = Some("/definitely/not/here.m4a".to_string());
        put(&h.store, &cp).await;

        let resumed =
            resume_all(&h.registry, &h.store, &h.gateway_dyn, &h.config).await;
        assert_eq!(resumed, 0);
        assert!(h.store.get(&state_key(100)).await.unwrap().is_none());
        assert!(
            h.gateway
                .messages()
                .iter()
                .any(|m| m.text.contains("gone"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_drops_checkpoint() {
        let mut h = harness();
        put(&h.store, &checkpoint(100, 60, false)).await;
        h.resolver
            .push_err(crate::resolver::ResolveError::Unavailable("down".into()));

        resume_all(&h.registry, &h.store, &h.gateway_dyn, &h.config).await;

        assert!(matches!(
            expect_event(&mut h.events).await,
            OutboundEvent::PlayFailed { chat_id: 100, .. }
        ));
        // The stale record does not survive to fail again on the next boot
        for _ in 0..200 {
            if h.store.get(&state_key(100)).await.unwrap().is_none() {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("stale checkpoint still present");
    }

    #[tokio::test(start_paused = true)]
    async fn test_checkpoint_past_track_end_is_dropped() {
        let mut h = harness();
        put(&h.store, &checkpoint(100, 300, false)).await;

        resume_all(&h.registry, &h.store, &h.gateway_dyn, &h.config).await;

        for _ in 0..200 {
            if h.store.get(&state_key(100)).await.unwrap().is_none() && !h.registry.is_active(100)
            {
                // No playback events were emitted
                assert!(h.events.try_recv().is_err());
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("finished checkpoint was not cleaned up");
    }

    #[tokio::test(start_paused = true)]
    async fn test_multiple_resumes_are_staggered() {
        let mut h = harness();
        put(&h.store, &checkpoint(100, 10, false)).await;
        put(&h.store, &checkpoint(200, 20, false)).await;
        h.resolver.push_ok(fixture_resolved("saved", 300));
        h.resolver.push_ok(fixture_resolved("saved", 300));

        let started = tokio::time::Instant::now();
        let resumed =
            resume_all(&h.registry, &h.store, &h.gateway_dyn, &h.config).await;
        assert_eq!(resumed, 2);
        // One stagger gap between the two resumes
        assert!(started.elapsed() >= std::time::Duration::from_secs(2));

        assert!(matches!(
            expect_event(&mut h.events).await,
            OutboundEvent::NowPlaying { .. }
        ));
        assert!(matches!(
            expect_event(&mut h.events).await,
            OutboundEvent::NowPlaying { .. }
        ));
    }
}
