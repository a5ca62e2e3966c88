//! Service assembly.
//!
//! Glues the pieces together for an embedding bot: open the configured
//! storage backend, build the resolver, spin up the registry and facade,
//! and resume whatever sessions the previous process left behind. The
//! embedder supplies the two platform-specific capabilities (voice
//! transport and gateway) and wires its command handlers to
//! [`MusicService::commands`] and its transport's end-of-stream signal to
//! [`MusicService::on_stream_end`].

use std::sync::Arc;

use crate::config::Config;
use crate::facade::CommandFacade;
use crate::model::ChatId;
use crate::platform::Gateway;
use crate::player::PlayerRegistry;
use crate::presence::Presence;
use crate::resolver::YtDlpResolver;
use crate::resume;
use crate::storage;
use crate::transport::VoiceTransport;

/// A fully wired playback service.
pub struct MusicService {
    config: Arc<Config>,
    registry: PlayerRegistry,
    facade: CommandFacade,
}

impl MusicService {
    /// Open storage, wire the engine, and resume persisted sessions.
    pub async fn start(
        config: Config,
        transport: Arc<dyn VoiceTransport>,
        gateway: Arc<dyn Gateway>,
    ) -> crate::Result<Self> {
        let config = Arc::new(config);
        let store = storage::open(&config).await?;
        let resolver = Arc::new(YtDlpResolver::new(config.resolver.bin.clone()));
        let presence = Arc::new(Presence::new(gateway.clone()));

        let (registry, events) = PlayerRegistry::new(
            config.clone(),
            store.clone(),
            resolver,
            transport,
            presence,
        );
        let facade = CommandFacade::new(registry.clone(), events, gateway.clone(), config.clone());

        let resumed = resume::resume_all(&registry, &store, &gateway, &config).await;
        if resumed > 0 {
            tracing::info!("Resumed {} playback session(s) from the previous run", resumed);
        }

        Ok(Self {
            config,
            registry,
            facade,
        })
    }

    /// The typed command surface for the platform's handlers.
    pub fn commands(&self) -> &CommandFacade {
        &self.facade
    }

    /// Effective configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Route the transport's end-of-stream signal into the engine.
    pub fn on_stream_end(&self, chat_id: ChatId) {
        self.registry.on_stream_end(chat_id);
    }

    /// Chats with live playback sessions.
    pub fn active_chats(&self) -> Vec<ChatId> {
        self.registry.active_chats()
    }

    /// Graceful shutdown: actors checkpoint and exit; checkpoints stay in
    /// storage so the next start resumes them.
    pub async fn shutdown(&self) {
        self.registry.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MockGateway, MockTransport};

    #[tokio::test(start_paused = true)]
    async fn test_start_with_memory_backend() {
        let mut config = Config::default();
        config.storage.backend = "memory".to_string();

        let service = MusicService::start(
            config,
            Arc::new(MockTransport::new()),
            Arc::new(MockGateway::new()),
        )
        .await
        .unwrap();

        assert!(service.active_chats().is_empty());
        assert_eq!(service.config().playback.max_queue, 50);
        service.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_rejects_unknown_backend() {
        let mut config = Config::default();
        config.storage.backend = "cloud".to_string();

        let result = MusicService::start(
            config,
            Arc::new(MockTransport::new()),
            Arc::new(MockGateway::new()),
        )
        .await;
        assert!(result.is_err());
    }
}
