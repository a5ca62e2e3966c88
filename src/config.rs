//! Configuration for the playback service.
//!
//! Settings come from an optional TOML file with environment variables
//! layered on top, so a containerized deployment can run on env alone.
//! Loading never fails: unreadable or partial files fall back to defaults
//! with a logged warning.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Playback engine timing and limits
    pub playback: PlaybackConfig,

    /// Media resolver settings
    pub resolver: ResolverConfig,

    /// State persistence settings
    pub storage: StorageConfig,
}

/// Playback engine timing and limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Seconds between periodic checkpoint writes while a session is active
    pub checkpoint_secs: u64,

    /// Minimum seconds between play requests from the same requester
    pub rate_limit_secs: u64,

    /// Seconds between consecutive session resumes at startup
    pub resume_stagger_secs: u64,

    /// Per-chat queue hard cap
    pub max_queue: usize,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            checkpoint_secs: 15,
            rate_limit_secs: 3,
            resume_stagger_secs: 2,
            max_queue: 50,
        }
    }
}

/// Media resolver settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Deadline for a single resolution attempt, in seconds
    pub timeout_secs: u64,

    /// Extractor binary to invoke
    pub bin: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 20,
            bin: "yt-dlp".to_string(),
        }
    }
}

/// State persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend name: "sqlite" or "memory"
    pub backend: String,

    /// Database file path (sqlite backend; defaults to the OS data dir)
    pub path: Option<PathBuf>,

    /// Deadline for a single storage operation, in seconds
    pub timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: "sqlite".to_string(),
            path: None,
            timeout_secs: 5,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, then apply env overrides.
    ///
    /// A missing or unparseable file yields defaults. Never fails - callers
    /// always get a usable config.
    pub fn load(path: Option<&Path>) -> Config {
        let mut config = match path {
            Some(path) => Self::from_file(path),
            None => Config::default(),
        };
        config.apply_env();
        config
    }

    fn from_file(path: &Path) -> Config {
        if !path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", path);
            return Config::default();
        }

        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded config from {:?}", path);
                    config
                }
                Err(e) => {
                    tracing::error!("Failed to parse config file {:?}: {}", path, e);
                    tracing::warn!("Using default configuration");
                    Config::default()
                }
            },
            Err(e) => {
                tracing::error!("Failed to read config file {:?}: {}", path, e);
                Config::default()
            }
        }
    }

    /// Apply environment variable overrides on top of the current values.
    pub fn apply_env(&mut self) {
        env_u64("CHECKPOINT_SECS", &mut self.playback.checkpoint_secs);
        env_u64("RATE_LIMIT_SECS", &mut self.playback.rate_limit_secs);
        env_u64("RESUME_STAGGER_SECS", &mut self.playback.resume_stagger_secs);
        env_usize("MAX_QUEUE", &mut self.playback.max_queue);
        env_u64("RESOLVE_TIMEOUT_SECS", &mut self.resolver.timeout_secs);
        env_string("YTDLP_BIN", &mut self.resolver.bin);
        env_string("STATE_BACKEND", &mut self.storage.backend);
        env_u64("STORAGE_TIMEOUT_SECS", &mut self.storage.timeout_secs);

        if let Ok(path) = std::env::var("STATE_PATH") {
            self.storage.path = Some(PathBuf::from(path));
        }
    }

    /// Cadence of periodic checkpoint writes.
    pub fn checkpoint_interval(&self) -> Duration {
        Duration::from_secs(self.playback.checkpoint_secs.max(1))
    }

    /// Minimum interval between plays from one requester.
    pub fn rate_limit(&self) -> Duration {
        Duration::from_secs(self.playback.rate_limit_secs)
    }

    /// Delay inserted between session resumes at startup.
    pub fn resume_stagger(&self) -> Duration {
        Duration::from_secs(self.playback.resume_stagger_secs)
    }

    /// Deadline for a single resolution attempt.
    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_secs(self.resolver.timeout_secs.max(1))
    }

    /// Deadline for a single storage operation.
    pub fn storage_timeout(&self) -> Duration {
        Duration::from_secs(self.storage.timeout_secs.max(1))
    }

    /// Database file path for the sqlite backend.
    pub fn state_path(&self) -> PathBuf {
        self.storage.path.clone().unwrap_or_else(default_state_path)
    }
}

/// Default location of the sqlite state file.
pub fn default_state_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("crescendo")
        .join("state.db")
}

fn env_u64(name: &str, slot: &mut u64) {
    if let Ok(raw) = std::env::var(name) {
        match raw.parse() {
            Ok(v) => *slot = v,
            Err(_) => tracing::warn!("Ignoring non-numeric {}={:?}", name, raw),
        }
    }
}

fn env_usize(name: &str, slot: &mut usize) {
    if let Ok(raw) = std::env::var(name) {
        match raw.parse() {
            Ok(v) => *slot = v,
            Err(_) => tracing::warn!("Ignoring non-numeric {}={:?}", name, raw),
        }
    }
}

fn env_string(name: &str, slot: &mut String) {
    if let Ok(raw) = std::env::var(name) {
        if !raw.is_empty() {
            *slot = raw;
        }
    }
}
