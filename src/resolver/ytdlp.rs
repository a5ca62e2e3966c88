//! `yt-dlp` subprocess backend.
//!
//! The extractor is treated as a black box: one process invocation per
//! resolution, JSON metadata on stdout, diagnostics on stderr. Free-text
//! queries go through the `ytsearch1:` pseudo-URL and take the first hit.
//!
//! The child is spawned with `kill_on_drop`, so cancelling the resolve
//! future (engine teardown, deadline) also reaps the process.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use super::dto::Extraction;
use super::{ResolveError, ResolvedTrack, Resolver};

/// Transient failures are retried this many times beyond the first attempt.
const MAX_RETRIES: u32 = 2;

/// Base delay of the exponential retry backoff.
const RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Resolver backed by the `yt-dlp` extractor.
#[derive(Debug, Clone)]
pub struct YtDlpResolver {
    bin: String,
}

impl YtDlpResolver {
    /// Create a resolver invoking the given extractor binary.
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }

    /// Build the extractor target for a query: URLs pass through, anything
    /// else becomes a first-hit search.
    fn target_for(query: &str) -> String {
        if query.starts_with("http://") || query.starts_with("https://") {
            query.to_string()
        } else {
            format!("ytsearch1:{query}")
        }
    }

    async fn extract_once(&self, query: &str) -> Result<ResolvedTrack, ResolveError> {
        let target = Self::target_for(query);

        let output = Command::new(&self.bin)
            .args([
                "--dump-single-json",
                "--no-playlist",
                "--no-warnings",
                "-f",
                "bestaudio/best",
                &target,
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ResolveError::Unavailable(format!("failed to spawn {}: {e}", self.bin)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::debug!(target: "resolver::ytdlp", "extractor failed: {}", stderr.trim());
            return Err(classify_failure(&stderr));
        }

        let extraction: Extraction = serde_json::from_slice(&output.stdout)
            .map_err(|e| ResolveError::Unavailable(format!("bad extractor output: {e}")))?;

        let hit = extraction.into_first_hit().ok_or(ResolveError::NotFound)?;

        let stream_url = hit
            .url
            .clone()
            .ok_or_else(|| ResolveError::Unavailable("extractor output has no stream url".into()))?;

        Ok(ResolvedTrack {
            id: hit.id.clone().unwrap_or_else(|| target.clone()),
            title: hit.title.clone().unwrap_or_else(|| "Unknown title".to_string()),
            duration: hit.duration_seconds(),
            stream_url,
            source_url: hit.webpage_url.clone().unwrap_or(target),
            uploader: hit.uploader,
            thumbnail: hit.thumbnail,
        })
    }
}

#[async_trait]
impl Resolver for YtDlpResolver {
    async fn resolve(&self, query: &str) -> Result<ResolvedTrack, ResolveError> {
        let mut attempt = 0;
        loop {
            match self.extract_once(query).await {
                Ok(track) => return Ok(track),
                Err(ResolveError::Unavailable(reason)) if attempt < MAX_RETRIES => {
                    let delay = RETRY_BACKOFF * 2u32.pow(attempt);
                    attempt += 1;
                    tracing::warn!(
                        "Resolve attempt {} for {:?} failed ({}), retrying in {:?}",
                        attempt,
                        query,
                        reason,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Map extractor stderr to an error kind.
fn classify_failure(stderr: &str) -> ResolveError {
    let lower = stderr.to_lowercase();

    if lower.contains("no video results")
        || lower.contains("unsupported url")
        || lower.contains("is not a valid url")
        || lower.contains("http error 404")
    {
        return ResolveError::NotFound;
    }

    if lower.contains("sign in")
        || lower.contains("private video")
        || lower.contains("video unavailable")
        || lower.contains("age-restricted")
        || lower.contains("http error 403")
    {
        return ResolveError::Forbidden(first_error_line(stderr));
    }

    ResolveError::Unavailable(first_error_line(stderr))
}

/// First `ERROR:` line of the diagnostics, or a trimmed fallback.
fn first_error_line(stderr: &str) -> String {
    stderr
        .lines()
        .find(|l| l.starts_with("ERROR:"))
        .unwrap_or_else(|| stderr.lines().next().unwrap_or("unknown extractor error"))
        .trim()
        .to_string()
}
