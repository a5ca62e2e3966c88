//! Media resolution.
//!
//! Turns a user query - a URL or a free-text search phrase - into a playable
//! [`ResolvedTrack`] carrying a direct stream address and display metadata.
//! The default backend shells out to `yt-dlp`; see [`ytdlp`].
//!
//! Resolution performs network I/O and can block for seconds, so the engine
//! always runs it off its critical path and applies the configured deadline.
//! Dropping the returned future cancels the work.

pub mod dto;
mod ytdlp;

pub use ytdlp::YtDlpResolver;

use async_trait::async_trait;

use crate::model::{Track, UserId};

/// Resolution errors.
///
/// `Unavailable` covers transient extractor and network trouble and is the
/// only kind worth retrying; the other two are verdicts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("no results for the query")]
    NotFound,

    #[error("extractor unavailable: {0}")]
    Unavailable(String),

    #[error("source refused the request: {0}")]
    Forbidden(String),
}

/// A resolved media item, not yet tied to a requester.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTrack {
    /// Source-stable identifier
    pub id: String,
    /// Display title
    pub title: String,
    /// Duration in seconds; 0 = live or unknown
    pub duration: u32,
    /// Direct media address (may expire)
    pub stream_url: String,
    /// Stable, human-visitable address
    pub source_url: String,
    /// Channel/uploader name
    pub uploader: Option<String>,
    /// Thumbnail address
    pub thumbnail: Option<String>,
}

impl ResolvedTrack {
    /// Attach the requesting user, producing a queueable [`Track`].
    pub fn into_track(self, requester_id: UserId, requester_display: String) -> Track {
        Track {
            id: self.id,
            title: self.title,
            duration: self.duration,
            source_url: self.source_url,
            stream_url: self.stream_url,
            file_ref: None,
            requester_id,
            requester_display,
            uploader: self.uploader,
            thumbnail: self.thumbnail,
        }
    }
}

/// Query-to-track resolution capability.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Resolve `query` to the best single match.
    ///
    /// `query` is either a URL (resolved directly) or a search phrase
    /// (resolved to its first hit).
    async fn resolve(&self, query: &str) -> Result<ResolvedTrack, ResolveError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_track_carries_requester() {
        let resolved = ResolvedTrack {
            id: "abc".to_string(),
            title: "Song".to_string(),
            duration: 180,
            stream_url: "https://cdn.example/a.m4a".to_string(),
            source_url: "https://example.com/watch?v=abc".to_string(),
            uploader: None,
            thumbnail: None,
        };

        let track = resolved.into_track(7, "Ada".to_string());
        assert_eq!(track.requester_id, 7);
        assert_eq!(track.requester_display, "Ada");
        assert_eq!(track.file_ref, None);
        assert!(!track.is_live());
    }
}
