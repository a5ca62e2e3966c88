//! Wire format of `yt-dlp --dump-single-json` output.
//!
//! Only the fields the resolver consumes are modeled; everything else in the
//! (large) extractor output is ignored. A search query returns a playlist
//! object whose `entries` hold the actual hits.

use serde::Deserialize;

/// One extracted media object, or a search playlist wrapping them.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Extraction {
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub title: Option<String>,

    /// Seconds; absent for live streams and some extractors
    #[serde(default)]
    pub duration: Option<f64>,

    /// Direct media address for the selected format
    #[serde(default)]
    pub url: Option<String>,

    /// Stable page address
    #[serde(default)]
    pub webpage_url: Option<String>,

    #[serde(default)]
    pub uploader: Option<String>,

    #[serde(default)]
    pub thumbnail: Option<String>,

    #[serde(default)]
    pub is_live: Option<bool>,

    /// Present when the query was a search/playlist
    #[serde(default)]
    pub entries: Option<Vec<Extraction>>,
}

impl Extraction {
    /// Unwrap a search result to its first hit; pass anything else through.
    pub fn into_first_hit(self) -> Option<Extraction> {
        match self.entries {
            Some(entries) => entries.into_iter().next(),
            None => Some(self),
        }
    }

    /// Duration in whole seconds, 0 for live/unknown.
    pub fn duration_seconds(&self) -> u32 {
        if self.is_live == Some(true) {
            return 0;
        }
        self.duration.map(|d| d.max(0.0) as u32).unwrap_or(0)
    }
}
