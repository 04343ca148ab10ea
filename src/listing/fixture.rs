//! Fixture-backed `ListingSource` (§1 out-of-scope: real provider scraping
//! is not implemented). Feeds and playlist lookups are served from an
//! in-memory table keyed by source URL, populated by tests or, in
//! production, left empty — the engine still runs, it simply has nothing
//! to fetch for any feed.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use super::{FeedSnapshot, ListedEpisode, ListingError, ListingSource, PlaylistMetadata};
use crate::models::Feed;

#[derive(Debug, Clone, Default)]
pub struct Fixtures {
    snapshots: HashMap<String, FeedSnapshot>,
    playlists: HashMap<String, PlaylistMetadata>,
}

impl Fixtures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, source_url: impl Into<String>, snapshot: FeedSnapshot) -> &mut Self {
        self.snapshots.insert(source_url.into(), snapshot);
        self
    }

    pub fn insert_playlist(&mut self, url: impl Into<String>, metadata: PlaylistMetadata) -> &mut Self {
        self.playlists.insert(url.into(), metadata);
        self
    }
}

pub struct FixtureListingSource {
    fixtures: Fixtures,
}

impl FixtureListingSource {
    pub fn new(fixtures: Fixtures) -> Self {
        Self { fixtures }
    }
}

#[async_trait]
impl ListingSource for FixtureListingSource {
    async fn build(&self, feed: &Feed) -> Result<FeedSnapshot, ListingError> {
        self.fixtures
            .snapshots
            .get(&feed.source_url)
            .cloned()
            .ok_or_else(|| ListingError::SourceFailed {
                provider: feed.provider.to_string(),
                message: format!("no fixture registered for {}", feed.source_url),
            })
    }

    async fn playlist_metadata(&self, url: &str) -> Result<PlaylistMetadata, ListingError> {
        self.fixtures
            .playlists
            .get(url)
            .cloned()
            .ok_or_else(|| ListingError::SourceFailed {
                provider: "unknown".into(),
                message: format!("no playlist fixture registered for {url}"),
            })
    }
}

/// A deterministic snapshot of `count` episodes, `count` seconds apart,
/// used by integration tests that don't care about specific metadata.
pub fn sample_snapshot(count: usize) -> FeedSnapshot {
    let base = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
    FeedSnapshot {
        title: Some("Sample Channel".into()),
        description: Some("A fixture channel".into()),
        cover_art: None,
        author: Some("Sample Author".into()),
        episodes: (0..count)
            .map(|i| ListedEpisode {
                id: format!("ep{i}"),
                title: format!("Episode {i}"),
                description: Some(format!("Description for episode {i}")),
                duration: 120,
                published: base + chrono::Duration::seconds(i as i64 * 3600),
                media_url: format!("https://example.com/videos/ep{i}"),
                thumbnail_url: None,
            })
            .collect(),
    }
}
