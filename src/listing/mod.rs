//! Listing Source (§9 provider polymorphism): the provider-specific channel
//! adapters are a black box here — each variant shares the capability set
//! `{ build(feed) -> FeedSnapshot, playlist_metadata(url) }` behind one
//! trait, and the Feed Updater never matches on provider directly. Only a
//! fixture-backed implementation exists; real network scraping is out of
//! scope.

pub mod error;
pub mod fixture;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use error::ListingError;
pub use fixture::{FixtureListingSource, Fixtures};

use crate::models::{Feed, Provider, SortOrder};

#[derive(Debug, Clone)]
pub struct ListedEpisode {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    /// Seconds.
    pub duration: u64,
    pub published: DateTime<Utc>,
    pub media_url: String,
    pub thumbnail_url: Option<String>,
}

/// The channel-level metadata and episode list a listing adapter returns
/// for one feed (§9 `Build(feedConfig) -> FeedSnapshot`).
#[derive(Debug, Clone, Default)]
pub struct FeedSnapshot {
    pub title: Option<String>,
    pub description: Option<String>,
    pub cover_art: Option<String>,
    pub author: Option<String>,
    pub episodes: Vec<ListedEpisode>,
}

/// `PlaylistMetadata(url)` result (§4.5 item 3).
#[derive(Debug, Clone)]
pub struct PlaylistMetadata {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub thumbnails: Vec<String>,
    pub channel: String,
    pub channel_id: String,
    pub channel_url: String,
    pub webpage_url: String,
}

#[async_trait]
pub trait ListingSource: Send + Sync {
    async fn build(&self, feed: &Feed) -> Result<FeedSnapshot, ListingError>;
    async fn playlist_metadata(&self, url: &str) -> Result<PlaylistMetadata, ListingError>;
}

/// Resolves a feed's provider tag to its adapter and applies the
/// page-size/sort contract every adapter shares, so individual
/// `ListingSource` impls only need to return raw episode metadata.
pub struct ListingRegistry {
    sources: HashMap<Provider, Arc<dyn ListingSource>>,
}

impl ListingRegistry {
    pub fn new() -> Self {
        Self {
            sources: HashMap::new(),
        }
    }

    /// Every provider wired to the same fixture-backed adapter — the only
    /// implementation this codebase ships (§1 out-of-scope: real network
    /// scraping).
    pub fn with_fixtures(fixtures: fixture::Fixtures) -> Self {
        let source: Arc<dyn ListingSource> = Arc::new(FixtureListingSource::new(fixtures));
        let mut registry = Self::new();
        for provider in [
            Provider::Youtube,
            Provider::Vimeo,
            Provider::Soundcloud,
            Provider::Twitch,
        ] {
            registry.register(provider, Arc::clone(&source));
        }
        registry
    }

    pub fn register(&mut self, provider: Provider, source: Arc<dyn ListingSource>) {
        self.sources.insert(provider, source);
    }

    fn resolve(&self, provider: Provider) -> Result<&Arc<dyn ListingSource>, ListingError> {
        self.sources
            .get(&provider)
            .ok_or_else(|| ListingError::UnknownProvider(provider.to_string()))
    }

    /// Fetch and bound the remote episode list for `feed`: resolves the
    /// adapter by provider, sorts by `playlist_sort`, and truncates to
    /// `page_size` (§4.6 Stage 1: "bounded to page_size").
    pub async fn build(&self, feed: &Feed) -> Result<FeedSnapshot, ListingError> {
        let source = self.resolve(feed.provider)?;
        let mut snapshot = source.build(feed).await?;
        match feed.playlist_sort {
            SortOrder::Ascending => snapshot.episodes.sort_by_key(|e| e.published),
            SortOrder::Descending => snapshot.episodes.sort_by_key(|e| std::cmp::Reverse(e.published)),
        }
        if feed.page_size > 0 {
            snapshot.episodes.truncate(feed.page_size);
        } else {
            snapshot.episodes.clear();
        }
        Ok(snapshot)
    }

    pub async fn playlist_metadata(
        &self,
        provider: Provider,
        url: &str,
    ) -> Result<PlaylistMetadata, ListingError> {
        self.resolve(provider)?.playlist_metadata(url).await
    }
}

impl Default for ListingRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::feed::{CleanupPolicy, CustomMetadata, Feed, FeedFormat, FeedQuality, FilterSet, Schedule};

    fn sample_feed(page_size: usize, sort: SortOrder) -> Feed {
        Feed {
            id: "f1".into(),
            source_url: "https://youtube.com/channel/xyz".into(),
            provider: Provider::Youtube,
            title: "Test Feed".into(),
            description: None,
            cover_art: None,
            author: None,
            format: FeedFormat::Audio,
            quality: FeedQuality::High,
            max_height: None,
            schedule: Schedule::Interval { period_seconds: 3600 },
            page_size,
            playlist_sort: sort,
            filters: FilterSet::default(),
            cleanup: CleanupPolicy::default(),
            custom: CustomMetadata::default(),
            opml_visible: true,
            extra_args: Vec::new(),
            hooks: Vec::new(),
            custom_format: None,
        }
    }

    #[tokio::test]
    async fn zero_page_size_downloads_nothing() {
        let mut fixtures = fixture::Fixtures::new();
        fixtures.insert(
            "https://youtube.com/channel/xyz",
            fixture::sample_snapshot(3),
        );
        let registry = ListingRegistry::with_fixtures(fixtures);
        let feed = sample_feed(0, SortOrder::Descending);
        let snapshot = registry.build(&feed).await.unwrap();
        assert!(snapshot.episodes.is_empty());
    }

    #[tokio::test]
    async fn unknown_source_url_errors() {
        let registry = ListingRegistry::with_fixtures(fixture::Fixtures::new());
        let feed = sample_feed(10, SortOrder::Descending);
        assert!(registry.build(&feed).await.is_err());
    }

    #[tokio::test]
    async fn descending_sort_orders_newest_first() {
        let mut fixtures = fixture::Fixtures::new();
        fixtures.insert(
            "https://youtube.com/channel/xyz",
            fixture::sample_snapshot(3),
        );
        let registry = ListingRegistry::with_fixtures(fixtures);
        let feed = sample_feed(10, SortOrder::Descending);
        let snapshot = registry.build(&feed).await.unwrap();
        assert!(snapshot.episodes[0].published > snapshot.episodes[1].published);
    }
}
