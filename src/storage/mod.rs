//! Storage Gateway (§4.1): a typed wrapper over an embedded, transactional,
//! byte-ordered key-value store. Each record kind gets its own `sled::Tree`
//! (the natural sled analogue of the versioned key namespaces in the design
//! doc); composite keys within the episode and history-index trees are what
//! let a single `scan_prefix` answer "every episode of this feed" or "every
//! history entry for this feed" without touching unrelated rows.

pub mod error;
pub mod keys;

use std::path::Path;

use chrono::{DateTime, Utc};
use sled::transaction::{ConflictableTransactionError, Transactional};

pub use error::StorageError;

use crate::models::{Episode, Feed, HistoryEntry, JobStatus, JobType};

/// In-memory filters applied during `list_history`'s scan (§4.1). `feed_id`
/// is special-cased to scan the `history_feed` index instead of the full
/// history tree, so a feed-scoped page never decodes unrelated entries.
#[derive(Debug, Clone, Default)]
pub struct HistoryFilters {
    pub feed_id: Option<String>,
    pub job_type: Option<JobType>,
    pub status: Option<JobStatus>,
    pub title_contains: Option<String>,
    pub start_after: Option<DateTime<Utc>>,
    pub end_before: Option<DateTime<Utc>>,
}

impl HistoryFilters {
    fn matches(&self, entry: &HistoryEntry) -> bool {
        if let Some(job_type) = self.job_type {
            if entry.job_type != job_type {
                return false;
            }
        }
        if let Some(status) = self.status {
            if entry.status != status {
                return false;
            }
        }
        if let Some(needle) = &self.title_contains {
            let haystack = format!(
                "{} {}",
                entry.feed_title,
                entry.episode_title.as_deref().unwrap_or("")
            );
            if !haystack.to_lowercase().contains(&needle.to_lowercase()) {
                return false;
            }
        }
        if let Some(after) = self.start_after {
            if entry.start < after {
                return false;
            }
        }
        if let Some(before) = self.end_before {
            if entry.start > before {
                return false;
            }
        }
        true
    }
}

pub struct StorageGateway {
    db: sled::Db,
    feeds: sled::Tree,
    episodes: sled::Tree,
    history: sled::Tree,
    history_feed_index: sled::Tree,
}

impl StorageGateway {
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        let feeds = db.open_tree(keys::feed_tree_name())?;
        let episodes = db.open_tree(keys::episode_tree_name())?;
        let history = db.open_tree(keys::history_tree_name())?;
        let history_feed_index = db.open_tree(keys::history_feed_index_tree_name())?;
        Ok(Self {
            db,
            feeds,
            episodes,
            history,
            history_feed_index,
        })
    }

    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }

    /// Upsert the feed record and insert-if-absent every supplied episode
    /// (§4.1). Existing episode rows are never overwritten — reconciliation
    /// relies on that to preserve in-flight/downloaded status.
    pub fn add_feed(
        &self,
        feed_id: &str,
        feed: &Feed,
        episodes: &[Episode],
    ) -> Result<(), StorageError> {
        let feed_bytes = serde_json::to_vec(feed)?;
        let feed_key = keys::feed_key(feed_id);
        let mut encoded = Vec::with_capacity(episodes.len());
        for episode in episodes {
            encoded.push((
                keys::episode_key(feed_id, &episode.id),
                serde_json::to_vec(episode)?,
            ));
        }

        (&self.feeds, &self.episodes)
            .transaction(move |(feeds_tx, episodes_tx)| {
                feeds_tx.insert(feed_key.clone(), feed_bytes.clone())?;
                for (key, value) in &encoded {
                    if episodes_tx.get(key)?.is_none() {
                        episodes_tx.insert(key.clone(), value.clone())?;
                    }
                }
                Ok::<(), ConflictableTransactionError<StorageError>>(())
            })
            .map_err(StorageError::from)
    }

    pub fn get_feed(&self, feed_id: &str) -> Result<(Feed, Vec<Episode>), StorageError> {
        let bytes = self
            .feeds
            .get(keys::feed_key(feed_id))?
            .ok_or_else(|| StorageError::NotFound(format!("feed {feed_id}")))?;
        let feed: Feed = serde_json::from_slice(&bytes)?;
        let mut episodes = Vec::new();
        self.walk_episodes(feed_id, |episode| {
            episodes.push(episode.clone());
            Ok(())
        })?;
        Ok((feed, episodes))
    }

    pub fn feed_exists(&self, feed_id: &str) -> Result<bool, StorageError> {
        Ok(self.feeds.get(keys::feed_key(feed_id))?.is_some())
    }

    pub fn walk_feeds<F>(&self, mut cb: F) -> Result<(), StorageError>
    where
        F: FnMut(&Feed) -> Result<(), StorageError>,
    {
        for entry in self.feeds.iter() {
            let (_, value) = entry?;
            let feed: Feed = serde_json::from_slice(&value)?;
            cb(&feed)?;
        }
        Ok(())
    }

    pub fn walk_episodes<F>(&self, feed_id: &str, mut cb: F) -> Result<(), StorageError>
    where
        F: FnMut(&Episode) -> Result<(), StorageError>,
    {
        let prefix = keys::episode_prefix(feed_id);
        for entry in self.episodes.scan_prefix(prefix) {
            let (_, value) = entry?;
            let episode: Episode = serde_json::from_slice(&value)?;
            cb(&episode)?;
        }
        Ok(())
    }

    pub fn get_episode(&self, feed_id: &str, episode_id: &str) -> Result<Episode, StorageError> {
        let bytes = self
            .episodes
            .get(keys::episode_key(feed_id, episode_id))?
            .ok_or_else(|| StorageError::NotFound(format!("episode {feed_id}/{episode_id}")))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Read-modify-write an episode in one transaction. Rejects mutators
    /// that change `feed_id`/`id` (§4.1).
    pub fn update_episode<F>(
        &self,
        feed_id: &str,
        episode_id: &str,
        mutator: F,
    ) -> Result<Episode, StorageError>
    where
        F: Fn(&mut Episode) -> Result<(), StorageError>,
    {
        let key = keys::episode_key(feed_id, episode_id);
        self.episodes
            .transaction(move |tx| {
                let bytes = tx.get(&key)?.ok_or_else(|| {
                    ConflictableTransactionError::Abort(StorageError::NotFound(format!(
                        "episode {feed_id}/{episode_id}"
                    )))
                })?;
                let mut episode: Episode = serde_json::from_slice(&bytes)
                    .map_err(|e| ConflictableTransactionError::Abort(StorageError::from(e)))?;
                let (original_feed, original_id) = (episode.feed_id.clone(), episode.id.clone());

                mutator(&mut episode).map_err(ConflictableTransactionError::Abort)?;

                if episode.feed_id != original_feed || episode.id != original_id {
                    return Err(ConflictableTransactionError::Abort(
                        StorageError::IdentityChanged(format!("{feed_id}/{episode_id}")),
                    ));
                }

                let encoded = serde_json::to_vec(&episode)
                    .map_err(|e| ConflictableTransactionError::Abort(StorageError::from(e)))?;
                tx.insert(&key, encoded)?;
                Ok(episode)
            })
            .map_err(StorageError::from)
    }

    pub fn insert_episode(&self, episode: &Episode) -> Result<(), StorageError> {
        let key = keys::episode_key(&episode.feed_id, &episode.id);
        let value = serde_json::to_vec(episode)?;
        self.episodes.insert(key, value)?;
        Ok(())
    }

    pub fn delete_episode(&self, feed_id: &str, episode_id: &str) -> Result<(), StorageError> {
        self.episodes
            .remove(keys::episode_key(feed_id, episode_id))?;
        Ok(())
    }

    /// Delete the feed record and every episode beneath it in one
    /// transaction. History entries are intentionally retained (§4.1).
    pub fn delete_feed(&self, feed_id: &str) -> Result<(), StorageError> {
        let prefix = keys::episode_prefix(feed_id);
        let episode_keys: Vec<sled::IVec> = self
            .episodes
            .scan_prefix(&prefix)
            .keys()
            .collect::<Result<Vec<_>, _>>()?;
        let feed_key = keys::feed_key(feed_id);

        (&self.feeds, &self.episodes)
            .transaction(move |(feeds_tx, episodes_tx)| {
                feeds_tx.remove(feed_key.clone())?;
                for key in &episode_keys {
                    episodes_tx.remove(key.clone())?;
                }
                Ok::<(), ConflictableTransactionError<StorageError>>(())
            })
            .map_err(StorageError::from)
    }

    // -- History -----------------------------------------------------

    pub fn insert_history(&self, entry: &HistoryEntry) -> Result<(), StorageError> {
        let key = keys::history_key(&entry.id);
        let value = serde_json::to_vec(entry)?;
        let index_key = keys::history_feed_key(&entry.feed_id, &entry.id);
        let index_value = entry.id.clone().into_bytes();

        (&self.history, &self.history_feed_index)
            .transaction(move |(history_tx, index_tx)| {
                history_tx.insert(key.clone(), value.clone())?;
                index_tx.insert(index_key.clone(), index_value.clone())?;
                Ok::<(), ConflictableTransactionError<StorageError>>(())
            })
            .map_err(StorageError::from)
    }

    pub fn update_history<F>(&self, id: &str, mutator: F) -> Result<HistoryEntry, StorageError>
    where
        F: Fn(&mut HistoryEntry),
    {
        let key = keys::history_key(id);
        self.history
            .transaction(move |tx| {
                let bytes = tx.get(&key)?.ok_or_else(|| {
                    ConflictableTransactionError::Abort(StorageError::NotFound(format!(
                        "history entry {id}"
                    )))
                })?;
                let mut entry: HistoryEntry = serde_json::from_slice(&bytes)
                    .map_err(|e| ConflictableTransactionError::Abort(StorageError::from(e)))?;
                mutator(&mut entry);
                let encoded = serde_json::to_vec(&entry)
                    .map_err(|e| ConflictableTransactionError::Abort(StorageError::from(e)))?;
                tx.insert(&key, encoded)?;
                Ok(entry)
            })
            .map_err(StorageError::from)
    }

    pub fn get_history(&self, id: &str) -> Result<HistoryEntry, StorageError> {
        let bytes = self
            .history
            .get(keys::history_key(id))?
            .ok_or_else(|| StorageError::NotFound(format!("history entry {id}")))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn delete_history(&self, id: &str) -> Result<(), StorageError> {
        let entry = self.get_history(id)?;
        let key = keys::history_key(id);
        let index_key = keys::history_feed_key(&entry.feed_id, id);
        (&self.history, &self.history_feed_index)
            .transaction(move |(history_tx, index_tx)| {
                history_tx.remove(key.clone())?;
                index_tx.remove(index_key.clone())?;
                Ok::<(), ConflictableTransactionError<StorageError>>(())
            })
            .map_err(StorageError::from)
    }

    pub fn delete_all_history(&self) -> Result<usize, StorageError> {
        let count = self.history.len();
        self.history.clear()?;
        self.history_feed_index.clear()?;
        Ok(count)
    }

    /// Reverse prefix scan, newest first (§4.1). `sled::Tree::scan_prefix`'s
    /// iterator already implements `DoubleEndedIterator`, so `.rev()` gives
    /// us the "seek to `prefix || 0xFF`, fall back to the last key in
    /// range" behavior the design doc calls for without hand-rolling the
    /// seek.
    pub fn list_history(
        &self,
        filters: &HistoryFilters,
        page: usize,
        page_size: usize,
    ) -> Result<(Vec<HistoryEntry>, usize), StorageError> {
        let mut matching = Vec::new();

        if let Some(feed_id) = &filters.feed_id {
            let prefix = keys::history_feed_prefix(feed_id);
            for entry in self.history_feed_index.scan_prefix(prefix).rev() {
                let (_, value) = entry?;
                let history_id = String::from_utf8_lossy(&value).to_string();
                let bytes = match self.history.get(keys::history_key(&history_id))? {
                    Some(b) => b,
                    None => continue,
                };
                let history_entry: HistoryEntry = serde_json::from_slice(&bytes)?;
                if filters.matches(&history_entry) {
                    matching.push(history_entry);
                }
            }
        } else {
            for entry in self.history.iter().rev() {
                let (_, value) = entry?;
                let history_entry: HistoryEntry = serde_json::from_slice(&value)?;
                if filters.matches(&history_entry) {
                    matching.push(history_entry);
                }
            }
        }

        let total = matching.len();
        let page = page.max(1);
        let start = (page - 1).saturating_mul(page_size).min(total);
        let end = start.saturating_add(page_size).min(total);
        Ok((matching[start..end].to_vec(), total))
    }

    pub fn history_count(&self) -> usize {
        self.history.len()
    }

    pub fn oldest_history_entry(&self) -> Result<Option<HistoryEntry>, StorageError> {
        match self.history.iter().next() {
            Some(entry) => {
                let (_, value) = entry?;
                Ok(Some(serde_json::from_slice(&value)?))
            }
            None => Ok(None),
        }
    }

    /// Reverse-scan all history and delete any entry older than
    /// `now - retention_days` or ranked beyond `max_entries` by recency
    /// (§4.1). `(0, 0)` falls naturally out of this formula: a zero-day
    /// cutoff makes every already-started entry "too old", and rank `0`
    /// immediately exceeds a `max_entries` of zero.
    pub fn cleanup_history(
        &self,
        retention_days: i64,
        max_entries: usize,
    ) -> Result<usize, StorageError> {
        let cutoff = Utc::now() - chrono::Duration::days(retention_days);
        let mut entries = Vec::new();
        for entry in self.history.iter() {
            let (key, value) = entry?;
            let history_entry: HistoryEntry = serde_json::from_slice(&value)?;
            entries.push((key.to_vec(), history_entry));
        }
        entries.sort_by(|a, b| b.1.start.cmp(&a.1.start));

        let mut deleted = 0usize;
        let mut history_batch = sled::Batch::default();
        let mut index_batch = sled::Batch::default();
        for (rank, (key, entry)) in entries.into_iter().enumerate() {
            if entry.start < cutoff || rank >= max_entries {
                history_batch.remove(key);
                index_batch.remove(keys::history_feed_key(&entry.feed_id, &entry.id));
                deleted += 1;
            }
        }
        self.history.apply_batch(history_batch)?;
        self.history_feed_index.apply_batch(index_batch)?;
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        CleanupPolicy, CustomMetadata, EpisodeStatus, FeedFormat, FeedQuality, FilterSet,
        Provider, Schedule, SortOrder, Statistics, Trigger,
    };
    use chrono::Utc;
    use tempfile::TempDir;

    fn gateway() -> (TempDir, StorageGateway) {
        let dir = TempDir::new().unwrap();
        let gw = StorageGateway::open(&dir.path().join("db")).unwrap();
        (dir, gw)
    }

    fn sample_feed(id: &str) -> Feed {
        Feed {
            id: id.to_string(),
            source_url: "https://youtube.com/c/x".into(),
            provider: Provider::Youtube,
            title: "Feed".into(),
            description: None,
            cover_art: None,
            author: None,
            format: FeedFormat::Audio,
            quality: FeedQuality::High,
            max_height: None,
            schedule: Schedule::Interval {
                period_seconds: 3600,
            },
            page_size: 10,
            playlist_sort: SortOrder::Descending,
            filters: FilterSet::default(),
            cleanup: CleanupPolicy::default(),
            custom: CustomMetadata::default(),
            opml_visible: true,
            extra_args: Vec::new(),
            hooks: Vec::new(),
            custom_format: None,
        }
    }

    fn sample_episode(feed_id: &str, id: &str) -> Episode {
        Episode::new(feed_id, id, "Title", "https://x/e.mp4", Utc::now())
    }

    #[test]
    fn add_feed_is_insert_if_absent_for_episodes() {
        let (_dir, gw) = gateway();
        let feed = sample_feed("f1");
        let mut ep = sample_episode("f1", "e1");
        gw.add_feed("f1", &feed, &[ep.clone()]).unwrap();

        ep.title = "Changed".into();
        gw.add_feed("f1", &feed, &[ep]).unwrap();

        let (_, episodes) = gw.get_feed("f1").unwrap();
        assert_eq!(episodes.len(), 1);
        assert_eq!(episodes[0].title, "Title");
    }

    #[test]
    fn walk_episodes_only_returns_episodes_of_requested_feed() {
        let (_dir, gw) = gateway();
        gw.add_feed("f1", &sample_feed("f1"), &[sample_episode("f1", "e1")])
            .unwrap();
        gw.add_feed("f10", &sample_feed("f10"), &[sample_episode("f10", "e1")])
            .unwrap();

        let mut seen = Vec::new();
        gw.walk_episodes("f1", |ep| {
            seen.push(ep.id.clone());
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, vec!["e1".to_string()]);
    }

    #[test]
    fn update_episode_rejects_identity_change() {
        let (_dir, gw) = gateway();
        gw.add_feed("f1", &sample_feed("f1"), &[sample_episode("f1", "e1")])
            .unwrap();
        let result = gw.update_episode("f1", "e1", |ep| {
            ep.id = "e2".into();
            Ok(())
        });
        assert!(result.is_err());
    }

    #[test]
    fn update_episode_persists_mutation() {
        let (_dir, gw) = gateway();
        gw.add_feed("f1", &sample_feed("f1"), &[sample_episode("f1", "e1")])
            .unwrap();
        gw.update_episode("f1", "e1", |ep| {
            ep.status = EpisodeStatus::Downloaded;
            ep.size = 1024;
            Ok(())
        })
        .unwrap();
        let episode = gw.get_episode("f1", "e1").unwrap();
        assert_eq!(episode.status, EpisodeStatus::Downloaded);
        assert_eq!(episode.size, 1024);
    }

    #[test]
    fn delete_feed_removes_feed_and_episodes_but_keeps_history() {
        let (_dir, gw) = gateway();
        gw.add_feed("f1", &sample_feed("f1"), &[sample_episode("f1", "e1")])
            .unwrap();
        gw.insert_history(&history_entry("f1")).unwrap();

        gw.delete_feed("f1").unwrap();

        assert!(gw.get_feed("f1").is_err());
        let (page, total) = gw
            .list_history(&HistoryFilters::default(), 1, 10)
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(page[0].feed_id, "f1");
    }

    fn history_entry(feed_id: &str) -> HistoryEntry {
        let start = Utc::now();
        HistoryEntry {
            id: HistoryEntry::new_id(start),
            job_type: crate::models::JobType::FeedUpdate,
            feed_id: feed_id.to_string(),
            feed_title: "Feed".into(),
            episode_id: None,
            episode_title: None,
            start,
            end: Some(start),
            duration_seconds: Some(0),
            status: JobStatus::Success,
            trigger: Trigger::Scheduled,
            stats: Statistics::default(),
            error: None,
        }
    }

    #[test]
    fn list_history_newest_first_with_pagination() {
        let (_dir, gw) = gateway();
        for i in 0..5 {
            let mut entry = history_entry("f1");
            entry.start = Utc::now() + chrono::Duration::seconds(i);
            entry.id = format!("{:02}-{}", i, uuid::Uuid::new_v4());
            gw.insert_history(&entry).unwrap();
        }
        let (page, total) = gw
            .list_history(&HistoryFilters::default(), 1, 2)
            .unwrap();
        assert_eq!(total, 5);
        assert_eq!(page.len(), 2);
        assert!(page[0].start > page[1].start);
    }

    #[test]
    fn cleanup_history_respects_retention_and_max_entries() {
        let (_dir, gw) = gateway();
        let now = Utc::now();
        for i in 0..3 {
            let mut entry = history_entry("f1");
            entry.start = now - chrono::Duration::days(40 - i);
            entry.id = format!("old-{i}-{}", uuid::Uuid::new_v4());
            gw.insert_history(&entry).unwrap();
        }
        for i in 0..3 {
            let mut entry = history_entry("f1");
            entry.start = now - chrono::Duration::minutes(i);
            entry.id = format!("recent-{i}-{}", uuid::Uuid::new_v4());
            gw.insert_history(&entry).unwrap();
        }

        let deleted = gw.cleanup_history(30, 1000).unwrap();
        assert_eq!(deleted, 3);
        let (_, total) = gw.list_history(&HistoryFilters::default(), 1, 100).unwrap();
        assert_eq!(total, 3);
    }

    #[test]
    fn cleanup_history_zero_zero_deletes_all() {
        let (_dir, gw) = gateway();
        gw.insert_history(&history_entry("f1")).unwrap();
        gw.insert_history(&history_entry("f1")).unwrap();
        let deleted = gw.cleanup_history(0, 0).unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(gw.history_count(), 0);
    }
}
