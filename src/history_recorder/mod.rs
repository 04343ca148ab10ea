//! History Recorder (§4.4): the single entry point for history writes. A
//! thin layer over the Storage Gateway's history operations — it owns ID
//! generation and the running/closed lifecycle of an entry, nothing else.

use std::sync::Arc;
use tracing::warn;

use crate::models::history::{EpisodeDetail, HistoryEntry, JobStatus, JobType, Statistics, Trigger};
use crate::storage::{StorageError, StorageGateway};

pub struct HistoryRecorder {
    storage: Arc<StorageGateway>,
    enabled: bool,
}

impl HistoryRecorder {
    pub fn new(storage: Arc<StorageGateway>, enabled: bool) -> Self {
        Self { storage, enabled }
    }

    pub fn log_feed_update_start(
        &self,
        feed_id: &str,
        feed_title: &str,
        trigger: Trigger,
    ) -> Result<String, StorageError> {
        if !self.enabled {
            return Ok(String::new());
        }
        let start = chrono::Utc::now();
        let id = HistoryEntry::new_id(start);
        let entry = HistoryEntry {
            id: id.clone(),
            job_type: JobType::FeedUpdate,
            feed_id: feed_id.to_string(),
            feed_title: feed_title.to_string(),
            episode_id: None,
            episode_title: None,
            start,
            end: None,
            duration_seconds: None,
            status: JobStatus::Running,
            trigger,
            stats: Statistics::default(),
            error: None,
        };
        self.storage.insert_history(&entry)?;
        Ok(id)
    }

    pub fn log_feed_update_end(
        &self,
        history_id: &str,
        status: JobStatus,
        stats: Statistics,
        err_msg: Option<String>,
    ) -> Result<(), StorageError> {
        if !self.enabled || history_id.is_empty() {
            return Ok(());
        }
        let end = chrono::Utc::now();
        self.storage.update_history(history_id, move |entry| {
            entry.close(end, status, stats.clone(), err_msg.clone());
        })?;
        Ok(())
    }

    pub fn log_feed_update_end_with_episodes(
        &self,
        history_id: &str,
        feed_id: &str,
        episode_ids: &[String],
        status: JobStatus,
        mut stats: Statistics,
        err_msg: Option<String>,
    ) -> Result<(), StorageError> {
        if !self.enabled || history_id.is_empty() {
            return Ok(());
        }
        for episode_id in episode_ids {
            match self.storage.get_episode(feed_id, episode_id) {
                Ok(episode) => stats.episodes.push(EpisodeDetail {
                    id: episode.id.clone(),
                    title: episode.title.clone(),
                    status: episode.status,
                    error: episode.error.clone(),
                    size: episode.size,
                    duration: episode.duration,
                }),
                Err(err) => warn!(%feed_id, %episode_id, %err, "episode missing when closing history entry"),
            }
        }
        self.log_feed_update_end(history_id, status, stats, err_msg)
    }

    fn log_episode_event(
        &self,
        job_type: JobType,
        feed_id: &str,
        feed_title: &str,
        episode_id: &str,
        episode_title: &str,
        success: bool,
        err_msg: Option<String>,
    ) -> Result<(), StorageError> {
        if !self.enabled {
            return Ok(());
        }
        let now = chrono::Utc::now();
        let entry = HistoryEntry {
            id: HistoryEntry::new_id(now),
            job_type,
            feed_id: feed_id.to_string(),
            feed_title: feed_title.to_string(),
            episode_id: Some(episode_id.to_string()),
            episode_title: Some(episode_title.to_string()),
            start: now,
            end: Some(now),
            duration_seconds: Some(0),
            status: if success { JobStatus::Success } else { JobStatus::Failed },
            trigger: Trigger::Manual,
            stats: Statistics::default(),
            error: err_msg,
        };
        self.storage.insert_history(&entry)
    }

    pub fn log_episode_retry(
        &self,
        feed_id: &str,
        feed_title: &str,
        episode_id: &str,
        episode_title: &str,
        success: bool,
        err_msg: Option<String>,
    ) -> Result<(), StorageError> {
        self.log_episode_event(
            JobType::EpisodeRetry,
            feed_id,
            feed_title,
            episode_id,
            episode_title,
            success,
            err_msg,
        )
    }

    pub fn log_episode_delete(
        &self,
        feed_id: &str,
        feed_title: &str,
        episode_id: &str,
        episode_title: &str,
        success: bool,
        err_msg: Option<String>,
    ) -> Result<(), StorageError> {
        self.log_episode_event(
            JobType::EpisodeDelete,
            feed_id,
            feed_title,
            episode_id,
            episode_title,
            success,
            err_msg,
        )
    }

    pub fn log_episode_block(
        &self,
        feed_id: &str,
        feed_title: &str,
        episode_id: &str,
        episode_title: &str,
        success: bool,
        err_msg: Option<String>,
    ) -> Result<(), StorageError> {
        self.log_episode_event(
            JobType::EpisodeBlock,
            feed_id,
            feed_title,
            episode_id,
            episode_title,
            success,
            err_msg,
        )
    }

    pub fn cleanup_old_entries(
        &self,
        retention_days: i64,
        max_entries: usize,
    ) -> Result<usize, StorageError> {
        if !self.enabled {
            return Ok(0);
        }
        self.storage.cleanup_history(retention_days, max_entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::feed::{CleanupPolicy, CustomMetadata, Feed, FeedFormat, FeedQuality, FilterSet, Provider, Schedule, SortOrder};
    use crate::models::Episode;
    use tempfile::TempDir;

    fn recorder() -> (HistoryRecorder, TempDir) {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(StorageGateway::open(dir.path()).unwrap());
        (HistoryRecorder::new(storage, true), dir)
    }

    #[test]
    fn start_then_end_closes_the_entry() {
        let (recorder, _dir) = recorder();
        let id = recorder
            .log_feed_update_start("feed1", "Feed One", Trigger::Scheduled)
            .unwrap();
        assert!(!id.is_empty());

        recorder
            .log_feed_update_end(&id, JobStatus::Success, Statistics::default(), None)
            .unwrap();

        let entry = recorder.storage.get_history(&id).unwrap();
        assert_eq!(entry.status, JobStatus::Success);
        assert!(entry.end.is_some());
    }

    #[test]
    fn disabled_recorder_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(StorageGateway::open(dir.path()).unwrap());
        let recorder = HistoryRecorder::new(storage, false);
        let id = recorder
            .log_feed_update_start("feed1", "Feed One", Trigger::Manual)
            .unwrap();
        assert!(id.is_empty());
        assert_eq!(recorder.storage.history_count(), 0);
    }

    #[test]
    fn end_with_episodes_attaches_episode_details() {
        let (recorder, _dir) = recorder();
        let feed = Feed {
            id: "feed1".into(),
            source_url: "https://youtube.com/channel/xyz".into(),
            provider: Provider::Youtube,
            title: "Feed One".into(),
            description: None,
            cover_art: None,
            author: None,
            format: FeedFormat::Audio,
            quality: FeedQuality::High,
            max_height: None,
            schedule: Schedule::Interval { period_seconds: 3600 },
            page_size: 50,
            playlist_sort: SortOrder::Descending,
            filters: FilterSet::default(),
            cleanup: CleanupPolicy::default(),
            custom: CustomMetadata::default(),
            opml_visible: true,
            extra_args: Vec::new(),
            hooks: Vec::new(),
            custom_format: None,
        };
        recorder.storage.add_feed("feed1", &feed, &[]).unwrap();
        let mut episode = Episode::new(
            "feed1",
            "ep1",
            "Episode 1",
            "https://example.com/ep1.mp4",
            chrono::Utc::now(),
        );
        episode.size = 1000;
        recorder.storage.insert_episode(&episode).unwrap();

        let id = recorder
            .log_feed_update_start("feed1", "Feed One", Trigger::Scheduled)
            .unwrap();
        recorder
            .log_feed_update_end_with_episodes(
                &id,
                "feed1",
                &["ep1".to_string(), "missing".to_string()],
                JobStatus::Success,
                Statistics::default(),
                None,
            )
            .unwrap();

        let entry = recorder.storage.get_history(&id).unwrap();
        assert_eq!(entry.stats.episodes.len(), 1);
        assert_eq!(entry.stats.episodes[0].size, 1000);
    }
}
