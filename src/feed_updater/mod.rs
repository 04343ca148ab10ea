//! Feed Updater (§4.6): the per-feed pipeline. `update` runs the six
//! publish-producing stages in order; `delete_episode`/`block_episode`/
//! `retry_episode` are isolated entry points that share Stage 3's
//! per-episode download subroutine and Stage 5's publish step.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::warn;

use crate::artifact::{ArtifactError, ArtifactStore};
use crate::download::{DownloadDriver, DownloadError, ProgressEvent, ProgressSink};
use crate::error::EngineError;
use crate::feed_document;
use crate::history_recorder::HistoryRecorder;
use crate::listing::ListingRegistry;
use crate::models::{Episode, EpisodeStatus, Feed, FilterSet, JobStatus, Statistics, Trigger};
use crate::progress_tracker::ProgressTracker;
use crate::storage::{StorageError, StorageGateway};

fn to_storage_err(err: EngineError) -> StorageError {
    StorageError::Transaction(err.to_string())
}

/// Whether `episode` passes every predicate in `filters` (§4.6 Stage 2).
/// An empty pattern or a zero threshold means "accept everything" for that
/// predicate; an unparseable regex is treated as a non-match rather than a
/// panic — `Feed::validate` is what's supposed to keep that from happening.
fn passes_filters(filters: &FilterSet, episode: &Episode) -> bool {
    let matches = |pattern: &str, text: &str| {
        regex::Regex::new(pattern)
            .map(|re| re.is_match(text))
            .unwrap_or(false)
    };

    if let Some(pattern) = &filters.title {
        if !matches(pattern, &episode.title) {
            return false;
        }
    }
    if let Some(pattern) = &filters.not_title {
        if matches(pattern, &episode.title) {
            return false;
        }
    }
    let description = episode.description.as_deref().unwrap_or("");
    if let Some(pattern) = &filters.description {
        if !matches(pattern, description) {
            return false;
        }
    }
    if let Some(pattern) = &filters.not_description {
        if matches(pattern, description) {
            return false;
        }
    }
    if filters.min_duration > 0 && episode.duration < filters.min_duration {
        return false;
    }
    if filters.max_duration > 0 && episode.duration > filters.max_duration {
        return false;
    }
    let age_days = (Utc::now() - episode.published).num_days().max(0) as u64;
    if filters.min_age_days > 0 && age_days < filters.min_age_days {
        return false;
    }
    if filters.max_age_days > 0 && age_days > filters.max_age_days {
        return false;
    }
    true
}

async fn run_hook(
    hook: &str,
    feed_id: &str,
    episode_file: &str,
    episode_title: &str,
) -> Result<(), EngineError> {
    let status = tokio::process::Command::new(hook)
        .env("EPISODE_FILE", format!("{feed_id}/{episode_file}"))
        .env("FEED_NAME", feed_id)
        .env("EPISODE_TITLE", episode_title)
        .status()
        .await
        .map_err(|e| EngineError::Hook(e.to_string()))?;
    if !status.success() {
        return Err(EngineError::Hook(format!("{hook} exited with {status:?}")));
    }
    Ok(())
}

pub struct FeedUpdater {
    storage: Arc<StorageGateway>,
    artifacts: Arc<dyn ArtifactStore>,
    listing: Arc<ListingRegistry>,
    downloader: Arc<DownloadDriver>,
    progress: Arc<ProgressTracker>,
    history: Arc<HistoryRecorder>,
    base_url: String,
    download_timeout: Duration,
}

impl FeedUpdater {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        storage: Arc<StorageGateway>,
        artifacts: Arc<dyn ArtifactStore>,
        listing: Arc<ListingRegistry>,
        downloader: Arc<DownloadDriver>,
        progress: Arc<ProgressTracker>,
        history: Arc<HistoryRecorder>,
        base_url: String,
        download_timeout: Duration,
    ) -> Self {
        Self {
            storage,
            artifacts,
            listing,
            downloader,
            progress,
            history,
            base_url,
            download_timeout,
        }
    }

    /// The top-level pipeline operation (§4.6). Runs Stages 1-5 in order and
    /// closes the history entry Stage 6 describes.
    pub async fn update(&self, feed_id: &str, trigger: Trigger) -> Result<(), EngineError> {
        let (feed, _) = self.storage.get_feed(feed_id)?;
        let history_id = self
            .history
            .log_feed_update_start(feed_id, &feed.title, trigger)?;

        match self.run_pipeline(&feed).await {
            Ok((candidate_ids, stats, status)) => {
                self.history.log_feed_update_end_with_episodes(
                    &history_id,
                    feed_id,
                    &candidate_ids,
                    status,
                    stats,
                    None,
                )?;
                Ok(())
            }
            Err(err) => {
                self.history.log_feed_update_end(
                    &history_id,
                    JobStatus::Failed,
                    Statistics::default(),
                    Some(err.to_string()),
                )?;
                Err(err)
            }
        }
    }

    async fn run_pipeline(
        &self,
        feed: &Feed,
    ) -> Result<(Vec<String>, Statistics, JobStatus), EngineError> {
        self.stage1_fetch_and_reconcile(feed).await?;

        let (_, stored) = self.storage.get_feed(&feed.id)?;
        let (candidates, ignored) = self.select_candidates(feed, &stored)?;
        let candidate_ids: Vec<String> = candidates.iter().map(|e| e.id.clone()).collect();

        let (mut stats, halted) = self.stage3_download(feed, &candidates).await?;
        stats.ignored = ignored;

        self.stage4_cleanup(feed).await?;
        self.stage5_publish(feed).await?;

        // A `TooManyRequests` halt that still downloaded at least one
        // episode is `partial`, not `success` — the run didn't finish its
        // candidate list (§8 scenario 3), even though nothing outright
        // failed.
        let status = if stats.failed == 0 && !(halted && stats.downloaded > 0) {
            JobStatus::Success
        } else if stats.downloaded > 0 {
            JobStatus::Partial
        } else {
            JobStatus::Failed
        };

        Ok((candidate_ids, stats, status))
    }

    /// Stage 1 (`updateFeed`): fetch the remote listing, reconcile it
    /// against what's stored, garbage-collect stale `new`/`error` rows the
    /// upstream channel dropped.
    async fn stage1_fetch_and_reconcile(&self, feed: &Feed) -> Result<(), EngineError> {
        let snapshot = self.listing.build(feed).await?;
        let (_, stored) = self.storage.get_feed(&feed.id)?;

        let blocked_ids: std::collections::HashSet<&str> = stored
            .iter()
            .filter(|e| e.status == EpisodeStatus::Blocked)
            .map(|e| e.id.as_str())
            .collect();
        let pending_ids: Vec<String> = stored
            .iter()
            .filter(|e| matches!(e.status, EpisodeStatus::New | EpisodeStatus::Error))
            .map(|e| e.id.clone())
            .collect();

        let fetched: Vec<Episode> = snapshot
            .episodes
            .into_iter()
            .filter(|listed| !blocked_ids.contains(listed.id.as_str()))
            .map(|listed| {
                let mut episode = Episode::new(
                    feed.id.clone(),
                    listed.id,
                    listed.title,
                    listed.media_url,
                    listed.published,
                );
                episode.description = listed.description;
                episode.duration = listed.duration;
                episode.thumbnail_url = listed.thumbnail_url;
                episode
            })
            .collect();

        self.storage.add_feed(&feed.id, feed, &fetched)?;

        let fetched_ids: std::collections::HashSet<&str> =
            fetched.iter().map(|e| e.id.as_str()).collect();
        for id in pending_ids {
            if !fetched_ids.contains(id.as_str()) {
                self.storage.delete_episode(&feed.id, &id)?;
            }
        }
        Ok(())
    }

    /// Stage 2 (`fetchEpisodes`): walk stored episodes in storage order,
    /// applying filters and the `page_size` cap; episodes that fail a
    /// filter while still `new` are persisted as `ignored` so they are not
    /// re-evaluated on the next run.
    fn select_candidates(
        &self,
        feed: &Feed,
        stored: &[Episode],
    ) -> Result<(Vec<Episode>, usize), EngineError> {
        let mut candidates = Vec::new();
        let mut ignored = 0;

        for episode in stored {
            if candidates.len() >= feed.page_size {
                break;
            }
            if episode.status == EpisodeStatus::Blocked {
                continue;
            }
            if !matches!(episode.status, EpisodeStatus::New | EpisodeStatus::Error) {
                continue;
            }
            if passes_filters(&feed.filters, episode) {
                candidates.push(episode.clone());
            } else if episode.status == EpisodeStatus::New {
                self.storage.update_episode(&feed.id, &episode.id, |e| {
                    e.set_status(EpisodeStatus::Ignored).map_err(to_storage_err)
                })?;
                ignored += 1;
            }
        }
        Ok((candidates, ignored))
    }

    /// Stage 3: mark candidates `queued`, then download each in turn. A
    /// `TooManyRequests` result halts the remaining candidates for this run
    /// without marking the current one `error` — it reverts to `queued` so
    /// the feed document still rebuilds and a later run can retry it. The
    /// returned `bool` reports whether a halt happened, so `run_pipeline` can
    /// tell "finished every candidate" apart from "stopped early" when both
    /// land on `failed == 0` (§8 scenario 3).
    async fn stage3_download(
        &self,
        feed: &Feed,
        candidates: &[Episode],
    ) -> Result<(Statistics, bool), EngineError> {
        let mut stats = Statistics {
            queued: candidates.len(),
            ..Default::default()
        };

        self.progress.init_feed_progress(&feed.id, candidates.len());
        for candidate in candidates {
            self.storage.update_episode(&feed.id, &candidate.id, |e| {
                e.set_status(EpisodeStatus::Queued).map_err(to_storage_err)
            })?;
        }
        self.progress.queue_episodes(&feed.id, candidates.len());

        let extension = feed.media_extension();
        let mut halted = false;

        for candidate in candidates {
            if halted {
                break;
            }

            let artifact_path = candidate.artifact_path(&extension);
            if let Ok(size) = self.artifacts.size(&artifact_path).await {
                self.storage.update_episode(&feed.id, &candidate.id, move |e| {
                    e.size = size;
                    e.set_status(EpisodeStatus::Downloaded).map_err(to_storage_err)
                })?;
                stats.downloaded += 1;
                stats.bytes_downloaded += size;
                continue;
            }

            self.storage.update_episode(&feed.id, &candidate.id, |e| {
                e.set_status(EpisodeStatus::Downloading).map_err(to_storage_err)
            })?;
            self.progress
                .start_episode(&feed.id, &candidate.id, &candidate.title);

            let tracker = self.progress.clone();
            let feed_id = feed.id.clone();
            let episode_id = candidate.id.clone();
            let sink: ProgressSink = Arc::new(move |event: ProgressEvent| {
                tracker.update_episode(
                    &feed_id,
                    &episode_id,
                    event.stage,
                    event.percent,
                    event.downloaded_bytes,
                    event.total_bytes,
                    &event.speed,
                );
            });

            match self
                .downloader
                .download(feed, candidate, self.download_timeout, sink)
                .await
            {
                Ok(downloaded_file) => {
                    let size = downloaded_file.size;
                    self.artifacts
                        .create(&artifact_path, Box::new(downloaded_file))
                        .await?;

                    for hook in &feed.hooks {
                        if let Err(err) =
                            run_hook(hook, &feed.id, &candidate.file_name(&extension), &candidate.title).await
                        {
                            warn!(feed_id = %feed.id, episode_id = %candidate.id, %err, "post-download hook failed");
                        }
                    }

                    self.storage.update_episode(&feed.id, &candidate.id, move |e| {
                        e.size = size;
                        e.set_status(EpisodeStatus::Downloaded).map_err(to_storage_err)
                    })?;
                    self.progress.complete_episode(&feed.id, &candidate.id);
                    stats.downloaded += 1;
                    stats.bytes_downloaded += size;
                }
                Err(DownloadError::TooManyRequests) => {
                    self.storage.update_episode(&feed.id, &candidate.id, |e| {
                        e.set_status(EpisodeStatus::Queued).map_err(to_storage_err)
                    })?;
                    self.progress.complete_episode(&feed.id, &candidate.id);
                    halted = true;
                }
                Err(err) => {
                    let message = err.to_string();
                    self.storage.update_episode(&feed.id, &candidate.id, move |e| {
                        e.error = Some(message.clone());
                        e.set_status(EpisodeStatus::Error).map_err(to_storage_err)
                    })?;
                    self.progress.complete_episode(&feed.id, &candidate.id);
                    stats.failed += 1;
                }
            }
        }

        self.progress.clear_feed(&feed.id);
        Ok((stats, halted))
    }

    /// Stage 4: enforce `cleanup.keep_last`. `keep_last = 0` means no
    /// policy is configured — every downloaded episode is kept (§8
    /// boundary behavior).
    async fn stage4_cleanup(&self, feed: &Feed) -> Result<(), EngineError> {
        if feed.cleanup.keep_last == 0 {
            return Ok(());
        }

        let mut downloaded = Vec::new();
        self.storage.walk_episodes(&feed.id, |episode| {
            if episode.status == EpisodeStatus::Downloaded {
                downloaded.push(episode.clone());
            }
            Ok(())
        })?;
        if downloaded.len() <= feed.cleanup.keep_last {
            return Ok(());
        }
        downloaded.sort_by_key(|e| std::cmp::Reverse(e.published));

        let extension = feed.media_extension();
        let mut errors = Vec::new();
        for episode in downloaded.into_iter().skip(feed.cleanup.keep_last) {
            let path = episode.artifact_path(&extension);
            if let Err(err) = self.artifacts.delete(&path).await {
                if !err.is_not_found() {
                    errors.push(err.to_string());
                    continue;
                }
            }
            let result = self.storage.update_episode(&feed.id, &episode.id, |e| {
                e.title.clear();
                e.description = None;
                e.set_status(EpisodeStatus::Cleaned).map_err(to_storage_err)
            });
            if let Err(err) = result {
                errors.push(err.to_string());
            }
        }

        if !errors.is_empty() {
            return Err(EngineError::Cleanup(errors.len(), errors.join("; ")));
        }
        Ok(())
    }

    /// Stage 5: rebuild `<feed_id>.xml` and `podsync.opml`.
    async fn stage5_publish(&self, feed: &Feed) -> Result<(), EngineError> {
        let (_, episodes) = self.storage.get_feed(&feed.id)?;
        let rss = feed_document::render_rss(feed, &episodes, &self.base_url);
        self.artifacts
            .create(
                &format!("{}.xml", feed.id),
                Box::new(std::io::Cursor::new(rss.into_bytes())),
            )
            .await?;

        let mut all_feeds = Vec::new();
        self.storage.walk_feeds(|f| {
            all_feeds.push(f.clone());
            Ok(())
        })?;
        let visible: Vec<Feed> = all_feeds.into_iter().filter(|f| f.opml_visible).collect();
        let opml = feed_document::render_opml(&visible, &self.base_url);
        self.artifacts
            .create("podsync.opml", Box::new(std::io::Cursor::new(opml.into_bytes())))
            .await?;
        Ok(())
    }

    /// Deletes an episode's artifact (idempotent on already-missing) and its
    /// storage record, logs one history entry, and rebuilds the feed
    /// document.
    pub async fn delete_episode(&self, feed_id: &str, episode_id: &str) -> Result<(), EngineError> {
        let episode = self.storage.get_episode(feed_id, episode_id)?;
        let (feed, _) = self.storage.get_feed(feed_id)?;
        let path = episode.artifact_path(&feed.media_extension());

        let artifact_result = self.artifacts.delete(&path).await;
        let succeeded = artifact_result.is_ok();

        if succeeded {
            self.storage.delete_episode(feed_id, episode_id)?;
        }
        self.history.log_episode_delete(
            feed_id,
            &feed.title,
            episode_id,
            &episode.title,
            succeeded,
            artifact_result.as_ref().err().map(|e: &ArtifactError| e.to_string()),
        )?;

        if !succeeded {
            return Err(artifact_result.unwrap_err().into());
        }
        self.stage5_publish(&feed).await
    }

    /// Blocks an episode (§4.6: sticky, takes precedence over future
    /// listings). Creates a stub `blocked` record if the episode is not yet
    /// known, so the next Stage 1 run filters it out before first download.
    /// Blocking an already-`downloaded` episode also removes its committed
    /// artifact (§8 scenario 4: "artifact removed from store") — otherwise
    /// Stage 4 cleanup, which only ever touches `downloaded` rows, would
    /// never reclaim it.
    pub async fn block_episode(&self, feed_id: &str, episode_id: &str) -> Result<(), EngineError> {
        let (feed, _) = self.storage.get_feed(feed_id)?;

        let title = match self.storage.get_episode(feed_id, episode_id) {
            Ok(episode) => {
                if episode.status == EpisodeStatus::Downloaded {
                    let path = episode.artifact_path(&feed.media_extension());
                    if let Err(err) = self.artifacts.delete(&path).await {
                        if !err.is_not_found() {
                            return Err(err.into());
                        }
                    }
                }
                self.storage.update_episode(feed_id, episode_id, |e| {
                    e.set_status(EpisodeStatus::Blocked).map_err(to_storage_err)
                })?;
                episode.title
            }
            Err(StorageError::NotFound(_)) => {
                let mut stub = Episode::new(feed_id, episode_id, "", "", Utc::now());
                stub.status = EpisodeStatus::Blocked;
                self.storage.insert_episode(&stub)?;
                String::new()
            }
            Err(err) => return Err(err.into()),
        };

        self.history
            .log_episode_block(feed_id, &feed.title, episode_id, &title, true, None)?;
        self.stage5_publish(&feed).await
    }

    /// Resets an episode to `new` and re-runs Stage 3's per-episode download
    /// subroutine for it alone (§4.6). An episode whose artifact already
    /// exists is marked `downloaded` without invoking the downloader —
    /// `stage3_download`'s existence probe covers that for free.
    pub async fn retry_episode(&self, feed_id: &str, episode_id: &str) -> Result<(), EngineError> {
        let (feed, _) = self.storage.get_feed(feed_id)?;
        self.storage.update_episode(feed_id, episode_id, |e| {
            e.error = None;
            e.set_status(EpisodeStatus::New).map_err(to_storage_err)
        })?;

        let episode = self.storage.get_episode(feed_id, episode_id)?;
        let (stats, _halted) = self
            .stage3_download(&feed, std::slice::from_ref(&episode))
            .await?;
        self.stage5_publish(&feed).await?;

        let success = stats.failed == 0;
        self.history.log_episode_retry(
            feed_id,
            &feed.title,
            episode_id,
            &episode.title,
            success,
            None,
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::LocalArtifactStore;
    use crate::download::DownloadDriver;
    use crate::listing::fixture::{self, Fixtures};
    use crate::models::{CleanupPolicy, CustomMetadata, FeedFormat, FeedQuality, Provider, Schedule, SortOrder};
    use tempfile::TempDir;

    fn sample_feed(id: &str) -> Feed {
        Feed {
            id: id.to_string(),
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
            page_size: 50,
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

    struct Harness {
        _data_dir: TempDir,
        _db_dir: TempDir,
        updater: FeedUpdater,
    }

    async fn harness(fixtures: Fixtures) -> Harness {
        let db_dir = TempDir::new().unwrap();
        let data_dir = TempDir::new().unwrap();
        let storage = Arc::new(StorageGateway::open(&db_dir.path().join("db")).unwrap());
        let artifacts: Arc<dyn ArtifactStore> = Arc::new(LocalArtifactStore::new(data_dir.path()));
        let listing = Arc::new(ListingRegistry::with_fixtures(fixtures));
        let downloader = Arc::new(
            DownloadDriver::discover(Some("true".into()), Some("true".into()))
                .await
                .unwrap_or_else(|_| panic!("test environment must provide a `true` binary")),
        );
        let progress = Arc::new(ProgressTracker::new());
        let history = Arc::new(HistoryRecorder::new(storage.clone(), true));
        let updater = FeedUpdater::new(
            storage.clone(),
            artifacts,
            listing,
            downloader,
            progress,
            history,
            "https://pod.example.com".to_string(),
            Duration::from_secs(60),
        );
        Harness {
            _data_dir: data_dir,
            _db_dir: db_dir,
            updater,
        }
    }

    #[test]
    fn filters_ignore_short_episodes() {
        let mut filters = FilterSet::default();
        filters.min_duration = 120;
        let short = Episode::new("f1", "a", "A", "https://x/a.mp4", Utc::now());
        assert!(!passes_filters(&filters, &short));
    }

    #[test]
    fn max_duration_below_min_duration_rejects_everything() {
        let mut filters = FilterSet::default();
        filters.min_duration = 200;
        filters.max_duration = 50;
        let episode = Episode::new("f1", "a", "A", "https://x/a.mp4", Utc::now());
        assert!(!passes_filters(&filters, &episode));
    }

    #[tokio::test]
    async fn zero_page_size_rebuilds_document_without_downloading() {
        let mut fixtures = Fixtures::new();
        fixtures.insert(
            "https://youtube.com/channel/xyz",
            fixture::sample_snapshot(3),
        );
        let harness = harness(fixtures).await;
        let mut feed = sample_feed("f1");
        feed.page_size = 0;
        harness.updater.storage.add_feed("f1", &feed, &[]).unwrap();

        harness.updater.update("f1", Trigger::Manual).await.unwrap();

        let bytes = {
            let mut reader = harness.updater.artifacts.open("f1.xml").await.unwrap();
            let mut buf = Vec::new();
            tokio::io::AsyncReadExt::read_to_end(&mut reader, &mut buf)
                .await
                .unwrap();
            buf
        };
        assert!(!bytes.is_empty());
    }
}
