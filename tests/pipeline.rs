//! End-to-end scenarios for the Feed Updater pipeline (§8 concrete
//! scenarios): a fresh feed downloading everything, a filter rejecting
//! short episodes, a mid-run rate limit, a sticky block surviving a
//! refresh, cleanup retention, and newest-first history pagination.
//!
//! All six drive the real `FeedUpdater` against a real (temp-directory)
//! `sled` store and `LocalArtifactStore`, with a shell-script stand-in for
//! the external downloader binary (`tests/fixtures/fake_downloader.sh`)
//! and a fixture-backed `ListingSource`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use tempfile::TempDir;
use tokio::io::AsyncReadExt;

use podsync_engine::artifact::{ArtifactStore, LocalArtifactStore};
use podsync_engine::download::DownloadDriver;
use podsync_engine::history_recorder::HistoryRecorder;
use podsync_engine::listing::fixture::Fixtures;
use podsync_engine::listing::{ListedEpisode, ListingRegistry};
use podsync_engine::models::{
    CleanupPolicy, CustomMetadata, EpisodeStatus, Feed, FeedFormat, FeedQuality, FilterSet,
    JobStatus, JobType, Provider, Schedule, SortOrder, Trigger,
};
use podsync_engine::progress_tracker::ProgressTracker;
use podsync_engine::storage::{HistoryFilters, StorageGateway};
use podsync_engine::FeedUpdater;

fn fake_downloader_path() -> PathBuf {
    PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/fake_downloader.sh"))
}

fn episode(id: &str, seconds_offset: i64, duration: u64, url: &str) -> ListedEpisode {
    let base = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
    ListedEpisode {
        id: id.to_string(),
        title: format!("Episode {id}"),
        description: Some(format!("Description for {id}")),
        duration,
        published: base + chrono::Duration::seconds(seconds_offset),
        media_url: url.to_string(),
        thumbnail_url: None,
    }
}

fn sample_feed(id: &str, source_url: &str) -> Feed {
    Feed {
        id: id.to_string(),
        source_url: source_url.to_string(),
        provider: Provider::Youtube,
        title: format!("Feed {id}"),
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
    _db_dir: TempDir,
    _data_dir: TempDir,
    storage: Arc<StorageGateway>,
    artifacts: Arc<dyn ArtifactStore>,
    updater: FeedUpdater,
}

async fn harness(fixtures: Fixtures) -> Harness {
    let db_dir = TempDir::new().unwrap();
    let data_dir = TempDir::new().unwrap();
    let storage = Arc::new(StorageGateway::open(&db_dir.path().join("db")).unwrap());
    let artifacts: Arc<dyn ArtifactStore> = Arc::new(LocalArtifactStore::new(data_dir.path()));
    let listing = Arc::new(ListingRegistry::with_fixtures(fixtures));
    let downloader = Arc::new(
        DownloadDriver::discover(Some(fake_downloader_path()), Some("true".into()))
            .await
            .expect("fake downloader script must be discoverable"),
    );
    let progress = Arc::new(ProgressTracker::new());
    let history = Arc::new(HistoryRecorder::new(Arc::clone(&storage), true));
    let updater = FeedUpdater::new(
        Arc::clone(&storage),
        Arc::clone(&artifacts),
        listing,
        downloader,
        progress,
        history,
        "https://pod.example.com".to_string(),
        Duration::from_secs(30),
    );
    Harness {
        _db_dir: db_dir,
        _data_dir: data_dir,
        storage,
        artifacts,
        updater,
    }
}

async fn read_artifact(artifacts: &Arc<dyn ArtifactStore>, path: &str) -> Vec<u8> {
    let mut reader = artifacts.open(path).await.unwrap();
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).await.unwrap();
    buf
}

/// Scenario 1: fresh feed, 3 episodes, all succeed.
#[tokio::test]
async fn fresh_feed_all_episodes_succeed() {
    let mut fixtures = Fixtures::new();
    fixtures.insert(
        "https://youtube.com/channel/f1",
        podsync_engine::listing::FeedSnapshot {
            title: Some("Feed One".into()),
            description: None,
            cover_art: None,
            author: None,
            episodes: vec![
                episode("a", 0, 120, "https://example.com/videos/a"),
                episode("b", 3600, 300, "https://example.com/videos/b"),
                episode("c", 7200, 60, "https://example.com/videos/c"),
            ],
        },
    );
    let harness = harness(fixtures).await;
    let feed = sample_feed("f1", "https://youtube.com/channel/f1");
    harness.storage.add_feed("f1", &feed, &[]).unwrap();

    harness.updater.update("f1", Trigger::Manual).await.unwrap();

    for id in ["a", "b", "c"] {
        let ep = harness.storage.get_episode("f1", id).unwrap();
        assert_eq!(ep.status, EpisodeStatus::Downloaded);
        assert!(ep.size > 0);
        let bytes = read_artifact(&harness.artifacts, &format!("f1/{}", ep.file_name("mp3"))).await;
        assert_eq!(bytes.len() as u64, ep.size);
    }

    let (entries, total) = harness
        .storage
        .list_history(&HistoryFilters { feed_id: Some("f1".into()), ..Default::default() }, 1, 10)
        .unwrap();
    assert_eq!(total, 1);
    let entry = &entries[0];
    assert_eq!(entry.status, JobStatus::Success);
    assert_eq!(entry.job_type, JobType::FeedUpdate);
    assert_eq!(entry.stats.downloaded, 3);
    assert_eq!(entry.stats.failed, 0);
    assert!(entry.stats.bytes_downloaded > 0);

    let xml = read_artifact(&harness.artifacts, "f1.xml").await;
    assert!(!xml.is_empty());
}

/// Scenario 2: a duration filter rejects the short episode and marks it
/// `ignored` so the next run doesn't re-evaluate it.
#[tokio::test]
async fn filter_rejects_short_episode_and_marks_it_ignored() {
    let mut fixtures = Fixtures::new();
    fixtures.insert(
        "https://youtube.com/channel/f2",
        podsync_engine::listing::FeedSnapshot {
            title: None,
            description: None,
            cover_art: None,
            author: None,
            episodes: vec![
                episode("long", 0, 600, "https://example.com/videos/long"),
                episode("short", 3600, 30, "https://example.com/videos/short"),
            ],
        },
    );
    let harness = harness(fixtures).await;
    let mut feed = sample_feed("f2", "https://youtube.com/channel/f2");
    feed.filters.min_duration = 120;
    harness.storage.add_feed("f2", &feed, &[]).unwrap();

    harness.updater.update("f2", Trigger::Manual).await.unwrap();

    let long = harness.storage.get_episode("f2", "long").unwrap();
    assert_eq!(long.status, EpisodeStatus::Downloaded);
    let short = harness.storage.get_episode("f2", "short").unwrap();
    assert_eq!(short.status, EpisodeStatus::Ignored);

    // Re-running must not re-attempt the ignored episode or flip its status.
    harness.updater.update("f2", Trigger::Manual).await.unwrap();
    let short_again = harness.storage.get_episode("f2", "short").unwrap();
    assert_eq!(short_again.status, EpisodeStatus::Ignored);
}

/// Scenario 3: a 429 mid-run halts further downloads but still finishes
/// the run (rebuilds the document, closes history as `partial`).
#[tokio::test]
async fn rate_limit_mid_run_halts_without_failing_the_job() {
    let mut fixtures = Fixtures::new();
    fixtures.insert(
        "https://youtube.com/channel/f3",
        podsync_engine::listing::FeedSnapshot {
            title: None,
            description: None,
            cover_art: None,
            author: None,
            episodes: vec![
                episode("first", 0, 120, "https://example.com/videos/first"),
                episode("limited", 3600, 120, "https://example.com/videos/ratelimited"),
                episode("later", 7200, 120, "https://example.com/videos/later"),
            ],
        },
    );
    let harness = harness(fixtures).await;
    let feed = sample_feed("f3", "https://youtube.com/channel/f3");
    harness.storage.add_feed("f3", &feed, &[]).unwrap();

    harness.updater.update("f3", Trigger::Manual).await.unwrap();

    let first = harness.storage.get_episode("f3", "first").unwrap();
    assert_eq!(first.status, EpisodeStatus::Downloaded);

    // The rate-limited episode is left queued (not failed) so the next run retries it.
    let limited = harness.storage.get_episode("f3", "limited").unwrap();
    assert_eq!(limited.status, EpisodeStatus::Queued);

    // Everything after the halt point never got a chance to run.
    let later = harness.storage.get_episode("f3", "later").unwrap();
    assert_eq!(later.status, EpisodeStatus::Queued);

    // The feed document is still rebuilt even though the run halted early.
    let xml = read_artifact(&harness.artifacts, "f3.xml").await;
    assert!(!xml.is_empty());

    // A halt that still downloaded something closes as `partial`, not
    // `success` — the run didn't finish its candidate list.
    let (entries, _) = harness
        .storage
        .list_history(&HistoryFilters { feed_id: Some("f3".into()), ..Default::default() }, 1, 10)
        .unwrap();
    let entry = &entries[0];
    assert_eq!(entry.status, JobStatus::Partial);
    assert_eq!(entry.stats.downloaded, 1);
    assert_eq!(entry.stats.failed, 0);
}

/// Scenario 4: a blocked episode stays blocked through a subsequent
/// refresh even though the listing still serves it.
#[tokio::test]
async fn blocked_episode_sticks_through_refresh() {
    let mut fixtures = Fixtures::new();
    fixtures.insert(
        "https://youtube.com/channel/f4",
        podsync_engine::listing::FeedSnapshot {
            title: None,
            description: None,
            cover_art: None,
            author: None,
            episodes: vec![episode("a", 0, 120, "https://example.com/videos/a")],
        },
    );
    let harness = harness(fixtures).await;
    let feed = sample_feed("f4", "https://youtube.com/channel/f4");
    harness.storage.add_feed("f4", &feed, &[]).unwrap();

    harness.updater.update("f4", Trigger::Manual).await.unwrap();
    assert_eq!(
        harness.storage.get_episode("f4", "a").unwrap().status,
        EpisodeStatus::Downloaded
    );

    harness.updater.block_episode("f4", "a").await.unwrap();
    assert_eq!(
        harness.storage.get_episode("f4", "a").unwrap().status,
        EpisodeStatus::Blocked
    );
    assert!(harness.artifacts.size("f4/a.mp3").await.is_err(), "blocking a downloaded episode must remove its artifact");

    harness.updater.update("f4", Trigger::Manual).await.unwrap();
    assert_eq!(
        harness.storage.get_episode("f4", "a").unwrap().status,
        EpisodeStatus::Blocked
    );
}

/// Scenario 5: `keep_last = 2` cleans up everything past the two newest
/// downloaded episodes.
#[tokio::test]
async fn cleanup_keeps_only_the_two_newest_downloads() {
    let mut fixtures = Fixtures::new();
    fixtures.insert(
        "https://youtube.com/channel/f5",
        podsync_engine::listing::FeedSnapshot {
            title: None,
            description: None,
            cover_art: None,
            author: None,
            episodes: vec![
                episode("a", 0, 120, "https://example.com/videos/a"),
                episode("b", 3600, 120, "https://example.com/videos/b"),
                episode("c", 7200, 120, "https://example.com/videos/c"),
            ],
        },
    );
    let harness = harness(fixtures).await;
    let mut feed = sample_feed("f5", "https://youtube.com/channel/f5");
    feed.cleanup = CleanupPolicy { keep_last: 2 };
    harness.storage.add_feed("f5", &feed, &[]).unwrap();

    harness.updater.update("f5", Trigger::Manual).await.unwrap();

    let a = harness.storage.get_episode("f5", "a").unwrap();
    assert_eq!(a.status, EpisodeStatus::Cleaned);
    assert!(a.title.is_empty());
    assert!(harness.artifacts.size(&format!("f5/{}", a.file_name("mp3"))).await.is_err());

    for id in ["b", "c"] {
        assert_eq!(
            harness.storage.get_episode("f5", id).unwrap().status,
            EpisodeStatus::Downloaded
        );
    }
}

/// Scenario 6: history pagination is newest-first.
#[tokio::test]
async fn history_pagination_is_newest_first() {
    let mut fixtures = Fixtures::new();
    fixtures.insert(
        "https://youtube.com/channel/f6",
        podsync_engine::listing::FeedSnapshot {
            title: None,
            description: None,
            cover_art: None,
            author: None,
            episodes: vec![episode("a", 0, 120, "https://example.com/videos/a")],
        },
    );
    let harness = harness(fixtures).await;
    let feed = sample_feed("f6", "https://youtube.com/channel/f6");
    harness.storage.add_feed("f6", &feed, &[]).unwrap();

    for _ in 0..3 {
        harness.updater.update("f6", Trigger::Manual).await.unwrap();
    }

    let (entries, total) = harness
        .storage
        .list_history(&HistoryFilters::default(), 1, 10)
        .unwrap();
    assert_eq!(total, 3);
    assert_eq!(entries.len(), 3);
    for pair in entries.windows(2) {
        assert!(pair[0].start >= pair[1].start, "entries must be newest-first");
    }
}
