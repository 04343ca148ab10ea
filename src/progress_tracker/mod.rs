//! Progress Tracker (§4.3): a process-wide, lock-guarded in-memory map of
//! feed- and episode-level download progress. Nothing here is durable — it
//! exists purely so the API façade has something to poll or stream.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::models::progress::{EpisodeProgress, FeedProgress, Stage};

fn episode_key(feed_id: &str, episode_id: &str) -> String {
    format!("{feed_id}/{episode_id}")
}

#[derive(Default)]
struct State {
    feeds: HashMap<String, FeedProgress>,
    episodes: HashMap<String, EpisodeProgress>,
}

impl State {
    fn recompute_overall(&mut self, feed_id: &str) {
        let Some(feed) = self.feeds.get_mut(feed_id) else {
            return;
        };
        if feed.total == 0 {
            feed.overall_percent = 0.0;
            return;
        }
        let active_fraction: f32 = self
            .episodes
            .values()
            .filter(|e| e.feed_id == feed_id)
            .map(|e| e.percent / 100.0)
            .sum();
        feed.overall_percent =
            (feed.completed as f32 + active_fraction) / feed.total as f32 * 100.0;
    }
}

/// Concurrency-safe tracker. One instance is shared across the scheduler's
/// worker and every API handler that serves progress reads.
pub struct ProgressTracker {
    state: RwLock<State>,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
        }
    }

    pub fn init_feed_progress(&self, feed_id: &str, total_episodes: usize) {
        let mut state = self.state.write();
        state
            .feeds
            .insert(feed_id.to_string(), FeedProgress::new(feed_id, total_episodes));
    }

    pub fn queue_episodes(&self, feed_id: &str, n: usize) {
        let mut state = self.state.write();
        if let Some(feed) = state.feeds.get_mut(feed_id) {
            feed.queued += n;
        }
    }

    pub fn start_episode(&self, feed_id: &str, episode_id: &str, title: &str) {
        let mut state = self.state.write();
        state.episodes.insert(
            episode_key(feed_id, episode_id),
            EpisodeProgress::new(feed_id, episode_id, title),
        );
        if let Some(feed) = state.feeds.get_mut(feed_id) {
            feed.queued = feed.queued.saturating_sub(1);
            feed.downloading += 1;
        }
        state.recompute_overall(feed_id);
    }

    #[allow(clippy::too_many_arguments)]
    pub fn update_episode(
        &self,
        feed_id: &str,
        episode_id: &str,
        stage: Stage,
        percent: f32,
        downloaded: u64,
        total: u64,
        speed: &str,
    ) {
        let mut state = self.state.write();
        let key = episode_key(feed_id, episode_id);
        let entry = state
            .episodes
            .entry(key)
            .or_insert_with(|| EpisodeProgress::new(feed_id, episode_id, ""));
        entry.stage = stage;
        entry.percent = percent;
        entry.downloaded_bytes = downloaded;
        entry.total_bytes = total;
        entry.speed = speed.to_string();
        entry.updated_at = chrono::Utc::now();
        state.recompute_overall(feed_id);
    }

    pub fn complete_episode(&self, feed_id: &str, episode_id: &str) {
        let mut state = self.state.write();
        state.episodes.remove(&episode_key(feed_id, episode_id));
        if let Some(feed) = state.feeds.get_mut(feed_id) {
            feed.downloading = feed.downloading.saturating_sub(1);
            feed.completed += 1;
        }
        state.recompute_overall(feed_id);
    }

    pub fn clear_feed(&self, feed_id: &str) {
        let mut state = self.state.write();
        state.feeds.remove(feed_id);
        state.episodes.retain(|_, e| e.feed_id != feed_id);
    }

    pub fn feed_progress(&self, feed_id: &str) -> Option<FeedProgress> {
        self.state.read().feeds.get(feed_id).cloned()
    }

    pub fn all_feed_progress(&self) -> Vec<FeedProgress> {
        self.state.read().feeds.values().cloned().collect()
    }

    pub fn episodes_for_feed(&self, feed_id: &str) -> Vec<EpisodeProgress> {
        self.state
            .read()
            .episodes
            .values()
            .filter(|e| e.feed_id == feed_id)
            .cloned()
            .collect()
    }

    pub fn all_episode_progress(&self) -> Vec<EpisodeProgress> {
        self.state.read().episodes.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_then_update_then_complete_recomputes_overall_percent() {
        let tracker = ProgressTracker::new();
        tracker.init_feed_progress("feed1", 2);
        tracker.queue_episodes("feed1", 2);

        tracker.start_episode("feed1", "ep1", "Episode 1");
        let progress = tracker.feed_progress("feed1").unwrap();
        assert_eq!(progress.queued, 1);
        assert_eq!(progress.downloading, 1);

        tracker.update_episode("feed1", "ep1", Stage::Downloading, 50.0, 500, 1000, "1MiB/s");
        let progress = tracker.feed_progress("feed1").unwrap();
        assert!((progress.overall_percent - 25.0).abs() < 0.01);

        tracker.complete_episode("feed1", "ep1");
        let progress = tracker.feed_progress("feed1").unwrap();
        assert_eq!(progress.completed, 1);
        assert_eq!(progress.downloading, 0);
        assert!((progress.overall_percent - 50.0).abs() < 0.01);
    }

    #[test]
    fn update_episode_creates_record_when_missing() {
        let tracker = ProgressTracker::new();
        tracker.init_feed_progress("feed1", 1);
        tracker.update_episode("feed1", "ep1", Stage::Encoding, 10.0, 10, 100, "500KiB/s");
        let episodes = tracker.episodes_for_feed("feed1");
        assert_eq!(episodes.len(), 1);
        assert_eq!(episodes[0].stage, Stage::Encoding);
    }

    #[test]
    fn clear_feed_removes_feed_and_its_episodes() {
        let tracker = ProgressTracker::new();
        tracker.init_feed_progress("feed1", 1);
        tracker.start_episode("feed1", "ep1", "Episode 1");
        tracker.clear_feed("feed1");
        assert!(tracker.feed_progress("feed1").is_none());
        assert!(tracker.episodes_for_feed("feed1").is_empty());
    }

    #[test]
    fn snapshots_are_independent_of_later_mutation() {
        let tracker = ProgressTracker::new();
        tracker.init_feed_progress("feed1", 1);
        let snapshot = tracker.all_feed_progress();
        tracker.queue_episodes("feed1", 1);
        assert_eq!(snapshot[0].queued, 0);
    }
}
