use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    FeedUpdate,
    EpisodeRetry,
    EpisodeDelete,
    EpisodeBlock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Success,
    Failed,
    Partial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    Scheduled,
    Manual,
}

/// Per-episode outcome captured at job end (§4.4
/// `log_feed_update_end_with_episodes`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeDetail {
    pub id: String,
    pub title: String,
    pub status: crate::models::EpisodeStatus,
    pub error: Option<String>,
    pub size: u64,
    pub duration: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Statistics {
    #[serde(default)]
    pub queued: usize,
    #[serde(default)]
    pub downloaded: usize,
    #[serde(default)]
    pub failed: usize,
    #[serde(default)]
    pub ignored: usize,
    #[serde(default)]
    pub bytes_downloaded: u64,
    #[serde(default)]
    pub episodes: Vec<EpisodeDetail>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// `<unix_seconds>-<random>`, so lexicographic order equals chronological
    /// order (§3).
    pub id: String,
    pub job_type: JobType,
    pub feed_id: String,
    pub feed_title: String,
    pub episode_id: Option<String>,
    pub episode_title: Option<String>,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    /// Seconds; `None` while `status == Running`.
    pub duration_seconds: Option<i64>,
    pub status: JobStatus,
    pub trigger: Trigger,
    #[serde(default)]
    pub stats: Statistics,
    pub error: Option<String>,
}

impl HistoryEntry {
    /// Builds the lexicographically-sortable ID described in §3: the start
    /// time makes entries sort chronologically, the random suffix breaks
    /// ties between entries started in the same second.
    pub fn new_id(start: DateTime<Utc>) -> String {
        format!("{}-{}", start.timestamp(), uuid::Uuid::new_v4())
    }

    pub fn close(&mut self, end: DateTime<Utc>, status: JobStatus, stats: Statistics, error: Option<String>) {
        self.end = Some(end);
        self.duration_seconds = Some((end - self.start).num_seconds());
        self.status = status;
        self.stats = stats;
        self.error = error;
    }
}
