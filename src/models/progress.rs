use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The sub-stage an in-flight episode download is in (§3). `Saving` covers
/// the window between the driver handing back a finished file and the Feed
/// Updater committing it to the artifact store — the driver itself only
/// ever reports `Downloading`/`Encoding`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Downloading,
    Encoding,
    Saving,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeProgress {
    pub feed_id: String,
    pub episode_id: String,
    pub title: String,
    pub stage: Stage,
    /// 0-100.
    pub percent: f32,
    pub downloaded_bytes: u64,
    pub total_bytes: u64,
    pub speed: String,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EpisodeProgress {
    pub fn new(feed_id: impl Into<String>, episode_id: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            feed_id: feed_id.into(),
            episode_id: episode_id.into(),
            title: title.into(),
            stage: Stage::Downloading,
            percent: 0.0,
            downloaded_bytes: 0,
            total_bytes: 0,
            speed: String::new(),
            started_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedProgress {
    pub feed_id: String,
    pub total: usize,
    pub completed: usize,
    pub downloading: usize,
    pub queued: usize,
    /// `(completed + Σ active.percent/100) / total × 100`, recomputed after
    /// every counter change (§4.3) so readers see continuous progress.
    pub overall_percent: f32,
    pub started_at: DateTime<Utc>,
}

impl FeedProgress {
    pub fn new(feed_id: impl Into<String>, total: usize) -> Self {
        Self {
            feed_id: feed_id.into(),
            total,
            completed: 0,
            downloading: 0,
            queued: 0,
            overall_percent: 0.0,
            started_at: Utc::now(),
        }
    }
}
