use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Closed state machine for an episode's lifecycle (§9 design note: a
/// dynamic status string would let the pipeline write an illegal
/// transition; the enum plus [`EpisodeStatus::can_transition_to`] closes
/// that gap at compile time for the variants and at call time for the
/// transition itself).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EpisodeStatus {
    New,
    Queued,
    Downloading,
    Downloaded,
    Error,
    Cleaned,
    Blocked,
    Ignored,
}

impl EpisodeStatus {
    /// Whether moving from `self` to `to` is a legal transition. `Blocked`
    /// is sticky (§3): once set, only an explicit unblock (not modelled as a
    /// transition here — the API has no "unblock" verb) should remove it,
    /// so every transition *out* of `Blocked` is rejected. `Cleaned` may
    /// only return to `New` via an explicit retry, matching the retry
    /// endpoint rather than a reconciliation pass.
    pub fn can_transition_to(&self, to: EpisodeStatus) -> bool {
        use EpisodeStatus::*;
        if *self == to {
            return true;
        }
        match self {
            Blocked => false,
            Cleaned => matches!(to, New),
            New => matches!(to, Queued | Downloading | Error | Ignored | Blocked),
            Queued => matches!(to, Downloading | Downloaded | Error | Blocked),
            Downloading => matches!(to, Downloaded | Error | Queued | Blocked),
            Downloaded => matches!(to, Cleaned | Blocked),
            Error => matches!(to, New | Queued | Downloading | Ignored | Blocked),
            Ignored => matches!(to, New | Blocked),
        }
    }
}

impl std::fmt::Display for EpisodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EpisodeStatus::New => "new",
            EpisodeStatus::Queued => "queued",
            EpisodeStatus::Downloading => "downloading",
            EpisodeStatus::Downloaded => "downloaded",
            EpisodeStatus::Error => "error",
            EpisodeStatus::Cleaned => "cleaned",
            EpisodeStatus::Blocked => "blocked",
            EpisodeStatus::Ignored => "ignored",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    pub feed_id: String,
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    /// Duration in seconds.
    pub duration: u64,
    pub published: DateTime<Utc>,
    pub media_url: String,
    pub thumbnail_url: Option<String>,
    /// Downloaded artifact size in bytes; zero until `status=downloaded`.
    #[serde(default)]
    pub size: u64,
    pub error: Option<String>,
    pub status: EpisodeStatus,
}

impl Episode {
    pub fn new(
        feed_id: impl Into<String>,
        id: impl Into<String>,
        title: impl Into<String>,
        media_url: impl Into<String>,
        published: DateTime<Utc>,
    ) -> Self {
        Self {
            feed_id: feed_id.into(),
            id: id.into(),
            title: title.into(),
            description: None,
            duration: 0,
            published,
            media_url: media_url.into(),
            thumbnail_url: None,
            size: 0,
            error: None,
            status: EpisodeStatus::New,
        }
    }

    /// The path component the artifact store keys the media file under,
    /// `<episode_id>.<extension>`, sanitized for filesystem safety.
    pub fn file_name(&self, extension: &str) -> String {
        crate::utils::validation::episode_file_name(&self.id, extension)
    }

    /// The artifact store path, `<feed_id>/<episode_file_name>`.
    pub fn artifact_path(&self, extension: &str) -> String {
        format!("{}/{}", self.feed_id, self.file_name(extension))
    }

    pub fn set_status(&mut self, to: EpisodeStatus) -> Result<(), EngineError> {
        if !self.status.can_transition_to(to) {
            return Err(EngineError::InvalidTransition {
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        self.status = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use EpisodeStatus::*;

    #[test]
    fn blocked_is_sticky() {
        assert!(!Blocked.can_transition_to(New));
        assert!(!Blocked.can_transition_to(Downloaded));
        assert!(Blocked.can_transition_to(Blocked));
    }

    #[test]
    fn cleaned_only_returns_to_new_via_retry() {
        assert!(Cleaned.can_transition_to(New));
        assert!(!Cleaned.can_transition_to(Downloading));
        assert!(!Cleaned.can_transition_to(Downloaded));
    }

    #[test]
    fn set_status_rejects_illegal_transition() {
        let mut episode = Episode::new(
            "f1",
            "e1",
            "Title",
            "https://example.com/e1.mp4",
            Utc::now(),
        );
        episode.status = EpisodeStatus::Blocked;
        assert!(episode.set_status(EpisodeStatus::New).is_err());
    }

    #[test]
    fn artifact_path_joins_feed_and_file_name() {
        let episode = Episode::new(
            "f1",
            "e/1",
            "Title",
            "https://example.com/e1.mp4",
            Utc::now(),
        );
        assert_eq!(episode.artifact_path("mp3"), "f1/e_1.mp3");
    }
}
