use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Video-hosting provider a feed's source URL resolves to (§9 provider
/// polymorphism). The Feed Updater never matches on this directly — it asks
/// the [`crate::listing`] registry for the adapter tagged with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Youtube,
    Vimeo,
    Soundcloud,
    Twitch,
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Provider::Youtube => "youtube",
            Provider::Vimeo => "vimeo",
            Provider::Soundcloud => "soundcloud",
            Provider::Twitch => "twitch",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedFormat {
    Video,
    Audio,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedQuality {
    High,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// A feed's update cadence (§9 cron vs interval duality). The two modes are
/// not interchangeable: `Interval` implies a boot-time kick, `Cron` defers
/// the first fire to the next tick. `Both` keeps an explicit cron expression
/// but is otherwise treated like `Cron` for scheduling purposes — the
/// interval is advisory documentation only once a cron expression exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Schedule {
    Interval { period_seconds: u64 },
    Cron { expression: String },
    Both {
        period_seconds: u64,
        expression: String,
    },
}

impl Schedule {
    /// Whether the scheduler should push this feed onto the queue at boot,
    /// as opposed to waiting for the cron engine's first fire.
    pub fn has_explicit_cron_schedule(&self) -> bool {
        matches!(self, Schedule::Cron { .. } | Schedule::Both { .. })
    }
}

/// Regex/numeric filter predicates applied in Stage 2 of the pipeline. An
/// empty pattern (`None`) means "accept everything" for that predicate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterSet {
    pub title: Option<String>,
    pub not_title: Option<String>,
    pub description: Option<String>,
    pub not_description: Option<String>,
    #[serde(default)]
    pub min_duration: u64,
    #[serde(default)]
    pub max_duration: u64,
    #[serde(default)]
    pub min_age_days: u64,
    #[serde(default)]
    pub max_age_days: u64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CleanupPolicy {
    pub keep_last: usize,
}

/// The iTunes-facing metadata block a feed may override on top of whatever
/// the listing source reports.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomMetadata {
    pub category: Option<String>,
    #[serde(default)]
    pub subcategories: Vec<String>,
    pub language: Option<String>,
    #[serde(default)]
    pub explicit: bool,
    pub owner: Option<String>,
    pub link: Option<String>,
    pub title_override: Option<String>,
    pub description_override: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feed {
    pub id: String,
    pub source_url: String,
    pub provider: Provider,
    pub title: String,
    pub description: Option<String>,
    pub cover_art: Option<String>,
    pub author: Option<String>,
    pub format: FeedFormat,
    pub quality: FeedQuality,
    pub max_height: Option<u32>,
    pub schedule: Schedule,
    pub page_size: usize,
    pub playlist_sort: SortOrder,
    #[serde(default)]
    pub filters: FilterSet,
    #[serde(default)]
    pub cleanup: CleanupPolicy,
    #[serde(default)]
    pub custom: CustomMetadata,
    /// Include this feed's entry when `podsync.opml` is rendered.
    #[serde(default = "default_true")]
    pub opml_visible: bool,
    /// Extra yt-dlp-style arguments appended to every download invocation.
    #[serde(default)]
    pub extra_args: Vec<String>,
    /// Executables run after every successful episode download.
    #[serde(default)]
    pub hooks: Vec<String>,
    /// `{ext, format_selector}` for `FeedFormat::Custom`.
    pub custom_format: Option<(String, String)>,
}

fn default_true() -> bool {
    true
}

impl Feed {
    /// The file extension episodes of this feed are downloaded as, used to
    /// build artifact paths and the RSS enclosure (§4.2, §4.6 Stage 3).
    pub fn media_extension(&self) -> String {
        match self.format {
            FeedFormat::Audio => "mp3".to_string(),
            FeedFormat::Video => "mp4".to_string(),
            FeedFormat::Custom => self
                .custom_format
                .as_ref()
                .map(|(ext, _)| ext.clone())
                .unwrap_or_else(|| "bin".to_string()),
        }
    }

    /// The MIME type advertised in the rendered feed's `<enclosure>` tag.
    pub fn media_mime_type(&self) -> &'static str {
        match self.format {
            FeedFormat::Audio => "audio/mpeg",
            FeedFormat::Video => "video/mp4",
            FeedFormat::Custom => "application/octet-stream",
        }
    }

    /// Validate invariants that must hold before the feed is accepted by the
    /// storage gateway or the scheduler (§3 invariant: interval xor/both
    /// cron; §7 `ConfigError`).
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.id.trim().is_empty() {
            return Err(EngineError::Config("feed id must not be empty".into()));
        }
        if let Err(reason) = crate::utils::validation::validate_feed_url(&self.source_url) {
            return Err(EngineError::Config(format!(
                "feed {}: {reason}",
                self.id
            )));
        }
        if let Schedule::Interval { period_seconds } = &self.schedule {
            if *period_seconds == 0 {
                return Err(EngineError::Config(format!(
                    "feed {}: interval period must be positive",
                    self.id
                )));
            }
        }
        if self.format == FeedFormat::Custom && self.custom_format.is_none() {
            return Err(EngineError::Config(format!(
                "feed {}: format=custom requires custom_format",
                self.id
            )));
        }
        for pattern in [
            &self.filters.title,
            &self.filters.not_title,
            &self.filters.description,
            &self.filters.not_description,
        ]
        .into_iter()
        .flatten()
        {
            if let Err(err) = regex::Regex::new(pattern) {
                return Err(EngineError::Config(format!(
                    "feed {}: invalid filter regex {pattern:?}: {err}",
                    self.id
                )));
            }
        }
        Ok(())
    }
}
