//! Domain types shared by every engine component (§3 of the design doc).
//!
//! Durable records (`Feed`, `Episode`, `HistoryEntry`) are owned by the
//! [`crate::storage`] gateway; volatile snapshots (`FeedProgress`,
//! `EpisodeProgress`) are owned by the progress tracker. Nothing in this
//! module talks to storage directly.

pub mod episode;
pub mod feed;
pub mod history;
pub mod progress;

pub use episode::{Episode, EpisodeStatus};
pub use feed::{
    CleanupPolicy, CustomMetadata, Feed, FeedFormat, FeedQuality, FilterSet, Provider, Schedule,
    SortOrder,
};
pub use history::{EpisodeDetail, HistoryEntry, JobStatus, JobType, Statistics, Trigger};
pub use progress::{EpisodeProgress, FeedProgress, Stage};
