//! Application-wide constants
//!
//! This module centralizes magic numbers and configuration defaults used
//! throughout the engine, making them easier to maintain and understand.

use std::time::Duration;

/// Network-related constants
pub mod network {
    use super::*;

    /// Default timeout for HTTP requests (listing/metadata fetches)
    pub const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

    /// Default per-download timeout when the config omits one
    pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(10 * 60);

    /// Maximum number of redirects to follow
    pub const MAX_REDIRECTS: usize = 10;

    /// User agent string for HTTP requests
    pub const USER_AGENT: &str = concat!("podsync-engine/", env!("CARGO_PKG_VERSION"));
}

/// Scheduler-related constants
pub mod scheduler {
    /// Capacity of the bounded job queue (§4.7)
    pub const QUEUE_CAPACITY: usize = 16;
}

/// Download driver constants
pub mod downloader {
    use super::*;

    /// Interval between self-update attempts
    pub const SELF_UPDATE_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

    /// Poll interval while tailing subprocess stderr
    pub const STDERR_POLL_INTERVAL: Duration = Duration::from_millis(50);
}

/// Progress tracker constants
pub mod progress {
    /// SSE frame interval advertised by `/progress/stream` (§6)
    pub const SSE_FRAME_INTERVAL_MS: u64 = 500;
}

/// History retention defaults (§6, `[history]`)
pub mod history {
    pub const DEFAULT_RETENTION_DAYS: i64 = 30;
    pub const DEFAULT_MAX_ENTRIES: usize = 1000;
    pub const DEFAULT_PAGE_SIZE: usize = 20;
}

/// Storage Gateway key-space constants (§4.1)
pub mod storage {
    pub const KEY_VERSION: &str = "podsync/v1";
}
