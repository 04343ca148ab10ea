//! Downloader argument construction (§4.5 argument table). Kept separate
//! from the driver itself so the format-selector logic is independently
//! testable without spawning a subprocess.

use std::path::Path;

use crate::models::{Episode, Feed, FeedFormat, FeedQuality};

fn height_clip(feed: &Feed) -> String {
    feed.max_height
        .map(|h| format!("[height<=?{h}]"))
        .unwrap_or_default()
}

fn format_selector(feed: &Feed) -> String {
    match (feed.format, feed.quality) {
        (FeedFormat::Video, FeedQuality::High) => {
            let clip = height_clip(feed);
            format!(
                "bestvideo[ext=mp4][vcodec^=avc1]{clip}+bestaudio[ext=m4a]/best[ext=mp4]{clip}/best"
            )
        }
        (FeedFormat::Video, FeedQuality::Low) => {
            let clip = height_clip(feed);
            format!(
                "worstvideo[ext=mp4][vcodec^=avc1]{clip}+worstaudio[ext=m4a]/worst[ext=mp4]{clip}/worst"
            )
        }
        (FeedFormat::Audio, FeedQuality::High) => "bestaudio".to_string(),
        (FeedFormat::Audio, FeedQuality::Low) => "worstaudio".to_string(),
        (FeedFormat::Custom, _) => feed
            .custom_format
            .as_ref()
            .map(|(_, selector)| selector.clone())
            .unwrap_or_default(),
    }
}

/// Builds the full argument list for one episode download (§4.5). `tmp_dir`
/// is the scratch directory the driver created for this invocation.
pub fn build_args(feed: &Feed, episode: &Episode, tmp_dir: &Path) -> Vec<String> {
    let mut args = Vec::new();

    match feed.format {
        FeedFormat::Audio => {
            args.push("--extract-audio".to_string());
            args.push("--audio-format".to_string());
            args.push("mp3".to_string());
            args.push("--format".to_string());
            args.push(format_selector(feed));
        }
        FeedFormat::Custom => {
            let extension = feed
                .custom_format
                .as_ref()
                .map(|(ext, _)| ext.clone())
                .unwrap_or_else(|| "mp3".to_string());
            args.push("--audio-format".to_string());
            args.push(extension);
            args.push("--format".to_string());
            args.push(format_selector(feed));
        }
        FeedFormat::Video => {
            args.push("--format".to_string());
            args.push(format_selector(feed));
        }
    }

    args.extend(feed.extra_args.iter().cloned());

    args.push("--progress".to_string());
    args.push("--newline".to_string());
    args.push("--output".to_string());
    args.push(
        tmp_dir
            .join(format!("{}.%(ext)s", episode.id))
            .to_string_lossy()
            .into_owned(),
    );
    args.push(episode.media_url.clone());
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::feed::{CleanupPolicy, CustomMetadata, FilterSet, Provider, Schedule, SortOrder};

    fn sample_feed(format: FeedFormat, quality: FeedQuality, max_height: Option<u32>) -> Feed {
        Feed {
            id: "f1".into(),
            source_url: "https://youtube.com/channel/xyz".into(),
            provider: Provider::Youtube,
            title: "Test Feed".into(),
            description: None,
            cover_art: None,
            author: None,
            format,
            quality,
            max_height,
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

    fn sample_episode() -> Episode {
        Episode::new(
            "f1",
            "ep1",
            "Episode 1",
            "https://example.com/watch?v=abc",
            chrono::Utc::now(),
        )
    }

    #[test]
    fn audio_format_extracts_to_mp3() {
        let feed = sample_feed(FeedFormat::Audio, FeedQuality::High, None);
        let episode = sample_episode();
        let args = build_args(&feed, &episode, Path::new("/tmp/work"));
        assert!(args.contains(&"--extract-audio".to_string()));
        assert!(args.windows(2).any(|w| w == ["--audio-format", "mp3"]));
        assert!(args.windows(2).any(|w| w == ["--format", "bestaudio"]));
    }

    #[test]
    fn video_high_quality_clips_by_max_height() {
        let feed = sample_feed(FeedFormat::Video, FeedQuality::High, Some(720));
        let episode = sample_episode();
        let args = build_args(&feed, &episode, Path::new("/tmp/work"));
        let selector = args
            .iter()
            .position(|a| a == "--format")
            .map(|i| args[i + 1].clone())
            .unwrap();
        assert!(selector.contains("height<=?720"));
        assert!(selector.contains("bestvideo"));
    }

    #[test]
    fn custom_format_uses_configured_extension_and_selector() {
        let mut feed = sample_feed(FeedFormat::Custom, FeedQuality::High, None);
        feed.custom_format = Some(("ogg".to_string(), "bestaudio[acodec=opus]".to_string()));
        let episode = sample_episode();
        let args = build_args(&feed, &episode, Path::new("/tmp/work"));
        assert!(args.windows(2).any(|w| w == ["--audio-format", "ogg"]));
        assert!(args
            .windows(2)
            .any(|w| w == ["--format", "bestaudio[acodec=opus]"]));
    }

    #[test]
    fn extra_args_and_output_are_appended_last() {
        let mut feed = sample_feed(FeedFormat::Audio, FeedQuality::High, None);
        feed.extra_args = vec!["--cookies".to_string(), "cookies.txt".to_string()];
        let episode = sample_episode();
        let args = build_args(&feed, &episode, Path::new("/tmp/work"));
        assert!(args.windows(2).any(|w| w == ["--cookies", "cookies.txt"]));
        assert_eq!(args.last().unwrap(), &episode.media_url);
    }
}
