//! Download Driver (§4.5): wraps the external media-downloader binary.
//! Discovery, self-update, playlist metadata, and the per-episode download
//! itself all go through one subprocess-spawning surface so the rest of the
//! engine never shells out directly.

pub mod args;
pub mod error;
pub mod parse;

use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, ReadBuf};
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub use error::DownloadError;

use crate::constants::downloader;
use crate::listing::PlaylistMetadata;
use crate::models::{Episode, Feed, Stage};

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub stage: Stage,
    pub percent: f32,
    pub downloaded_bytes: u64,
    pub total_bytes: u64,
    pub speed: String,
}

/// Built fresh per episode by the Feed Updater and passed into `download`
/// explicitly (§9 design note: never a settable field on the driver, so
/// concurrent downloads can never cross-wire their progress callbacks).
pub type ProgressSink = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// A finished download: an open handle onto the file inside its now-sole
/// owner, the scratch directory. Dropping this removes the directory.
pub struct DownloadedFile {
    _tmp_dir: tempfile::TempDir,
    file: tokio::fs::File,
    pub size: u64,
}

impl AsyncRead for DownloadedFile {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        Pin::new(&mut this.file).poll_read(cx, buf)
    }
}

#[derive(Debug, Clone)]
pub struct UpdateChannel {
    pub channel: String,
    pub pinned_version: Option<String>,
}

impl UpdateChannel {
    fn update_arg(&self) -> String {
        match &self.pinned_version {
            Some(version) => format!("{}@{version}", self.channel),
            None => self.channel.clone(),
        }
    }
}

pub struct DownloadDriver {
    binary_path: PathBuf,
    transcoder_path: PathBuf,
    update_lock: Mutex<()>,
}

impl DownloadDriver {
    /// Discovery (§4.5 item 1): resolve the downloader binary (honoring an
    /// override), confirm it runs, and confirm a transcoder is present.
    pub async fn discover(
        binary_override: Option<PathBuf>,
        transcoder_override: Option<PathBuf>,
    ) -> Result<Self, DownloadError> {
        let binary_path = binary_override.unwrap_or_else(|| PathBuf::from("yt-dlp"));
        let output = Command::new(&binary_path)
            .arg("--version")
            .output()
            .await
            .map_err(|_| DownloadError::BinaryNotFound(binary_path.display().to_string()))?;
        if !output.status.success() {
            return Err(DownloadError::BinaryNotFound(binary_path.display().to_string()));
        }

        let transcoder_path = transcoder_override.unwrap_or_else(|| PathBuf::from("ffmpeg"));
        let transcoder_ok = Command::new(&transcoder_path)
            .arg("-version")
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false);
        if !transcoder_ok {
            return Err(DownloadError::TranscoderNotFound(
                transcoder_path.display().to_string(),
            ));
        }

        Ok(Self {
            binary_path,
            transcoder_path,
            update_lock: Mutex::new(()),
        })
    }

    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    pub fn transcoder_path(&self) -> &Path {
        &self.transcoder_path
    }

    /// Self-update (§4.5 item 2). Serialized against `download` via
    /// `update_lock` so an in-place binary replacement never races a
    /// download holding the old binary open.
    pub async fn self_update(&self, channel: &UpdateChannel) -> Result<(), DownloadError> {
        let _guard = self.update_lock.lock().await;
        debug!(channel = %channel.channel, "running downloader self-update");
        let output = Command::new(&self.binary_path)
            .arg("--update-to")
            .arg(channel.update_arg())
            .output()
            .await
            .map_err(DownloadError::Spawn)?;
        if !output.status.success() {
            return Err(DownloadError::UpdateFailed(
                String::from_utf8_lossy(&output.stderr).into_owned(),
            ));
        }
        Ok(())
    }

    /// Runs `self_update` once, then every [`downloader::SELF_UPDATE_INTERVAL`]
    /// forever. Intended to be spawned as a background task at startup.
    pub async fn run_self_update_loop(self: Arc<Self>, channel: UpdateChannel) {
        loop {
            if let Err(err) = self.self_update(&channel).await {
                warn!(%err, "downloader self-update failed");
            }
            tokio::time::sleep(downloader::SELF_UPDATE_INTERVAL).await;
        }
    }

    /// Playlist metadata fetch (§4.5 item 3).
    pub async fn playlist_metadata(&self, url: &str) -> Result<PlaylistMetadata, DownloadError> {
        let output = Command::new(&self.binary_path)
            .arg("--dump-single-json")
            .arg("--playlist-items")
            .arg("0")
            .arg(url)
            .output()
            .await
            .map_err(DownloadError::Spawn)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            if parse::is_rate_limited(&stderr) {
                return Err(DownloadError::TooManyRequests);
            }
            return Err(DownloadError::ExitFailure {
                code: output.status.code(),
                stderr_tail: stderr,
            });
        }

        let value: serde_json::Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| DownloadError::InvalidMetadata(e.to_string()))?;
        let field = |name: &str| value.get(name).and_then(|v| v.as_str()).unwrap_or("").to_string();
        let thumbnails = value
            .get("thumbnails")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|t| t.get("url").and_then(|u| u.as_str()).map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        Ok(PlaylistMetadata {
            id: field("id"),
            title: field("title"),
            description: value.get("description").and_then(|v| v.as_str()).map(str::to_string),
            thumbnails,
            channel: field("channel"),
            channel_id: field("channel_id"),
            channel_url: field("channel_url"),
            webpage_url: field("webpage_url"),
        })
    }

    /// Download (§4.5 item 4): run the subprocess in a scoped temporary
    /// directory, tailing its stderr for progress lines forwarded to
    /// `sink`, and return a reader over the finished file on success.
    pub async fn download(
        &self,
        feed: &Feed,
        episode: &Episode,
        timeout: std::time::Duration,
        sink: ProgressSink,
    ) -> Result<DownloadedFile, DownloadError> {
        let tmp_dir = tempfile::tempdir()?;
        let args = args::build_args(feed, episode, tmp_dir.path());

        let mut child = Command::new(&self.binary_path)
            .args(&args)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(DownloadError::Spawn)?;

        let stderr = child.stderr.take().expect("stderr was piped");
        let mut lines = BufReader::new(stderr).lines();
        let stderr_task = tokio::spawn(async move {
            let mut tail = String::new();
            let mut rate_limited = false;
            while let Ok(Some(line)) = lines.next_line().await {
                if parse::is_rate_limited(&line) {
                    rate_limited = true;
                }
                tail.push_str(&line);
                tail.push('\n');
                if let Some(event) = parse::classify_line(&line) {
                    match event {
                        parse::LineEvent::Progress(update) => sink(ProgressEvent {
                            stage: Stage::Downloading,
                            percent: update.percent,
                            downloaded_bytes: update.downloaded_bytes,
                            total_bytes: update.total_bytes,
                            speed: update.speed,
                        }),
                        parse::LineEvent::StageChange(stage) => sink(ProgressEvent {
                            stage,
                            percent: 0.0,
                            downloaded_bytes: 0,
                            total_bytes: 0,
                            speed: String::new(),
                        }),
                    }
                }
            }
            (tail, rate_limited)
        });

        let status = tokio::select! {
            result = child.wait() => result?,
            _ = tokio::time::sleep(timeout) => {
                let _ = child.start_kill();
                stderr_task.abort();
                return Err(DownloadError::ExitFailure {
                    code: None,
                    stderr_tail: format!("timed out after {timeout:?}"),
                });
            }
        };

        let (stderr_tail, rate_limited) = stderr_task.await.unwrap_or_default();

        if !status.success() {
            if rate_limited {
                return Err(DownloadError::TooManyRequests);
            }
            return Err(DownloadError::ExitFailure {
                code: status.code(),
                stderr_tail,
            });
        }

        let mut entries = tokio::fs::read_dir(tmp_dir.path()).await?;
        let prefix = format!("{}.", episode.id);
        let mut found = None;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_name().to_string_lossy().starts_with(&prefix) {
                found = Some(entry.path());
                break;
            }
        }
        let path = found.ok_or_else(|| DownloadError::ExitFailure {
            code: status.code(),
            stderr_tail: "downloader exited successfully but produced no output file".to_string(),
        })?;

        let file = tokio::fs::File::open(&path).await?;
        let size = file.metadata().await?.len();

        Ok(DownloadedFile {
            _tmp_dir: tmp_dir,
            file,
            size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_arg_pins_version_when_present() {
        let channel = UpdateChannel {
            channel: "stable".to_string(),
            pinned_version: Some("2024.01.01".to_string()),
        };
        assert_eq!(channel.update_arg(), "stable@2024.01.01");
    }

    #[test]
    fn update_arg_is_bare_channel_without_pin() {
        let channel = UpdateChannel {
            channel: "nightly".to_string(),
            pinned_version: None,
        };
        assert_eq!(channel.update_arg(), "nightly");
    }
}
