use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{not_found, AppState, ApiError};
use crate::models::{Episode, EpisodeStatus};

/// Query parameters accepted by `GET /episodes` (§6): every field is
/// optional and narrows the in-memory scan further.
#[derive(Debug, Deserialize, Default)]
pub struct EpisodeQuery {
    feed_id: Option<String>,
    status: Option<EpisodeStatus>,
    search: Option<String>,
    #[serde(default)]
    show_ignored: bool,
    published_after: Option<DateTime<Utc>>,
    published_before: Option<DateTime<Utc>>,
    #[serde(default = "default_page")]
    page: usize,
    #[serde(default = "default_page_size")]
    page_size: usize,
}

fn default_page() -> usize {
    1
}

fn default_page_size() -> usize {
    crate::constants::history::DEFAULT_PAGE_SIZE
}

impl EpisodeQuery {
    fn matches(&self, episode: &Episode) -> bool {
        if let Some(status) = self.status {
            if episode.status != status {
                return false;
            }
        } else if !self.show_ignored && episode.status == EpisodeStatus::Ignored {
            return false;
        }
        if let Some(needle) = &self.search {
            let haystack = format!(
                "{} {}",
                episode.title,
                episode.description.as_deref().unwrap_or("")
            );
            if !haystack.to_lowercase().contains(&needle.to_lowercase()) {
                return false;
            }
        }
        if let Some(after) = self.published_after {
            if episode.published < after {
                return false;
            }
        }
        if let Some(before) = self.published_before {
            if episode.published > before {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, serde::Serialize)]
pub struct EpisodePage {
    episodes: Vec<Episode>,
    total: usize,
}

/// `GET /episodes` (§6): scans the requested feed (or every feed, if
/// `feed_id` is omitted) and applies the remaining filters in memory.
pub async fn list_episodes(
    State(state): State<AppState>,
    Query(query): Query<EpisodeQuery>,
) -> Result<Json<EpisodePage>, ApiError> {
    let mut matching = Vec::new();
    let mut collect = |feed_id: &str| -> Result<(), ApiError> {
        state
            .storage
            .walk_episodes(feed_id, |episode| {
                if query.matches(episode) {
                    matching.push(episode.clone());
                }
                Ok(())
            })
            .map_err(ApiError::from)
    };

    if let Some(feed_id) = &query.feed_id {
        collect(feed_id)?;
    } else {
        let feed_ids = {
            let mut ids = Vec::new();
            state
                .storage
                .walk_feeds(|feed| {
                    ids.push(feed.id.clone());
                    Ok(())
                })
                .map_err(ApiError::from)?;
            ids
        };
        for feed_id in feed_ids {
            collect(&feed_id)?;
        }
    }

    matching.sort_by(|a, b| b.published.cmp(&a.published));
    let total = matching.len();
    let page = query.page.max(1);
    let start = (page - 1).saturating_mul(query.page_size).min(total);
    let end = start.saturating_add(query.page_size).min(total);

    Ok(Json(EpisodePage {
        episodes: matching[start..end].to_vec(),
        total,
    }))
}

/// `DELETE /episodes/{feedID}/{episodeID}` (§6).
pub async fn delete_episode(
    State(state): State<AppState>,
    Path((feed_id, episode_id)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .updater
        .delete_episode(&feed_id, &episode_id)
        .await
        .map_err(ApiError::from)?;
    Ok(Json(serde_json::json!({ "status": "deleted" })))
}

/// `POST /episodes/{feedID}/{episodeID}/retry` (§6).
pub async fn retry_episode(
    State(state): State<AppState>,
    Path((feed_id, episode_id)): Path<(String, String)>,
) -> Result<Json<Episode>, ApiError> {
    state
        .updater
        .retry_episode(&feed_id, &episode_id)
        .await
        .map_err(ApiError::from)?;
    let episode = state
        .storage
        .get_episode(&feed_id, &episode_id)
        .map_err(|_| not_found(format!("episode {feed_id}/{episode_id}")))?;
    Ok(Json(episode))
}

/// `POST /episodes/{feedID}/{episodeID}/block` (§6).
pub async fn block_episode(
    State(state): State<AppState>,
    Path((feed_id, episode_id)): Path<(String, String)>,
) -> Result<Json<Episode>, ApiError> {
    state
        .updater
        .block_episode(&feed_id, &episode_id)
        .await
        .map_err(ApiError::from)?;
    let episode = state
        .storage
        .get_episode(&feed_id, &episode_id)
        .map_err(|_| not_found(format!("episode {feed_id}/{episode_id}")))?;
    Ok(Json(episode))
}
