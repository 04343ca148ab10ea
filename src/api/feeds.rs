use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use tracing::{error, info};

use super::{not_found, AppState, ApiError};
use crate::models::{Feed, Trigger};

/// `GET /feeds` (§6): every feed currently configured, regardless of
/// whether it has run yet.
pub async fn list_feeds(State(state): State<AppState>) -> Json<Vec<Feed>> {
    let mut feeds: Vec<Feed> = state.config.read().feeds.values().cloned().collect();
    feeds.sort_by(|a, b| a.id.cmp(&b.id));
    Json(feeds)
}

/// `GET /feeds/{id}` (§6).
pub async fn get_feed(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Feed>, ApiError> {
    state
        .config
        .read()
        .feeds
        .get(&id)
        .cloned()
        .map(Json)
        .ok_or_else(|| not_found(format!("feed {id}")))
}

/// `POST /feeds` (§6): validates and persists the new feed, then kicks off
/// a scheduler restart is NOT performed here — callers that need the new
/// feed's timer registered must follow up with `/config/restart`.
pub async fn create_feed(
    State(state): State<AppState>,
    Json(feed): Json<Feed>,
) -> Result<(StatusCode, Json<Feed>), ApiError> {
    feed.validate().map_err(ApiError::from)?;

    {
        let config = state.config.read();
        if config.feeds.contains_key(&feed.id) {
            return Err(ApiError::new(
                StatusCode::CONFLICT,
                format!("feed {} already exists", feed.id),
            ));
        }
    }

    {
        let mut config = state.config.write();
        config.feeds.insert(feed.id.clone(), feed.clone());
        config
            .save(&state.config_path)
            .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    }
    state.storage.add_feed(&feed.id, &feed, &[])?;
    info!(feed_id = %feed.id, "feed created via management API");
    Ok((StatusCode::CREATED, Json(feed)))
}

/// `PUT /feeds/{id}` (§6): replaces the feed's configuration. The path id
/// always wins over whatever `id` the body carries.
pub async fn update_feed(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(mut feed): Json<Feed>,
) -> Result<Json<Feed>, ApiError> {
    feed.id = id.clone();
    feed.validate().map_err(ApiError::from)?;

    {
        let mut config = state.config.write();
        if !config.feeds.contains_key(&id) {
            return Err(not_found(format!("feed {id}")));
        }
        config.feeds.insert(id.clone(), feed.clone());
        config
            .save(&state.config_path)
            .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    }
    // Upsert the feed record itself; episodes are untouched (insert-if-absent).
    state.storage.add_feed(&id, &feed, &[])?;
    Ok(Json(feed))
}

/// `DELETE /feeds/{id}` (§6): removes the feed from configuration and its
/// durable records; artifacts and history are left in place (history is
/// never pruned by a feed delete, matching the Storage Gateway's own
/// `delete_feed`).
pub async fn delete_feed(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let removed = {
        let mut config = state.config.write();
        let removed = config.feeds.remove(&id).is_some();
        if removed {
            config
                .save(&state.config_path)
                .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
        }
        removed
    };
    if !removed {
        return Err(not_found(format!("feed {id}")));
    }

    if let Err(err) = state.storage.delete_feed(&id) {
        error!(feed_id = %id, %err, "failed to delete feed records from storage");
    }
    state.progress.clear_feed(&id);
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /feeds/{id}/refresh` (§6): enqueues an immediate, manually
/// triggered update and returns without waiting for it to finish.
pub async fn refresh_feed(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if !state.storage.feed_exists(&id).map_err(ApiError::from)?
        && !state.config.read().feeds.contains_key(&id)
    {
        return Err(not_found(format!("feed {id}")));
    }

    let updater = state.updater.clone();
    let feed_id = id.clone();
    tokio::spawn(async move {
        if let Err(err) = updater.update(&feed_id, Trigger::Manual).await {
            error!(feed_id = %feed_id, %err, "manual feed refresh failed");
        }
    });

    Ok(StatusCode::ACCEPTED)
}
