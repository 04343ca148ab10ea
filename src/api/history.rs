use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{not_found, AppState, ApiError};
use crate::models::{HistoryEntry, JobStatus, JobType};
use crate::storage::HistoryFilters;

/// Query parameters accepted by `GET /history` (§6).
#[derive(Debug, Deserialize, Default)]
pub struct HistoryQuery {
    feed_id: Option<String>,
    job_type: Option<JobType>,
    status: Option<JobStatus>,
    search: Option<String>,
    start_after: Option<DateTime<Utc>>,
    end_before: Option<DateTime<Utc>>,
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

impl From<HistoryQuery> for HistoryFilters {
    fn from(query: HistoryQuery) -> Self {
        HistoryFilters {
            feed_id: query.feed_id,
            job_type: query.job_type,
            status: query.status,
            title_contains: query.search,
            start_after: query.start_after,
            end_before: query.end_before,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HistoryPage {
    entries: Vec<HistoryEntry>,
    total: usize,
}

/// `GET /history` (§6): newest-first, paginated, filtered.
pub async fn list_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryPage>, ApiError> {
    let page = query.page.max(1);
    let page_size = query.page_size;
    let filters: HistoryFilters = query.into();
    let (entries, total) = state
        .storage
        .list_history(&filters, page, page_size)
        .map_err(ApiError::from)?;
    Ok(Json(HistoryPage { entries, total }))
}

/// `GET /history/{id}` (§6).
pub async fn get_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<HistoryEntry>, ApiError> {
    state
        .storage
        .get_history(&id)
        .map(Json)
        .map_err(|_| not_found(format!("history entry {id}")))
}

/// `DELETE /history/{id}` (§6).
pub async fn delete_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .storage
        .delete_history(&id)
        .map_err(|_| not_found(format!("history entry {id}")))?;
    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /history` (§6): wipes every entry.
pub async fn delete_all_history(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let deleted = state
        .storage
        .delete_all_history()
        .map_err(ApiError::from)?;
    Ok(Json(serde_json::json!({ "deleted": deleted })))
}

#[derive(Debug, Serialize)]
pub struct HistoryStats {
    count: usize,
    oldest_entry: Option<DateTime<Utc>>,
}

/// `GET /history/stats` (§6).
pub async fn stats(State(state): State<AppState>) -> Result<Json<HistoryStats>, ApiError> {
    let oldest_entry = state
        .storage
        .oldest_history_entry()
        .map_err(ApiError::from)?
        .map(|entry| entry.start);
    Ok(Json(HistoryStats {
        count: state.storage.history_count(),
        oldest_entry,
    }))
}

/// `POST /history/cleanup` (§6): applies the configured retention/max-entry
/// policy immediately rather than waiting for its next scheduled pass.
pub async fn cleanup(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let (retention_days, max_entries) = {
        let config = state.config.read();
        (config.history.retention_days, config.history.max_entries)
    };
    let deleted = state
        .history
        .cleanup_old_entries(retention_days, max_entries)
        .map_err(ApiError::from)?;
    Ok(Json(serde_json::json!({ "deleted": deleted })))
}
