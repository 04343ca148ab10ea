use std::collections::HashMap;
use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures_util::stream::Stream;
use serde::Serialize;
use tokio_stream::StreamExt as _;

use super::AppState;
use crate::constants::progress::SSE_FRAME_INTERVAL_MS;
use crate::models::{EpisodeProgress, FeedProgress};

#[derive(Debug, Serialize)]
pub struct ProgressSnapshot {
    feeds: HashMap<String, FeedProgress>,
    episodes: Vec<EpisodeProgress>,
}

fn snapshot_of(state: &AppState) -> ProgressSnapshot {
    let feeds = state
        .progress
        .all_feed_progress()
        .into_iter()
        .map(|p| (p.feed_id.clone(), p))
        .collect();
    let episodes = state.progress.all_episode_progress();
    ProgressSnapshot { feeds, episodes }
}

/// `GET /progress` (§6): a one-shot JSON snapshot of every in-flight feed
/// and episode.
pub async fn snapshot(State(state): State<AppState>) -> Json<ProgressSnapshot> {
    Json(snapshot_of(&state))
}

/// `GET /progress/stream` (§6): the same snapshot shape, pushed as an SSE
/// frame every [`SSE_FRAME_INTERVAL_MS`].
pub async fn stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let interval = tokio::time::interval(Duration::from_millis(SSE_FRAME_INTERVAL_MS));
    let ticks = tokio_stream::wrappers::IntervalStream::new(interval);
    let events = async_stream::stream! {
        tokio::pin!(ticks);
        while ticks.next().await.is_some() {
            let snapshot = snapshot_of(&state);
            match Event::default().json_data(snapshot) {
                Ok(event) => yield Ok(event),
                Err(err) => {
                    tracing::warn!(%err, "failed to encode progress snapshot as SSE data");
                }
            }
        }
    };
    Sse::new(events).keep_alive(KeepAlive::default())
}
