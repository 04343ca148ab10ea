//! Management API (§6): a thin axum façade over [`FeedUpdater`],
//! [`StorageGateway`], [`ProgressTracker`] and [`Config`]. Handlers never
//! hold business logic themselves — they decode the request, call into the
//! engine, and encode the result (the same "thin handlers delegate to
//! services" split the teacher's network-facing modules use).

pub mod config;
pub mod episodes;
pub mod error;
pub mod feeds;
pub mod history;
pub mod progress;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::Router;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

pub use error::ApiError;

use crate::artifact::ArtifactStore;
use crate::config::Config;
use crate::feed_updater::FeedUpdater;
use crate::history_recorder::HistoryRecorder;
use crate::progress_tracker::ProgressTracker;
use crate::storage::StorageGateway;

/// Shared application state, cloned into every handler (§9: every field is
/// an `Arc`/lock so handlers never block each other on unrelated feeds).
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<StorageGateway>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub updater: Arc<FeedUpdater>,
    pub progress: Arc<ProgressTracker>,
    pub history: Arc<HistoryRecorder>,
    pub config: Arc<RwLock<Config>>,
    pub config_path: PathBuf,
    pub shutdown: CancellationToken,
    /// Root directory to serve rendered feed documents and media from
    /// directly, when the artifact store backend is `local` (§6 persisted
    /// layout: `<feed_id>.xml` and `podsync.opml` live at its root). `None`
    /// for `remote_object` storage, which is expected to be hosted
    /// externally (§4.2).
    pub local_artifact_root: Option<PathBuf>,
}

pub fn router(state: AppState) -> Router {
    let local_root = state.local_artifact_root.clone();

    let mut app = Router::new()
        .route("/config", get(config::get_config).put(config::put_config))
        .route("/config/tls/upload", post(config::upload_tls))
        .route("/config/restart", post(config::restart))
        .route("/feeds", get(feeds::list_feeds).post(feeds::create_feed))
        .route(
            "/feeds/:id",
            get(feeds::get_feed).put(feeds::update_feed).delete(feeds::delete_feed),
        )
        .route("/feeds/:id/refresh", post(feeds::refresh_feed))
        .route("/episodes", get(episodes::list_episodes))
        .route(
            "/episodes/:feed_id/:episode_id",
            delete(episodes::delete_episode),
        )
        .route(
            "/episodes/:feed_id/:episode_id/retry",
            post(episodes::retry_episode),
        )
        .route(
            "/episodes/:feed_id/:episode_id/block",
            post(episodes::block_episode),
        )
        .route("/progress", get(progress::snapshot))
        .route("/progress/stream", get(progress::stream))
        .route("/history", get(history::list_history).delete(history::delete_all_history))
        .route(
            "/history/:id",
            get(history::get_history).delete(history::delete_history),
        )
        .route("/history/stats", get(history::stats))
        .route("/history/cleanup", post(history::cleanup));

    if let Some(root) = local_root {
        app = app.fallback_service(ServeDir::new(root));
    }

    app.layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Binds and serves the router until `shutdown` is cancelled (§6 lifecycle:
/// `POST /config/restart` cancels the same token the process's SIGINT/SIGTERM
/// handler does).
pub async fn serve(
    bind_address: &str,
    port: u16,
    state: AppState,
) -> Result<(), std::io::Error> {
    let shutdown = state.shutdown.clone();
    let addr: SocketAddr = format!("{bind_address}:{port}").parse().map_err(|e| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, format!("bad bind address: {e}"))
    })?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "management API listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        (status, self.to_string()).into_response()
    }
}

pub(crate) fn not_found(message: impl Into<String>) -> ApiError {
    ApiError::new(StatusCode::NOT_FOUND, message.into())
}
