use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::Value;
use tracing::info;

use super::{AppState, ApiError};
use crate::config::Config;

/// `GET /config` (§6): the current effective configuration.
pub async fn get_config(State(state): State<AppState>) -> Json<Config> {
    Json(state.config.read().clone())
}

/// `PUT /config/{section}` (§6), collapsed to whole-document replacement at
/// this layer — callers send the full config and only the changed section
/// need differ; validated and persisted atomically before taking effect.
pub async fn put_config(
    State(state): State<AppState>,
    Json(incoming): Json<Config>,
) -> Result<Json<Config>, ApiError> {
    incoming
        .validate()
        .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.to_string()))?;
    incoming
        .save(&state.config_path)
        .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    *state.config.write() = incoming.clone();
    Ok(Json(incoming))
}

const MAX_TLS_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// `POST /config/tls/upload` (§6): multipart cert+key upload, max 10 MiB,
/// key written with owner-only permissions.
pub async fn upload_tls(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let bad_request = |msg: String| ApiError::new(StatusCode::BAD_REQUEST, msg);

    let mut cert_path = None;
    let mut key_path = None;
    let tls_dir = state
        .config_path
        .parent()
        .unwrap_or_else(|| std::path::Path::new("."))
        .join("tls");
    tokio::fs::create_dir_all(&tls_dir)
        .await
        .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(e.to_string()))?
    {
        let name = field.name().unwrap_or("").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| bad_request(e.to_string()))?;
        if bytes.len() > MAX_TLS_UPLOAD_BYTES {
            return Err(bad_request(format!("{name} exceeds 10 MiB limit")));
        }

        match name.as_str() {
            "cert" => {
                let path = tls_dir.join("cert.pem");
                tokio::fs::write(&path, &bytes)
                    .await
                    .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
                cert_path = Some(path);
            }
            "key" => {
                let path = tls_dir.join("key.pem");
                tokio::fs::write(&path, &bytes)
                    .await
                    .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
                set_owner_only_permissions(&path)
                    .await
                    .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
                key_path = Some(path);
            }
            other => return Err(bad_request(format!("unexpected multipart field {other:?}"))),
        }
    }

    let (cert_path, key_path) = match (cert_path, key_path) {
        (Some(c), Some(k)) => (c, k),
        _ => return Err(bad_request("both cert and key fields are required".to_string())),
    };

    {
        let mut config = state.config.write();
        config.server.tls.enabled = true;
        config.server.tls.cert_path = Some(cert_path);
        config.server.tls.key_path = Some(key_path);
        config
            .save(&state.config_path)
            .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    }

    Ok(Json(serde_json::json!({ "status": "ok" })))
}

#[cfg(unix)]
async fn set_owner_only_permissions(path: &std::path::Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await
}

#[cfg(not(unix))]
async fn set_owner_only_permissions(_path: &std::path::Path) -> std::io::Result<()> {
    Ok(())
}

/// `POST /config/restart` (§6): signals in-process shutdown; a supervisor is
/// expected to restart the process.
pub async fn restart(State(state): State<AppState>) -> Json<Value> {
    info!("restart requested via management API, cancelling shutdown token");
    state.shutdown.cancel();
    Json(serde_json::json!({ "status": "shutting down" }))
}
