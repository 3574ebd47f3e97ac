//! Media-server connectivity probe.

use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

use crate::media::SystemInfo;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct MediaStatusResponse {
    pub connected: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_info: Option<SystemInfo>,
}

/// Probe the media server. An unreachable server is a payload, not an HTTP
/// error; the admin UI renders the connection state either way.
pub async fn media_status(State(state): State<Arc<AppState>>) -> Json<MediaStatusResponse> {
    match state.media.system_info().await {
        Ok(info) => Json(MediaStatusResponse {
            connected: true,
            message: format!("Connected to {} ({})", info.server_name, info.version),
            server_info: Some(info),
        }),
        Err(e) => {
            warn!(error = %e, "media server probe failed");
            Json(MediaStatusResponse {
                connected: false,
                message: e.to_string(),
                server_info: None,
            })
        }
    }
}
