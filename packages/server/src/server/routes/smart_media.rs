//! Smart media HTTP routes.
//!
//! Refresh requests are acknowledged immediately; the refresh itself runs in
//! the queue and its result is read back through `GET /smart-media/{post_id}`.

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;

use crate::domains::smart_media::activities::{RefreshError, RequestOptions, UpdateRequest};
use crate::domains::smart_media::models::SmartMediaPost;
use crate::server::app::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct RefreshRequest {
    #[serde(default)]
    pub requested_by: Option<String>,
    #[serde(default)]
    pub force_update: bool,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct PostResponse {
    #[serde(flatten)]
    pub post: SmartMediaPost,
    pub is_processing: bool,
}

/// Error body: `{"error": "..."}` with a status per failure kind.
pub struct ApiError(RefreshError);

impl From<RefreshError> for ApiError {
    fn from(err: RefreshError) -> Self {
        Self(err)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self(RefreshError::Internal(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            RefreshError::NotFound(_) => StatusCode::NOT_FOUND,
            RefreshError::Unauthorized(_) => StatusCode::FORBIDDEN,
            RefreshError::PostDisabled(_) => StatusCode::CONFLICT,
            RefreshError::Internal(e) => {
                error!(error = %e, "request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let message = match &self.0 {
            RefreshError::Internal(_) => "internal error".to_string(),
            other => other.to_string(),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// `POST /smart-media/{post_id}/refresh`
pub async fn refresh_handler(
    Extension(state): Extension<AppState>,
    Path(post_id): Path<String>,
    body: Option<Json<RefreshRequest>>,
) -> Result<(StatusCode, Json<RefreshResponse>), ApiError> {
    let request = body.map(|Json(request)| request).unwrap_or_default();
    let options = RequestOptions {
        requested_by: request.requested_by,
        force_update: request.force_update,
    };

    match state.orchestrator.request_update(&post_id, options).await? {
        // The handle is dropped; the refresh keeps running in the queue.
        UpdateRequest::Queued(_) => Ok((
            StatusCode::ACCEPTED,
            Json(RefreshResponse {
                status: "processing",
            }),
        )),
        UpdateRequest::AlreadyProcessing => Ok((
            StatusCode::OK,
            Json(RefreshResponse {
                status: "already_processing",
            }),
        )),
    }
}

/// `GET /smart-media/{post_id}`
pub async fn get_post_handler(
    Extension(state): Extension<AppState>,
    Path(post_id): Path<String>,
) -> Result<Json<PostResponse>, ApiError> {
    let post = state
        .orchestrator
        .find_post(&post_id)
        .await?
        .ok_or_else(|| RefreshError::NotFound(post_id.clone()))?;

    Ok(Json(PostResponse {
        is_processing: state.orchestrator.is_processing(&post_id),
        post,
    }))
}
