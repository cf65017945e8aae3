pub(crate) mod health;
pub(crate) mod lyrics;
pub(crate) mod metrics;
pub(crate) mod translation;

use axum::{
    Json, Router,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::app::AppState;
use crate::pipeline::PipelineError;

pub(crate) fn router(state: AppState) -> Router {
    Router::new()
        .route("/health/ready", get(health::ready))
        .route("/health/live", get(health::live))
        .route("/metrics", get(metrics::exporter))
        .route("/v1/lyrics/parse", post(lyrics::parse))
        .route("/v1/lyrics/parse-and-save", post(lyrics::parse_and_save))
        .route(
            "/v1/songs/{song_id}/lexicon",
            post(lyrics::parse_song).get(lyrics::stored_lexicon),
        )
        .route(
            "/v1/songs/{song_id}/translation/realtime",
            post(translation::start_realtime),
        )
        .route(
            "/v1/songs/{song_id}/translation/events",
            get(translation::events),
        )
        .route(
            "/v1/songs/{song_id}/lines/translate",
            post(translation::fill_missing),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

/// Handler error rendered as `{"error": "..."}`.
#[derive(Debug)]
pub(crate) struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub(crate) fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(error: PipelineError) -> Self {
        match error {
            PipelineError::NotFound(_) => Self {
                status: StatusCode::NOT_FOUND,
                message: error.to_string(),
            },
            PipelineError::InvalidInput(_) => Self::bad_request(error.to_string()),
            PipelineError::Store(source) => {
                error!(error = ?source, "request failed in storage layer");
                Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    message: "internal storage error".to_string(),
                }
            }
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        PipelineError::Store(error).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}
