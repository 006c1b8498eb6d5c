use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use chrono::Utc;
use coachline_core::telemetry::{FeedbackEntry, LogRecord};
use tracing::info;
use uuid::Uuid;

use crate::coach::user_agent;
use crate::error::use_post;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/feedback", post(feedback).fallback(use_post))
}

pub async fn feedback(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let correlation_id = Uuid::new_v4().to_string();

    match FeedbackEntry::from_slice(&body, user_agent(&headers), Utc::now()) {
        Ok(entry) => {
            info!(
                event_name = "feedback.received",
                correlation_id = %correlation_id,
                good = entry.good,
            );
            state.recorder.spawn(LogRecord::Feedback(entry), correlation_id);
            StatusCode::NO_CONTENT.into_response()
        }
        Err(error) => {
            info!(
                event_name = "feedback.rejected",
                correlation_id = %correlation_id,
                error = %error,
            );
            (StatusCode::BAD_REQUEST, "Bad JSON").into_response()
        }
    }
}
