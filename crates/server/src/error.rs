use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use coachline_core::errors::InterfaceError;
use tracing::{error, info};

/// Plain-text failure response; internal details stay in the logs.
pub fn plain_text(failure: &InterfaceError) -> Response {
    let status =
        StatusCode::from_u16(failure.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    if status.is_server_error() {
        error!(
            event_name = "http.request.failed",
            correlation_id = %failure.correlation_id(),
            status = status.as_u16(),
            error = %failure,
            "request failed"
        );
    } else {
        info!(
            event_name = "http.request.rejected",
            correlation_id = %failure.correlation_id(),
            status = status.as_u16(),
            error = %failure,
            "request rejected"
        );
    }

    (status, failure.user_message().to_string()).into_response()
}

pub async fn use_post() -> Response {
    plain_text(&InterfaceError::method_not_allowed(uuid::Uuid::new_v4().to_string()))
}
