//! Mapping workflow replies onto HTTP responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use kts_workflow::{Failure, FailureKind, Reply};

/// Body sent when a workflow ended without writing a reply
pub const STALLED_MESSAGE: &str = "Request could not be completed";

pub fn status_for(reply: &Reply) -> StatusCode {
    match reply {
        Reply::Success(Some(_)) => StatusCode::OK,
        Reply::Success(None) => StatusCode::NO_CONTENT,
        Reply::Failure(Failure {
            kind: FailureKind::Validation,
            ..
        }) => StatusCode::BAD_REQUEST,
        Reply::Failure(Failure {
            kind: FailureKind::Operation,
            ..
        }) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn into_response(reply: Reply) -> Response {
    let status = status_for(&reply);
    match reply {
        Reply::Success(None) => status.into_response(),
        reply => (status, Json(reply.body())).into_response(),
    }
}

/// Failure body with a single general error
pub fn failure_response(
    status: StatusCode,
    kind: FailureKind,
    message: impl Into<String>,
) -> Response {
    let failure = Failure::general(kind, vec![message.into()]);
    (status, Json(Reply::Failure(failure).body())).into_response()
}

/// Response for a run that dropped its channel without replying
pub fn stalled() -> Response {
    failure_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        FailureKind::Operation,
        STALLED_MESSAGE,
    )
}
