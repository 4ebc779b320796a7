//! POST /api/feedback

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use serde::Serialize;
use tracing::{debug, error};

use super::{AppState, method_not_allowed};
use crate::domain::TokenFeedback;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/feedback", post(drain).fallback(method_not_allowed))
}

#[derive(Serialize)]
struct FeedbackBody<'a> {
    feedback: &'a [TokenFeedback],
}

/// Serialize and clear the buffer in one step. A serialization failure
/// leaves every entry for the next call.
async fn drain(State(state): State<AppState>) -> Response {
    let drained = state.feedback.drain_with(|entries| {
        serde_json::to_vec(&FeedbackBody { feedback: entries }).map(|body| (entries.len(), body))
    });

    match drained {
        Ok((count, body)) => {
            debug!(count, "feedback drained");
            ([(header::CONTENT_TYPE, "application/json")], body).into_response()
        }
        Err(err) => {
            error!(error = %err, "failed to serialize feedback");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}
