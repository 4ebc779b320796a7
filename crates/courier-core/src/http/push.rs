//! POST /api/push

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use super::{AppState, ApiError, method_not_allowed};
use crate::domain::{PushJob, ServiceId};

pub fn router() -> Router<AppState> {
    Router::new().route("/api/push", post(push).fallback(method_not_allowed))
}

#[derive(Debug, Deserialize)]
pub struct PushRequest {
    pub service: ServiceId,
    #[serde(default)]
    pub token: String,
    /// A JSON string is sent as its UTF-8 bytes; anything else as its JSON encoding.
    #[serde(default)]
    pub payload: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PushAccepted {
    pub id: String,
}

impl PushRequest {
    fn payload_bytes(&self) -> Result<Vec<u8>, ApiError> {
        match &self.payload {
            None | Some(Value::Null) => Err(ApiError::BadRequest("missing payload".into())),
            Some(Value::String(text)) => Ok(text.as_bytes().to_vec()),
            Some(other) => {
                serde_json::to_vec(other).map_err(|err| ApiError::BadRequest(err.to_string()))
            }
        }
    }
}

async fn push(
    State(state): State<AppState>,
    body: Result<Json<PushRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<PushAccepted>), ApiError> {
    let Json(request) = body?;

    if request.token.is_empty() {
        return Err(ApiError::BadRequest("missing token".into()));
    }
    let payload = request.payload_bytes()?;
    let route = state
        .services
        .get(&request.service)
        .ok_or_else(|| ApiError::UnknownService(request.service.clone()))?;
    if state.stopping.is_triggered() {
        return Err(ApiError::Unavailable("server is shutting down".into()));
    }

    let job = PushJob::new(
        state.ids.generate_job_id(),
        request.service,
        request.token,
        payload,
        state.clock.now(),
    );
    let id = job.id;
    let service = job.service.clone();

    if let Err(err) = route.queue.enqueue(job).await {
        warn!(%service, job_id = %id, error = %err, "enqueue failed");
        return Err(err.into());
    }
    info!(%service, job_id = %id, "push accepted");

    Ok((
        StatusCode::ACCEPTED,
        Json(PushAccepted { id: id.to_string() }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn request(payload: Value) -> PushRequest {
        serde_json::from_value(json!({
            "service": "push",
            "token": "T1",
            "payload": payload,
        }))
        .unwrap()
    }

    #[test]
    fn string_payload_is_sent_verbatim() {
        let bytes = request(json!("hello")).payload_bytes().unwrap();
        assert_eq!(bytes, b"hello");
    }

    #[test]
    fn object_payload_is_json_encoded() {
        let bytes = request(json!({"aps": {"alert": "hi"}})).payload_bytes().unwrap();
        assert_eq!(bytes, br#"{"aps":{"alert":"hi"}}"#);
    }

    #[rstest]
    #[case(json!({"service": "push", "token": "T1"}))]
    #[case(json!({"service": "push", "token": "T1", "payload": null}))]
    fn missing_payload_is_rejected(#[case] body: Value) {
        let request: PushRequest = serde_json::from_value(body).unwrap();
        assert!(matches!(
            request.payload_bytes(),
            Err(ApiError::BadRequest(_))
        ));
    }
}
