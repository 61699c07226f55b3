//! JSON request/response surface for the two public operations.
//!
//! Transport-agnostic: callers hand in a route name and a JSON body and get a
//! status code plus a JSON body back. Failures have the shape
//! `{"error": <code>}` where `<code>` is [`ServiceError::code`], plus a
//! `detail` message for validation and storage failures.

use exam_core::model::{AnswerDraft, SessionId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::app_services::ExamServices;
use crate::error::ServiceError;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionRequest {
    pub institutional_code: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionResponse {
    pub session_id: SessionId,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAnswersRequest {
    pub session_id: SessionId,
    pub answers: Vec<AnswerDraft>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitAnswersResponse {
    pub message: String,
}

/// Status plus JSON body, as written back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    fn ok<T: Serialize>(body: &T) -> Self {
        match serde_json::to_value(body) {
            Ok(body) => Self { status: 200, body },
            Err(err) => Self::from_error(&ServiceError::Storage(err.to_string())),
        }
    }

    #[must_use]
    pub fn from_error(err: &ServiceError) -> Self {
        let mut body = serde_json::json!({ "error": err.code() });
        match err {
            ServiceError::NotFound | ServiceError::Conflict => {}
            other => body["detail"] = Value::String(other.to_string()),
        }
        Self {
            status: err.status(),
            body,
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The operations reachable through [`handle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    StartSession,
    SubmitAnswers,
}

impl Route {
    /// Accepts both bare names (`start-session`) and path form
    /// (`/api/start-session`).
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().trim_start_matches("/api/").trim_start_matches('/') {
            "start-session" => Some(Route::StartSession),
            "submit-answers" => Some(Route::SubmitAnswers),
            _ => None,
        }
    }
}

/// One line of the JSON-lines transport: `{"route": "...", "body": {...}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    pub route: String,
    #[serde(default)]
    pub body: Value,
}

/// Infrastructure failures are logged here; caller mistakes are not.
fn failed(route: &'static str, err: &ServiceError) -> ApiResponse {
    if err.status() >= 500 {
        warn!(
            route,
            code = err.code(),
            retryable = err.is_retryable(),
            error = %err,
            "request failed"
        );
    }
    ApiResponse::from_error(err)
}

fn decode<T: serde::de::DeserializeOwned>(body: Value) -> Result<T, ServiceError> {
    serde_json::from_value(body).map_err(|err| ServiceError::Validation(err.to_string()))
}

/// `start-session`: `{institutionalCode, email}` -> `{sessionId}`.
pub async fn start_session(services: &ExamServices, body: Value) -> ApiResponse {
    let result = async {
        let req: StartSessionRequest = decode(body)?;
        services
            .start_session(&req.institutional_code, &req.email)
            .await
    }
    .await;

    match result {
        Ok(started) => ApiResponse::ok(&StartSessionResponse {
            session_id: started.session_id,
        }),
        Err(err) => failed("start-session", &err),
    }
}

/// `submit-answers`: `{sessionId, answers: [{questionId, choice}]}` -> `{message: "ok"}`.
pub async fn submit_answers(services: &ExamServices, body: Value) -> ApiResponse {
    let result = async {
        let req: SubmitAnswersRequest = decode(body)?;
        services
            .submissions()
            .submit(req.session_id, req.answers)
            .await
    }
    .await;

    match result {
        Ok(_) => ApiResponse::ok(&SubmitAnswersResponse {
            message: "ok".to_string(),
        }),
        Err(err) => failed("submit-answers", &err),
    }
}

/// Dispatch `body` to the operation named by `route`.
pub async fn handle(services: &ExamServices, route: &str, body: Value) -> ApiResponse {
    match Route::parse(route) {
        Some(Route::StartSession) => start_session(services, body).await,
        Some(Route::SubmitAnswers) => submit_answers(services, body).await,
        None => ApiResponse::from_error(&ServiceError::NotFound),
    }
}

/// Decode one JSON-lines request and dispatch it.
pub async fn handle_line(services: &ExamServices, line: &str) -> ApiResponse {
    match serde_json::from_str::<Envelope>(line) {
        Ok(envelope) => handle(services, &envelope.route, envelope.body).await,
        Err(err) => ApiResponse::from_error(&ServiceError::Validation(err.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_accept_bare_and_path_forms() {
        assert_eq!(Route::parse("start-session"), Some(Route::StartSession));
        assert_eq!(Route::parse("/api/submit-answers"), Some(Route::SubmitAnswers));
        assert_eq!(Route::parse("/submit-answers"), Some(Route::SubmitAnswers));
        assert_eq!(Route::parse("grade"), None);
    }

    #[test]
    fn conflict_body_has_no_detail() {
        let resp = ApiResponse::from_error(&ServiceError::Conflict);
        assert_eq!(resp.status, 409);
        assert_eq!(resp.body, serde_json::json!({"error": "conflict"}));
    }

    #[test]
    fn validation_body_carries_detail() {
        let resp = ApiResponse::from_error(&ServiceError::Validation("bad".into()));
        assert_eq!(resp.status, 400);
        assert_eq!(resp.body["error"], "validation");
        assert_eq!(resp.body["detail"], "validation failed: bad");
        assert!(!resp.is_success());
    }

    #[test]
    fn submit_request_reads_camel_case() {
        let req: SubmitAnswersRequest = serde_json::from_value(serde_json::json!({
            "sessionId": 3,
            "answers": [{"questionId": "q1", "choice": "B"}]
        }))
        .unwrap();
        assert_eq!(req.session_id, SessionId::new(3));
        assert_eq!(req.answers, vec![AnswerDraft::new("q1", "B")]);
    }
}
