//! JSON response bodies.
//!
//! Success is `{"status":"ok"}`; every failure is `{"error", "code"}` with the
//! status from [`IntakeError::status`]. Panics and timeouts become
//! `INTERNAL_ERROR` so clients never see a non-JSON body from this service.

use std::any::Any;

use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use serde_json::json;

use crate::intake::error::IntakeError;

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    code: &'static str,
}

impl IntoResponse for IntakeError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.to_string(),
            code: self.code(),
        };
        (self.status(), Json(body)).into_response()
    }
}

/// `200 {"status":"ok"}`.
pub fn ok_response() -> Response {
    Json(json!({ "status": "ok" })).into_response()
}

/// Handler for `CatchPanicLayer`.
pub fn panic_response(_payload: Box<dyn Any + Send + 'static>) -> Response {
    tracing::error!("Handler panicked");
    IntakeError::Internal.into_response()
}
