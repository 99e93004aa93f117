//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  extract::rejection::{JsonRejection, PathRejection, QueryRejection},
  http::StatusCode,
  response::{IntoResponse, Response},
};
use gatehouse_core::ErrorClass;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error(transparent)]
  Gate(#[from] gatehouse_core::Error),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("no scan in progress with id {0}")]
  ScanNotFound(Uuid),

  #[error("a scan with id {0} is already in progress")]
  ScanInProgress(Uuid),

  #[error("export failed: {0}")]
  Export(String),
}

impl ApiError {
  fn status_and_kind(&self) -> (StatusCode, ErrorClass) {
    match self {
      Self::Gate(e) => {
        let class = e.class();
        let status = match class {
          ErrorClass::Denied if e.is_not_found() => StatusCode::NOT_FOUND,
          ErrorClass::Denied => StatusCode::FORBIDDEN,
          ErrorClass::Conflict | ErrorClass::Cancelled => StatusCode::CONFLICT,
          ErrorClass::Invalid => StatusCode::UNPROCESSABLE_ENTITY,
          ErrorClass::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        };
        (status, class)
      }
      Self::BadRequest(_) => (StatusCode::BAD_REQUEST, ErrorClass::Invalid),
      Self::ScanNotFound(_) => (StatusCode::NOT_FOUND, ErrorClass::Denied),
      Self::ScanInProgress(_) => (StatusCode::CONFLICT, ErrorClass::Conflict),
      Self::Export(_) => (StatusCode::INTERNAL_SERVER_ERROR, ErrorClass::Unavailable),
    }
  }
}

impl From<JsonRejection> for ApiError {
  fn from(rejection: JsonRejection) -> Self { Self::BadRequest(rejection.body_text()) }
}

impl From<QueryRejection> for ApiError {
  fn from(rejection: QueryRejection) -> Self { Self::BadRequest(rejection.body_text()) }
}

impl From<PathRejection> for ApiError {
  fn from(rejection: PathRejection) -> Self { Self::BadRequest(rejection.body_text()) }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, kind) = self.status_and_kind();
    if status.is_server_error() {
      tracing::error!(error = %self, "request failed");
    }
    (status, Json(json!({ "error": self.to_string(), "kind": kind }))).into_response()
  }
}
