//! `POST /employees/{id}/access` — manual employee entry or exit.

use axum::{
  Json,
  extract::State,
  http::StatusCode,
  response::IntoResponse,
};
use gatehouse_core::{directory::IdentityDirectory, service::AccessRequest, store::AccessStore};

use crate::{
  AppState,
  error::ApiError,
  extract::{JsonBody, PathParam},
};

/// `POST /employees/{id}/access` — body: `{"direction":"entry"}`
pub async fn access<S, D>(
  State(state): State<AppState<S, D>>,
  PathParam(employee_id): PathParam<String>,
  JsonBody(body): JsonBody<AccessRequest>,
) -> Result<impl IntoResponse, ApiError>
where
  S: AccessStore + 'static,
  D: IdentityDirectory + 'static,
{
  let event = state.service.record_employee_access(&employee_id, body).await?;
  Ok((StatusCode::CREATED, Json(event)))
}
