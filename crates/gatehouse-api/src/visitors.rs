//! Handlers for `/visitors` endpoints.
//!
//! | Method  | Path | Notes |
//! |---------|------|-------|
//! | `POST`  | `/visitors` | Body: [`RegisterBody`]; 201 if created, 200 if the CPF was known |
//! | `GET`   | `/visitors?cpf=...` | Lookup by CPF, punctuation allowed |
//! | `GET`   | `/visitors/{id}` | |
//! | `PATCH` | `/visitors/{id}` | Body: `{"name":..,"photo":..}` |
//! | `PUT`   | `/visitors/{id}/active` | Body: `{"is_active":false}` |
//! | `POST`  | `/visitors/{id}/access` | Body: access request; 201 + event and counted visitor |

use axum::{
  Json,
  extract::State,
  http::StatusCode,
  response::IntoResponse,
};
use gatehouse_core::{
  directory::IdentityDirectory,
  service::AccessRequest,
  store::AccessStore,
  visitor::{Visitor, VisitorEdit},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  AppState,
  error::ApiError,
  extract::{JsonBody, PathParam, QueryParams},
};

// ─── Register ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RegisterBody {
  pub name:  String,
  pub cpf:   String,
  pub photo: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Registered {
  pub visitor: Visitor,
  pub created: bool,
}

/// `POST /visitors`
pub async fn register<S, D>(
  State(state): State<AppState<S, D>>,
  JsonBody(body): JsonBody<RegisterBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: AccessStore + 'static,
  D: IdentityDirectory + 'static,
{
  let (visitor, created) = state
    .service
    .register_visitor(&body.name, &body.cpf, body.photo)
    .await?;
  let status = if created { StatusCode::CREATED } else { StatusCode::OK };
  Ok((status, Json(Registered { visitor, created })))
}

// ─── Lookup ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct FindParams {
  pub cpf: String,
}

/// `GET /visitors?cpf=<cpf>`
pub async fn find<S, D>(
  State(state): State<AppState<S, D>>,
  QueryParams(params): QueryParams<FindParams>,
) -> Result<Json<Visitor>, ApiError>
where
  S: AccessStore + 'static,
  D: IdentityDirectory + 'static,
{
  Ok(Json(state.service.find_visitor_by_cpf(&params.cpf).await?))
}

/// `GET /visitors/{id}`
pub async fn get_one<S, D>(
  State(state): State<AppState<S, D>>,
  PathParam(id): PathParam<Uuid>,
) -> Result<Json<Visitor>, ApiError>
where
  S: AccessStore + 'static,
  D: IdentityDirectory + 'static,
{
  Ok(Json(state.service.get_visitor(id).await?))
}

// ─── Administration ──────────────────────────────────────────────────────────

/// `PATCH /visitors/{id}`
pub async fn edit<S, D>(
  State(state): State<AppState<S, D>>,
  PathParam(id): PathParam<Uuid>,
  JsonBody(body): JsonBody<VisitorEdit>,
) -> Result<Json<Visitor>, ApiError>
where
  S: AccessStore + 'static,
  D: IdentityDirectory + 'static,
{
  Ok(Json(state.service.edit_visitor(id, body).await?))
}

#[derive(Debug, Deserialize)]
pub struct ActiveBody {
  pub is_active: bool,
}

/// `PUT /visitors/{id}/active`
pub async fn set_active<S, D>(
  State(state): State<AppState<S, D>>,
  PathParam(id): PathParam<Uuid>,
  JsonBody(body): JsonBody<ActiveBody>,
) -> Result<Json<Visitor>, ApiError>
where
  S: AccessStore + 'static,
  D: IdentityDirectory + 'static,
{
  Ok(Json(state.service.set_visitor_active(id, body.is_active).await?))
}

// ─── Access ──────────────────────────────────────────────────────────────────

/// `POST /visitors/{id}/access`
pub async fn access<S, D>(
  State(state): State<AppState<S, D>>,
  PathParam(id): PathParam<Uuid>,
  JsonBody(body): JsonBody<AccessRequest>,
) -> Result<impl IntoResponse, ApiError>
where
  S: AccessStore + 'static,
  D: IdentityDirectory + 'static,
{
  let outcome = state.service.record_visitor_access(id, body).await?;
  Ok((StatusCode::CREATED, Json(outcome)))
}
