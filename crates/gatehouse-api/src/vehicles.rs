//! Handlers for `/vehicles` endpoints. `{id}` is a vehicle id or a plate.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/vehicles/{id}/checklist` | Body: `{"driver_id","checklist_id"}` |
//! | `POST` | `/vehicles/{id}/checklist/approve` | Body: `{"checklist_id"}` |
//! | `POST` | `/vehicles/{id}/checklist/reject` | Body: `{"checklist_id"}` |
//! | `POST` | `/vehicles/{id}/exit` | Body: [`ExitBody`] |
//! | `POST` | `/vehicles/{id}/return` | Body: [`ReturnBody`] |
//! | `GET`  | `/vehicles/{id}/movement` | Current movement row |
//! | `GET`  | `/vehicles/ready` | Approved and available |
//! | `GET`  | `/vehicles/in-transit` | |

use axum::{
  Json,
  extract::State,
};
use gatehouse_core::{
  directory::IdentityDirectory,
  movement::{MovementRecord, VehicleMovement},
  store::AccessStore,
};
use serde::Deserialize;

use crate::{
  AppState,
  error::ApiError,
  extract::{JsonBody, PathParam},
};

// ─── Checklist ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SubmitBody {
  pub driver_id:    String,
  pub checklist_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ChecklistBody {
  pub checklist_id: String,
}

/// `POST /vehicles/{id}/checklist`
pub async fn submit_checklist<S, D>(
  State(state): State<AppState<S, D>>,
  PathParam(vehicle): PathParam<String>,
  JsonBody(body): JsonBody<SubmitBody>,
) -> Result<Json<MovementRecord>, ApiError>
where
  S: AccessStore + 'static,
  D: IdentityDirectory + 'static,
{
  let record = state
    .service
    .submit_checklist(&vehicle, &body.driver_id, &body.checklist_id)
    .await?;
  Ok(Json(record))
}

/// `POST /vehicles/{id}/checklist/approve`
pub async fn approve_checklist<S, D>(
  State(state): State<AppState<S, D>>,
  PathParam(vehicle): PathParam<String>,
  JsonBody(body): JsonBody<ChecklistBody>,
) -> Result<Json<MovementRecord>, ApiError>
where
  S: AccessStore + 'static,
  D: IdentityDirectory + 'static,
{
  Ok(Json(state.service.approve_checklist(&vehicle, &body.checklist_id).await?))
}

/// `POST /vehicles/{id}/checklist/reject`
pub async fn reject_checklist<S, D>(
  State(state): State<AppState<S, D>>,
  PathParam(vehicle): PathParam<String>,
  JsonBody(body): JsonBody<ChecklistBody>,
) -> Result<Json<MovementRecord>, ApiError>
where
  S: AccessStore + 'static,
  D: IdentityDirectory + 'static,
{
  Ok(Json(state.service.reject_checklist(&vehicle, &body.checklist_id).await?))
}

// ─── Exit and return ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ExitBody {
  pub driver_id:   String,
  pub destination: String,
  pub location:    Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReturnBody {
  pub driver_id:   String,
  pub origin_base: String,
  pub location:    Option<String>,
}

/// `POST /vehicles/{id}/exit`
pub async fn exit<S, D>(
  State(state): State<AppState<S, D>>,
  PathParam(vehicle): PathParam<String>,
  JsonBody(body): JsonBody<ExitBody>,
) -> Result<Json<MovementRecord>, ApiError>
where
  S: AccessStore + 'static,
  D: IdentityDirectory + 'static,
{
  let record = state
    .service
    .authorize_vehicle_exit(&vehicle, &body.driver_id, &body.destination, body.location)
    .await?;
  Ok(Json(record))
}

/// `POST /vehicles/{id}/return`
pub async fn register_return<S, D>(
  State(state): State<AppState<S, D>>,
  PathParam(vehicle): PathParam<String>,
  JsonBody(body): JsonBody<ReturnBody>,
) -> Result<Json<MovementRecord>, ApiError>
where
  S: AccessStore + 'static,
  D: IdentityDirectory + 'static,
{
  let record = state
    .service
    .register_vehicle_return(&vehicle, &body.driver_id, &body.origin_base, body.location)
    .await?;
  Ok(Json(record))
}

// ─── Reads ───────────────────────────────────────────────────────────────────

/// `GET /vehicles/{id}/movement`
pub async fn movement<S, D>(
  State(state): State<AppState<S, D>>,
  PathParam(vehicle): PathParam<String>,
) -> Result<Json<VehicleMovement>, ApiError>
where
  S: AccessStore + 'static,
  D: IdentityDirectory + 'static,
{
  Ok(Json(state.service.get_movement(&vehicle).await?))
}

/// `GET /vehicles/ready`
pub async fn ready<S, D>(
  State(state): State<AppState<S, D>>,
) -> Result<Json<Vec<VehicleMovement>>, ApiError>
where
  S: AccessStore + 'static,
  D: IdentityDirectory + 'static,
{
  Ok(Json(state.service.list_ready_for_exit().await?))
}

/// `GET /vehicles/in-transit`
pub async fn in_transit<S, D>(
  State(state): State<AppState<S, D>>,
) -> Result<Json<Vec<VehicleMovement>>, ApiError>
where
  S: AccessStore + 'static,
  D: IdentityDirectory + 'static,
{
  Ok(Json(state.service.list_in_transit().await?))
}
