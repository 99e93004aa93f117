//! In-flight credential scans, addressable by a client-chosen id so a
//! second request can cancel the first.
//!
//! | Method   | Path              | Notes |
//! |----------|-------------------|-------|
//! | `POST`   | `/scans`          | Body: [`ScanBody`]; resolves and records; 201 + event |
//! | `DELETE` | `/scans/{scan_id}` | 204, or 404 if nothing is in flight under that id |
//!
//! A 204 means the cancel signal was delivered. If the scan had already
//! started writing its event, the `POST` still answers 201 with that event.

use std::{
  collections::HashMap,
  sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use axum::{
  Json,
  extract::State,
  http::StatusCode,
  response::IntoResponse,
};
use gatehouse_core::{
  credential::{ScanCancelHandle, ScanSession, scan_session},
  directory::IdentityDirectory,
  service::AccessRequest,
  store::AccessStore,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
  AppState,
  error::ApiError,
  extract::{JsonBody, PathParam},
};

// ─── Registry ────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct ScanRegistry {
  in_flight: Mutex<HashMap<Uuid, ScanCancelHandle>>,
}

/// Removes its scan from the registry when the request finishes, however it
/// finishes.
pub struct ScanGuard {
  registry: Arc<ScanRegistry>,
  id:       Uuid,
}

impl Drop for ScanGuard {
  fn drop(&mut self) { self.registry.lock().remove(&self.id); }
}

impl ScanRegistry {
  fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, ScanCancelHandle>> {
    self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Register a new scan under `id`.
  pub fn begin(self: &Arc<Self>, id: Uuid) -> Result<(ScanSession, ScanGuard), ApiError> {
    let mut in_flight = self.lock();
    if in_flight.contains_key(&id) {
      return Err(ApiError::ScanInProgress(id));
    }
    let (session, handle) = scan_session();
    in_flight.insert(id, handle);
    Ok((session, ScanGuard { registry: Arc::clone(self), id }))
  }

  /// Cancel the scan registered under `id`. Returns `false` if there is none.
  pub fn cancel(&self, id: Uuid) -> bool {
    match self.lock().get(&id) {
      Some(handle) => {
        handle.cancel();
        true
      }
      None => false,
    }
  }

  pub fn in_flight(&self) -> usize { self.lock().len() }
}

// ─── Handlers ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ScanBody {
  /// Client-chosen id used to cancel this scan.
  pub scan_id: Uuid,
  pub token:   String,
  #[serde(flatten)]
  pub request: AccessRequest,
}

/// `POST /scans`
pub async fn start<S, D>(
  State(state): State<AppState<S, D>>,
  JsonBody(body): JsonBody<ScanBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: AccessStore + 'static,
  D: IdentityDirectory + 'static,
{
  let (session, _guard) = state.scans.begin(body.scan_id)?;
  let event = state
    .service
    .scan_access(&session, &body.token, body.request)
    .await?;
  Ok((StatusCode::CREATED, Json(event)))
}

/// `DELETE /scans/{scan_id}`
pub async fn cancel<S, D>(
  State(state): State<AppState<S, D>>,
  PathParam(scan_id): PathParam<Uuid>,
) -> Result<StatusCode, ApiError>
where
  S: AccessStore + 'static,
  D: IdentityDirectory + 'static,
{
  if state.scans.cancel(scan_id) {
    tracing::info!(%scan_id, "scan cancelled");
    Ok(StatusCode::NO_CONTENT)
  } else {
    Err(ApiError::ScanNotFound(scan_id))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn guard_unregisters_and_cancel_reaches_session() {
    let registry = Arc::new(ScanRegistry::default());
    let id = Uuid::new_v4();

    let (session, guard) = registry.begin(id).unwrap();
    assert!(matches!(registry.begin(id), Err(ApiError::ScanInProgress(_))));
    assert!(registry.cancel(id));
    assert!(session.is_cancelled());

    drop(guard);
    assert_eq!(registry.in_flight(), 0);
    assert!(!registry.cancel(id));
  }
}
