//! JSON REST API for Gatehouse.
//!
//! Exposes an axum [`Router`] backed by a [`GateService`] over any
//! [`AccessStore`] and [`IdentityDirectory`]. Auth, TLS, and transport
//! concerns are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", gatehouse_api::api_router(service))
//! ```
//!
//! Errors are returned as `{"error": "...", "kind": "denied|conflict|invalid|cancelled|unavailable"}`.

pub mod credentials;
pub mod employees;
pub mod error;
pub mod events;
pub mod extract;
pub mod occupancy;
pub mod scans;
pub mod vehicles;
pub mod visitors;

use std::sync::Arc;

use axum::{
  Router,
  routing::{delete, get, post, put},
};
use gatehouse_core::{directory::IdentityDirectory, service::GateService, store::AccessStore};

pub use error::ApiError;
use scans::ScanRegistry;

// ─── Application state ───────────────────────────────────────────────────────

/// Shared state threaded through all handlers.
pub struct AppState<S, D> {
  pub service: GateService<S, D>,
  pub scans:   Arc<ScanRegistry>,
}

impl<S, D> Clone for AppState<S, D> {
  fn clone(&self) -> Self {
    Self { service: self.service.clone(), scans: Arc::clone(&self.scans) }
  }
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build a fully-materialised API router for `service`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S, D>(service: GateService<S, D>) -> Router<()>
where
  S: AccessStore + 'static,
  D: IdentityDirectory + 'static,
{
  let state = AppState { service, scans: Arc::new(ScanRegistry::default()) };

  Router::new()
    // Credentials
    .route("/credentials/resolve", post(credentials::resolve::<S, D>))
    .route("/scans", post(scans::start::<S, D>))
    .route("/scans/{scan_id}", delete(scans::cancel::<S, D>))
    // Employees
    .route("/employees/{id}/access", post(employees::access::<S, D>))
    // Visitors
    .route("/visitors", get(visitors::find::<S, D>).post(visitors::register::<S, D>))
    .route("/visitors/{id}", get(visitors::get_one::<S, D>).patch(visitors::edit::<S, D>))
    .route("/visitors/{id}/active", put(visitors::set_active::<S, D>))
    .route("/visitors/{id}/access", post(visitors::access::<S, D>))
    // Vehicles
    .route("/vehicles/ready", get(vehicles::ready::<S, D>))
    .route("/vehicles/in-transit", get(vehicles::in_transit::<S, D>))
    .route("/vehicles/{id}/movement", get(vehicles::movement::<S, D>))
    .route("/vehicles/{id}/checklist", post(vehicles::submit_checklist::<S, D>))
    .route("/vehicles/{id}/checklist/approve", post(vehicles::approve_checklist::<S, D>))
    .route("/vehicles/{id}/checklist/reject", post(vehicles::reject_checklist::<S, D>))
    .route("/vehicles/{id}/exit", post(vehicles::exit::<S, D>))
    .route("/vehicles/{id}/return", post(vehicles::register_return::<S, D>))
    // Log and occupancy
    .route("/events", get(events::list::<S, D>))
    .route("/events/export", get(events::export::<S, D>))
    .route("/occupancy", get(occupancy::handler::<S, D>))
    .with_state(state)
}
