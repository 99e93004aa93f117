//! Async HTTP client wrapping the Gatehouse JSON API.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use gatehouse_core::{
  credential::ResolvedCredential,
  event::AccessEvent,
  movement::{MovementRecord, VehicleMovement},
  occupancy::OccupancySnapshot,
  store::AppendOutcome,
  visitor::Visitor,
};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Value, json};
use thiserror::Error;
use uuid::Uuid;

/// Connection settings for the Gatehouse API.
#[derive(Debug, Clone)]
pub struct ApiConfig {
  pub base_url: String,
}

/// Async HTTP client for the Gatehouse JSON REST API.
///
/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct ApiClient {
  client: Client,
  config: ApiConfig,
}

/// Body of `POST /visitors` responses.
#[derive(Debug, Deserialize)]
pub struct Registered {
  pub visitor: Visitor,
  pub created: bool,
}

/// Annotations shared by every access-recording call.
#[derive(Debug, Clone, Serialize)]
pub struct AccessBody {
  pub direction:     String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub location:      Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub access_method: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub verified_by:   Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub notes:         Option<String>,
}

/// A non-2xx response, with the server's `{"error","kind"}` body if present.
#[derive(Debug, Error)]
#[error("{what} → {status}{}", self.detail())]
pub struct ServerError {
  pub what:    String,
  pub status:  reqwest::StatusCode,
  pub kind:    Option<String>,
  pub message: Option<String>,
}

impl ServerError {
  pub fn is_cancelled(&self) -> bool { self.kind.as_deref() == Some("cancelled") }

  /// ` (kind): message` when the server sent an error body.
  fn detail(&self) -> String {
    match (&self.kind, &self.message) {
      (Some(kind), Some(message)) => format!(" ({kind}): {message}"),
      _ => String::new(),
    }
  }
}

impl ApiClient {
  pub fn new(config: ApiConfig) -> Result<Self> {
    let client = Client::builder()
      .timeout(Duration::from_secs(30))
      .build()
      .context("failed to build HTTP client")?;
    Ok(Self { client, config })
  }

  fn url(&self, path: &str) -> String {
    format!("{}/api{}", self.config.base_url.trim_end_matches('/'), path)
  }

  fn request(&self, method: Method, path: &str) -> RequestBuilder {
    tracing::debug!(%method, path, "request");
    self.client.request(method, self.url(path))
  }

  /// Send `req`; on a non-2xx status, surface the server's error message.
  async fn send(&self, req: RequestBuilder, what: &str) -> Result<Response> {
    let resp = req.send().await.with_context(|| format!("{what} failed"))?;
    let status = resp.status();
    if status.is_success() {
      return Ok(resp);
    }
    let body: Value = resp.json().await.unwrap_or(Value::Null);
    Err(anyhow!(ServerError {
      what: what.to_owned(),
      status,
      kind: body["kind"].as_str().map(str::to_owned),
      message: body["error"].as_str().map(str::to_owned),
    }))
  }

  async fn json<T: DeserializeOwned>(&self, req: RequestBuilder, what: &str) -> Result<T> {
    self
      .send(req, what)
      .await?
      .json()
      .await
      .with_context(|| format!("deserialising {what} response"))
  }

  // ── Credentials ───────────────────────────────────────────────────────

  /// `POST /api/credentials/resolve`
  pub async fn resolve(&self, token: &str) -> Result<ResolvedCredential> {
    let req = self
      .request(Method::POST, "/credentials/resolve")
      .json(&json!({ "token": token }));
    self.json(req, "POST /credentials/resolve").await
  }

  /// `POST /api/scans`
  pub async fn scan(&self, scan_id: Uuid, token: &str, body: &AccessBody) -> Result<AccessEvent> {
    let mut payload = serde_json::to_value(body)?;
    payload["scan_id"] = json!(scan_id);
    payload["token"] = json!(token);
    let req = self.request(Method::POST, "/scans").json(&payload);
    self.json(req, "POST /scans").await
  }

  /// `DELETE /api/scans/{id}`
  pub async fn cancel_scan(&self, scan_id: Uuid) -> Result<()> {
    let req = self.request(Method::DELETE, &format!("/scans/{scan_id}"));
    self.send(req, "DELETE /scans").await?;
    Ok(())
  }

  // ── Employees ─────────────────────────────────────────────────────────

  /// `POST /api/employees/{id}/access`
  pub async fn employee_access(&self, employee_id: &str, body: &AccessBody) -> Result<AccessEvent> {
    let req = self
      .request(Method::POST, &format!("/employees/{employee_id}/access"))
      .json(body);
    self.json(req, "POST /employees/access").await
  }

  // ── Visitors ──────────────────────────────────────────────────────────

  /// `POST /api/visitors`
  pub async fn register_visitor(
    &self,
    name: &str,
    cpf: &str,
    photo: Option<&str>,
  ) -> Result<Registered> {
    let req = self
      .request(Method::POST, "/visitors")
      .json(&json!({ "name": name, "cpf": cpf, "photo": photo }));
    self.json(req, "POST /visitors").await
  }

  /// `GET /api/visitors?cpf=...`
  pub async fn find_visitor(&self, cpf: &str) -> Result<Visitor> {
    let req = self.request(Method::GET, "/visitors").query(&[("cpf", cpf)]);
    self.json(req, "GET /visitors").await
  }

  /// `GET /api/visitors/{id}`
  pub async fn get_visitor(&self, id: Uuid) -> Result<Visitor> {
    let req = self.request(Method::GET, &format!("/visitors/{id}"));
    self.json(req, "GET /visitors/{id}").await
  }

  /// `PATCH /api/visitors/{id}`
  pub async fn edit_visitor(
    &self,
    id: Uuid,
    name: Option<&str>,
    photo: Option<&str>,
  ) -> Result<Visitor> {
    let req = self
      .request(Method::PATCH, &format!("/visitors/{id}"))
      .json(&json!({ "name": name, "photo": photo }));
    self.json(req, "PATCH /visitors/{id}").await
  }

  /// `PUT /api/visitors/{id}/active`
  pub async fn set_visitor_active(&self, id: Uuid, is_active: bool) -> Result<Visitor> {
    let req = self
      .request(Method::PUT, &format!("/visitors/{id}/active"))
      .json(&json!({ "is_active": is_active }));
    self.json(req, "PUT /visitors/{id}/active").await
  }

  /// `POST /api/visitors/{id}/access`
  pub async fn visitor_access(&self, id: Uuid, body: &AccessBody) -> Result<AppendOutcome> {
    let req = self
      .request(Method::POST, &format!("/visitors/{id}/access"))
      .json(body);
    self.json(req, "POST /visitors/{id}/access").await
  }

  // ── Vehicles ──────────────────────────────────────────────────────────

  /// `POST /api/vehicles/{id}/checklist`
  pub async fn submit_checklist(
    &self,
    vehicle: &str,
    driver_id: &str,
    checklist_id: &str,
  ) -> Result<MovementRecord> {
    let req = self
      .request(Method::POST, &format!("/vehicles/{vehicle}/checklist"))
      .json(&json!({ "driver_id": driver_id, "checklist_id": checklist_id }));
    self.json(req, "POST /vehicles/{id}/checklist").await
  }

  /// `POST /api/vehicles/{id}/checklist/{approve|reject}`
  pub async fn decide_checklist(
    &self,
    vehicle: &str,
    checklist_id: &str,
    approve: bool,
  ) -> Result<MovementRecord> {
    let action = if approve { "approve" } else { "reject" };
    let req = self
      .request(Method::POST, &format!("/vehicles/{vehicle}/checklist/{action}"))
      .json(&json!({ "checklist_id": checklist_id }));
    self.json(req, "POST /vehicles/{id}/checklist").await
  }

  /// `POST /api/vehicles/{id}/exit`
  pub async fn vehicle_exit(
    &self,
    vehicle: &str,
    driver_id: &str,
    destination: &str,
    location: Option<&str>,
  ) -> Result<MovementRecord> {
    let req = self
      .request(Method::POST, &format!("/vehicles/{vehicle}/exit"))
      .json(&json!({ "driver_id": driver_id, "destination": destination, "location": location }));
    self.json(req, "POST /vehicles/{id}/exit").await
  }

  /// `POST /api/vehicles/{id}/return`
  pub async fn vehicle_return(
    &self,
    vehicle: &str,
    driver_id: &str,
    origin_base: &str,
    location: Option<&str>,
  ) -> Result<MovementRecord> {
    let req = self
      .request(Method::POST, &format!("/vehicles/{vehicle}/return"))
      .json(&json!({ "driver_id": driver_id, "origin_base": origin_base, "location": location }));
    self.json(req, "POST /vehicles/{id}/return").await
  }

  /// `GET /api/vehicles/{id}/movement`
  pub async fn movement(&self, vehicle: &str) -> Result<VehicleMovement> {
    let req = self.request(Method::GET, &format!("/vehicles/{vehicle}/movement"));
    self.json(req, "GET /vehicles/{id}/movement").await
  }

  /// `GET /api/vehicles/ready` or `/api/vehicles/in-transit`
  pub async fn list_vehicles(&self, in_transit: bool) -> Result<Vec<VehicleMovement>> {
    let path = if in_transit { "/vehicles/in-transit" } else { "/vehicles/ready" };
    let req = self.request(Method::GET, path);
    self.json(req, "GET /vehicles").await
  }

  // ── Log and occupancy ─────────────────────────────────────────────────

  /// `GET /api/events`
  pub async fn events(&self, filters: &[(&str, String)]) -> Result<Vec<AccessEvent>> {
    let req = self.request(Method::GET, "/events").query(filters);
    self.json(req, "GET /events").await
  }

  /// `GET /api/events/export` — raw CSV text.
  pub async fn export_events(&self, filters: &[(&str, String)]) -> Result<String> {
    let req = self.request(Method::GET, "/events/export").query(filters);
    self
      .send(req, "GET /events/export")
      .await?
      .text()
      .await
      .context("reading CSV export")
  }

  /// `GET /api/occupancy`
  pub async fn occupancy(&self, filters: &[(&str, String)]) -> Result<OccupancySnapshot> {
    let req = self.request(Method::GET, "/occupancy").query(filters);
    self.json(req, "GET /occupancy").await
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn error(kind: Option<&str>, message: Option<&str>) -> ServerError {
    ServerError {
      what:    "POST /scans".into(),
      status:  reqwest::StatusCode::CONFLICT,
      kind:    kind.map(str::to_owned),
      message: message.map(str::to_owned),
    }
  }

  #[test]
  fn server_error_message_includes_kind_when_present() {
    let e = error(Some("cancelled"), Some("scan cancelled"));
    assert_eq!(e.to_string(), "POST /scans → 409 Conflict (cancelled): scan cancelled");
    assert!(e.is_cancelled());

    let bare = error(None, None);
    assert_eq!(bare.to_string(), "POST /scans → 409 Conflict");
    assert!(!bare.is_cancelled());
  }

  #[test]
  fn anyhow_wrapped_server_error_downcasts() {
    let err = anyhow!(error(Some("cancelled"), Some("x")));
    assert!(err.downcast_ref::<ServerError>().is_some_and(ServerError::is_cancelled));
  }
}
