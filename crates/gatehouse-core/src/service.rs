//! [`GateService`] — the operations exposed to calling surfaces.
//!
//! The service validates input, consults the identity directory, computes
//! vehicle transitions with [`crate::movement`], and hands each unit of work
//! to the store as a single atomic write. It never retries: every failure is
//! returned to the caller.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result, cpf,
  credential::{CredentialResolver, ResolvedCredential, ScanSession},
  directory::{Driver, EmployeeKey, IdentityDirectory, Vehicle, VehicleKey, normalize_plate},
  event::{AccessEvent, AccessEventDraft, AccessMethod, AccessSubject, Direction, EventQuery, PersonType},
  movement::{CommitOutcome, MovementCommit, MovementFilter, MovementRecord, VehicleMovement},
  occupancy::{OccupancySnapshot, OccupancyWindow, project},
  store::{AccessStore, AppendOutcome},
  visitor::{NewVisitor, Visitor, VisitorEdit},
};

// ─── Configuration ───────────────────────────────────────────────────────────

/// What to do when a person's new event has the same direction as their
/// previous one (e.g. a badge scanned twice on the way in).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectionPolicy {
  /// Append silently.
  Allow,
  /// Append and log a warning.
  #[default]
  Warn,
  /// Refuse with [`Error::DuplicateDirection`].
  Reject,
}

#[derive(Debug, Clone)]
pub struct GateConfig {
  pub direction_policy:    DirectionPolicy,
  /// Prefix stripped from employee credential tokens, e.g. `EMP-`.
  pub credential_prefix:   String,
  /// Offset of the site's local time; defines calendar days for occupancy.
  pub site_offset:         FixedOffset,
  /// Location recorded when a request does not name one.
  pub default_location:    String,
  /// Applied to log queries that do not set a limit.
  pub default_query_limit: usize,
}

impl Default for GateConfig {
  fn default() -> Self {
    Self {
      direction_policy:    DirectionPolicy::default(),
      credential_prefix:   "EMP-".to_owned(),
      site_offset:         Utc.fix(),
      default_location:    "Main gate".to_owned(),
      default_query_limit: 100,
    }
  }
}

/// Annotations for a person access event.
#[derive(Debug, Clone, Deserialize)]
pub struct AccessRequest {
  pub direction:     Direction,
  #[serde(default)]
  pub location:      Option<String>,
  #[serde(default)]
  pub access_method: AccessMethod,
  #[serde(default)]
  pub verified_by:   Option<String>,
  #[serde(default)]
  pub notes:         Option<String>,
}

impl AccessRequest {
  pub fn new(direction: Direction) -> Self {
    Self {
      direction,
      location: None,
      access_method: AccessMethod::default(),
      verified_by: None,
      notes: None,
    }
  }
}

fn required(field: &str, value: &str) -> Result<String> {
  let trimmed = value.trim();
  if trimmed.is_empty() {
    return Err(Error::InvalidInput(format!("{field} must not be empty")));
  }
  Ok(trimmed.to_owned())
}

// ─── Service ─────────────────────────────────────────────────────────────────

/// Cloning is cheap; all state is reference-counted.
pub struct GateService<S, D> {
  store:     Arc<S>,
  directory: Arc<D>,
  resolver:  CredentialResolver<D>,
  config:    Arc<GateConfig>,
}

impl<S, D> Clone for GateService<S, D> {
  fn clone(&self) -> Self {
    Self {
      store:     Arc::clone(&self.store),
      directory: Arc::clone(&self.directory),
      resolver:  self.resolver.clone(),
      config:    Arc::clone(&self.config),
    }
  }
}

impl<S, D> GateService<S, D>
where
  S: AccessStore,
  D: IdentityDirectory,
{
  pub fn new(store: Arc<S>, directory: Arc<D>, config: GateConfig) -> Self {
    let resolver =
      CredentialResolver::new(Arc::clone(&directory), config.credential_prefix.clone());
    Self { store, directory, resolver, config: Arc::new(config) }
  }

  pub fn config(&self) -> &GateConfig { &self.config }

  /// Today's date in site-local time.
  pub fn site_today(&self) -> NaiveDate {
    Utc::now().with_timezone(&self.config.site_offset).date_naive()
  }

  fn draft(&self, subject: AccessSubject, request: AccessRequest) -> AccessEventDraft {
    let location = request
      .location
      .map(|l| l.trim().to_owned())
      .filter(|l| !l.is_empty())
      .unwrap_or_else(|| self.config.default_location.clone());
    AccessEventDraft {
      subject,
      direction: request.direction,
      access_method: request.access_method,
      location,
      verified_by: request.verified_by,
      notes: request.notes,
    }
  }

  async fn append(&self, draft: AccessEventDraft) -> Result<AppendOutcome> {
    let outcome = self.store.append_event(draft).await.map_err(Error::storage)?;
    tracing::info!(
      event_id = %outcome.event.id,
      person_type = outcome.event.subject.person_type().as_str(),
      person_id = %outcome.event.subject.person_id(),
      direction = %outcome.event.direction,
      "access event recorded"
    );
    Ok(outcome)
  }

  /// Apply the configured [`DirectionPolicy`] against the person's latest
  /// event. Not atomic with the append that follows; alternation is a
  /// validation rule, not a storage invariant.
  async fn check_direction(
    &self,
    person_type: PersonType,
    person_id: &str,
    direction: Direction,
  ) -> Result<()> {
    let policy = self.config.direction_policy;
    if policy == DirectionPolicy::Allow {
      return Ok(());
    }
    let latest = self
      .store
      .latest_event_for(person_type, person_id.to_owned())
      .await
      .map_err(Error::storage)?;
    match latest {
      Some(prev) if prev.direction == direction => {
        if policy == DirectionPolicy::Reject {
          return Err(Error::DuplicateDirection {
            person_id: person_id.to_owned(),
            direction,
          });
        }
        tracing::warn!(
          person_type = person_type.as_str(),
          person_id,
          %direction,
          previous_event = %prev.id,
          "consecutive events with the same direction"
        );
        Ok(())
      }
      _ => Ok(()),
    }
  }

  // ── Credentials ───────────────────────────────────────────────────────

  pub async fn resolve_credential(&self, token: &str) -> Result<ResolvedCredential> {
    self.resolver.resolve(token).await
  }

  /// Resolve a scanned credential and record the employee's access.
  ///
  /// Cancellation is honoured until the event is handed to the store: a
  /// session cancelled during resolution or the direction check writes
  /// nothing. Once the append has started it runs to completion, so a cancel
  /// that lands during the write is acknowledged but the event still
  /// commits; the caller sees it in this call's result.
  pub async fn scan_access(
    &self,
    session: &ScanSession,
    token: &str,
    request: AccessRequest,
  ) -> Result<AccessEvent> {
    let credential = match session.resolve(&self.resolver, token).await {
      Ok(c) => c,
      Err(e) => {
        tracing::warn!(error = %e, "scan did not resolve");
        return Err(e);
      }
    };
    self
      .check_direction(PersonType::Employee, &credential.person_id, request.direction)
      .await?;
    session.ensure_active()?;
    let draft = self.draft(credential.into_subject(), request);
    Ok(self.append(draft).await?.event)
  }

  // ── Employees ─────────────────────────────────────────────────────────

  pub async fn record_employee_access(
    &self,
    employee_id: &str,
    request: AccessRequest,
  ) -> Result<AccessEvent> {
    let employee = self
      .directory
      .lookup_employee(EmployeeKey::Id(employee_id.to_owned()))
      .await
      .map_err(Error::directory)?
      .filter(|e| e.is_active)
      .ok_or_else(|| Error::EmployeeNotFound(employee_id.to_owned()))?;

    self
      .check_direction(PersonType::Employee, &employee.id, request.direction)
      .await?;
    let subject = AccessSubject::Employee {
      employee_id: employee.id,
      name:        employee.name,
      cpf:         employee.cpf,
    };
    Ok(self.append(self.draft(subject, request)).await?.event)
  }

  // ── Visitors ──────────────────────────────────────────────────────────

  /// Find-or-create on CPF. An existing visitor is returned unchanged; the
  /// boolean reports whether a row was created.
  pub async fn register_visitor(
    &self,
    name: &str,
    raw_cpf: &str,
    photo: Option<String>,
  ) -> Result<(Visitor, bool)> {
    let input = NewVisitor {
      name: required("name", name)?,
      cpf: cpf::parse(raw_cpf)?,
      photo,
    };
    let (visitor, created) = self
      .store
      .insert_visitor_if_absent(input)
      .await
      .map_err(Error::storage)?;
    if created {
      tracing::info!(visitor_id = %visitor.id, "visitor registered");
    }
    Ok((visitor, created))
  }

  pub async fn find_visitor_by_cpf(&self, raw_cpf: &str) -> Result<Visitor> {
    let digits = cpf::parse(raw_cpf)?;
    self
      .store
      .find_visitor_by_cpf(digits.clone())
      .await
      .map_err(Error::storage)?
      .ok_or_else(|| Error::VisitorNotFound(cpf::format(&digits)))
  }

  pub async fn get_visitor(&self, id: Uuid) -> Result<Visitor> {
    self
      .store
      .get_visitor(id)
      .await
      .map_err(Error::storage)?
      .ok_or_else(|| Error::VisitorNotFound(id.to_string()))
  }

  pub async fn edit_visitor(&self, id: Uuid, edit: VisitorEdit) -> Result<Visitor> {
    if edit.is_empty() {
      return Err(Error::InvalidInput("nothing to edit".into()));
    }
    let edit = VisitorEdit {
      name: edit.name.as_deref().map(|n| required("name", n)).transpose()?,
      photo: edit.photo,
    };
    self
      .store
      .edit_visitor(id, edit)
      .await
      .map_err(Error::storage)?
      .ok_or_else(|| Error::VisitorNotFound(id.to_string()))
  }

  pub async fn set_visitor_active(&self, id: Uuid, is_active: bool) -> Result<Visitor> {
    self
      .store
      .set_visitor_active(id, is_active)
      .await
      .map_err(Error::storage)?
      .ok_or_else(|| Error::VisitorNotFound(id.to_string()))
  }

  /// Record a visitor entry or exit. An entry counts one visit in the same
  /// transaction as the event; an exit never does.
  pub async fn record_visitor_access(
    &self,
    visitor_id: Uuid,
    request: AccessRequest,
  ) -> Result<AppendOutcome> {
    let visitor = self.get_visitor(visitor_id).await?;
    if request.direction == Direction::Entry && !visitor.is_active {
      return Err(Error::VisitorInactive(visitor_id));
    }
    self
      .check_direction(PersonType::Visitor, &visitor_id.to_string(), request.direction)
      .await?;
    let subject = AccessSubject::Visitor {
      visitor_id,
      name: visitor.name,
      cpf:  visitor.cpf,
    };
    self.append(self.draft(subject, request)).await
  }

  // ── Vehicles ──────────────────────────────────────────────────────────

  /// Look a vehicle up by id, then by plate.
  async fn vehicle(&self, reference: &str) -> Result<Vehicle> {
    let reference = required("vehicle", reference)?;
    let by_id = self
      .directory
      .lookup_vehicle(VehicleKey::Id(reference.clone()))
      .await
      .map_err(Error::directory)?;
    if let Some(vehicle) = by_id {
      return Ok(vehicle);
    }
    let plate = normalize_plate(&reference);
    if plate.is_empty() {
      return Err(Error::VehicleNotFound(reference));
    }
    self
      .directory
      .lookup_vehicle(VehicleKey::Plate(plate))
      .await
      .map_err(Error::directory)?
      .ok_or(Error::VehicleNotFound(reference))
  }

  async fn driver(&self, id: &str) -> Result<Driver> {
    let id = required("driver", id)?;
    self
      .directory
      .lookup_driver(id.clone())
      .await
      .map_err(Error::directory)?
      .ok_or(Error::DriverNotFound(id))
  }

  async fn movement_of(&self, vehicle_id: &str) -> Result<Option<VehicleMovement>> {
    self
      .store
      .get_movement(vehicle_id.to_owned())
      .await
      .map_err(Error::storage)
  }

  async fn commit(
    &self,
    current: &VehicleMovement,
    next: VehicleMovement,
    event: Option<AccessEventDraft>,
  ) -> Result<MovementRecord> {
    let commit = MovementCommit { expected_version: current.version, next, event };
    match self.store.commit_movement(commit).await.map_err(Error::storage)? {
      CommitOutcome::Committed(record) => {
        tracing::info!(
          vehicle_id = %record.movement.vehicle_id,
          phase = %record.movement.phase(),
          version = record.movement.version,
          "vehicle movement committed"
        );
        Ok(record)
      }
      CommitOutcome::Stale => {
        tracing::warn!(vehicle_id = %current.vehicle_id, "lost movement race");
        Err(Error::Conflict { vehicle_id: current.vehicle_id.clone() })
      }
    }
  }

  fn vehicle_event(
    &self,
    vehicle: Vehicle,
    driver_id: String,
    direction: Direction,
    location: Option<String>,
  ) -> AccessEventDraft {
    let subject = AccessSubject::Vehicle {
      vehicle_id: vehicle.id,
      plate: vehicle.plate,
      driver_id,
    };
    let request = AccessRequest { location, ..AccessRequest::new(direction) };
    self.draft(subject, request)
  }

  pub async fn get_movement(&self, vehicle_ref: &str) -> Result<VehicleMovement> {
    let vehicle = self.vehicle(vehicle_ref).await?;
    self
      .movement_of(&vehicle.id)
      .await?
      .ok_or(Error::MovementNotFound(vehicle.id))
  }

  /// Associate a pending checklist with a vehicle, creating its movement row
  /// on first use.
  pub async fn submit_checklist(
    &self,
    vehicle_ref: &str,
    driver_id: &str,
    checklist_id: &str,
  ) -> Result<MovementRecord> {
    let checklist_id = required("checklist_id", checklist_id)?;
    let vehicle = self.vehicle(vehicle_ref).await?;
    let driver = self.driver(driver_id).await?;
    let now = Utc::now();
    let current = self
      .movement_of(&vehicle.id)
      .await?
      .unwrap_or_else(|| VehicleMovement::fresh(&vehicle.id, &driver.id, now));
    let next = current.submit_checklist(&driver.id, &checklist_id, now)?;
    self.commit(&current, next, None).await
  }

  pub async fn approve_checklist(
    &self,
    vehicle_ref: &str,
    checklist_id: &str,
  ) -> Result<MovementRecord> {
    let current = self.get_movement(vehicle_ref).await?;
    let next = current.approve_checklist(checklist_id.trim(), Utc::now())?;
    self.commit(&current, next, None).await
  }

  pub async fn reject_checklist(
    &self,
    vehicle_ref: &str,
    checklist_id: &str,
  ) -> Result<MovementRecord> {
    let current = self.get_movement(vehicle_ref).await?;
    let next = current.reject_checklist(checklist_id.trim(), Utc::now())?;
    self.commit(&current, next, None).await
  }

  /// Let a vehicle leave. Requires an approved checklist and an available
  /// vehicle; the state change and the exit event commit together.
  pub async fn authorize_vehicle_exit(
    &self,
    vehicle_ref: &str,
    driver_id: &str,
    destination: &str,
    location: Option<String>,
  ) -> Result<MovementRecord> {
    let destination = required("destination", destination)?;
    let vehicle = self.vehicle(vehicle_ref).await?;
    let driver = self.driver(driver_id).await?;
    let now = Utc::now();
    let current = self
      .movement_of(&vehicle.id)
      .await?
      .unwrap_or_else(|| VehicleMovement::fresh(&vehicle.id, &driver.id, now));

    let next = match current.authorize_exit(&driver.id, &destination, now) {
      Ok(next) => next,
      Err(e) => {
        tracing::warn!(vehicle_id = %vehicle.id, error = %e, "exit refused");
        return Err(e);
      }
    };
    let event = self.vehicle_event(vehicle, driver.id, Direction::Exit, location);
    self.commit(&current, next, Some(event)).await
  }

  /// Bring a vehicle back. Requires it to be in transit with `driver_id`.
  pub async fn register_vehicle_return(
    &self,
    vehicle_ref: &str,
    driver_id: &str,
    origin_base: &str,
    location: Option<String>,
  ) -> Result<MovementRecord> {
    let origin_base = required("origin_base", origin_base)?;
    let vehicle = self.vehicle(vehicle_ref).await?;
    let driver = self.driver(driver_id).await?;
    let current = self.movement_of(&vehicle.id).await?.ok_or_else(|| {
      Error::NotInTransit {
        vehicle_id: vehicle.id.clone(),
        driver_id:  driver.id.clone(),
      }
    })?;
    let next = current.register_return(&driver.id, &origin_base, Utc::now())?;
    let event = self.vehicle_event(vehicle, driver.id, Direction::Entry, location);
    self.commit(&current, next, Some(event)).await
  }

  pub async fn list_ready_for_exit(&self) -> Result<Vec<VehicleMovement>> {
    self
      .store
      .list_movements(MovementFilter::ready_for_exit())
      .await
      .map_err(Error::storage)
  }

  pub async fn list_in_transit(&self) -> Result<Vec<VehicleMovement>> {
    self
      .store
      .list_movements(MovementFilter::in_transit())
      .await
      .map_err(Error::storage)
  }

  // ── Log and occupancy ─────────────────────────────────────────────────

  /// Filtered log, newest first. Unbounded queries get the configured
  /// default limit.
  pub async fn query_access_log(&self, mut query: EventQuery) -> Result<Vec<AccessEvent>> {
    query.limit.get_or_insert(self.config.default_query_limit);
    self.log_rows(query).await
  }

  /// Rows for a log export. Same filters as [`Self::query_access_log`], but
  /// only an explicit `limit` caps the result.
  pub async fn export_access_log(&self, query: EventQuery) -> Result<Vec<AccessEvent>> {
    self.log_rows(query).await
  }

  async fn log_rows(&self, query: EventQuery) -> Result<Vec<AccessEvent>> {
    if matches!((query.from, query.to), (Some(from), Some(to)) if from > to) {
      return Err(Error::InvalidInput("`from` must not be after `to`".into()));
    }
    self.store.query_events(&query).await.map_err(Error::storage)
  }

  /// Occupancy for the site-local `date`, cut off at `as_of` when given.
  pub async fn occupancy_snapshot(
    &self,
    date: NaiveDate,
    as_of: Option<DateTime<Utc>>,
  ) -> Result<OccupancySnapshot> {
    let window = OccupancyWindow::for_day(date, self.config.site_offset, as_of)?;
    let events = self
      .store
      .events_between(window.start, window.end)
      .await
      .map_err(Error::storage)?;
    Ok(project(&events, &window))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn access_request_defaults() {
    let req: AccessRequest =
      serde_json::from_str(r#"{"direction":"entry"}"#).unwrap();
    assert_eq!(req.direction, Direction::Entry);
    assert_eq!(req.access_method, AccessMethod::Manual);
    assert!(req.location.is_none());
  }

  #[test]
  fn direction_policy_names() {
    let p: DirectionPolicy = serde_json::from_str(r#""reject""#).unwrap();
    assert_eq!(p, DirectionPolicy::Reject);
    assert_eq!(DirectionPolicy::default(), DirectionPolicy::Warn);
  }

  #[test]
  fn required_trims() {
    assert_eq!(required("name", "  Ana ").unwrap(), "Ana");
    assert!(matches!(required("name", "   "), Err(Error::InvalidInput(_))));
  }
}
