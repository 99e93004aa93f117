//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings with microsecond
//! precision and a `Z` suffix, so lexical comparison in SQL is time
//! comparison. UUIDs are stored as hyphenated lowercase strings. Enums use
//! their snake_case wire names.

use chrono::{DateTime, SecondsFormat, Utc};
use gatehouse_core::{
  event::{AccessEvent, AccessEventDraft, AccessMethod, AccessSubject, Direction, PersonType},
  movement::{ChecklistStatus, VehicleMovement, VehicleState},
  visitor::Visitor,
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

/// [`decode_dt`] for use inside a connection closure.
pub fn sql_dt(s: &str) -> rusqlite::Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| {
      rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn decode_opt_dt(s: Option<&str>) -> Result<Option<DateTime<Utc>>> {
  s.map(decode_dt).transpose()
}

fn unknown(column: &'static str, value: &str) -> Error {
  Error::UnknownValue { column, value: value.to_owned() }
}

// ─── Enums ───────────────────────────────────────────────────────────────────

pub fn decode_person_type(s: &str) -> Result<PersonType> {
  match s {
    "employee" => Ok(PersonType::Employee),
    "visitor" => Ok(PersonType::Visitor),
    "vehicle" => Ok(PersonType::Vehicle),
    other => Err(unknown("person_type", other)),
  }
}

pub fn decode_direction(s: &str) -> Result<Direction> {
  match s {
    "entry" => Ok(Direction::Entry),
    "exit" => Ok(Direction::Exit),
    other => Err(unknown("direction", other)),
  }
}

pub fn decode_access_method(s: &str) -> Result<AccessMethod> {
  match s {
    "qr_code" => Ok(AccessMethod::QrCode),
    "manual" => Ok(AccessMethod::Manual),
    "facial_recognition" => Ok(AccessMethod::FacialRecognition),
    other => Err(unknown("access_method", other)),
  }
}

pub fn decode_checklist_status(s: &str) -> Result<ChecklistStatus> {
  ChecklistStatus::ALL
    .into_iter()
    .find(|c| c.as_str() == s)
    .ok_or_else(|| unknown("checklist_status", s))
}

pub fn decode_vehicle_state(s: &str) -> Result<VehicleState> {
  match s {
    "available" => Ok(VehicleState::Available),
    "in_transit" => Ok(VehicleState::InTransit),
    other => Err(unknown("status", other)),
  }
}

// ─── Access events ───────────────────────────────────────────────────────────

/// Column values for an `access_events` insert, minus the fields assigned
/// inside the write transaction (`sequence`, `timestamp`).
pub struct EventRow {
  pub event_id:      String,
  pub person_type:   &'static str,
  pub person_id:     String,
  pub person_name:   String,
  pub person_cpf:    Option<String>,
  pub driver_id:     Option<String>,
  pub direction:     &'static str,
  pub access_method: &'static str,
  pub location:      String,
  pub verified_by:   Option<String>,
  pub notes:         Option<String>,
}

impl EventRow {
  pub fn new(id: Uuid, draft: &AccessEventDraft) -> Self {
    let driver_id = match &draft.subject {
      AccessSubject::Vehicle { driver_id, .. } => Some(driver_id.clone()),
      _ => None,
    };
    Self {
      event_id: encode_uuid(id),
      person_type: draft.subject.person_type().as_str(),
      person_id: draft.subject.person_id(),
      person_name: draft.subject.person_name().to_owned(),
      person_cpf: draft.subject.person_cpf().map(str::to_owned),
      driver_id,
      direction: draft.direction.as_str(),
      access_method: draft.access_method.as_str(),
      location: draft.location.clone(),
      verified_by: draft.verified_by.clone(),
      notes: draft.notes.clone(),
    }
  }
}

/// Build the stored event from its draft and the values assigned on insert.
pub fn event_from_draft(
  id: Uuid,
  sequence: i64,
  timestamp: DateTime<Utc>,
  draft: AccessEventDraft,
) -> AccessEvent {
  AccessEvent {
    id,
    sequence,
    subject: draft.subject,
    direction: draft.direction,
    access_method: draft.access_method,
    location: draft.location,
    timestamp,
    verified_by: draft.verified_by,
    notes: draft.notes,
  }
}

pub const EVENT_COLUMNS: &str = "sequence, event_id, person_type, person_id, person_name, \
   person_cpf, driver_id, direction, access_method, location, timestamp, verified_by, notes";

/// Raw strings read directly from an `access_events` row.
pub struct RawAccessEvent {
  pub sequence:      i64,
  pub event_id:      String,
  pub person_type:   String,
  pub person_id:     String,
  pub person_name:   String,
  pub person_cpf:    Option<String>,
  pub driver_id:     Option<String>,
  pub direction:     String,
  pub access_method: String,
  pub location:      String,
  pub timestamp:     String,
  pub verified_by:   Option<String>,
  pub notes:         Option<String>,
}

impl RawAccessEvent {
  /// Row mapper for queries selecting [`EVENT_COLUMNS`].
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      sequence:      row.get(0)?,
      event_id:      row.get(1)?,
      person_type:   row.get(2)?,
      person_id:     row.get(3)?,
      person_name:   row.get(4)?,
      person_cpf:    row.get(5)?,
      driver_id:     row.get(6)?,
      direction:     row.get(7)?,
      access_method: row.get(8)?,
      location:      row.get(9)?,
      timestamp:     row.get(10)?,
      verified_by:   row.get(11)?,
      notes:         row.get(12)?,
    })
  }

  pub fn into_event(self) -> Result<AccessEvent> {
    let subject = match decode_person_type(&self.person_type)? {
      PersonType::Employee => AccessSubject::Employee {
        employee_id: self.person_id,
        name:        self.person_name,
        cpf:         self.person_cpf,
      },
      PersonType::Visitor => AccessSubject::Visitor {
        visitor_id: decode_uuid(&self.person_id)?,
        name:       self.person_name,
        cpf:        self.person_cpf.unwrap_or_default(),
      },
      PersonType::Vehicle => AccessSubject::Vehicle {
        vehicle_id: self.person_id,
        plate:      self.person_name,
        driver_id:  self.driver_id.unwrap_or_default(),
      },
    };
    Ok(AccessEvent {
      id: decode_uuid(&self.event_id)?,
      sequence: self.sequence,
      subject,
      direction: decode_direction(&self.direction)?,
      access_method: decode_access_method(&self.access_method)?,
      location: self.location,
      timestamp: decode_dt(&self.timestamp)?,
      verified_by: self.verified_by,
      notes: self.notes,
    })
  }
}

// ─── Visitors ────────────────────────────────────────────────────────────────

pub const VISITOR_COLUMNS: &str =
  "visitor_id, name, cpf, photo, total_visits, last_visit, is_active, created_at";

/// Raw strings read directly from a `visitors` row.
pub struct RawVisitor {
  pub visitor_id:   String,
  pub name:         String,
  pub cpf:          String,
  pub photo:        Option<String>,
  pub total_visits: u32,
  pub last_visit:   Option<String>,
  pub is_active:    bool,
  pub created_at:   String,
}

impl RawVisitor {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      visitor_id:   row.get(0)?,
      name:         row.get(1)?,
      cpf:          row.get(2)?,
      photo:        row.get(3)?,
      total_visits: row.get(4)?,
      last_visit:   row.get(5)?,
      is_active:    row.get(6)?,
      created_at:   row.get(7)?,
    })
  }

  pub fn into_visitor(self) -> Result<Visitor> {
    Ok(Visitor {
      id:           decode_uuid(&self.visitor_id)?,
      name:         self.name,
      cpf:          self.cpf,
      photo:        self.photo,
      total_visits: self.total_visits,
      last_visit:   decode_opt_dt(self.last_visit.as_deref())?,
      is_active:    self.is_active,
      created_at:   decode_dt(&self.created_at)?,
    })
  }
}

// ─── Vehicle movements ───────────────────────────────────────────────────────

pub const MOVEMENT_COLUMNS: &str = "vehicle_id, driver_id, checklist_id, checklist_status, \
   status, destination, origin_base, exit_time, return_time, checklist_date, version, updated_at";

/// Column values for writing a `vehicle_movements` row, in
/// [`MOVEMENT_COLUMNS`] order.
pub struct MovementRow {
  pub vehicle_id:       String,
  pub driver_id:        String,
  pub checklist_id:     Option<String>,
  pub checklist_status: &'static str,
  pub status:           &'static str,
  pub destination:      Option<String>,
  pub origin_base:      Option<String>,
  pub exit_time:        Option<String>,
  pub return_time:      Option<String>,
  pub checklist_date:   Option<String>,
  pub version:          i64,
  pub updated_at:       String,
}

impl MovementRow {
  pub fn new(m: &VehicleMovement, version: u64) -> Self {
    Self {
      vehicle_id:       m.vehicle_id.clone(),
      driver_id:        m.driver_id.clone(),
      checklist_id:     m.checklist_id.clone(),
      checklist_status: m.checklist_status.as_str(),
      status:           m.status.as_str(),
      destination:      m.destination.clone(),
      origin_base:      m.origin_base.clone(),
      exit_time:        m.exit_time.map(encode_dt),
      return_time:      m.return_time.map(encode_dt),
      checklist_date:   m.checklist_date.map(encode_dt),
      version:          version as i64,
      updated_at:       encode_dt(m.updated_at),
    }
  }
}

/// Raw strings read directly from a `vehicle_movements` row.
pub struct RawMovement {
  pub vehicle_id:       String,
  pub driver_id:        String,
  pub checklist_id:     Option<String>,
  pub checklist_status: String,
  pub status:           String,
  pub destination:      Option<String>,
  pub origin_base:      Option<String>,
  pub exit_time:        Option<String>,
  pub return_time:      Option<String>,
  pub checklist_date:   Option<String>,
  pub version:          i64,
  pub updated_at:       String,
}

impl RawMovement {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      vehicle_id:       row.get(0)?,
      driver_id:        row.get(1)?,
      checklist_id:     row.get(2)?,
      checklist_status: row.get(3)?,
      status:           row.get(4)?,
      destination:      row.get(5)?,
      origin_base:      row.get(6)?,
      exit_time:        row.get(7)?,
      return_time:      row.get(8)?,
      checklist_date:   row.get(9)?,
      version:          row.get(10)?,
      updated_at:       row.get(11)?,
    })
  }

  pub fn into_movement(self) -> Result<VehicleMovement> {
    Ok(VehicleMovement {
      vehicle_id:       self.vehicle_id,
      driver_id:        self.driver_id,
      checklist_id:     self.checklist_id,
      checklist_status: decode_checklist_status(&self.checklist_status)?,
      status:           decode_vehicle_state(&self.status)?,
      destination:      self.destination,
      origin_base:      self.origin_base,
      exit_time:        decode_opt_dt(self.exit_time.as_deref())?,
      return_time:      decode_opt_dt(self.return_time.as_deref())?,
      checklist_date:   decode_opt_dt(self.checklist_date.as_deref())?,
      version:          self.version as u64,
      updated_at:       decode_dt(&self.updated_at)?,
    })
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone as _;

  use super::*;

  #[test]
  fn timestamps_are_fixed_width() {
    let whole = Utc.with_ymd_and_hms(2024, 3, 4, 8, 0, 0).unwrap();
    let encoded = encode_dt(whole);
    assert_eq!(encoded, "2024-03-04T08:00:00.000000Z");
    assert_eq!(decode_dt(&encoded).unwrap(), whole);

    let later = whole + chrono::Duration::microseconds(1);
    assert!(encode_dt(later) > encoded);
  }

  #[test]
  fn unknown_enum_values_are_errors() {
    assert!(matches!(
      decode_direction("sideways"),
      Err(Error::UnknownValue { column: "direction", .. })
    ));
    assert_eq!(decode_checklist_status("approved").unwrap(), ChecklistStatus::Approved);
  }
}
