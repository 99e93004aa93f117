//! Access events — the append-only fact log of the subsystem.
//!
//! An event is an immutable entry/exit fact for an employee, a visitor or a
//! vehicle. The identity fields are a snapshot taken when the event was
//! recorded and never change afterwards, even if the directory record does.

use std::fmt;

use chrono::{DateTime, Duration, SubsecRound as _, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Enumerations ────────────────────────────────────────────────────────────

/// The kind of entity an event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonType {
  Employee,
  Visitor,
  Vehicle,
}

impl PersonType {
  /// The discriminant stored in the `person_type` column.
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Employee => "employee",
      Self::Visitor => "visitor",
      Self::Vehicle => "vehicle",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
  Entry,
  Exit,
}

impl Direction {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Entry => "entry",
      Self::Exit => "exit",
    }
  }
}

impl fmt::Display for Direction {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// How the identity behind an event was established at the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMethod {
  QrCode,
  #[default]
  Manual,
  FacialRecognition,
}

impl AccessMethod {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::QrCode => "qr_code",
      Self::Manual => "manual",
      Self::FacialRecognition => "facial_recognition",
    }
  }
}

// ─── Subject ─────────────────────────────────────────────────────────────────

/// Who or what an event is about. Each variant carries exactly the snapshot
/// fields that make sense for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "person_type", rename_all = "snake_case")]
pub enum AccessSubject {
  Employee {
    employee_id: String,
    name:        String,
    cpf:         Option<String>,
  },
  Visitor {
    visitor_id: Uuid,
    name:       String,
    cpf:        String,
  },
  Vehicle {
    vehicle_id: String,
    plate:      String,
    driver_id:  String,
  },
}

impl AccessSubject {
  pub fn person_type(&self) -> PersonType {
    match self {
      Self::Employee { .. } => PersonType::Employee,
      Self::Visitor { .. } => PersonType::Visitor,
      Self::Vehicle { .. } => PersonType::Vehicle,
    }
  }

  /// The directory (or visitor) identifier, as stored in `person_id`.
  pub fn person_id(&self) -> String {
    match self {
      Self::Employee { employee_id, .. } => employee_id.clone(),
      Self::Visitor { visitor_id, .. } => visitor_id.hyphenated().to_string(),
      Self::Vehicle { vehicle_id, .. } => vehicle_id.clone(),
    }
  }

  /// Display name snapshot; the plate for vehicles.
  pub fn person_name(&self) -> &str {
    match self {
      Self::Employee { name, .. } | Self::Visitor { name, .. } => name,
      Self::Vehicle { plate, .. } => plate,
    }
  }

  pub fn person_cpf(&self) -> Option<&str> {
    match self {
      Self::Employee { cpf, .. } => cpf.as_deref(),
      Self::Visitor { cpf, .. } => Some(cpf),
      Self::Vehicle { .. } => None,
    }
  }

  pub fn key(&self) -> PersonKey {
    PersonKey {
      person_type: self.person_type(),
      person_id:   self.person_id(),
    }
  }
}

/// Identity of an entity across events, independent of snapshot fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PersonKey {
  pub person_type: PersonType,
  pub person_id:   String,
}

// ─── AccessEvent ─────────────────────────────────────────────────────────────

/// An immutable access fact. Once written, no field is ever updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessEvent {
  pub id:            Uuid,
  /// Store-assigned insertion order; breaks timestamp ties.
  pub sequence:      i64,
  #[serde(flatten)]
  pub subject:       AccessSubject,
  pub direction:     Direction,
  pub access_method: AccessMethod,
  pub location:      String,
  /// Server-assigned, strictly increasing across the log.
  pub timestamp:     DateTime<Utc>,
  /// Staff member who confirmed a manual event.
  pub verified_by:   Option<String>,
  pub notes:         Option<String>,
}

impl AccessEvent {
  /// Total order of the log: timestamp first, insertion sequence second.
  pub fn order_key(&self) -> (DateTime<Utc>, i64) {
    (self.timestamp, self.sequence)
  }
}

/// Input to [`crate::store::AccessStore::append_event`].
/// `id`, `sequence` and `timestamp` are always set by the store.
#[derive(Debug, Clone)]
pub struct AccessEventDraft {
  pub subject:       AccessSubject,
  pub direction:     Direction,
  pub access_method: AccessMethod,
  pub location:      String,
  pub verified_by:   Option<String>,
  pub notes:         Option<String>,
}

impl AccessEventDraft {
  /// Convenience constructor with a manual access method and no annotations.
  pub fn new(
    subject: AccessSubject,
    direction: Direction,
    location: impl Into<String>,
  ) -> Self {
    Self {
      subject,
      direction,
      access_method: AccessMethod::default(),
      location: location.into(),
      verified_by: None,
      notes: None,
    }
  }
}

/// Timestamp for the next appended event.
///
/// Clock readings are truncated to microseconds (the stored precision). If
/// the clock has not advanced past the previous event, the previous
/// timestamp plus one microsecond is used, so timestamps stay distinct and
/// increasing even under clock skew.
pub fn next_timestamp(
  now: DateTime<Utc>,
  last: Option<DateTime<Utc>>,
) -> DateTime<Utc> {
  let now = now.trunc_subsecs(6);
  match last {
    Some(last) if last >= now => last + Duration::microseconds(1),
    _ => now,
  }
}

// ─── Query type ──────────────────────────────────────────────────────────────

/// Parameters for [`crate::store::AccessStore::query_events`]. Results are
/// ordered by timestamp descending.
#[derive(Debug, Clone, Default)]
pub struct EventQuery {
  pub person_type:   Option<PersonType>,
  pub person_id:     Option<String>,
  pub direction:     Option<Direction>,
  pub access_method: Option<AccessMethod>,
  /// Inclusive lower bound on `timestamp`.
  pub from:          Option<DateTime<Utc>>,
  /// Inclusive upper bound on `timestamp`.
  pub to:            Option<DateTime<Utc>>,
  /// Substring matched against name, CPF, location and notes.
  pub text:          Option<String>,
  pub limit:         Option<usize>,
  pub offset:        Option<usize>,
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone as _;

  use super::*;

  fn at(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, h, m, 0).unwrap()
  }

  #[test]
  fn next_timestamp_uses_clock_when_it_advanced() {
    assert_eq!(next_timestamp(at(9, 0), Some(at(8, 0))), at(9, 0));
    assert_eq!(next_timestamp(at(9, 0), None), at(9, 0));
  }

  #[test]
  fn next_timestamp_bumps_past_previous_event() {
    let last = at(9, 0);
    assert_eq!(
      next_timestamp(at(9, 0), Some(last)),
      last + Duration::microseconds(1)
    );
    // Clock went backwards.
    assert_eq!(
      next_timestamp(at(8, 30), Some(last)),
      last + Duration::microseconds(1)
    );
  }

  #[test]
  fn next_timestamp_truncates_to_micros() {
    let now = at(9, 0) + Duration::nanoseconds(1_500);
    assert_eq!(next_timestamp(now, None), at(9, 0) + Duration::microseconds(1));
  }

  #[test]
  fn subject_serializes_with_person_type_tag() {
    let event = AccessEvent {
      id:            Uuid::nil(),
      sequence:      1,
      subject:       AccessSubject::Employee {
        employee_id: "E1".into(),
        name:        "Ana".into(),
        cpf:         None,
      },
      direction:     Direction::Entry,
      access_method: AccessMethod::QrCode,
      location:      "Main gate".into(),
      timestamp:     at(8, 0),
      verified_by:   None,
      notes:         None,
    };
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["person_type"], "employee");
    assert_eq!(json["employee_id"], "E1");
    assert_eq!(json["access_method"], "qr_code");

    let back: AccessEvent = serde_json::from_value(json).unwrap();
    assert_eq!(back, event);
  }

  #[test]
  fn subject_accessors() {
    let id = Uuid::new_v4();
    let visitor = AccessSubject::Visitor {
      visitor_id: id,
      name:       "Bia".into(),
      cpf:        "11122233344".into(),
    };
    assert_eq!(visitor.person_type(), PersonType::Visitor);
    assert_eq!(visitor.person_id(), id.to_string());
    assert_eq!(visitor.person_cpf(), Some("11122233344"));

    let vehicle = AccessSubject::Vehicle {
      vehicle_id: "V9".into(),
      plate:      "ABC1D23".into(),
      driver_id:  "D1".into(),
    };
    assert_eq!(vehicle.person_name(), "ABC1D23");
    assert_eq!(vehicle.person_cpf(), None);
  }
}
