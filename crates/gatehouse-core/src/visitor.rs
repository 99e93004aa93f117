//! Visitor — the mutable walk-in visitor aggregate.
//!
//! Distinct from the event log: a visitor row is created on first
//! registration and its counters move forward on every recorded entry. CPF is
//! the natural key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Visitor {
  pub id:           Uuid,
  pub name:         String,
  /// Digits only.
  pub cpf:          String,
  pub photo:        Option<String>,
  pub total_visits: u32,
  pub last_visit:   Option<DateTime<Utc>>,
  /// Soft flag owned by external administration; visitors are never deleted.
  pub is_active:    bool,
  pub created_at:   DateTime<Utc>,
}

/// Input to [`crate::store::AccessStore::insert_visitor_if_absent`].
#[derive(Debug, Clone)]
pub struct NewVisitor {
  pub name:  String,
  /// Digits only; callers normalise with [`crate::cpf::parse`].
  pub cpf:   String,
  pub photo: Option<String>,
}

/// An explicit edit of a visitor's descriptive fields. `None` leaves the
/// field unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VisitorEdit {
  pub name:  Option<String>,
  pub photo: Option<String>,
}

impl VisitorEdit {
  pub fn is_empty(&self) -> bool { self.name.is_none() && self.photo.is_none() }
}
