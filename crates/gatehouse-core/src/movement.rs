//! The vehicle movement state machine.
//!
//! A [`VehicleMovement`] is the live status row of one vehicle. It is
//! overwritten in place, guarded by a version counter: every transition is
//! computed here as a pure function of the current row, and the store only
//! commits it if the row's version is still the one the transition was
//! computed from.
//!
//! ```text
//!  available ──submit──▶ checklist_pending ──approve──▶ checklist_approved
//!      ▲                       │ reject                        │ exit
//!      │                       ▼                               ▼
//!      └───────── return ──────────────────────────────── in_transit
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  event::{AccessEvent, AccessEventDraft},
};

// ─── Status enums ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChecklistStatus {
  #[default]
  None,
  Pending,
  Approved,
}

impl ChecklistStatus {
  pub const ALL: [Self; 3] = [Self::None, Self::Pending, Self::Approved];

  pub fn as_str(self) -> &'static str {
    match self {
      Self::None => "none",
      Self::Pending => "pending",
      Self::Approved => "approved",
    }
  }
}

/// Physical state of a vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleState {
  #[default]
  Available,
  InTransit,
}

impl VehicleState {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Available => "available",
      Self::InTransit => "in_transit",
    }
  }
}

/// The combined lifecycle phase derived from checklist and vehicle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementPhase {
  Available,
  ChecklistPending,
  ChecklistApproved,
  InTransit,
}

impl fmt::Display for MovementPhase {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Self::Available => "available",
      Self::ChecklistPending => "checklist_pending",
      Self::ChecklistApproved => "checklist_approved",
      Self::InTransit => "in_transit",
    })
  }
}

/// Why [`VehicleMovement::authorize_exit`] refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ExitDenial {
  ChecklistNotApproved { checklist_status: ChecklistStatus },
  AlreadyInTransit,
}

impl fmt::Display for ExitDenial {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::ChecklistNotApproved { checklist_status } => {
        write!(f, "checklist is {}, not approved", checklist_status.as_str())
      }
      Self::AlreadyInTransit => f.write_str("vehicle is already in transit"),
    }
  }
}

// ─── VehicleMovement ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleMovement {
  pub vehicle_id:       String,
  pub driver_id:        String,
  pub checklist_id:     Option<String>,
  pub checklist_status: ChecklistStatus,
  pub status:           VehicleState,
  /// Set on exit, cleared on return.
  pub destination:      Option<String>,
  /// Set on return.
  pub origin_base:      Option<String>,
  pub exit_time:        Option<DateTime<Utc>>,
  pub return_time:      Option<DateTime<Utc>>,
  pub checklist_date:   Option<DateTime<Utc>>,
  /// Optimistic-concurrency token. `0` means the row has never been stored.
  pub version:          u64,
  pub updated_at:       DateTime<Utc>,
}

impl VehicleMovement {
  /// A row that has never been persisted.
  pub fn fresh(
    vehicle_id: impl Into<String>,
    driver_id: impl Into<String>,
    at: DateTime<Utc>,
  ) -> Self {
    Self {
      vehicle_id:       vehicle_id.into(),
      driver_id:        driver_id.into(),
      checklist_id:     None,
      checklist_status: ChecklistStatus::None,
      status:           VehicleState::Available,
      destination:      None,
      origin_base:      None,
      exit_time:        None,
      return_time:      None,
      checklist_date:   None,
      version:          0,
      updated_at:       at,
    }
  }

  pub fn phase(&self) -> MovementPhase {
    match (self.status, self.checklist_status) {
      (VehicleState::InTransit, _) => MovementPhase::InTransit,
      (VehicleState::Available, ChecklistStatus::None) => MovementPhase::Available,
      (VehicleState::Available, ChecklistStatus::Pending) => {
        MovementPhase::ChecklistPending
      }
      (VehicleState::Available, ChecklistStatus::Approved) => {
        MovementPhase::ChecklistApproved
      }
    }
  }

  pub fn is_ready_for_exit(&self) -> bool {
    self.phase() == MovementPhase::ChecklistApproved
  }

  fn invalid(&self, action: &'static str) -> Error {
    Error::InvalidTransition {
      vehicle_id: self.vehicle_id.clone(),
      phase: self.phase(),
      action,
    }
  }

  // ── Transitions ───────────────────────────────────────────────────────
  //
  // Each returns the next row with the same `version`; the store bumps it
  // on commit.

  /// A driver submits a pre-exit checklist. Resubmitting replaces a pending
  /// or approved checklist and requires fresh approval.
  pub fn submit_checklist(
    &self,
    driver_id: &str,
    checklist_id: &str,
    at: DateTime<Utc>,
  ) -> Result<Self> {
    if self.status == VehicleState::InTransit {
      return Err(self.invalid("submit a checklist for"));
    }
    Ok(Self {
      driver_id: driver_id.to_owned(),
      checklist_id: Some(checklist_id.to_owned()),
      checklist_status: ChecklistStatus::Pending,
      checklist_date: Some(at),
      updated_at: at,
      ..self.clone()
    })
  }

  fn require_pending(&self, checklist_id: &str, action: &'static str) -> Result<()> {
    if self.phase() != MovementPhase::ChecklistPending {
      return Err(self.invalid(action));
    }
    if self.checklist_id.as_deref() != Some(checklist_id) {
      return Err(Error::ChecklistMismatch {
        vehicle_id: self.vehicle_id.clone(),
        expected:   self.checklist_id.clone(),
        got:        checklist_id.to_owned(),
      });
    }
    Ok(())
  }

  pub fn approve_checklist(&self, checklist_id: &str, at: DateTime<Utc>) -> Result<Self> {
    self.require_pending(checklist_id, "approve the checklist of")?;
    Ok(Self {
      checklist_status: ChecklistStatus::Approved,
      updated_at: at,
      ..self.clone()
    })
  }

  pub fn reject_checklist(&self, checklist_id: &str, at: DateTime<Utc>) -> Result<Self> {
    self.require_pending(checklist_id, "reject the checklist of")?;
    Ok(Self {
      checklist_id: None,
      checklist_status: ChecklistStatus::None,
      updated_at: at,
      ..self.clone()
    })
  }

  /// The single gate that keeps an unchecked vehicle on site.
  pub fn authorize_exit(
    &self,
    driver_id: &str,
    destination: &str,
    at: DateTime<Utc>,
  ) -> Result<Self> {
    let denial = match (self.status, self.checklist_status) {
      (VehicleState::InTransit, _) => Some(ExitDenial::AlreadyInTransit),
      (VehicleState::Available, ChecklistStatus::Approved) => None,
      (VehicleState::Available, checklist_status) => {
        Some(ExitDenial::ChecklistNotApproved { checklist_status })
      }
    };
    if let Some(reason) = denial {
      return Err(Error::ExitNotAuthorized {
        vehicle_id: self.vehicle_id.clone(),
        reason,
      });
    }
    Ok(Self {
      driver_id: driver_id.to_owned(),
      status: VehicleState::InTransit,
      destination: Some(destination.to_owned()),
      exit_time: Some(at),
      updated_at: at,
      ..self.clone()
    })
  }

  /// Return requires the vehicle to be in transit with the same driver. The
  /// checklist is consumed: the next exit needs a fresh one.
  pub fn register_return(
    &self,
    driver_id: &str,
    origin_base: &str,
    at: DateTime<Utc>,
  ) -> Result<Self> {
    if self.status != VehicleState::InTransit || self.driver_id != driver_id {
      return Err(Error::NotInTransit {
        vehicle_id: self.vehicle_id.clone(),
        driver_id:  driver_id.to_owned(),
      });
    }
    Ok(Self {
      status: VehicleState::Available,
      destination: None,
      origin_base: Some(origin_base.to_owned()),
      checklist_id: None,
      checklist_status: ChecklistStatus::None,
      return_time: Some(at),
      updated_at: at,
      ..self.clone()
    })
  }
}

// ─── Commit protocol ─────────────────────────────────────────────────────────

/// A transition ready to be committed atomically, optionally together with
/// the access event it produces.
#[derive(Debug, Clone)]
pub struct MovementCommit {
  /// Version the transition was computed from; `0` inserts a new row.
  pub expected_version: u64,
  pub next:             VehicleMovement,
  pub event:            Option<AccessEventDraft>,
}

/// The committed row and the event appended with it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovementRecord {
  pub movement: VehicleMovement,
  pub event:    Option<AccessEvent>,
}

#[derive(Debug, Clone)]
pub enum CommitOutcome {
  Committed(MovementRecord),
  /// The row changed since it was read; nothing was written.
  Stale,
}

/// Parameters for [`crate::store::AccessStore::list_movements`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MovementFilter {
  pub status:           Option<VehicleState>,
  pub checklist_status: Option<ChecklistStatus>,
}

impl MovementFilter {
  pub fn ready_for_exit() -> Self {
    Self {
      status:           Some(VehicleState::Available),
      checklist_status: Some(ChecklistStatus::Approved),
    }
  }

  pub fn in_transit() -> Self {
    Self { status: Some(VehicleState::InTransit), checklist_status: None }
  }
}
