//! Error types for `gatehouse-core`.
//!
//! Every failure belongs to one [`ErrorClass`]. Callers use the class to tell
//! an operator "denied" apart from "unavailable", since the right response to
//! each differs.

use std::error::Error as StdError;

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::{
  event::Direction,
  movement::{ExitDenial, MovementPhase},
};

#[derive(Debug, Error)]
pub enum Error {
  // ── Not found ─────────────────────────────────────────────────────────
  #[error("credential token is empty")]
  EmptyCredential,

  #[error("credential does not match any known identity")]
  CredentialNotFound,

  #[error("employee not found: {0}")]
  EmployeeNotFound(String),

  #[error("visitor not found: {0}")]
  VisitorNotFound(String),

  #[error("vehicle not found: {0}")]
  VehicleNotFound(String),

  #[error("driver not found: {0}")]
  DriverNotFound(String),

  #[error("no movement record for vehicle {0}")]
  MovementNotFound(String),

  // ── Precondition violations ───────────────────────────────────────────
  #[error("visitor {0} is inactive")]
  VisitorInactive(Uuid),

  #[error("exit not authorized for vehicle {vehicle_id}: {reason}")]
  ExitNotAuthorized {
    vehicle_id: String,
    reason:     ExitDenial,
  },

  #[error("vehicle {vehicle_id} is not in transit with driver {driver_id}")]
  NotInTransit {
    vehicle_id: String,
    driver_id:  String,
  },

  #[error("cannot {action} vehicle {vehicle_id} while {phase}")]
  InvalidTransition {
    vehicle_id: String,
    phase:      MovementPhase,
    action:     &'static str,
  },

  #[error("checklist {got} does not match pending checklist {expected:?} for vehicle {vehicle_id}")]
  ChecklistMismatch {
    vehicle_id: String,
    expected:   Option<String>,
    got:        String,
  },

  #[error("{person_id} already has a recorded {direction}")]
  DuplicateDirection {
    person_id: String,
    direction: Direction,
  },

  // ── Conflict ──────────────────────────────────────────────────────────
  #[error("vehicle {vehicle_id} was modified concurrently; re-read and retry")]
  Conflict { vehicle_id: String },

  // ── Invalid input ─────────────────────────────────────────────────────
  #[error("invalid CPF: {0:?}")]
  InvalidCpf(String),

  #[error("invalid input: {0}")]
  InvalidInput(String),

  // ── Cancellation ──────────────────────────────────────────────────────
  #[error("scan cancelled before the credential was resolved")]
  Cancelled,

  // ── Collaborators ─────────────────────────────────────────────────────
  #[error("identity directory unavailable: {0}")]
  DirectoryUnavailable(#[source] Box<dyn StdError + Send + Sync>),

  #[error("storage unavailable: {0}")]
  StorageUnavailable(#[source] Box<dyn StdError + Send + Sync>),
}

/// Coarse grouping of [`Error`] used by calling surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
  /// Unknown identity or violated precondition; the operator should refuse
  /// passage.
  Denied,
  /// Lost an optimistic-concurrency race; re-read state and retry.
  Conflict,
  /// Malformed request.
  Invalid,
  /// The operator cancelled the request.
  Cancelled,
  /// Infrastructure failure; nothing was committed.
  Unavailable,
}

impl Error {
  pub fn class(&self) -> ErrorClass {
    match self {
      Self::EmptyCredential | Self::InvalidCpf(_) | Self::InvalidInput(_) => {
        ErrorClass::Invalid
      }
      Self::Conflict { .. } => ErrorClass::Conflict,
      Self::Cancelled => ErrorClass::Cancelled,
      Self::DirectoryUnavailable(_) | Self::StorageUnavailable(_) => {
        ErrorClass::Unavailable
      }
      _ => ErrorClass::Denied,
    }
  }

  /// `true` for the denial variants that mean "no such identity or record".
  pub fn is_not_found(&self) -> bool {
    matches!(
      self,
      Self::CredentialNotFound
        | Self::EmployeeNotFound(_)
        | Self::VisitorNotFound(_)
        | Self::VehicleNotFound(_)
        | Self::DriverNotFound(_)
        | Self::MovementNotFound(_)
    )
  }

  pub(crate) fn storage<E>(e: E) -> Self
  where
    E: StdError + Send + Sync + 'static,
  {
    Self::StorageUnavailable(Box::new(e))
  }

  pub(crate) fn directory<E>(e: E) -> Self
  where
    E: StdError + Send + Sync + 'static,
  {
    Self::DirectoryUnavailable(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn classes_separate_denied_from_unavailable() {
    assert_eq!(Error::CredentialNotFound.class(), ErrorClass::Denied);
    assert_eq!(
      Error::NotInTransit {
        vehicle_id: "v1".into(),
        driver_id:  "d1".into(),
      }
      .class(),
      ErrorClass::Denied
    );
    assert_eq!(
      Error::storage(std::io::Error::other("disk gone")).class(),
      ErrorClass::Unavailable
    );
    assert_eq!(
      Error::Conflict { vehicle_id: "v1".into() }.class(),
      ErrorClass::Conflict
    );
  }

  #[test]
  fn not_found_is_a_subset_of_denied() {
    let err = Error::VehicleNotFound("ABC1D23".into());
    assert!(err.is_not_found());
    assert_eq!(err.class(), ErrorClass::Denied);
    assert!(!Error::VisitorInactive(Uuid::nil()).is_not_found());
  }
}
