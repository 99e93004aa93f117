//! The identity directory — read-only lookup of employees, vehicles and
//! drivers owned by the wider operations system.
//!
//! This subsystem never writes directory records. References from events and
//! movement rows into the directory are weak: lookup only.

use std::future::Future;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
  pub id:        String,
  pub name:      String,
  /// Digits only.
  pub cpf:       Option<String>,
  #[serde(default = "default_true")]
  pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vehicle {
  pub id:    String,
  /// Normalised with [`normalize_plate`].
  pub plate: String,
  pub model: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Driver {
  pub id:   String,
  pub name: String,
  pub cpf:  Option<String>,
}

fn default_true() -> bool { true }

/// How to look up an employee.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmployeeKey {
  Id(String),
  /// Digits only.
  Cpf(String),
}

/// How to look up a vehicle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VehicleKey {
  Id(String),
  /// Normalised with [`normalize_plate`].
  Plate(String),
}

/// Upper-case a licence plate and drop separators, so `abc-1d23` and
/// `ABC1D23` compare equal.
pub fn normalize_plate(raw: &str) -> String {
  raw
    .chars()
    .filter(char::is_ascii_alphanumeric)
    .map(|c| c.to_ascii_uppercase())
    .collect()
}

/// Bulk directory contents, used to populate a backend's directory tables.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DirectorySeed {
  #[serde(default)]
  pub employees: Vec<Employee>,
  #[serde(default)]
  pub vehicles:  Vec<Vehicle>,
  #[serde(default)]
  pub drivers:   Vec<Driver>,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over the identity directory collaborator.
///
/// Any error returned here is reported to callers as
/// [`crate::Error::DirectoryUnavailable`]; "no such record" is `Ok(None)`.
pub trait IdentityDirectory: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn lookup_employee(
    &self,
    key: EmployeeKey,
  ) -> impl Future<Output = Result<Option<Employee>, Self::Error>> + Send + '_;

  fn lookup_vehicle(
    &self,
    key: VehicleKey,
  ) -> impl Future<Output = Result<Option<Vehicle>, Self::Error>> + Send + '_;

  fn lookup_driver(
    &self,
    id: String,
  ) -> impl Future<Output = Result<Option<Driver>, Self::Error>> + Send + '_;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn plates_compare_without_separators_or_case() {
    assert_eq!(normalize_plate("abc-1d23"), "ABC1D23");
    assert_eq!(normalize_plate(" ABC 1234 "), "ABC1234");
  }

  #[test]
  fn seed_defaults_missing_sections() {
    let seed: DirectorySeed = serde_json::from_str(
      r#"{"employees":[{"id":"E1","name":"Ana","cpf":null}]}"#,
    )
    .unwrap();
    assert_eq!(seed.employees.len(), 1);
    assert!(seed.employees[0].is_active);
    assert!(seed.vehicles.is_empty());
    assert!(seed.drivers.is_empty());
  }
}
