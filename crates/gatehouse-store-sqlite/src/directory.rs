//! The local identity directory: read-only lookups for the gate, plus bulk
//! seeding from the wider operations system.

use rusqlite::{OptionalExtension as _, TransactionBehavior};

use gatehouse_core::{
  cpf,
  directory::{
    DirectorySeed, Driver, Employee, EmployeeKey, IdentityDirectory, Vehicle, VehicleKey,
    normalize_plate,
  },
};

use crate::{Error, Result, SqliteStore};

/// Row counts written by [`SqliteStore::seed_directory`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedCounts {
  pub employees: usize,
  pub vehicles:  usize,
  pub drivers:   usize,
}

fn employee_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Employee> {
  Ok(Employee {
    id:        row.get(0)?,
    name:      row.get(1)?,
    cpf:       row.get(2)?,
    is_active: row.get(3)?,
  })
}

fn vehicle_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Vehicle> {
  Ok(Vehicle { id: row.get(0)?, plate: row.get(1)?, model: row.get(2)? })
}

fn normalized_cpf(raw: Option<&str>) -> Option<String> {
  raw.map(cpf::normalize).filter(|d| !d.is_empty())
}

impl SqliteStore {
  /// Upsert every record in `seed` in one transaction. CPFs are reduced to
  /// digits and plates normalised on the way in; existing rows with the same
  /// id are overwritten.
  pub async fn seed_directory(&self, seed: DirectorySeed) -> Result<SeedCounts> {
    let counts = SeedCounts {
      employees: seed.employees.len(),
      vehicles:  seed.vehicles.len(),
      drivers:   seed.drivers.len(),
    };

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        for e in &seed.employees {
          tx.execute(
            "INSERT INTO employees (employee_id, name, cpf, is_active)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(employee_id) DO UPDATE SET
               name = excluded.name, cpf = excluded.cpf, is_active = excluded.is_active",
            rusqlite::params![e.id, e.name, normalized_cpf(e.cpf.as_deref()), e.is_active],
          )?;
        }
        for v in &seed.vehicles {
          tx.execute(
            "INSERT INTO vehicles (vehicle_id, plate, model)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(vehicle_id) DO UPDATE SET
               plate = excluded.plate, model = excluded.model",
            rusqlite::params![v.id, normalize_plate(&v.plate), v.model],
          )?;
        }
        for d in &seed.drivers {
          tx.execute(
            "INSERT INTO drivers (driver_id, name, cpf)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(driver_id) DO UPDATE SET
               name = excluded.name, cpf = excluded.cpf",
            rusqlite::params![d.id, d.name, normalized_cpf(d.cpf.as_deref())],
          )?;
        }
        tx.commit()?;
        Ok(())
      })
      .await?;

    Ok(counts)
  }
}

// ─── IdentityDirectory impl ──────────────────────────────────────────────────

impl IdentityDirectory for SqliteStore {
  type Error = Error;

  async fn lookup_employee(&self, key: EmployeeKey) -> Result<Option<Employee>> {
    let (column, value) = match key {
      EmployeeKey::Id(id) => ("employee_id", id),
      EmployeeKey::Cpf(digits) => ("cpf", digits),
    };

    Ok(
      self
        .conn
        .call(move |conn| {
          Ok(
            conn
              .query_row(
                &format!(
                  "SELECT employee_id, name, cpf, is_active FROM employees
                   WHERE {column} = ?1
                   ORDER BY is_active DESC, employee_id LIMIT 1"
                ),
                rusqlite::params![value],
                employee_row,
              )
              .optional()?,
          )
        })
        .await?,
    )
  }

  async fn lookup_vehicle(&self, key: VehicleKey) -> Result<Option<Vehicle>> {
    let (column, value) = match key {
      VehicleKey::Id(id) => ("vehicle_id", id),
      VehicleKey::Plate(plate) => ("plate", normalize_plate(&plate)),
    };

    Ok(
      self
        .conn
        .call(move |conn| {
          Ok(
            conn
              .query_row(
                &format!("SELECT vehicle_id, plate, model FROM vehicles WHERE {column} = ?1"),
                rusqlite::params![value],
                vehicle_row,
              )
              .optional()?,
          )
        })
        .await?,
    )
  }

  async fn lookup_driver(&self, id: String) -> Result<Option<Driver>> {
    Ok(
      self
        .conn
        .call(move |conn| {
          Ok(
            conn
              .query_row(
                "SELECT driver_id, name, cpf FROM drivers WHERE driver_id = ?1",
                rusqlite::params![id],
                |row| Ok(Driver { id: row.get(0)?, name: row.get(1)?, cpf: row.get(2)? }),
              )
              .optional()?,
          )
        })
        .await?,
    )
  }
}
