//! Credential resolution and scan sessions.
//!
//! A credential is the opaque string produced by a QR decode or typed by an
//! operator. [`CredentialResolver`] maps it to an employee in the identity
//! directory. [`ScanSession`] wraps a single resolution so the operator can
//! cancel it: once cancelled, a resolution that completes late is discarded
//! and can never lead to an access event.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::{
  Error, Result, cpf,
  directory::{EmployeeKey, IdentityDirectory},
  event::{AccessSubject, PersonType},
};

/// A credential resolved to a directory identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedCredential {
  pub person_type: PersonType,
  pub person_id:   String,
  pub person_name: String,
  pub person_cpf:  Option<String>,
}

impl ResolvedCredential {
  /// The event subject snapshot for this identity.
  pub fn into_subject(self) -> AccessSubject {
    AccessSubject::Employee {
      employee_id: self.person_id,
      name:        self.person_name,
      cpf:         self.person_cpf,
    }
  }
}

// ─── Resolver ────────────────────────────────────────────────────────────────

/// Resolves tokens against the employee directory.
///
/// A token is either `<prefix><identifier>` (e.g. `EMP-1042`) or a bare
/// identifier. The identifier is looked up as an employee id; if that misses
/// and the identifier is written like a CPF, it is looked up by CPF. There is
/// no fuzzy fallback. Inactive employees do not resolve.
pub struct CredentialResolver<D> {
  directory: Arc<D>,
  prefix:    String,
}

impl<D> Clone for CredentialResolver<D> {
  fn clone(&self) -> Self {
    Self { directory: Arc::clone(&self.directory), prefix: self.prefix.clone() }
  }
}

impl<D: IdentityDirectory> CredentialResolver<D> {
  pub fn new(directory: Arc<D>, prefix: impl Into<String>) -> Self {
    Self { directory, prefix: prefix.into() }
  }

  fn identifier<'t>(&self, token: &'t str) -> Result<&'t str> {
    let trimmed = token.trim();
    let id = if self.prefix.is_empty() {
      trimmed
    } else {
      trimmed.strip_prefix(self.prefix.as_str()).unwrap_or(trimmed).trim()
    };
    if id.is_empty() {
      return Err(Error::EmptyCredential);
    }
    Ok(id)
  }

  /// Pure read; never writes anything.
  pub async fn resolve(&self, token: &str) -> Result<ResolvedCredential> {
    let id = self.identifier(token)?;

    let mut found = self
      .directory
      .lookup_employee(EmployeeKey::Id(id.to_owned()))
      .await
      .map_err(Error::directory)?;

    if found.is_none() && cpf::looks_like_cpf(id) {
      found = self
        .directory
        .lookup_employee(EmployeeKey::Cpf(cpf::normalize(id)))
        .await
        .map_err(Error::directory)?;
    }

    let employee = found
      .filter(|e| e.is_active)
      .ok_or(Error::CredentialNotFound)?;

    Ok(ResolvedCredential {
      person_type: PersonType::Employee,
      person_id:   employee.id,
      person_name: employee.name,
      person_cpf:  employee.cpf,
    })
  }
}

// ─── Scan sessions ───────────────────────────────────────────────────────────

/// Create a scan session and the handle that cancels it.
pub fn scan_session() -> (ScanSession, ScanCancelHandle) {
  let (tx, rx) = watch::channel(false);
  (ScanSession { cancelled: rx }, ScanCancelHandle { tx: Arc::new(tx) })
}

/// One operator scan. Owns its own lifecycle, independent of any in-flight
/// directory call.
#[derive(Debug)]
pub struct ScanSession {
  cancelled: watch::Receiver<bool>,
}

/// Cancels the paired [`ScanSession`]. Dropping the handle does not cancel.
#[derive(Debug, Clone)]
pub struct ScanCancelHandle {
  tx: Arc<watch::Sender<bool>>,
}

impl ScanCancelHandle {
  pub fn cancel(&self) { self.tx.send_replace(true); }

  pub fn is_cancelled(&self) -> bool { *self.tx.borrow() }
}

impl ScanSession {
  pub fn is_cancelled(&self) -> bool { *self.cancelled.borrow() }

  /// Fails with [`Error::Cancelled`] if the session has been cancelled.
  pub fn ensure_active(&self) -> Result<()> {
    if self.is_cancelled() { Err(Error::Cancelled) } else { Ok(()) }
  }

  /// Resolve `token`, racing the directory lookup against cancellation.
  /// A result that arrives after cancellation is dropped.
  pub async fn resolve<D: IdentityDirectory>(
    &self,
    resolver: &CredentialResolver<D>,
    token: &str,
  ) -> Result<ResolvedCredential> {
    self.ensure_active()?;
    let mut rx = self.cancelled.clone();
    let outcome = tokio::select! {
      biased;
      () = wait_cancelled(&mut rx) => return Err(Error::Cancelled),
      r = resolver.resolve(token) => r,
    };
    self.ensure_active()?;
    outcome
  }
}

async fn wait_cancelled(rx: &mut watch::Receiver<bool>) {
  if rx.wait_for(|c| *c).await.is_err() {
    // Handle dropped without cancelling: never fires.
    std::future::pending::<()>().await;
  }
}

#[cfg(test)]
mod tests {
  use std::{collections::HashMap, convert::Infallible, time::Duration};

  use tokio::sync::Notify;

  use super::*;
  use crate::directory::{Driver, Employee, Vehicle, VehicleKey};

  #[derive(Default)]
  struct FakeDirectory {
    employees: HashMap<String, Employee>,
    /// When set, employee lookups wait for a notification.
    gate:      Option<Arc<Notify>>,
  }

  impl FakeDirectory {
    fn with(employees: Vec<Employee>) -> Self {
      Self {
        employees: employees.into_iter().map(|e| (e.id.clone(), e)).collect(),
        gate:      None,
      }
    }
  }

  impl IdentityDirectory for FakeDirectory {
    type Error = Infallible;

    async fn lookup_employee(
      &self,
      key: EmployeeKey,
    ) -> Result<Option<Employee>, Infallible> {
      if let Some(gate) = &self.gate {
        gate.notified().await;
      }
      Ok(match key {
        EmployeeKey::Id(id) => self.employees.get(&id).cloned(),
        EmployeeKey::Cpf(c) => self
          .employees
          .values()
          .find(|e| e.cpf.as_deref() == Some(c.as_str()))
          .cloned(),
      })
    }

    async fn lookup_vehicle(&self, _: VehicleKey) -> Result<Option<Vehicle>, Infallible> {
      Ok(None)
    }

    async fn lookup_driver(&self, _: String) -> Result<Option<Driver>, Infallible> {
      Ok(None)
    }
  }

  fn ana() -> Employee {
    Employee {
      id:        "1042".into(),
      name:      "Ana Souza".into(),
      cpf:       Some("11122233344".into()),
      is_active: true,
    }
  }

  fn resolver(dir: FakeDirectory) -> CredentialResolver<FakeDirectory> {
    CredentialResolver::new(Arc::new(dir), "EMP-")
  }

  #[tokio::test]
  async fn resolves_prefixed_and_bare_ids() {
    let r = resolver(FakeDirectory::with(vec![ana()]));
    let a = r.resolve("EMP-1042").await.unwrap();
    assert_eq!(a.person_id, "1042");
    assert_eq!(a.person_type, PersonType::Employee);
    assert_eq!(a.person_name, "Ana Souza");

    let b = r.resolve("  1042 \n").await.unwrap();
    assert_eq!(a, b);
  }

  #[tokio::test]
  async fn falls_back_to_cpf_only_for_cpf_shaped_tokens() {
    let r = resolver(FakeDirectory::with(vec![ana()]));
    let found = r.resolve("111.222.333-44").await.unwrap();
    assert_eq!(found.person_id, "1042");

    let err = r.resolve("EMP-999").await.unwrap_err();
    assert!(matches!(err, Error::CredentialNotFound));
  }

  #[tokio::test]
  async fn empty_tokens_are_rejected() {
    let r = resolver(FakeDirectory::default());
    assert!(matches!(r.resolve("   ").await, Err(Error::EmptyCredential)));
    assert!(matches!(r.resolve("EMP-").await, Err(Error::EmptyCredential)));
  }

  #[tokio::test]
  async fn inactive_employees_do_not_resolve() {
    let mut inactive = ana();
    inactive.is_active = false;
    let r = resolver(FakeDirectory::with(vec![inactive]));
    assert!(matches!(r.resolve("EMP-1042").await, Err(Error::CredentialNotFound)));
  }

  #[tokio::test]
  async fn session_cancelled_before_start_does_not_resolve() {
    let r = resolver(FakeDirectory::with(vec![ana()]));
    let (session, handle) = scan_session();
    handle.cancel();
    assert!(matches!(session.resolve(&r, "EMP-1042").await, Err(Error::Cancelled)));
  }

  #[tokio::test]
  async fn session_cancelled_mid_flight_discards_result() {
    let gate = Arc::new(Notify::new());
    let mut dir = FakeDirectory::with(vec![ana()]);
    dir.gate = Some(Arc::clone(&gate));
    let r = resolver(dir);

    let (session, handle) = scan_session();
    let resolving = tokio::spawn(async move {
      let out = session.resolve(&r, "EMP-1042").await;
      (out, session.is_cancelled())
    });

    tokio::time::sleep(Duration::from_millis(10)).await;
    handle.cancel();
    gate.notify_waiters();

    let (out, cancelled) = resolving.await.unwrap();
    assert!(matches!(out, Err(Error::Cancelled)));
    assert!(cancelled);
  }

  #[tokio::test]
  async fn dropping_the_handle_does_not_cancel() {
    let r = resolver(FakeDirectory::with(vec![ana()]));
    let (session, handle) = scan_session();
    drop(handle);
    let found = session.resolve(&r, "EMP-1042").await.unwrap();
    assert_eq!(found.person_id, "1042");
    assert!(session.ensure_active().is_ok());
  }
}
