//! End-to-end tests of `GateService` over an in-memory `SqliteStore`.

use std::sync::Arc;

use chrono::{Duration, TimeZone as _, Utc};
use gatehouse_core::{
  Error as CoreError,
  credential::scan_session,
  directory::{DirectorySeed, Driver, Employee, Vehicle},
  event::{AccessEventDraft, AccessSubject, Direction, EventQuery, PersonType},
  movement::{ChecklistStatus, ExitDenial, VehicleState},
  service::{AccessRequest, DirectionPolicy, GateConfig, GateService},
  store::AccessStore,
};
use uuid::Uuid;

use crate::SqliteStore;

type Service = GateService<SqliteStore, SqliteStore>;

async fn service_with(config: GateConfig) -> (Service, Arc<SqliteStore>) {
  let store = Arc::new(SqliteStore::open_in_memory().await.expect("in-memory store"));
  store
    .seed_directory(DirectorySeed {
      employees: vec![
        Employee { id: "E1".into(), name: "Ana".into(), cpf: Some("52998224725".into()), is_active: true },
        Employee { id: "E2".into(), name: "Bruno".into(), cpf: None, is_active: false },
      ],
      vehicles:  vec![
        Vehicle { id: "V1".into(), plate: "ABC1D23".into(), model: None },
        Vehicle { id: "V2".into(), plate: "XYZ9K88".into(), model: None },
      ],
      drivers:   vec![
        Driver { id: "D1".into(), name: "Davi".into(), cpf: None },
        Driver { id: "D2".into(), name: "Elisa".into(), cpf: None },
      ],
    })
    .await
    .expect("seed");
  (GateService::new(Arc::clone(&store), Arc::clone(&store), config), store)
}

async fn service() -> Service { service_with(GateConfig::default()).await.0 }

fn entry() -> AccessRequest { AccessRequest::new(Direction::Entry) }

fn exit() -> AccessRequest { AccessRequest::new(Direction::Exit) }

async fn approved(svc: &Service, vehicle: &str, checklist: &str) {
  svc.submit_checklist(vehicle, "D1", checklist).await.unwrap();
  svc.approve_checklist(vehicle, checklist).await.unwrap();
}

// ─── Credentials ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn credential_resolves_by_prefix_id_and_cpf() {
  let svc = service().await;
  assert_eq!(svc.resolve_credential("EMP-E1").await.unwrap().person_id, "E1");
  assert_eq!(svc.resolve_credential(" E1 ").await.unwrap().person_id, "E1");
  assert_eq!(svc.resolve_credential("529.982.247-25").await.unwrap().person_id, "E1");

  assert!(matches!(svc.resolve_credential("EMP-").await, Err(CoreError::EmptyCredential)));
  assert!(matches!(svc.resolve_credential("E2").await, Err(CoreError::CredentialNotFound)));
  assert!(matches!(svc.resolve_credential("nobody").await, Err(CoreError::CredentialNotFound)));
}

#[tokio::test]
async fn scan_records_employee_access() {
  let svc = service().await;
  let (session, _handle) = scan_session();
  let event = svc.scan_access(&session, "EMP-E1", entry()).await.unwrap();
  assert_eq!(event.subject.person_id(), "E1");
  assert_eq!(event.location, "Main gate");
}

#[tokio::test]
async fn cancelled_scan_writes_nothing() {
  let svc = service().await;
  let (session, handle) = scan_session();
  handle.cancel();

  let err = svc.scan_access(&session, "EMP-E1", entry()).await.unwrap_err();
  assert!(matches!(err, CoreError::Cancelled));
  assert!(svc.query_access_log(EventQuery::default()).await.unwrap().is_empty());
}

#[tokio::test]
async fn racing_cancel_agrees_with_the_log() {
  for _ in 0..20 {
    let svc = service().await;
    let (session, handle) = scan_session();
    let (outcome, ()) = tokio::join!(svc.scan_access(&session, "EMP-E1", entry()), async {
      tokio::task::yield_now().await;
      handle.cancel();
    });

    let log = svc.query_access_log(EventQuery::default()).await.unwrap();
    match outcome {
      Ok(event) => {
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].id, event.id);
      }
      Err(CoreError::Cancelled) => assert!(log.is_empty()),
      Err(other) => panic!("unexpected error: {other}"),
    }
  }
}

#[tokio::test]
async fn cancel_after_commit_leaves_the_event() {
  let svc = service().await;
  let (session, handle) = scan_session();
  let event = svc.scan_access(&session, "EMP-E1", entry()).await.unwrap();
  handle.cancel();

  let log = svc.query_access_log(EventQuery::default()).await.unwrap();
  assert_eq!(log.len(), 1);
  assert_eq!(log[0].id, event.id);
}

#[tokio::test]
async fn unresolved_scan_writes_nothing() {
  let svc = service().await;
  let (session, _handle) = scan_session();
  assert!(svc.scan_access(&session, "EMP-nobody", entry()).await.is_err());
  assert!(svc.query_access_log(EventQuery::default()).await.unwrap().is_empty());
}

// ─── Employees ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn inactive_or_unknown_employee_is_denied() {
  let svc = service().await;
  let err = svc.record_employee_access("E2", entry()).await.unwrap_err();
  assert!(matches!(err, CoreError::EmployeeNotFound(_)));
  let err = svc.record_employee_access("E9", entry()).await.unwrap_err();
  assert!(err.is_not_found());
}

#[tokio::test]
async fn direction_policy_warn_allows_repeats() {
  let svc = service().await;
  svc.record_employee_access("E1", entry()).await.unwrap();
  svc.record_employee_access("E1", entry()).await.unwrap();
  let q = EventQuery { person_id: Some("E1".into()), ..Default::default() };
  assert_eq!(svc.query_access_log(q).await.unwrap().len(), 2);
}

#[tokio::test]
async fn direction_policy_reject_refuses_repeats() {
  let config = GateConfig { direction_policy: DirectionPolicy::Reject, ..Default::default() };
  let (svc, _) = service_with(config).await;

  svc.record_employee_access("E1", entry()).await.unwrap();
  let err = svc.record_employee_access("E1", entry()).await.unwrap_err();
  assert!(matches!(
    err,
    CoreError::DuplicateDirection { direction: Direction::Entry, .. }
  ));
  svc.record_employee_access("E1", exit()).await.unwrap();
}

// ─── Visitors ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn returning_visitor_counts_visits_on_one_row() {
  let svc = service().await;

  let (v, created) = svc.register_visitor("Carla", "111.222.333-44", None).await.unwrap();
  assert!(created);
  assert_eq!(v.cpf, "11122233344");
  let first = svc.record_visitor_access(v.id, entry()).await.unwrap();
  let after_first = first.visitor.unwrap();
  assert_eq!(after_first.total_visits, 1);
  svc.record_visitor_access(v.id, exit()).await.unwrap();

  let (again, created) = svc.register_visitor("Carla", "11122233344", None).await.unwrap();
  assert!(!created);
  assert_eq!(again.id, v.id);
  let second = svc.record_visitor_access(v.id, entry()).await.unwrap();
  let after_second = second.visitor.unwrap();
  assert_eq!(after_second.total_visits, 2);
  assert!(after_second.last_visit > after_first.last_visit);

  assert_eq!(svc.find_visitor_by_cpf("111.222.333-44").await.unwrap().id, v.id);
}

#[tokio::test]
async fn visitor_registration_validates_input() {
  let svc = service().await;
  assert!(matches!(
    svc.register_visitor("Carla", "123", None).await,
    Err(CoreError::InvalidCpf(_))
  ));
  assert!(matches!(
    svc.register_visitor("  ", "11122233344", None).await,
    Err(CoreError::InvalidInput(_))
  ));
}

#[tokio::test]
async fn inactive_visitor_cannot_enter_but_can_leave() {
  let svc = service().await;
  let (v, _) = svc.register_visitor("Carla", "11122233344", None).await.unwrap();
  svc.record_visitor_access(v.id, entry()).await.unwrap();
  svc.set_visitor_active(v.id, false).await.unwrap();

  svc.record_visitor_access(v.id, exit()).await.unwrap();
  let err = svc.record_visitor_access(v.id, entry()).await.unwrap_err();
  assert!(matches!(err, CoreError::VisitorInactive(id) if id == v.id));
  assert_eq!(svc.get_visitor(v.id).await.unwrap().total_visits, 1);
}

#[tokio::test]
async fn unknown_visitor_is_not_found() {
  let svc = service().await;
  let err = svc.record_visitor_access(Uuid::new_v4(), entry()).await.unwrap_err();
  assert!(matches!(err, CoreError::VisitorNotFound(_)));
}

// ─── Vehicles ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn exit_refused_for_every_unapproved_checklist_state() {
  let svc = service().await;

  // No movement row yet.
  let err = svc.authorize_vehicle_exit("V1", "D1", "Port", None).await.unwrap_err();
  assert!(matches!(
    err,
    CoreError::ExitNotAuthorized {
      reason: ExitDenial::ChecklistNotApproved { checklist_status: ChecklistStatus::None },
      ..
    }
  ));

  // Pending: the row is left as it was.
  svc.submit_checklist("V1", "D1", "CL-1").await.unwrap();
  let before = svc.get_movement("V1").await.unwrap();
  let err = svc.authorize_vehicle_exit("V1", "D1", "Port", None).await.unwrap_err();
  assert!(matches!(
    err,
    CoreError::ExitNotAuthorized {
      reason: ExitDenial::ChecklistNotApproved { checklist_status: ChecklistStatus::Pending },
      ..
    }
  ));
  assert_eq!(svc.get_movement("V1").await.unwrap(), before);

  // Rejected goes back to none.
  svc.reject_checklist("V1", "CL-1").await.unwrap();
  assert!(svc.authorize_vehicle_exit("V1", "D1", "Port", None).await.is_err());

  let q = EventQuery { person_type: Some(PersonType::Vehicle), ..Default::default() };
  assert!(svc.query_access_log(q).await.unwrap().is_empty());
}

#[tokio::test]
async fn approved_vehicle_exits_once_until_return() {
  let svc = service().await;
  approved(&svc, "V1", "CL-1").await;
  assert_eq!(svc.list_ready_for_exit().await.unwrap().len(), 1);

  let out = svc.authorize_vehicle_exit("abc-1d23", "D1", "Port", None).await.unwrap();
  assert_eq!(out.movement.status, VehicleState::InTransit);
  assert_eq!(out.movement.destination.as_deref(), Some("Port"));
  let event = out.event.unwrap();
  assert_eq!(event.direction, Direction::Exit);
  assert_eq!(event.subject.person_name(), "ABC1D23");

  let err = svc.authorize_vehicle_exit("V1", "D1", "Port", None).await.unwrap_err();
  assert!(matches!(
    err,
    CoreError::ExitNotAuthorized { reason: ExitDenial::AlreadyInTransit, .. }
  ));
  assert_eq!(svc.list_in_transit().await.unwrap().len(), 1);
  assert!(svc.list_ready_for_exit().await.unwrap().is_empty());
}

#[tokio::test]
async fn racing_exits_have_one_winner() {
  let svc = service().await;
  approved(&svc, "V1", "CL-1").await;

  let (a, b) = tokio::join!(
    svc.authorize_vehicle_exit("V1", "D1", "Port", None),
    svc.authorize_vehicle_exit("V1", "D2", "Depot", None),
  );
  let outcomes = [a, b];
  assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
  for err in outcomes.iter().filter_map(|r| r.as_ref().err()) {
    assert!(matches!(
      err,
      CoreError::Conflict { .. } | CoreError::ExitNotAuthorized { .. }
    ));
  }

  let q = EventQuery { person_type: Some(PersonType::Vehicle), ..Default::default() };
  assert_eq!(svc.query_access_log(q).await.unwrap().len(), 1);
}

#[tokio::test]
async fn return_requires_transit_with_same_driver() {
  let svc = service().await;
  let err = svc.register_vehicle_return("V1", "D1", "Base", None).await.unwrap_err();
  assert!(matches!(err, CoreError::NotInTransit { .. }));

  approved(&svc, "V1", "CL-1").await;
  let err = svc.register_vehicle_return("V1", "D1", "Base", None).await.unwrap_err();
  assert!(matches!(err, CoreError::NotInTransit { .. }));

  svc.authorize_vehicle_exit("V1", "D1", "Port", None).await.unwrap();
  let err = svc.register_vehicle_return("V1", "D2", "Base", None).await.unwrap_err();
  assert!(matches!(err, CoreError::NotInTransit { .. }));

  let back = svc.register_vehicle_return("V1", "D1", "Base", None).await.unwrap();
  assert_eq!(back.movement.status, VehicleState::Available);
  assert_eq!(back.movement.checklist_status, ChecklistStatus::None);
  assert_eq!(back.movement.origin_base.as_deref(), Some("Base"));
  assert_eq!(back.event.unwrap().direction, Direction::Entry);

  // The checklist was consumed.
  assert!(svc.authorize_vehicle_exit("V1", "D1", "Port", None).await.is_err());
}

#[tokio::test]
async fn checklist_approval_needs_matching_id() {
  let svc = service().await;
  svc.submit_checklist("V1", "D1", "CL-1").await.unwrap();
  let err = svc.approve_checklist("V1", "CL-2").await.unwrap_err();
  assert!(matches!(err, CoreError::ChecklistMismatch { .. }));

  svc.approve_checklist("V1", "CL-1").await.unwrap();
  let err = svc.approve_checklist("V1", "CL-1").await.unwrap_err();
  assert!(matches!(err, CoreError::InvalidTransition { .. }));
}

#[tokio::test]
async fn unknown_vehicle_or_driver_is_denied() {
  let svc = service().await;
  let err = svc.submit_checklist("V9", "D1", "CL-1").await.unwrap_err();
  assert!(matches!(err, CoreError::VehicleNotFound(_)));
  let err = svc.submit_checklist("V1", "D9", "CL-1").await.unwrap_err();
  assert!(matches!(err, CoreError::DriverNotFound(_)));
  let err = svc.get_movement("V2").await.unwrap_err();
  assert!(matches!(err, CoreError::MovementNotFound(_)));
}

// ─── Log and occupancy ───────────────────────────────────────────────────────

#[tokio::test]
async fn query_rejects_inverted_range_and_applies_default_limit() {
  let config = GateConfig { default_query_limit: 3, ..Default::default() };
  let (svc, _) = service_with(config).await;
  for _ in 0..5 {
    svc.record_employee_access("E1", entry()).await.unwrap();
  }
  assert_eq!(svc.query_access_log(EventQuery::default()).await.unwrap().len(), 3);

  let now = Utc::now();
  let inverted = EventQuery { from: Some(now), to: Some(now - Duration::hours(1)), ..Default::default() };
  assert!(matches!(
    svc.query_access_log(inverted).await,
    Err(CoreError::InvalidInput(_))
  ));
}

#[tokio::test]
async fn occupancy_reflects_latest_event_per_person() {
  let svc = service().await;
  let (v, _) = svc.register_visitor("Carla", "11122233344", None).await.unwrap();

  svc.record_employee_access("E1", entry()).await.unwrap();
  svc.record_visitor_access(v.id, entry()).await.unwrap();
  svc.record_visitor_access(v.id, exit()).await.unwrap();
  approved(&svc, "V1", "CL-1").await;
  svc.authorize_vehicle_exit("V1", "D1", "Port", None).await.unwrap();

  let snap = svc.occupancy_snapshot(svc.site_today(), None).await.unwrap();
  assert_eq!(snap.counts.employees, 1);
  assert_eq!(snap.counts.visitors, 0);
  assert_eq!(snap.counts.vehicles_in_transit, 1);
  assert_eq!(snap.employees_inside[0].person_id, "E1");
  assert!(snap.unmatched_exits.is_empty());
}

#[tokio::test]
async fn occupancy_for_another_day_is_empty() {
  let svc = service().await;
  svc.record_employee_access("E1", entry()).await.unwrap();

  let yesterday = svc.site_today() - Duration::days(1);
  let snap = svc.occupancy_snapshot(yesterday, None).await.unwrap();
  assert_eq!(snap.counts.employees, 0);
}

#[tokio::test]
async fn occupancy_cutoff_excludes_later_events() {
  let (svc, store) = service_with(GateConfig::default()).await;
  let subject = AccessSubject::Employee { employee_id: "E1".into(), name: "Ana".into(), cpf: None };
  let entered = store
    .append_event(AccessEventDraft::new(subject.clone(), Direction::Entry, "Main gate"))
    .await
    .unwrap()
    .event;
  store
    .append_event(AccessEventDraft::new(subject, Direction::Exit, "Main gate"))
    .await
    .unwrap();

  let date = entered.timestamp.date_naive();
  let at_entry = svc.occupancy_snapshot(date, Some(entered.timestamp)).await.unwrap();
  assert_eq!(at_entry.counts.employees, 1);
  let now = svc.occupancy_snapshot(date, None).await.unwrap();
  assert_eq!(now.counts.employees, 0);
}

#[tokio::test]
async fn occupancy_window_uses_site_offset() {
  let config = GateConfig {
    site_offset: chrono::FixedOffset::west_opt(3 * 3600).unwrap(),
    ..Default::default()
  };
  let (svc, _) = service_with(config).await;
  let date = chrono::NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
  let snap = svc.occupancy_snapshot(date, None).await.unwrap();
  assert_eq!(snap.window.start, Utc.with_ymd_and_hms(2024, 3, 4, 3, 0, 0).unwrap());
}
