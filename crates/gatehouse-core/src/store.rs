//! The `AccessStore` trait — persistence contract for the event log, the
//! visitor aggregate and the vehicle movement rows.
//!
//! The trait is implemented by storage backends (e.g.
//! `gatehouse-store-sqlite`). [`crate::service::GateService`] depends on this
//! abstraction, not on any concrete backend.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  event::{AccessEvent, AccessEventDraft, EventQuery, PersonType},
  movement::{CommitOutcome, MovementCommit, MovementFilter, VehicleMovement},
  visitor::{NewVisitor, Visitor, VisitorEdit},
};

/// Result of [`AccessStore::append_event`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendOutcome {
  pub event:   AccessEvent,
  /// For a visitor entry: the visitor row after its visit was counted.
  pub visitor: Option<Visitor>,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a Gatehouse storage backend.
///
/// Access events are append-only: there is no update or delete. Each write
/// method is a single transaction; on error nothing is committed.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait AccessStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Access events ─────────────────────────────────────────────────────

  /// Append an event, assigning `id`, `sequence` and `timestamp`.
  ///
  /// Timestamps are assigned inside the write with
  /// [`crate::event::next_timestamp`], so they are strictly increasing in
  /// `sequence` order. A visitor `entry` also counts a visit on the visitor
  /// row in the same transaction; if that row is missing nothing is written.
  fn append_event(
    &self,
    draft: AccessEventDraft,
  ) -> impl Future<Output = Result<AppendOutcome, Self::Error>> + Send + '_;

  /// The most recent event for one entity, if any.
  fn latest_event_for(
    &self,
    person_type: PersonType,
    person_id: String,
  ) -> impl Future<Output = Result<Option<AccessEvent>, Self::Error>> + Send + '_;

  /// Filtered read of the log, newest first.
  fn query_events<'a>(
    &'a self,
    query: &'a EventQuery,
  ) -> impl Future<Output = Result<Vec<AccessEvent>, Self::Error>> + Send + 'a;

  /// Every event with `from <= timestamp <= to`, oldest first, unbounded.
  fn events_between(
    &self,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
  ) -> impl Future<Output = Result<Vec<AccessEvent>, Self::Error>> + Send + '_;

  // ── Visitors ──────────────────────────────────────────────────────────

  fn get_visitor(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Visitor>, Self::Error>> + Send + '_;

  /// Exact match on the digits-only CPF.
  fn find_visitor_by_cpf(
    &self,
    cpf: String,
  ) -> impl Future<Output = Result<Option<Visitor>, Self::Error>> + Send + '_;

  /// Insert a visitor unless one with the same CPF exists. Returns the stored
  /// row and whether it was created. Must be atomic on CPF: concurrent calls
  /// never produce two rows.
  fn insert_visitor_if_absent(
    &self,
    input: NewVisitor,
  ) -> impl Future<Output = Result<(Visitor, bool), Self::Error>> + Send + '_;

  /// Returns `None` if the visitor does not exist.
  fn edit_visitor(
    &self,
    id: Uuid,
    edit: VisitorEdit,
  ) -> impl Future<Output = Result<Option<Visitor>, Self::Error>> + Send + '_;

  /// Returns `None` if the visitor does not exist.
  fn set_visitor_active(
    &self,
    id: Uuid,
    is_active: bool,
  ) -> impl Future<Output = Result<Option<Visitor>, Self::Error>> + Send + '_;

  // ── Vehicle movements ─────────────────────────────────────────────────

  fn get_movement(
    &self,
    vehicle_id: String,
  ) -> impl Future<Output = Result<Option<VehicleMovement>, Self::Error>> + Send + '_;

  fn list_movements(
    &self,
    filter: MovementFilter,
  ) -> impl Future<Output = Result<Vec<VehicleMovement>, Self::Error>> + Send + '_;

  /// Compare-and-swap on the movement row's version.
  ///
  /// Writes `commit.next` with version `expected_version + 1` only if the
  /// stored version still equals `expected_version` (or, for `0`, no row
  /// exists), and appends `commit.event` in the same transaction. Otherwise
  /// returns [`CommitOutcome::Stale`] and writes nothing.
  fn commit_movement(
    &self,
    commit: MovementCommit,
  ) -> impl Future<Output = Result<CommitOutcome, Self::Error>> + Send + '_;
}
