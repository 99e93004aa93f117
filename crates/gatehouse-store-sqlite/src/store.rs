//! [`SqliteStore`] — the SQLite implementation of [`AccessStore`].

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension as _, TransactionBehavior};
use uuid::Uuid;

use gatehouse_core::{
  cpf,
  event::{
    AccessEvent, AccessEventDraft, AccessSubject, Direction, EventQuery, PersonType, next_timestamp,
  },
  movement::{CommitOutcome, MovementCommit, MovementFilter, MovementRecord, VehicleMovement},
  store::{AccessStore, AppendOutcome},
  visitor::{NewVisitor, Visitor, VisitorEdit},
};

use crate::{
  Error, Result,
  encode::{
    EVENT_COLUMNS, EventRow, MOVEMENT_COLUMNS, MovementRow, RawAccessEvent, RawMovement,
    RawVisitor, VISITOR_COLUMNS, encode_dt, encode_uuid, event_from_draft, sql_dt,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Gatehouse store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted. All calls
/// are serialised on the connection thread; each write method runs in one
/// `IMMEDIATE` transaction.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

/// Append one event inside an open transaction. Assigns the timestamp from
/// the newest stored event so the log stays strictly increasing.
fn insert_event(
  tx: &rusqlite::Transaction<'_>,
  row: &EventRow,
) -> rusqlite::Result<(i64, DateTime<Utc>)> {
  let last: Option<String> = tx
    .query_row(
      "SELECT timestamp FROM access_events ORDER BY sequence DESC LIMIT 1",
      [],
      |r| r.get(0),
    )
    .optional()?;
  let last = last.as_deref().map(sql_dt).transpose()?;
  let timestamp = next_timestamp(Utc::now(), last);

  tx.execute(
    "INSERT INTO access_events (
       event_id, person_type, person_id, person_name, person_cpf, driver_id,
       direction, access_method, location, timestamp, verified_by, notes
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
    rusqlite::params![
      row.event_id,
      row.person_type,
      row.person_id,
      row.person_name,
      row.person_cpf,
      row.driver_id,
      row.direction,
      row.access_method,
      row.location,
      encode_dt(timestamp),
      row.verified_by,
      row.notes,
    ],
  )?;
  Ok((tx.last_insert_rowid(), timestamp))
}

fn select_visitor(
  conn: &rusqlite::Connection,
  column: &str,
  value: &str,
) -> rusqlite::Result<Option<RawVisitor>> {
  conn
    .query_row(
      &format!("SELECT {VISITOR_COLUMNS} FROM visitors WHERE {column} = ?1"),
      rusqlite::params![value],
      RawVisitor::from_row,
    )
    .optional()
}

/// Escape `%`, `_` and `\` for use in a `LIKE ... ESCAPE '\'` pattern.
fn like_pattern(text: &str) -> String {
  let mut out = String::with_capacity(text.len() + 2);
  out.push('%');
  for c in text.chars() {
    if matches!(c, '%' | '_' | '\\') {
      out.push('\\');
    }
    out.push(c);
  }
  out.push('%');
  out
}

// ─── AccessStore impl ────────────────────────────────────────────────────────

impl AccessStore for SqliteStore {
  type Error = Error;

  // ── Access events ─────────────────────────────────────────────────────

  async fn append_event(&self, draft: AccessEventDraft) -> Result<AppendOutcome> {
    let id = Uuid::new_v4();
    let row = EventRow::new(id, &draft);
    let counted_visitor = match (&draft.subject, draft.direction) {
      (AccessSubject::Visitor { visitor_id, .. }, Direction::Entry) => {
        Some(*visitor_id)
      }
      _ => None,
    };
    let visitor_id_str = counted_visitor.map(encode_uuid);

    let written: Option<(i64, DateTime<Utc>, Option<RawVisitor>)> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let (sequence, timestamp) = insert_event(&tx, &row)?;

        let visitor = match visitor_id_str {
          Some(vid) => {
            let changed = tx.execute(
              "UPDATE visitors
               SET total_visits = total_visits + 1, last_visit = ?2
               WHERE visitor_id = ?1",
              rusqlite::params![vid, encode_dt(timestamp)],
            )?;
            if changed == 0 {
              // Dropping `tx` rolls the event back.
              return Ok(None);
            }
            select_visitor(&tx, "visitor_id", &vid)?
          }
          None => None,
        };

        tx.commit()?;
        Ok(Some((sequence, timestamp, visitor)))
      })
      .await?;

    // Only a visitor entry can abort the append.
    let Some((sequence, timestamp, raw_visitor)) = written else {
      return Err(Error::VisitorNotFound(counted_visitor.unwrap_or_default()));
    };

    Ok(AppendOutcome {
      event:   event_from_draft(id, sequence, timestamp, draft),
      visitor: raw_visitor.map(RawVisitor::into_visitor).transpose()?,
    })
  }

  async fn latest_event_for(
    &self,
    person_type: PersonType,
    person_id: String,
  ) -> Result<Option<AccessEvent>> {
    let type_str = person_type.as_str();

    let raw: Option<RawAccessEvent> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {EVENT_COLUMNS} FROM access_events
                 WHERE person_type = ?1 AND person_id = ?2
                 ORDER BY sequence DESC LIMIT 1"
              ),
              rusqlite::params![type_str, person_id],
              RawAccessEvent::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawAccessEvent::into_event).transpose()
  }

  async fn query_events(&self, query: &EventQuery) -> Result<Vec<AccessEvent>> {
    let type_str = query.person_type.map(PersonType::as_str);
    let person_id = query.person_id.clone();
    let direction = query.direction.map(Direction::as_str);
    let method = query.access_method.map(|m| m.as_str());
    let from = query.from.map(encode_dt);
    let to = query.to.map(encode_dt);
    let text = query
      .text
      .as_deref()
      .map(str::trim)
      .filter(|t| !t.is_empty());
    let text_pattern = text.map(like_pattern);
    // A CPF typed with punctuation still matches the stored digits.
    let cpf_pattern = text
      .map(cpf::normalize)
      .filter(|d| !d.is_empty())
      .map(|d| like_pattern(&d));
    let limit_val = query.limit.map_or(-1, |l| l as i64);
    let offset_val = query.offset.unwrap_or(0) as i64;

    let raws: Vec<RawAccessEvent> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {EVENT_COLUMNS} FROM access_events
           WHERE (?1 IS NULL OR person_type = ?1)
             AND (?2 IS NULL OR person_id = ?2)
             AND (?3 IS NULL OR direction = ?3)
             AND (?4 IS NULL OR access_method = ?4)
             AND (?5 IS NULL OR timestamp >= ?5)
             AND (?6 IS NULL OR timestamp <= ?6)
             AND (?7 IS NULL
                  OR person_name LIKE ?7 ESCAPE '\\'
                  OR location    LIKE ?7 ESCAPE '\\'
                  OR notes       LIKE ?7 ESCAPE '\\'
                  OR person_cpf  LIKE ?7 ESCAPE '\\'
                  OR (?8 IS NOT NULL AND person_cpf LIKE ?8 ESCAPE '\\'))
           ORDER BY timestamp DESC, sequence DESC
           LIMIT ?9 OFFSET ?10"
        ))?;

        let rows = stmt
          .query_map(
            rusqlite::params![
              type_str,
              person_id,
              direction,
              method,
              from,
              to,
              text_pattern,
              cpf_pattern,
              limit_val,
              offset_val,
            ],
            RawAccessEvent::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawAccessEvent::into_event).collect()
  }

  async fn events_between(
    &self,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
  ) -> Result<Vec<AccessEvent>> {
    let from_str = encode_dt(from);
    let to_str = encode_dt(to);

    let raws: Vec<RawAccessEvent> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {EVENT_COLUMNS} FROM access_events
           WHERE timestamp >= ?1 AND timestamp <= ?2
           ORDER BY timestamp ASC, sequence ASC"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![from_str, to_str], RawAccessEvent::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawAccessEvent::into_event).collect()
  }

  // ── Visitors ──────────────────────────────────────────────────────────

  async fn get_visitor(&self, id: Uuid) -> Result<Option<Visitor>> {
    let id_str = encode_uuid(id);
    let raw = self
      .conn
      .call(move |conn| Ok(select_visitor(conn, "visitor_id", &id_str)?))
      .await?;
    raw.map(RawVisitor::into_visitor).transpose()
  }

  async fn find_visitor_by_cpf(&self, cpf: String) -> Result<Option<Visitor>> {
    let raw = self
      .conn
      .call(move |conn| Ok(select_visitor(conn, "cpf", &cpf)?))
      .await?;
    raw.map(RawVisitor::into_visitor).transpose()
  }

  async fn insert_visitor_if_absent(&self, input: NewVisitor) -> Result<(Visitor, bool)> {
    let id_str = encode_uuid(Uuid::new_v4());
    let at_str = encode_dt(Utc::now());

    let (raw, created): (RawVisitor, bool) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let changed = tx.execute(
          "INSERT INTO visitors (visitor_id, name, cpf, photo, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5)
           ON CONFLICT(cpf) DO NOTHING",
          rusqlite::params![id_str, input.name, input.cpf, input.photo, at_str],
        )?;
        let raw = tx.query_row(
          &format!("SELECT {VISITOR_COLUMNS} FROM visitors WHERE cpf = ?1"),
          rusqlite::params![input.cpf],
          RawVisitor::from_row,
        )?;
        tx.commit()?;
        Ok((raw, changed == 1))
      })
      .await?;

    Ok((raw.into_visitor()?, created))
  }

  async fn edit_visitor(&self, id: Uuid, edit: VisitorEdit) -> Result<Option<Visitor>> {
    let id_str = encode_uuid(id);

    let raw = self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE visitors
           SET name = COALESCE(?2, name), photo = COALESCE(?3, photo)
           WHERE visitor_id = ?1",
          rusqlite::params![id_str, edit.name, edit.photo],
        )?;
        Ok(select_visitor(conn, "visitor_id", &id_str)?)
      })
      .await?;
    raw.map(RawVisitor::into_visitor).transpose()
  }

  async fn set_visitor_active(&self, id: Uuid, is_active: bool) -> Result<Option<Visitor>> {
    let id_str = encode_uuid(id);

    let raw = self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE visitors SET is_active = ?2 WHERE visitor_id = ?1",
          rusqlite::params![id_str, is_active],
        )?;
        Ok(select_visitor(conn, "visitor_id", &id_str)?)
      })
      .await?;
    raw.map(RawVisitor::into_visitor).transpose()
  }

  // ── Vehicle movements ─────────────────────────────────────────────────

  async fn get_movement(&self, vehicle_id: String) -> Result<Option<VehicleMovement>> {
    let raw: Option<RawMovement> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {MOVEMENT_COLUMNS} FROM vehicle_movements WHERE vehicle_id = ?1"),
              rusqlite::params![vehicle_id],
              RawMovement::from_row,
            )
            .optional()?,
        )
      })
      .await?;
    raw.map(RawMovement::into_movement).transpose()
  }

  async fn list_movements(&self, filter: MovementFilter) -> Result<Vec<VehicleMovement>> {
    let status = filter.status.map(|s| s.as_str());
    let checklist = filter.checklist_status.map(|c| c.as_str());

    let raws: Vec<RawMovement> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {MOVEMENT_COLUMNS} FROM vehicle_movements
           WHERE (?1 IS NULL OR status = ?1)
             AND (?2 IS NULL OR checklist_status = ?2)
           ORDER BY vehicle_id"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![status, checklist], RawMovement::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawMovement::into_movement).collect()
  }

  async fn commit_movement(&self, commit: MovementCommit) -> Result<CommitOutcome> {
    let MovementCommit { expected_version, next, event } = commit;
    let new_version = expected_version + 1;
    let row = MovementRow::new(&next, new_version);
    let expected = expected_version as i64;
    let event_id = Uuid::new_v4();
    let event_row = event.as_ref().map(|d| EventRow::new(event_id, d));

    let written: Option<Option<(i64, DateTime<Utc>)>> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let params = rusqlite::params![
          row.vehicle_id,
          row.driver_id,
          row.checklist_id,
          row.checklist_status,
          row.status,
          row.destination,
          row.origin_base,
          row.exit_time,
          row.return_time,
          row.checklist_date,
          row.version,
          row.updated_at,
          expected,
        ];
        let changed = if expected == 0 {
          tx.execute(
            &format!(
              "INSERT INTO vehicle_movements ({MOVEMENT_COLUMNS})
               SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12
               WHERE ?13 = 0
               ON CONFLICT(vehicle_id) DO NOTHING"
            ),
            params,
          )?
        } else {
          tx.execute(
            "UPDATE vehicle_movements SET
               driver_id = ?2, checklist_id = ?3, checklist_status = ?4,
               status = ?5, destination = ?6, origin_base = ?7,
               exit_time = ?8, return_time = ?9, checklist_date = ?10,
               version = ?11, updated_at = ?12
             WHERE vehicle_id = ?1 AND version = ?13",
            params,
          )?
        };
        if changed == 0 {
          return Ok(None);
        }

        let appended = event_row.as_ref().map(|r| insert_event(&tx, r)).transpose()?;
        tx.commit()?;
        Ok(Some(appended))
      })
      .await?;

    let Some(appended) = written else {
      return Ok(CommitOutcome::Stale);
    };
    let event = match (event, appended) {
      (Some(draft), Some((sequence, timestamp))) => {
        Some(event_from_draft(event_id, sequence, timestamp, draft))
      }
      _ => None,
    };
    Ok(CommitOutcome::Committed(MovementRecord {
      movement: VehicleMovement { version: new_version, ..next },
      event,
    }))
  }
}
