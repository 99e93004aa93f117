//! Handlers for `/events` — the access log.
//!
//! Query params map directly to [`EventQuery`] fields. `/events/export`
//! accepts the same params and returns CSV.

use axum::{
  Json,
  extract::State,
  http::header,
  response::IntoResponse,
};
use chrono::{DateTime, SecondsFormat, Utc};
use gatehouse_core::{
  directory::IdentityDirectory,
  event::{AccessEvent, AccessMethod, Direction, EventQuery, PersonType},
  store::AccessStore,
};
use serde::Deserialize;

use crate::{AppState, error::ApiError, extract::QueryParams};

#[derive(Debug, Deserialize, Default)]
pub struct LogParams {
  pub person_type:   Option<PersonType>,
  pub person_id:     Option<String>,
  pub direction:     Option<Direction>,
  pub access_method: Option<AccessMethod>,
  pub from:          Option<DateTime<Utc>>,
  pub to:            Option<DateTime<Utc>>,
  /// Substring of name, CPF, location or notes.
  pub text:          Option<String>,
  pub limit:         Option<usize>,
  pub offset:        Option<usize>,
}

impl From<LogParams> for EventQuery {
  fn from(p: LogParams) -> Self {
    EventQuery {
      person_type:   p.person_type,
      person_id:     p.person_id,
      direction:     p.direction,
      access_method: p.access_method,
      from:          p.from,
      to:            p.to,
      text:          p.text,
      limit:         p.limit,
      offset:        p.offset,
    }
  }
}

/// `GET /events[?person_type=..][&direction=..][&from=..][&text=..][&limit=..]`
pub async fn list<S, D>(
  State(state): State<AppState<S, D>>,
  QueryParams(params): QueryParams<LogParams>,
) -> Result<Json<Vec<AccessEvent>>, ApiError>
where
  S: AccessStore + 'static,
  D: IdentityDirectory + 'static,
{
  Ok(Json(state.service.query_access_log(params.into()).await?))
}

/// `GET /events/export` — same filters, `text/csv` body. Without a `limit`
/// every matching row is exported.
pub async fn export<S, D>(
  State(state): State<AppState<S, D>>,
  QueryParams(params): QueryParams<LogParams>,
) -> Result<impl IntoResponse, ApiError>
where
  S: AccessStore + 'static,
  D: IdentityDirectory + 'static,
{
  let events = state.service.export_access_log(params.into()).await?;
  let body = render_csv(&events)?;
  Ok((
    [
      (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
      (header::CONTENT_DISPOSITION, "attachment; filename=\"access-log.csv\""),
    ],
    body,
  ))
}

// ─── CSV ─────────────────────────────────────────────────────────────────────

const HEADER: [&str; 12] = [
  "timestamp",
  "event_id",
  "sequence",
  "person_type",
  "person_id",
  "person_name",
  "person_cpf",
  "direction",
  "access_method",
  "location",
  "verified_by",
  "notes",
];

/// Spreadsheet apps evaluate cells starting with these characters.
fn needs_formula_guard(value: &str) -> bool {
  matches!(value.chars().next(), Some('=' | '+' | '-' | '@'))
}

fn cell(value: &str) -> String {
  if needs_formula_guard(value) {
    format!("'{value}")
  } else {
    value.to_owned()
  }
}

pub fn render_csv(events: &[AccessEvent]) -> Result<String, ApiError> {
  let mut writer = csv::Writer::from_writer(Vec::new());
  let export = |e: csv::Error| ApiError::Export(e.to_string());

  writer.write_record(HEADER).map_err(export)?;
  for e in events {
    writer
      .write_record([
        e.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
        e.id.to_string(),
        e.sequence.to_string(),
        e.subject.person_type().as_str().to_owned(),
        cell(&e.subject.person_id()),
        cell(e.subject.person_name()),
        e.subject.person_cpf().map(cell).unwrap_or_default(),
        e.direction.as_str().to_owned(),
        e.access_method.as_str().to_owned(),
        cell(&e.location),
        e.verified_by.as_deref().map(cell).unwrap_or_default(),
        e.notes.as_deref().map(cell).unwrap_or_default(),
      ])
      .map_err(export)?;
  }

  let bytes = writer
    .into_inner()
    .map_err(|e| ApiError::Export(e.to_string()))?;
  String::from_utf8(bytes).map_err(|e| ApiError::Export(e.to_string()))
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone as _;
  use gatehouse_core::event::AccessSubject;
  use uuid::Uuid;

  use super::*;

  fn event(name: &str, notes: Option<&str>) -> AccessEvent {
    AccessEvent {
      id:            Uuid::nil(),
      sequence:      7,
      subject:       AccessSubject::Visitor {
        visitor_id: Uuid::nil(),
        name:       name.into(),
        cpf:        "11122233344".into(),
      },
      direction:     Direction::Entry,
      access_method: AccessMethod::Manual,
      location:      "Main gate".into(),
      timestamp:     Utc.with_ymd_and_hms(2024, 3, 4, 8, 0, 0).unwrap(),
      verified_by:   None,
      notes:         notes.map(str::to_owned),
    }
  }

  #[test]
  fn csv_has_header_and_one_row_per_event() {
    let out = render_csv(&[event("Carla", None), event("Davi", Some("late, again"))]).unwrap();
    let lines: Vec<_> = out.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("timestamp,event_id,sequence"));
    assert!(lines[1].starts_with("2024-03-04T08:00:00.000000Z,"));
    assert!(lines[2].ends_with("\"late, again\""));
  }

  #[test]
  fn formula_cells_are_neutralised() {
    let out = render_csv(&[event("=HYPERLINK(\"x\")", Some("+1")), event("@cmd", None)]).unwrap();
    assert!(out.contains("'=HYPERLINK"));
    assert!(out.contains(",'+1"));
    assert!(out.contains(",'@cmd,"));
  }

  #[test]
  fn plain_values_are_untouched() {
    assert_eq!(cell("Ana"), "Ana");
    assert_eq!(cell("-5"), "'-5");
    assert_eq!(cell(""), "");
  }
}
