//! The occupancy projection — "who and what is on site right now", derived
//! purely from the access event log.
//!
//! For every entity seen in the window, the latest event (by timestamp, then
//! sequence) decides: an employee or visitor is inside iff it is an `entry`;
//! a vehicle is in transit iff it is an `exit`. This is a last-write-wins
//! fold, not a running balance, so the reported sets can never go negative.
//! Raw balances and exits without a prior entry are reported alongside them
//! instead of being clamped away.

use std::collections::HashMap;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  event::{AccessEvent, Direction, PersonKey, PersonType},
};

// ─── Window ──────────────────────────────────────────────────────────────────

/// An inclusive time range over event timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccupancyWindow {
  pub start: DateTime<Utc>,
  pub end:   DateTime<Utc>,
}

impl OccupancyWindow {
  pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
    if start > end {
      return Err(Error::InvalidInput(format!(
        "window start {start} is after its end {end}"
      )));
    }
    Ok(Self { start, end })
  }

  /// The site-local calendar day `date`, cut off at `as_of` when given.
  pub fn for_day(
    date: NaiveDate,
    offset: FixedOffset,
    as_of: Option<DateTime<Utc>>,
  ) -> Result<Self> {
    let start = date
      .and_time(NaiveTime::MIN)
      .and_local_timezone(offset)
      .single()
      .ok_or_else(|| Error::InvalidInput(format!("no local midnight on {date}")))?
      .with_timezone(&Utc);
    let end_of_day = start + Duration::days(1) - Duration::microseconds(1);
    let end = as_of.map_or(end_of_day, |t| t.min(end_of_day));
    Self::new(start, end)
  }

  pub fn contains(&self, at: DateTime<Utc>) -> bool {
    self.start <= at && at <= self.end
  }
}

// ─── Snapshot ────────────────────────────────────────────────────────────────

/// An entity the projection considers on site (or, for vehicles, away).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occupant {
  pub person_id: String,
  pub name:      String,
  pub cpf:       Option<String>,
  /// Timestamp of the deciding event.
  pub since:     DateTime<Utc>,
  pub location:  String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccupancyCounts {
  pub employees:           usize,
  pub visitors:            usize,
  pub vehicles_in_transit: usize,
}

/// Entries minus exits per entity type within the window. May be negative
/// when the window holds exits whose entries happened earlier or were never
/// recorded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawBalance {
  pub employees: i64,
  pub visitors:  i64,
  pub vehicles:  i64,
}

/// Who and what is on site, folded from the events inside one window.
///
/// Everything here is scoped to the window. A vehicle that left before the
/// window opened and has not returned has no event in it, so it is absent
/// from `vehicles_in_transit`; the movement table
/// (`GateService::list_in_transit`) is the authority on vehicles currently
/// away. The same holds for a person who entered on an earlier day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OccupancySnapshot {
  pub window:              OccupancyWindow,
  pub employees_inside:    Vec<Occupant>,
  pub visitors_inside:     Vec<Occupant>,
  /// Vehicles whose latest event in the window is an exit.
  pub vehicles_in_transit: Vec<Occupant>,
  pub counts:              OccupancyCounts,
  pub raw_balance:         RawBalance,
  /// Employees and visitors whose first event in the window is an exit.
  pub unmatched_exits:     Vec<PersonKey>,
}

// ─── Fold ────────────────────────────────────────────────────────────────────

struct Tracked<'a> {
  first: &'a AccessEvent,
  last:  &'a AccessEvent,
}

fn occupant(event: &AccessEvent) -> Occupant {
  Occupant {
    person_id: event.subject.person_id(),
    name:      event.subject.person_name().to_owned(),
    cpf:       event.subject.person_cpf().map(str::to_owned),
    since:     event.timestamp,
    location:  event.location.clone(),
  }
}

/// Fold `events` into a snapshot for `window`. Events outside the window are
/// ignored; input order does not matter.
pub fn project<'a, I>(events: I, window: &OccupancyWindow) -> OccupancySnapshot
where
  I: IntoIterator<Item = &'a AccessEvent>,
{
  let mut tracked: HashMap<PersonKey, Tracked<'a>> = HashMap::new();
  let mut raw_balance = RawBalance::default();

  for event in events.into_iter().filter(|e| window.contains(e.timestamp)) {
    let delta = match event.direction {
      Direction::Entry => 1,
      Direction::Exit => -1,
    };
    match event.subject.person_type() {
      PersonType::Employee => raw_balance.employees += delta,
      PersonType::Visitor => raw_balance.visitors += delta,
      PersonType::Vehicle => raw_balance.vehicles += delta,
    }

    tracked
      .entry(event.subject.key())
      .and_modify(|t| {
        if event.order_key() < t.first.order_key() {
          t.first = event;
        }
        if event.order_key() > t.last.order_key() {
          t.last = event;
        }
      })
      .or_insert(Tracked { first: event, last: event });
  }

  let mut employees_inside = Vec::new();
  let mut visitors_inside = Vec::new();
  let mut vehicles_in_transit = Vec::new();
  let mut unmatched_exits = Vec::new();

  for (key, t) in &tracked {
    match (key.person_type, t.last.direction) {
      (PersonType::Employee, Direction::Entry) => employees_inside.push(occupant(t.last)),
      (PersonType::Visitor, Direction::Entry) => visitors_inside.push(occupant(t.last)),
      (PersonType::Vehicle, Direction::Exit) => vehicles_in_transit.push(occupant(t.last)),
      _ => {}
    }
    if key.person_type != PersonType::Vehicle && t.first.direction == Direction::Exit {
      unmatched_exits.push(key.clone());
    }
  }

  for list in [&mut employees_inside, &mut visitors_inside, &mut vehicles_in_transit] {
    list.sort_by(|a, b| (a.since, &a.person_id).cmp(&(b.since, &b.person_id)));
  }
  unmatched_exits.sort();

  OccupancySnapshot {
    window: *window,
    counts: OccupancyCounts {
      employees:           employees_inside.len(),
      visitors:            visitors_inside.len(),
      vehicles_in_transit: vehicles_in_transit.len(),
    },
    employees_inside,
    visitors_inside,
    vehicles_in_transit,
    raw_balance,
    unmatched_exits,
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone as _;
  use uuid::Uuid;

  use super::*;
  use crate::event::{AccessMethod, AccessSubject};

  fn at(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, h, m, 0).unwrap()
  }

  fn day() -> OccupancyWindow {
    OccupancyWindow::for_day(
      NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
      FixedOffset::east_opt(0).unwrap(),
      None,
    )
    .unwrap()
  }

  fn employee(id: &str) -> AccessSubject {
    AccessSubject::Employee { employee_id: id.into(), name: format!("Employee {id}"), cpf: None }
  }

  fn event(seq: i64, subject: AccessSubject, direction: Direction, ts: DateTime<Utc>) -> AccessEvent {
    AccessEvent {
      id: Uuid::new_v4(),
      sequence: seq,
      subject,
      direction,
      access_method: AccessMethod::Manual,
      location: "Main gate".into(),
      timestamp: ts,
      verified_by: None,
      notes: None,
    }
  }

  #[test]
  fn entry_only_is_inside() {
    let events = [event(1, employee("E"), Direction::Entry, at(8, 0))];
    let window = OccupancyWindow::new(day().start, at(9, 0)).unwrap();
    let snap = project(&events, &window);
    assert_eq!(snap.counts.employees, 1);
    assert_eq!(snap.employees_inside[0].person_id, "E");
    assert_eq!(snap.employees_inside[0].since, at(8, 0));
  }

  #[test]
  fn entry_then_exit_is_not_inside() {
    let events = [
      event(1, employee("E"), Direction::Entry, at(8, 0)),
      event(2, employee("E"), Direction::Exit, at(17, 0)),
    ];
    let window = OccupancyWindow::new(day().start, at(18, 0)).unwrap();
    let snap = project(&events, &window);
    assert_eq!(snap.counts.employees, 0);
    assert_eq!(snap.raw_balance.employees, 0);
    assert!(snap.unmatched_exits.is_empty());
  }

  #[test]
  fn as_of_cutoff_hides_later_events() {
    let events = [
      event(1, employee("E"), Direction::Entry, at(8, 0)),
      event(2, employee("E"), Direction::Exit, at(17, 0)),
    ];
    let window = OccupancyWindow::new(day().start, at(12, 0)).unwrap();
    assert_eq!(project(&events, &window).counts.employees, 1);
  }

  #[test]
  fn exit_without_entry_is_reported_not_clamped() {
    let events = [
      event(1, employee("A"), Direction::Exit, at(7, 0)),
      event(2, employee("B"), Direction::Exit, at(7, 30)),
    ];
    let snap = project(&events, &day());
    assert_eq!(snap.counts.employees, 0);
    assert_eq!(snap.raw_balance.employees, -2);
    assert_eq!(snap.unmatched_exits.len(), 2);
    assert_eq!(snap.unmatched_exits[0].person_id, "A");
  }

  #[test]
  fn vehicles_are_in_transit_after_exit() {
    let truck = AccessSubject::Vehicle {
      vehicle_id: "V1".into(),
      plate:      "ABC1D23".into(),
      driver_id:  "D1".into(),
    };
    let van = AccessSubject::Vehicle {
      vehicle_id: "V2".into(),
      plate:      "XYZ9K88".into(),
      driver_id:  "D2".into(),
    };
    let events = [
      event(1, truck.clone(), Direction::Exit, at(8, 0)),
      event(2, van.clone(), Direction::Exit, at(8, 10)),
      event(3, van, Direction::Entry, at(12, 0)),
    ];
    let snap = project(&events, &day());
    assert_eq!(snap.counts.vehicles_in_transit, 1);
    assert_eq!(snap.vehicles_in_transit[0].name, "ABC1D23");
    // Vehicles never count as unmatched.
    assert!(snap.unmatched_exits.is_empty());
  }

  #[test]
  fn equal_timestamps_fall_back_to_sequence() {
    let events = [
      event(2, employee("E"), Direction::Exit, at(8, 0)),
      event(1, employee("E"), Direction::Entry, at(8, 0)),
    ];
    assert_eq!(project(&events, &day()).counts.employees, 0);
  }

  #[test]
  fn events_outside_window_are_ignored() {
    let yesterday = at(8, 0) - Duration::days(1);
    let events = [event(1, employee("E"), Direction::Entry, yesterday)];
    let snap = project(&events, &day());
    assert_eq!(snap.counts.employees, 0);
    assert_eq!(snap.raw_balance.employees, 0);
  }

  #[test]
  fn vehicle_that_left_before_the_window_is_not_listed() {
    let vehicle = AccessSubject::Vehicle {
      vehicle_id: "V1".into(),
      plate:      "ABC1D23".into(),
      driver_id:  "D1".into(),
    };
    let yesterday = at(18, 0) - Duration::days(1);
    let events = [event(1, vehicle.clone(), Direction::Exit, yesterday)];
    let snap = project(&events, &day());
    assert!(snap.vehicles_in_transit.is_empty());

    let events = [event(1, vehicle, Direction::Exit, at(7, 0))];
    let snap = project(&events, &day());
    assert_eq!(snap.vehicles_in_transit[0].person_id, "V1");
    assert_eq!(snap.counts.vehicles_in_transit, 1);
  }

  #[test]
  fn for_day_respects_site_offset() {
    let window = OccupancyWindow::for_day(
      NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
      FixedOffset::west_opt(3 * 3600).unwrap(),
      None,
    )
    .unwrap();
    assert_eq!(window.start, at(3, 0));
    assert_eq!(window.end, at(3, 0) + Duration::days(1) - Duration::microseconds(1));
  }

  #[test]
  fn for_day_rejects_as_of_before_the_day() {
    let err = OccupancyWindow::for_day(
      NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
      FixedOffset::east_opt(0).unwrap(),
      Some(at(0, 0) - Duration::hours(1)),
    )
    .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
  }

  mod properties {
    use proptest::prelude::*;

    use super::*;

    /// `(person, is_entry, minute)` triples, numbered in generation order
    /// and then shuffled. Minutes are coarse so timestamp ties are common.
    fn arb_history() -> impl Strategy<Value = Vec<AccessEvent>> {
      proptest::collection::vec((0..6usize, any::<bool>(), 0..30i64), 0..40)
        .prop_map(|raw| {
          raw
            .into_iter()
            .enumerate()
            .map(|(seq, (who, is_entry, minute))| {
              let direction = if is_entry { Direction::Entry } else { Direction::Exit };
              let ts = at(8, 0) + Duration::minutes(minute);
              event(seq as i64, employee(&format!("P{who}")), direction, ts)
            })
            .collect::<Vec<_>>()
        })
        .prop_flat_map(|events| Just(events).prop_shuffle())
    }

    proptest! {
      #[test]
      fn inside_iff_latest_event_is_entry(events in arb_history()) {
        let snap = project(&events, &day());

        for p in 0..6 {
          let id = format!("P{p}");
          let latest = events
            .iter()
            .filter(|e| e.subject.person_id() == id)
            .max_by_key(|e| e.order_key());
          let expected = latest.is_some_and(|e| e.direction == Direction::Entry);
          let actual = snap.employees_inside.iter().any(|o| o.person_id == id);
          prop_assert_eq!(actual, expected, "person {}", id);
        }
        prop_assert_eq!(snap.counts.employees, snap.employees_inside.len());
      }
    }
  }
}
