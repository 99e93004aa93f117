//! `gatehouse` — operator console for the Gatehouse access API.
//!
//! # Usage
//!
//! ```
//! gatehouse --url http://localhost:8080 scan EMP-1042 --direction entry
//! gatehouse --config ~/.config/gatehouse/config.toml occupancy
//! ```

mod client;

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use client::{AccessBody, ApiClient, ApiConfig, ServerError};
use gatehouse_core::{
  cpf,
  event::{AccessEvent, AccessSubject},
  movement::{MovementRecord, VehicleMovement},
  occupancy::{Occupant, OccupancySnapshot},
  visitor::Visitor,
};
use serde::Deserialize;
use uuid::Uuid;

const DEFAULT_URL: &str = "http://localhost:8080";

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "gatehouse", about = "Operator console for the Gatehouse access API")]
struct Args {
  /// Path to a TOML config file (url).
  #[arg(short, long, value_name = "FILE")]
  config: Option<PathBuf>,

  /// Base URL of the gatehouse server (default: http://localhost:8080).
  #[arg(long, env = "GATEHOUSE_URL")]
  url: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Resolve a credential token without recording anything.
  Resolve { token: String },
  /// Resolve a credential and record the access. Ctrl-C cancels the scan.
  Scan {
    token:  String,
    #[command(flatten)]
    access: AccessArgs,
  },
  /// Record a manual employee access.
  Employee {
    employee_id: String,
    #[command(flatten)]
    access:      AccessArgs,
  },
  #[command(subcommand)]
  Visitor(VisitorCommand),
  #[command(subcommand)]
  Vehicle(VehicleCommand),
  /// Query the access log.
  Log(LogArgs),
  /// Show who is inside for a site-local day.
  Occupancy {
    /// Site-local calendar day (default: today at the site).
    #[arg(long)]
    date:  Option<NaiveDate>,
    /// Only count events at or before this instant.
    #[arg(long)]
    as_of: Option<DateTime<Utc>>,
  },
}

#[derive(Subcommand, Debug)]
enum VisitorCommand {
  /// Register a visitor, or fetch the existing one with the same CPF.
  Register {
    name:  String,
    cpf:   String,
    #[arg(long)]
    photo: Option<String>,
  },
  /// Look a visitor up by CPF.
  Find { cpf: String },
  Show { id: Uuid },
  Edit {
    id:    Uuid,
    #[arg(long)]
    name:  Option<String>,
    #[arg(long)]
    photo: Option<String>,
  },
  Activate { id: Uuid },
  Deactivate { id: Uuid },
  /// Record a visitor entry or exit.
  Access {
    id:     Uuid,
    #[command(flatten)]
    access: AccessArgs,
  },
}

#[derive(Subcommand, Debug)]
enum VehicleCommand {
  /// Submit a pre-trip checklist.
  Checklist {
    vehicle:   String,
    #[arg(long)]
    driver:    String,
    #[arg(long)]
    checklist: String,
  },
  Approve {
    vehicle:   String,
    #[arg(long)]
    checklist: String,
  },
  Reject {
    vehicle:   String,
    #[arg(long)]
    checklist: String,
  },
  /// Authorize an exit; requires an approved checklist.
  Exit {
    vehicle:     String,
    #[arg(long)]
    driver:      String,
    #[arg(long)]
    destination: String,
    #[arg(long)]
    location:    Option<String>,
  },
  /// Register a return from transit.
  Return {
    vehicle:  String,
    #[arg(long)]
    driver:   String,
    #[arg(long)]
    origin:   String,
    #[arg(long)]
    location: Option<String>,
  },
  Status { vehicle: String },
  /// Vehicles with an approved checklist that are still on site.
  Ready,
  InTransit,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
#[value(rename_all = "snake_case")]
enum DirectionArg {
  Entry,
  Exit,
}

impl DirectionArg {
  fn as_str(self) -> &'static str {
    match self {
      Self::Entry => "entry",
      Self::Exit => "exit",
    }
  }
}

#[derive(ValueEnum, Debug, Clone, Copy)]
#[value(rename_all = "snake_case")]
enum PersonTypeArg {
  Employee,
  Visitor,
  Vehicle,
}

impl PersonTypeArg {
  fn as_str(self) -> &'static str {
    match self {
      Self::Employee => "employee",
      Self::Visitor => "visitor",
      Self::Vehicle => "vehicle",
    }
  }
}

#[derive(ValueEnum, Debug, Clone, Copy)]
#[value(rename_all = "snake_case")]
enum MethodArg {
  QrCode,
  Manual,
  FacialRecognition,
}

impl MethodArg {
  fn as_str(self) -> &'static str {
    match self {
      Self::QrCode => "qr_code",
      Self::Manual => "manual",
      Self::FacialRecognition => "facial_recognition",
    }
  }
}

#[derive(ClapArgs, Debug)]
struct AccessArgs {
  #[arg(short, long, value_enum)]
  direction:   DirectionArg,
  #[arg(long)]
  location:    Option<String>,
  #[arg(long, value_enum)]
  method:      Option<MethodArg>,
  /// Staff member confirming the access.
  #[arg(long)]
  verified_by: Option<String>,
  #[arg(long)]
  notes:       Option<String>,
}

impl AccessArgs {
  fn body(self, default_method: Option<MethodArg>) -> AccessBody {
    AccessBody {
      direction:     self.direction.as_str().to_owned(),
      location:      self.location,
      access_method: self.method.or(default_method).map(|m| m.as_str().to_owned()),
      verified_by:   self.verified_by,
      notes:         self.notes,
    }
  }
}

#[derive(ClapArgs, Debug)]
struct LogArgs {
  #[arg(long, value_enum)]
  person_type: Option<PersonTypeArg>,
  #[arg(long)]
  person_id:   Option<String>,
  #[arg(long, value_enum)]
  direction:   Option<DirectionArg>,
  #[arg(long, value_enum)]
  method:      Option<MethodArg>,
  #[arg(long)]
  from:        Option<DateTime<Utc>>,
  #[arg(long)]
  to:          Option<DateTime<Utc>>,
  /// Substring of name, CPF, location or notes.
  #[arg(long)]
  text:        Option<String>,
  #[arg(long)]
  limit:       Option<usize>,
  #[arg(long)]
  offset:      Option<usize>,
  /// Print the log as CSV instead of a table.
  #[arg(long)]
  csv:         bool,
}

impl LogArgs {
  fn filters(&self) -> Vec<(&'static str, String)> {
    let mut out = Vec::new();
    if let Some(v) = self.person_type {
      out.push(("person_type", v.as_str().to_owned()));
    }
    if let Some(v) = &self.person_id {
      out.push(("person_id", v.clone()));
    }
    if let Some(v) = self.direction {
      out.push(("direction", v.as_str().to_owned()));
    }
    if let Some(v) = self.method {
      out.push(("access_method", v.as_str().to_owned()));
    }
    if let Some(v) = self.from {
      out.push(("from", v.to_rfc3339()));
    }
    if let Some(v) = self.to {
      out.push(("to", v.to_rfc3339()));
    }
    if let Some(v) = &self.text {
      out.push(("text", v.clone()));
    }
    if let Some(v) = self.limit {
      out.push(("limit", v.to_string()));
    }
    if let Some(v) = self.offset {
      out.push(("offset", v.to_string()));
    }
    out
  }
}

// ─── Config file ──────────────────────────────────────────────────────────────

/// Shape of the optional TOML config file.
#[derive(Deserialize, Default)]
struct ConfigFile {
  #[serde(default)]
  url: String,
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
    )
    .init();

  let args = Args::parse();

  let file_cfg: ConfigFile = if let Some(path) = &args.config {
    let raw = std::fs::read_to_string(path)
      .with_context(|| format!("reading config file {}", path.display()))?;
    toml::from_str(&raw).context("parsing config file")?
  } else {
    ConfigFile::default()
  };

  // CLI flags override config file, which overrides defaults.
  let api_config = ApiConfig {
    base_url: args
      .url
      .clone()
      .or_else(|| (!file_cfg.url.is_empty()).then_some(file_cfg.url))
      .unwrap_or_else(|| DEFAULT_URL.to_string()),
  };
  let client = ApiClient::new(api_config)?;

  run(&client, args.command).await
}

async fn run(client: &ApiClient, command: Command) -> Result<()> {
  match command {
    Command::Resolve { token } => {
      let who = client.resolve(&token).await?;
      let cpf = cpf_or_dash(who.person_cpf.as_deref());
      println!("{} {} ({cpf})", who.person_id, who.person_name);
    }
    Command::Scan { token, access } => {
      scan(client, &token, access.body(Some(MethodArg::QrCode))).await?;
    }
    Command::Employee { employee_id, access } => {
      let event = client.employee_access(&employee_id, &access.body(None)).await?;
      print_recorded(&event);
    }
    Command::Visitor(cmd) => visitor(client, cmd).await?,
    Command::Vehicle(cmd) => vehicle(client, cmd).await?,
    Command::Log(log) => {
      let filters = log.filters();
      if log.csv {
        print!("{}", client.export_events(&filters).await?);
      } else {
        let events = client.events(&filters).await?;
        for event in &events {
          print_event(event);
        }
        if events.is_empty() {
          println!("(no events)");
        }
      }
    }
    Command::Occupancy { date, as_of } => {
      let mut filters = Vec::new();
      if let Some(d) = date {
        filters.push(("date", d.to_string()));
      }
      if let Some(t) = as_of {
        filters.push(("as_of", t.to_rfc3339()));
      }
      print_occupancy(&client.occupancy(&filters).await?);
    }
  }
  Ok(())
}

/// Submit a scan, cancelling it server-side if the operator hits Ctrl-C
/// before the response arrives.
async fn scan(client: &ApiClient, token: &str, body: AccessBody) -> Result<()> {
  let scan_id = Uuid::new_v4();
  let request = client.scan(scan_id, token, &body);
  tokio::pin!(request);

  tokio::select! {
    result = &mut request => {
      print_recorded(&result?);
      return Ok(());
    }
    signal = tokio::signal::ctrl_c() => {
      signal.context("listening for Ctrl-C")?;
    }
  }

  tracing::info!(%scan_id, "cancelling scan");
  if let Err(e) = client.cancel_scan(scan_id).await {
    // The scan may already have finished; its own response says how.
    tracing::warn!(%scan_id, error = %e, "cancel request failed");
  }
  match request.await {
    Ok(event) => {
      println!("scan finished before it could be cancelled");
      print_recorded(&event);
      Ok(())
    }
    Err(e) if e.downcast_ref::<ServerError>().is_some_and(ServerError::is_cancelled) => {
      println!("scan cancelled; nothing recorded");
      Ok(())
    }
    Err(e) => Err(e),
  }
}

async fn visitor(client: &ApiClient, cmd: VisitorCommand) -> Result<()> {
  match cmd {
    VisitorCommand::Register { name, cpf, photo } => {
      let reg = client.register_visitor(&name, &cpf, photo.as_deref()).await?;
      if !reg.created {
        println!("visitor already registered");
      }
      print_visitor(&reg.visitor);
    }
    VisitorCommand::Find { cpf } => print_visitor(&client.find_visitor(&cpf).await?),
    VisitorCommand::Show { id } => print_visitor(&client.get_visitor(id).await?),
    VisitorCommand::Edit { id, name, photo } => {
      if name.is_none() && photo.is_none() {
        bail!("nothing to edit: pass --name and/or --photo");
      }
      let v = client.edit_visitor(id, name.as_deref(), photo.as_deref()).await?;
      print_visitor(&v);
    }
    VisitorCommand::Activate { id } => print_visitor(&client.set_visitor_active(id, true).await?),
    VisitorCommand::Deactivate { id } => {
      print_visitor(&client.set_visitor_active(id, false).await?)
    }
    VisitorCommand::Access { id, access } => {
      let outcome = client.visitor_access(id, &access.body(None)).await?;
      print_recorded(&outcome.event);
      if let Some(v) = outcome.visitor {
        println!("  total visits: {}", v.total_visits);
      }
    }
  }
  Ok(())
}

async fn vehicle(client: &ApiClient, cmd: VehicleCommand) -> Result<()> {
  let record = match cmd {
    VehicleCommand::Checklist { vehicle, driver, checklist } => {
      client.submit_checklist(&vehicle, &driver, &checklist).await?
    }
    VehicleCommand::Approve { vehicle, checklist } => {
      client.decide_checklist(&vehicle, &checklist, true).await?
    }
    VehicleCommand::Reject { vehicle, checklist } => {
      client.decide_checklist(&vehicle, &checklist, false).await?
    }
    VehicleCommand::Exit { vehicle, driver, destination, location } => {
      client.vehicle_exit(&vehicle, &driver, &destination, location.as_deref()).await?
    }
    VehicleCommand::Return { vehicle, driver, origin, location } => {
      client.vehicle_return(&vehicle, &driver, &origin, location.as_deref()).await?
    }
    VehicleCommand::Status { vehicle } => {
      print_movement(&client.movement(&vehicle).await?);
      return Ok(());
    }
    VehicleCommand::Ready => return print_movements(&client.list_vehicles(false).await?),
    VehicleCommand::InTransit => return print_movements(&client.list_vehicles(true).await?),
  };
  print_record(&record);
  Ok(())
}

// ─── Output ───────────────────────────────────────────────────────────────────

fn cpf_or_dash(digits: Option<&str>) -> String {
  digits.map(cpf::format).unwrap_or_else(|| "-".to_string())
}

fn subject_label(subject: &AccessSubject) -> String {
  match subject {
    AccessSubject::Employee { employee_id, name, .. } => format!("employee {employee_id} {name}"),
    AccessSubject::Visitor { name, cpf: digits, .. } => {
      format!("visitor {name} ({})", cpf::format(digits))
    }
    AccessSubject::Vehicle { plate, driver_id, .. } => {
      format!("vehicle {plate} driver {driver_id}")
    }
  }
}

fn print_event(e: &AccessEvent) {
  println!(
    "{}  {:<5}  {:<18}  {}  @ {}",
    e.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
    e.direction.as_str(),
    e.access_method.as_str(),
    subject_label(&e.subject),
    e.location,
  );
}

fn print_recorded(e: &AccessEvent) {
  println!("recorded {} ({})", e.id, e.direction);
  print_event(e);
}

fn print_visitor(v: &Visitor) {
  println!("{}  {}  {}", v.id, v.name, cpf::format(&v.cpf));
  let last = v
    .last_visit
    .map(|t| t.to_rfc3339())
    .unwrap_or_else(|| "never".to_string());
  println!(
    "  visits: {}  last: {}  {}",
    v.total_visits,
    last,
    if v.is_active { "active" } else { "inactive" }
  );
}

fn print_movement(m: &VehicleMovement) {
  println!(
    "{}  {}  driver {}  checklist {} ({})",
    m.vehicle_id,
    m.phase(),
    m.driver_id,
    m.checklist_id.as_deref().unwrap_or("-"),
    m.checklist_status.as_str(),
  );
  if let Some(dest) = &m.destination {
    println!("  destination: {dest}");
  }
}

fn print_movements(ms: &[VehicleMovement]) -> Result<()> {
  if ms.is_empty() {
    println!("(none)");
  }
  for m in ms {
    print_movement(m);
  }
  Ok(())
}

fn print_record(r: &MovementRecord) {
  print_movement(&r.movement);
  if let Some(e) = &r.event {
    print_recorded(e);
  }
}

fn print_occupants(title: &str, people: &[Occupant]) {
  println!("{title} ({}):", people.len());
  for p in people {
    println!(
      "  {:<24} {:<16} since {}  @ {}",
      p.name,
      cpf_or_dash(p.cpf.as_deref()),
      p.since.format("%H:%M"),
      p.location
    );
  }
}

fn print_occupancy(s: &OccupancySnapshot) {
  println!("window {} .. {}", s.window.start.to_rfc3339(), s.window.end.to_rfc3339());
  print_occupants("employees inside", &s.employees_inside);
  print_occupants("visitors inside", &s.visitors_inside);
  print_occupants("vehicles in transit", &s.vehicles_in_transit);
  if !s.unmatched_exits.is_empty() {
    println!("unmatched exits: {}", s.unmatched_exits.len());
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn log_filters_only_include_set_flags() {
    let args = Args::parse_from([
      "gatehouse", "log", "--person-type", "visitor", "--direction", "exit", "--limit", "5",
    ]);
    let Command::Log(log) = args.command else { panic!("expected log") };
    assert_eq!(log.filters(), vec![
      ("person_type", "visitor".to_string()),
      ("direction", "exit".to_string()),
      ("limit", "5".to_string()),
    ]);
  }

  #[test]
  fn unknown_person_type_is_rejected_by_clap() {
    let err = Args::try_parse_from(["gatehouse", "log", "--person-type", "visiter"]).unwrap_err();
    assert_eq!(err.kind(), clap::error::ErrorKind::InvalidValue);
  }

  #[test]
  fn scan_defaults_to_qr_method() {
    let args = Args::parse_from(["gatehouse", "scan", "EMP-1", "-d", "entry"]);
    let Command::Scan { access, .. } = args.command else { panic!("expected scan") };
    let body = access.body(Some(MethodArg::QrCode));
    assert_eq!(body.direction, "entry");
    assert_eq!(body.access_method.as_deref(), Some("qr_code"));
  }

  #[test]
  fn explicit_method_wins() {
    let args = Args::parse_from([
      "gatehouse", "employee", "E1", "-d", "exit", "--method", "facial_recognition",
    ]);
    let Command::Employee { access, .. } = args.command else { panic!("expected employee") };
    let body = access.body(None);
    assert_eq!(body.access_method.as_deref(), Some("facial_recognition"));
  }

  #[test]
  fn config_file_url() {
    let cfg: ConfigFile = toml::from_str("url = \"http://gate:9000\"").unwrap();
    assert_eq!(cfg.url, "http://gate:9000");
    let empty: ConfigFile = toml::from_str("").unwrap();
    assert!(empty.url.is_empty());
  }
}
