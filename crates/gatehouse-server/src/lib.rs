//! HTTP server wiring for Gatehouse: configuration and the top-level router.

use std::path::{Path, PathBuf};

use axum::{Router, routing::get};
use chrono::FixedOffset;
use gatehouse_core::{
  directory::{DirectorySeed, IdentityDirectory},
  service::{DirectionPolicy, GateConfig, GateService},
  store::AccessStore,
};
use serde::Deserialize;
use thiserror::Error;
use tower_http::trace::TraceLayer;

#[derive(Debug, Error)]
pub enum Error {
  #[error("site UTC offset of {0} minutes is out of range")]
  InvalidOffset(i32),

  #[error("failed to read seed file {path:?}: {source}")]
  SeedRead {
    path:   PathBuf,
    source: std::io::Error,
  },

  #[error("failed to parse seed file {path:?}: {source}")]
  SeedParse {
    path:   PathBuf,
    source: serde_json::Error,
  },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

// ─── Configuration ───────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `gatehouse.toml` and
/// `GATEHOUSE_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
  pub host:                    String,
  pub port:                    u16,
  pub store_path:              PathBuf,
  /// Minutes east of UTC for the site clock; `-180` for UTC−3.
  pub site_utc_offset_minutes: i32,
  pub default_location:        String,
  pub credential_prefix:       String,
  pub direction_policy:        DirectionPolicy,
  pub default_query_limit:     usize,
  /// JSON [`DirectorySeed`] loaded into the directory tables at start.
  pub seed_path:               Option<PathBuf>,
}

impl Default for ServerConfig {
  fn default() -> Self {
    let gate = GateConfig::default();
    Self {
      host:                    "127.0.0.1".to_owned(),
      port:                    8080,
      store_path:              PathBuf::from("gatehouse.db"),
      site_utc_offset_minutes: 0,
      default_location:        gate.default_location,
      credential_prefix:       gate.credential_prefix,
      direction_policy:        gate.direction_policy,
      default_query_limit:     gate.default_query_limit,
      seed_path:               None,
    }
  }
}

impl ServerConfig {
  pub fn gate_config(&self) -> Result<GateConfig> {
    let minutes = self.site_utc_offset_minutes;
    let site_offset = minutes
      .checked_mul(60)
      .and_then(FixedOffset::east_opt)
      .ok_or(Error::InvalidOffset(minutes))?;
    Ok(GateConfig {
      direction_policy: self.direction_policy,
      credential_prefix: self.credential_prefix.clone(),
      site_offset,
      default_location: self.default_location.clone(),
      default_query_limit: self.default_query_limit,
    })
  }
}

/// Read a JSON directory seed file.
pub fn load_seed(path: &Path) -> Result<DirectorySeed> {
  let raw = std::fs::read_to_string(path)
    .map_err(|source| Error::SeedRead { path: path.to_path_buf(), source })?;
  serde_json::from_str(&raw)
    .map_err(|source| Error::SeedParse { path: path.to_path_buf(), source })
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// The full application: the JSON API under `/api`, a health check, and
/// request tracing.
pub fn app<S, D>(service: GateService<S, D>) -> Router
where
  S: AccessStore + 'static,
  D: IdentityDirectory + 'static,
{
  Router::new()
    .route("/health", get(|| async { "ok" }))
    .nest("/api", gatehouse_api::api_router(service))
    .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use axum::{
    body::Body,
    http::{Request, StatusCode},
  };
  use config::{Config, File, FileFormat};
  use gatehouse_store_sqlite::SqliteStore;
  use tower::ServiceExt as _;

  use super::*;

  fn parse(toml: &str) -> ServerConfig {
    Config::builder()
      .add_source(File::from_str(toml, FileFormat::Toml))
      .build()
      .unwrap()
      .try_deserialize()
      .unwrap()
  }

  #[test]
  fn empty_config_uses_defaults() {
    let cfg = parse("");
    assert_eq!(cfg.port, 8080);
    assert_eq!(cfg.credential_prefix, "EMP-");
    assert_eq!(cfg.direction_policy, DirectionPolicy::Warn);
    assert_eq!(cfg.default_query_limit, 100);
    assert!(cfg.seed_path.is_none());
  }

  #[test]
  fn config_overrides_and_offset() {
    let cfg = parse(
      r#"
        port = 9000
        site_utc_offset_minutes = -180
        direction_policy = "reject"
        seed_path = "directory.json"
      "#,
    );
    assert_eq!(cfg.port, 9000);
    assert_eq!(cfg.direction_policy, DirectionPolicy::Reject);
    let gate = cfg.gate_config().unwrap();
    assert_eq!(gate.site_offset.local_minus_utc(), -3 * 3600);
    assert_eq!(cfg.seed_path, Some(PathBuf::from("directory.json")));
  }

  #[test]
  fn out_of_range_offset_is_rejected() {
    let cfg = ServerConfig { site_utc_offset_minutes: 24 * 60, ..Default::default() };
    assert!(matches!(cfg.gate_config(), Err(Error::InvalidOffset(_))));
  }

  #[test]
  fn seed_file_parses() {
    let dir = std::env::temp_dir().join(format!("gatehouse-seed-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("directory.json");
    std::fs::write(
      &path,
      r#"{"employees":[{"id":"1042","name":"Ana","cpf":"529.982.247-25"}],
          "vehicles":[{"id":"V1","plate":"ABC-1D23","model":null}]}"#,
    )
    .unwrap();

    let seed = load_seed(&path).unwrap();
    assert_eq!(seed.employees.len(), 1);
    assert!(seed.employees[0].is_active);
    assert_eq!(seed.vehicles.len(), 1);
    assert!(seed.drivers.is_empty());

    assert!(matches!(load_seed(&dir.join("missing.json")), Err(Error::SeedRead { .. })));
    std::fs::remove_dir_all(&dir).ok();
  }

  #[tokio::test]
  async fn api_is_nested_and_health_answers() {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let app = app(GateService::new(Arc::clone(&store), store, GateConfig::default()));

    let resp = app
      .clone()
      .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
      .await
      .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
      .oneshot(Request::builder().uri("/api/vehicles/ready").body(Body::empty()).unwrap())
      .await
      .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
  }
}
