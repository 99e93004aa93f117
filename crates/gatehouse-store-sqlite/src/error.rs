//! Error type for `gatehouse-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("unknown {column} value in database: {value:?}")]
  UnknownValue { column: &'static str, value: String },

  /// A visitor entry was appended for a visitor row that does not exist.
  #[error("visitor not found: {0}")]
  VisitorNotFound(uuid::Uuid),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
