//! `GET /occupancy[?date=YYYY-MM-DD][&as_of=<rfc3339>]`
//!
//! `date` is a site-local calendar day and defaults to today.

use axum::{
  Json,
  extract::State,
};
use chrono::{DateTime, NaiveDate, Utc};
use gatehouse_core::{
  directory::IdentityDirectory, occupancy::OccupancySnapshot, store::AccessStore,
};
use serde::Deserialize;

use crate::{AppState, error::ApiError, extract::QueryParams};

#[derive(Debug, Deserialize, Default)]
pub struct OccupancyParams {
  pub date:  Option<NaiveDate>,
  pub as_of: Option<DateTime<Utc>>,
}

pub async fn handler<S, D>(
  State(state): State<AppState<S, D>>,
  QueryParams(params): QueryParams<OccupancyParams>,
) -> Result<Json<OccupancySnapshot>, ApiError>
where
  S: AccessStore + 'static,
  D: IdentityDirectory + 'static,
{
  let date = params.date.unwrap_or_else(|| state.service.site_today());
  Ok(Json(state.service.occupancy_snapshot(date, params.as_of).await?))
}
