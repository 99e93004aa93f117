//! `POST /credentials/resolve` — decode-to-identity without recording
//! anything.

use axum::{Json, extract::State};
use gatehouse_core::{
  credential::ResolvedCredential, directory::IdentityDirectory, store::AccessStore,
};
use serde::Deserialize;

use crate::{AppState, error::ApiError, extract::JsonBody};

#[derive(Debug, Deserialize)]
pub struct ResolveBody {
  pub token: String,
}

/// `POST /credentials/resolve` — body: `{"token":"EMP-1042"}`
pub async fn resolve<S, D>(
  State(state): State<AppState<S, D>>,
  JsonBody(body): JsonBody<ResolveBody>,
) -> Result<Json<ResolvedCredential>, ApiError>
where
  S: AccessStore + 'static,
  D: IdentityDirectory + 'static,
{
  Ok(Json(state.service.resolve_credential(&body.token).await?))
}
