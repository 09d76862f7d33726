// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Per-principal key operations for the service API.

use axum::{
	extract::{Path, State},
	http::StatusCode,
	response::IntoResponse,
	Json,
};
use keysmith_core::{ContextId, KeyRecord, PrincipalId};
use serde::{Deserialize, Serialize};

use crate::{api::AppState, error::ServerError};

#[derive(Debug, Deserialize)]
pub struct IssueKeyRequest {
	pub context_id: String,
	#[serde(default)]
	pub principal_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct IssueKeyResponse {
	#[serde(flatten)]
	pub record: KeyRecord,
	pub created: bool,
}

/// `key` is `null` when the principal holds no active key.
#[derive(Debug, Serialize)]
pub struct ActiveKeyResponse {
	pub key: Option<KeyRecord>,
}

#[derive(Debug, Serialize)]
pub struct DeactivationResponse {
	pub deactivated: u64,
}

fn principal_from_path(raw: String) -> Result<PrincipalId, ServerError> {
	let trimmed = raw.trim();
	if trimmed.is_empty() {
		return Err(ServerError::BadRequest("principal id is required".to_string()));
	}
	Ok(PrincipalId::new(trimmed))
}

/// POST /v1/principals/{principal_id}/key
pub async fn issue_key(
	State(state): State<AppState>,
	Path(principal_id): Path<String>,
	Json(body): Json<IssueKeyRequest>,
) -> Result<impl IntoResponse, ServerError> {
	let principal = principal_from_path(principal_id)?;
	let context_id = body.context_id.trim();
	if context_id.is_empty() {
		return Err(ServerError::BadRequest("context_id is required".to_string()));
	}

	let issued = state
		.manager
		.issue(&principal, &ContextId::new(context_id), body.principal_name)
		.await?;

	let status = if issued.created {
		StatusCode::CREATED
	} else {
		StatusCode::OK
	};
	Ok((
		status,
		Json(IssueKeyResponse {
			record: issued.record,
			created: issued.created,
		}),
	))
}

/// GET /v1/principals/{principal_id}/key - the principal's own view, rate limited.
pub async fn inspect_key(
	State(state): State<AppState>,
	Path(principal_id): Path<String>,
) -> Result<Json<ActiveKeyResponse>, ServerError> {
	let principal = principal_from_path(principal_id)?;
	let key = state.manager.inspect(&principal).await?;
	Ok(Json(ActiveKeyResponse { key }))
}

/// GET /v1/principals/{principal_id}/key/admin - operator lookup, not rate limited.
pub async fn lookup_key(
	State(state): State<AppState>,
	Path(principal_id): Path<String>,
) -> Result<Json<ActiveKeyResponse>, ServerError> {
	let principal = principal_from_path(principal_id)?;
	let key = state.manager.lookup(&principal).await?;
	Ok(Json(ActiveKeyResponse { key }))
}

/// POST /v1/principals/{principal_id}/departure
pub async fn record_departure(
	State(state): State<AppState>,
	Path(principal_id): Path<String>,
) -> Result<Json<DeactivationResponse>, ServerError> {
	let principal = principal_from_path(principal_id)?;
	let deactivated = state.manager.handle_departure(&principal).await?;
	Ok(Json(DeactivationResponse { deactivated }))
}

/// DELETE /v1/principals/{principal_id}/key
pub async fn revoke_key(
	State(state): State<AppState>,
	Path(principal_id): Path<String>,
) -> Result<Json<DeactivationResponse>, ServerError> {
	let principal = principal_from_path(principal_id)?;
	let deactivated = state.manager.revoke(&principal).await?;
	Ok(Json(DeactivationResponse { deactivated }))
}
