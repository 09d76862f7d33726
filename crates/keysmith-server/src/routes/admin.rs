// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Operator endpoints: statistics and reconciliation control.

use axum::{extract::State, Json};
use keysmith_core::KeyStats;
use keysmith_server_jobs::{JobHealthStatus, JobRun, TriggerSource};
use serde::Serialize;

use crate::{
	api::AppState,
	error::ServerError,
	jobs::{ReconciliationReport, ReconciliationState, RECONCILIATION_JOB_ID},
};

const RECENT_RUNS_LIMIT: usize = 10;

#[derive(Debug, Serialize)]
pub struct ReconciliationStatusResponse {
	pub state: ReconciliationState,
	/// Paused passes stop between keys and scheduled ticks are skipped.
	pub paused: bool,
	pub job: Option<JobHealthStatus>,
	pub recent_runs: Vec<JobRun>,
}

#[derive(Debug, Serialize)]
pub struct ReconciliationRunResponse {
	pub run_id: String,
	pub duration_ms: Option<i64>,
	pub report: ReconciliationReport,
}

/// GET /v1/keys/stats
pub async fn key_stats(State(state): State<AppState>) -> Result<Json<KeyStats>, ServerError> {
	Ok(Json(state.manager.stats().await?))
}

/// GET /v1/reconciliation
pub async fn reconciliation_status(
	State(state): State<AppState>,
) -> Json<ReconciliationStatusResponse> {
	Json(ReconciliationStatusResponse {
		state: state.reconciliation.state(),
		paused: state.scheduler.is_cancelled(RECONCILIATION_JOB_ID),
		job: state.scheduler.job_status(RECONCILIATION_JOB_ID),
		recent_runs: state
			.scheduler
			.recent_runs(RECONCILIATION_JOB_ID, RECENT_RUNS_LIMIT),
	})
}

/// POST /v1/reconciliation/pause
pub async fn pause_reconciliation(
	State(state): State<AppState>,
) -> Result<Json<ReconciliationStatusResponse>, ServerError> {
	state.scheduler.cancel_job(RECONCILIATION_JOB_ID)?;
	tracing::info!("reconciliation paused by operator");
	Ok(reconciliation_status(State(state)).await)
}

/// POST /v1/reconciliation/resume
pub async fn resume_reconciliation(
	State(state): State<AppState>,
) -> Result<Json<ReconciliationStatusResponse>, ServerError> {
	state.scheduler.resume_job(RECONCILIATION_JOB_ID)?;
	tracing::info!("reconciliation resumed by operator");
	Ok(reconciliation_status(State(state)).await)
}

/// POST /v1/reconciliation/run - run one pass now and wait for it.
pub async fn run_reconciliation(
	State(state): State<AppState>,
) -> Result<Json<ReconciliationRunResponse>, ServerError> {
	let run = state
		.scheduler
		.trigger_job(RECONCILIATION_JOB_ID, TriggerSource::Manual)
		.await?;

	let report = run
		.output
		.and_then(|output| output.metadata)
		.and_then(|metadata| serde_json::from_value(metadata).ok())
		.ok_or_else(|| ServerError::Internal("reconciliation produced no report".to_string()))?;

	Ok(Json(ReconciliationRunResponse {
		run_id: run.id,
		duration_ms: run.duration_ms,
		report,
	}))
}
