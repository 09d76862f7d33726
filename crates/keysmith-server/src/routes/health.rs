// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Liveness and health HTTP handlers.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use keysmith_server_jobs::{HealthState, JobsHealthStatus};
use serde::Serialize;

use crate::api::AppState;

#[derive(Debug, Serialize)]
pub struct ComponentHealth {
	pub status: HealthState,
	pub latency_ms: u64,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
	pub status: HealthState,
	pub version: &'static str,
	pub database: ComponentHealth,
	pub jobs: JobsHealthStatus,
}

/// Public error text for a failed store ping; the cause goes to the log only.
pub const STORE_UNREACHABLE: &str = "key store unreachable";

/// GET / - plain liveness answer for hosting platforms.
pub async fn liveness() -> &'static str {
	"alive"
}

/// GET /health - store reachability plus scheduled job health.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
	let start = tokio::time::Instant::now();
	let database = match state.manager.store().ping().await {
		Ok(()) => ComponentHealth {
			status: HealthState::Healthy,
			latency_ms: start.elapsed().as_millis() as u64,
			error: None,
		},
		Err(e) => {
			tracing::warn!(error = %e, "key store health check failed");
			ComponentHealth {
				status: HealthState::Unhealthy,
				latency_ms: start.elapsed().as_millis() as u64,
				error: Some(STORE_UNREACHABLE.to_string()),
			}
		}
	};

	let jobs = state.scheduler.health_status();
	let status = database.status.max(jobs.status);

	let http_status = if database.status == HealthState::Unhealthy {
		StatusCode::SERVICE_UNAVAILABLE
	} else {
		StatusCode::OK
	};

	(
		http_status,
		Json(HealthResponse {
			status,
			version: env!("CARGO_PKG_VERSION"),
			database,
			jobs,
		}),
	)
}
