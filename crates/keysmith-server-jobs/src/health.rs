// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use crate::types::{JobRun, JobStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct JobHealthStatus {
	pub job_id: String,
	pub name: String,
	pub status: HealthState,
	pub last_run: Option<LastRunInfo>,
	pub consecutive_failures: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct LastRunInfo {
	pub run_id: String,
	pub status: JobStatus,
	pub started_at: DateTime<Utc>,
	pub duration_ms: Option<i64>,
	pub error: Option<String>,
}

impl From<JobRun> for LastRunInfo {
	fn from(run: JobRun) -> Self {
		Self {
			run_id: run.id,
			status: run.status,
			started_at: run.started_at,
			duration_ms: run.duration_ms,
			error: run.error_message,
		}
	}
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
	Healthy,
	Degraded,
	Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobsHealthStatus {
	pub status: HealthState,
	pub jobs: Vec<JobHealthStatus>,
}

/// One failure degrades a job, three in a row make it unhealthy.
pub(crate) fn determine_health_state(last_run: Option<&JobRun>, consecutive_failures: u32) -> HealthState {
	if last_run.is_none() {
		return HealthState::Healthy;
	}
	match consecutive_failures {
		0 => HealthState::Healthy,
		1 | 2 => HealthState::Degraded,
		_ => HealthState::Unhealthy,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::types::TriggerSource;

	fn run_with(status: JobStatus) -> JobRun {
		let mut run = JobRun::start("job-1", TriggerSource::Schedule);
		run.finish(status, None, None);
		run
	}

	#[test]
	fn test_no_runs_is_healthy() {
		assert_eq!(determine_health_state(None, 0), HealthState::Healthy);
	}

	#[test]
	fn test_success_is_healthy() {
		let run = run_with(JobStatus::Succeeded);
		assert_eq!(determine_health_state(Some(&run), 0), HealthState::Healthy);
	}

	#[test]
	fn test_failure_thresholds() {
		let run = run_with(JobStatus::Failed);
		assert_eq!(determine_health_state(Some(&run), 1), HealthState::Degraded);
		assert_eq!(determine_health_state(Some(&run), 2), HealthState::Degraded);
		assert_eq!(determine_health_state(Some(&run), 3), HealthState::Unhealthy);
		assert_eq!(determine_health_state(Some(&run), 7), HealthState::Unhealthy);
	}

	#[test]
	fn test_skip_after_failures_keeps_state() {
		let run = run_with(JobStatus::Skipped);
		assert_eq!(determine_health_state(Some(&run), 3), HealthState::Unhealthy);
	}

	#[test]
	fn test_ordering_picks_worst() {
		assert!(HealthState::Unhealthy > HealthState::Degraded);
		assert!(HealthState::Degraded > HealthState::Healthy);
	}
}
