// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;

use async_trait::async_trait;
use keysmith_server_jobs::{Job, JobContext, JobError, JobOutput};
use tracing::instrument;

use crate::manager::Registries;

pub const REGISTRY_SWEEP_JOB_ID: &str = "registry-sweep";

pub struct RegistrySweepJob {
	registries: Arc<Registries>,
}

impl RegistrySweepJob {
	pub fn new(registries: Arc<Registries>) -> Self {
		Self { registries }
	}
}

#[async_trait]
impl Job for RegistrySweepJob {
	fn id(&self) -> &str {
		REGISTRY_SWEEP_JOB_ID
	}

	fn name(&self) -> &str {
		"Registry Sweep"
	}

	fn description(&self) -> &str {
		"Drop expired rate-limit windows and idle principal locks"
	}

	#[instrument(skip(self, ctx), fields(job_id = "registry-sweep"))]
	async fn run(&self, ctx: &JobContext) -> Result<JobOutput, JobError> {
		if ctx.cancellation_token.is_cancelled() {
			return Err(JobError::Cancelled);
		}

		let counts = self.registries.sweep();

		tracing::debug!(
			windows_removed = counts.windows_removed,
			locks_removed = counts.locks_removed,
			"registry sweep completed"
		);

		Ok(JobOutput {
			message: format!(
				"Removed {} rate windows and {} locks",
				counts.windows_removed, counts.locks_removed
			),
			metadata: Some(serde_json::json!({
				"windows_removed": counts.windows_removed,
				"locks_removed": counts.locks_removed,
			})),
		})
	}
}
