// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Periodic re-check of every active key against the authorization oracle.
//!
//! A definite "no" deactivates the key with reason `lost authorization`.
//! An indeterminate answer leaves the key alone until the next tick, so an
//! oracle outage never causes mass deactivation. A failure on one record
//! never aborts the pass. Failing to enumerate aborts the tick without
//! retry; the next timer firing tries again.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use keysmith_core::{Clock, DeactivationReason};
use keysmith_server_db::KeyStore;
use keysmith_server_jobs::{CancellationToken, Job, JobContext, JobError, JobOutput};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::oracle::AuthorizationOracle;

pub const RECONCILIATION_JOB_ID: &str = "key-reconciliation";

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationReport {
	pub checked: u64,
	pub deactivated: u64,
	pub skipped_indeterminate: u64,
	pub failed: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationState {
	Idle,
	Running,
}

pub struct KeyReconciliationJob {
	store: Arc<dyn KeyStore>,
	oracle: Arc<dyn AuthorizationOracle>,
	clock: Arc<dyn Clock>,
	running: AtomicBool,
}

/// Clears the running flag when a pass ends, however it ends.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
	fn drop(&mut self) {
		self.0.store(false, Ordering::SeqCst);
	}
}

impl KeyReconciliationJob {
	pub fn new(
		store: Arc<dyn KeyStore>,
		oracle: Arc<dyn AuthorizationOracle>,
		clock: Arc<dyn Clock>,
	) -> Self {
		Self {
			store,
			oracle,
			clock,
			running: AtomicBool::new(false),
		}
	}

	pub fn state(&self) -> ReconciliationState {
		if self.running.load(Ordering::SeqCst) {
			ReconciliationState::Running
		} else {
			ReconciliationState::Idle
		}
	}

	/// Run one pass. Overlapping passes are refused with `AlreadyRunning`.
	pub async fn reconcile(
		&self,
		cancellation: &CancellationToken,
	) -> Result<ReconciliationReport, JobError> {
		if self
			.running
			.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
			.is_err()
		{
			return Err(JobError::AlreadyRunning(RECONCILIATION_JOB_ID.to_string()));
		}
		let _running = RunningGuard(&self.running);

		let records = self.store.list_active().await.map_err(|e| {
			warn!(error = %e, "could not enumerate active keys");
			JobError::failed(format!("could not enumerate active keys: {e}"))
		})?;

		let mut report = ReconciliationReport::default();

		for record in records {
			if cancellation.is_cancelled() {
				info!(
					checked = report.checked,
					deactivated = report.deactivated,
					"reconciliation cancelled mid-pass"
				);
				return Err(JobError::Cancelled);
			}

			report.checked += 1;

			match self
				.oracle
				.is_authorized(&record.principal_id, &record.context_id)
				.await
			{
				Ok(true) => {}
				Ok(false) => {
					match self
						.store
						.deactivate(
							&record.value,
							DeactivationReason::LostAuthorization,
							self.clock.now(),
						)
						.await
					{
						Ok(true) => {
							report.deactivated += 1;
							info!(
								principal_id = %record.principal_id,
								key = %record.value.redacted(),
								"deactivated key after authorization loss"
							);
						}
						Ok(false) => {
							debug!(
								principal_id = %record.principal_id,
								"key was already deactivated"
							);
						}
						Err(e) => {
							report.failed += 1;
							warn!(
								principal_id = %record.principal_id,
								error = %e,
								"failed to deactivate key"
							);
						}
					}
				}
				Err(e) => {
					report.skipped_indeterminate += 1;
					debug!(
						principal_id = %record.principal_id,
						error = %e,
						"authorization indeterminate, leaving key active"
					);
				}
			}
		}

		Ok(report)
	}
}

#[async_trait]
impl Job for KeyReconciliationJob {
	fn id(&self) -> &str {
		RECONCILIATION_JOB_ID
	}

	fn name(&self) -> &str {
		"Key Reconciliation"
	}

	fn description(&self) -> &str {
		"Deactivate keys whose principals lost the required authorization"
	}

	#[instrument(skip(self, ctx), fields(job_id = "key-reconciliation"))]
	async fn run(&self, ctx: &JobContext) -> Result<JobOutput, JobError> {
		if ctx.is_cancelled() {
			return Err(JobError::Cancelled);
		}

		let report = self.reconcile(&ctx.cancellation_token).await?;

		info!(
			checked = report.checked,
			deactivated = report.deactivated,
			skipped_indeterminate = report.skipped_indeterminate,
			failed = report.failed,
			"reconciliation pass completed"
		);

		Ok(JobOutput {
			message: format!(
				"Checked {} keys, deactivated {}",
				report.checked, report.deactivated
			),
			metadata: serde_json::to_value(report).ok(),
		})
	}
}
