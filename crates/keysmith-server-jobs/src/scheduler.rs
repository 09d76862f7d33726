// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use crate::context::{CancellationToken, JobContext};
use crate::error::{JobError, Result};
use crate::health::{determine_health_state, HealthState, JobHealthStatus, JobsHealthStatus};
use crate::history::RunHistory;
use crate::job::Job;
use crate::types::{JobRun, JobStatus, JobType, TriggerSource};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

/// Exponential backoff for retryable job failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
	pub max_retries: u32,
	pub base_delay: Duration,
	pub max_delay: Duration,
	pub factor: f64,
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			max_retries: 3,
			base_delay: Duration::from_secs(1),
			max_delay: Duration::from_secs(60),
			factor: 2.0,
		}
	}
}

impl RetryPolicy {
	/// Delay before retry number `retry_count` (1-based).
	pub fn delay_for(&self, retry_count: u32) -> Duration {
		let exponent = retry_count.saturating_sub(1).min(i32::MAX as u32) as i32;
		let delay = self.base_delay.as_secs_f64() * self.factor.powi(exponent);
		if !delay.is_finite() || delay >= self.max_delay.as_secs_f64() {
			return self.max_delay;
		}
		Duration::from_secs_f64(delay)
	}
}

struct RegisteredJob {
	job: Arc<dyn Job>,
	job_type: JobType,
	cancellation_token: CancellationToken,
}

pub struct JobScheduler {
	jobs: HashMap<String, RegisteredJob>,
	history: Arc<RunHistory>,
	retry_policy: RetryPolicy,
	shutdown_tx: broadcast::Sender<()>,
	handles: Mutex<Vec<JoinHandle<()>>>,
}

impl JobScheduler {
	pub fn new() -> Self {
		Self::with_retry_policy(RetryPolicy::default())
	}

	pub fn with_retry_policy(retry_policy: RetryPolicy) -> Self {
		let (shutdown_tx, _) = broadcast::channel(1);
		Self {
			jobs: HashMap::new(),
			history: Arc::new(RunHistory::default()),
			retry_policy,
			shutdown_tx,
			handles: Mutex::new(Vec::new()),
		}
	}

	pub fn register_periodic(&mut self, job: Arc<dyn Job>, interval: Duration) {
		self.register(job, JobType::Periodic { interval });
	}

	/// Register a job that only runs when triggered.
	pub fn register_one_shot(&mut self, job: Arc<dyn Job>) {
		self.register(job, JobType::OneShot);
	}

	fn register(&mut self, job: Arc<dyn Job>, job_type: JobType) {
		let id = job.id().to_string();
		self.jobs.insert(
			id,
			RegisteredJob {
				job,
				job_type,
				cancellation_token: CancellationToken::new(),
			},
		);
	}

	/// Spawn one timer loop per periodic job. The first run happens one
	/// interval after start.
	#[instrument(skip(self))]
	pub async fn start(&self) {
		let mut handles = self.handles.lock().await;

		for (job_id, registered) in &self.jobs {
			let JobType::Periodic { interval } = registered.job_type else {
				continue;
			};

			let job = Arc::clone(&registered.job);
			let history = Arc::clone(&self.history);
			let mut shutdown_rx = self.shutdown_tx.subscribe();
			let cancellation_token = registered.cancellation_token.clone();
			let retry_policy = self.retry_policy;
			let job_id = job_id.clone();

			let handle = tokio::spawn(async move {
				loop {
					tokio::select! {
						_ = tokio::time::sleep(interval) => {
							if cancellation_token.is_cancelled() {
								continue;
							}
							let _ = run_job_with_retry(
								&job,
								&history,
								TriggerSource::Schedule,
								&cancellation_token,
								&retry_policy,
							).await;
						}
						_ = shutdown_rx.recv() => {
							info!(job_id = %job_id, "Shutting down periodic job");
							break;
						}
					}
				}
			});

			handles.push(handle);
		}

		info!(job_count = handles.len(), "Job scheduler started");
	}

	/// Run a job now, outside its schedule. Returns the finished run.
	#[instrument(skip(self))]
	pub async fn trigger_job(&self, job_id: &str, triggered_by: TriggerSource) -> Result<JobRun> {
		let registered = self
			.jobs
			.get(job_id)
			.ok_or_else(|| JobError::NotFound(job_id.to_string()))?;

		run_job_with_retry(
			&registered.job,
			&self.history,
			triggered_by,
			&registered.cancellation_token,
			&self.retry_policy,
		)
		.await
	}

	/// Ask a job to stop. Scheduled runs are skipped until [`Self::resume_job`].
	#[instrument(skip(self))]
	pub fn cancel_job(&self, job_id: &str) -> Result<()> {
		let registered = self
			.jobs
			.get(job_id)
			.ok_or_else(|| JobError::NotFound(job_id.to_string()))?;

		registered.cancellation_token.cancel();
		Ok(())
	}

	#[instrument(skip(self))]
	pub fn resume_job(&self, job_id: &str) -> Result<()> {
		let registered = self
			.jobs
			.get(job_id)
			.ok_or_else(|| JobError::NotFound(job_id.to_string()))?;

		registered.cancellation_token.reset();
		Ok(())
	}

	/// Whether [`Self::cancel_job`] is in effect. Unknown jobs are not cancelled.
	pub fn is_cancelled(&self, job_id: &str) -> bool {
		self.jobs
			.get(job_id)
			.is_some_and(|registered| registered.cancellation_token.is_cancelled())
	}

	#[instrument(skip(self))]
	pub async fn shutdown(&self) {
		let _ = self.shutdown_tx.send(());

		let mut handles = self.handles.lock().await;
		for handle in handles.drain(..) {
			let _ = handle.await;
		}

		info!("Job scheduler shut down");
	}

	pub fn job_ids(&self) -> Vec<String> {
		self.jobs.keys().cloned().collect()
	}

	pub fn recent_runs(&self, job_id: &str, limit: usize) -> Vec<JobRun> {
		self.history.recent(job_id, limit)
	}

	pub fn job_status(&self, job_id: &str) -> Option<JobHealthStatus> {
		let registered = self.jobs.get(job_id)?;

		let last_run = self.history.last_run(job_id);
		let consecutive_failures = self.history.consecutive_failures(job_id);
		let status = determine_health_state(last_run.as_ref(), consecutive_failures);

		Some(JobHealthStatus {
			job_id: job_id.to_string(),
			name: registered.job.name().to_string(),
			status,
			last_run: last_run.map(Into::into),
			consecutive_failures,
		})
	}

	pub fn health_status(&self) -> JobsHealthStatus {
		let mut jobs: Vec<JobHealthStatus> = self
			.jobs
			.keys()
			.filter_map(|job_id| self.job_status(job_id))
			.collect();
		jobs.sort_by(|a, b| a.job_id.cmp(&b.job_id));

		let status = jobs
			.iter()
			.map(|j| j.status)
			.max()
			.unwrap_or(HealthState::Healthy);

		JobsHealthStatus { status, jobs }
	}
}

impl Default for JobScheduler {
	fn default() -> Self {
		Self::new()
	}
}

async fn run_job_with_retry(
	job: &Arc<dyn Job>,
	history: &RunHistory,
	triggered_by: TriggerSource,
	cancellation_token: &CancellationToken,
	retry_policy: &RetryPolicy,
) -> Result<JobRun> {
	let mut run = JobRun::start(job.id(), triggered_by);
	history.record(&run);

	loop {
		let ctx = JobContext {
			run_id: run.id.clone(),
			triggered_by: if run.retry_count > 0 {
				TriggerSource::Retry
			} else {
				triggered_by
			},
			attempt: run.retry_count,
			cancellation_token: cancellation_token.clone(),
		};

		match job.run(&ctx).await {
			Ok(output) => {
				info!(job_id = %job.id(), run_id = %run.id, message = %output.message, "Job completed successfully");
				run.finish(JobStatus::Succeeded, None, Some(output));
				history.record(&run);
				return Ok(run);
			}
			Err(JobError::Cancelled) => {
				run.finish(JobStatus::Cancelled, None, None);
				history.record(&run);
				info!(job_id = %job.id(), run_id = %run.id, "Job cancelled");
				return Err(JobError::Cancelled);
			}
			Err(JobError::AlreadyRunning(id)) => {
				run.finish(JobStatus::Skipped, None, None);
				history.record(&run);
				info!(job_id = %job.id(), run_id = %run.id, "Previous run still in progress, skipping");
				return Err(JobError::AlreadyRunning(id));
			}
			Err(JobError::Failed { message, retryable }) => {
				if retryable && run.retry_count < retry_policy.max_retries {
					run.retry_count += 1;
					let delay = retry_policy.delay_for(run.retry_count);
					warn!(
						job_id = %job.id(),
						run_id = %run.id,
						retry_count = run.retry_count,
						delay_ms = delay.as_millis() as u64,
						error = %message,
						"Job failed, retrying"
					);
					tokio::time::sleep(delay).await;
					continue;
				}

				run.finish(JobStatus::Failed, Some(message.clone()), None);
				history.record(&run);
				warn!(job_id = %job.id(), run_id = %run.id, error = %message, "Job failed");
				return Err(JobError::Failed { message, retryable });
			}
			Err(e) => {
				let message = e.to_string();
				run.finish(JobStatus::Failed, Some(message.clone()), None);
				history.record(&run);
				warn!(job_id = %job.id(), run_id = %run.id, error = %message, "Job failed with error");
				return Err(e);
			}
		}
	}
}
