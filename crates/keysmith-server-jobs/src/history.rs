// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

use crate::types::{JobRun, JobStatus};

const DEFAULT_RUNS_PER_JOB: usize = 50;

/// Bounded, process-lifetime record of job runs, newest last.
pub struct RunHistory {
	runs: Mutex<HashMap<String, VecDeque<JobRun>>>,
	capacity: usize,
}

impl RunHistory {
	pub fn new(capacity: usize) -> Self {
		Self {
			runs: Mutex::new(HashMap::new()),
			capacity: capacity.max(1),
		}
	}

	/// Insert `run`, or replace the entry with the same id.
	pub fn record(&self, run: &JobRun) {
		let mut runs = self.runs.lock();
		let entries = runs.entry(run.job_id.clone()).or_default();
		if let Some(existing) = entries.iter_mut().rev().find(|r| r.id == run.id) {
			*existing = run.clone();
			return;
		}
		entries.push_back(run.clone());
		while entries.len() > self.capacity {
			entries.pop_front();
		}
	}

	pub fn last_run(&self, job_id: &str) -> Option<JobRun> {
		self.runs.lock().get(job_id).and_then(|r| r.back().cloned())
	}

	/// Most recent runs first.
	pub fn recent(&self, job_id: &str, limit: usize) -> Vec<JobRun> {
		self.runs
			.lock()
			.get(job_id)
			.map(|r| r.iter().rev().take(limit).cloned().collect())
			.unwrap_or_default()
	}

	/// Failed runs since the last success. Skipped and cancelled runs do not
	/// break the streak.
	pub fn consecutive_failures(&self, job_id: &str) -> u32 {
		let runs = self.runs.lock();
		let Some(entries) = runs.get(job_id) else {
			return 0;
		};
		let mut count = 0;
		for run in entries.iter().rev() {
			match run.status {
				JobStatus::Failed => count += 1,
				JobStatus::Succeeded => break,
				JobStatus::Running | JobStatus::Cancelled | JobStatus::Skipped => {}
			}
		}
		count
	}
}

impl Default for RunHistory {
	fn default() -> Self {
		Self::new(DEFAULT_RUNS_PER_JOB)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::types::TriggerSource;

	fn finished(job_id: &str, status: JobStatus) -> JobRun {
		let mut run = JobRun::start(job_id, TriggerSource::Schedule);
		run.finish(status, None, None);
		run
	}

	#[test]
	fn record_replaces_by_id() {
		let history = RunHistory::default();
		let mut run = JobRun::start("job", TriggerSource::Manual);
		history.record(&run);
		run.finish(JobStatus::Succeeded, None, None);
		history.record(&run);

		let recent = history.recent("job", 10);
		assert_eq!(recent.len(), 1);
		assert_eq!(recent[0].status, JobStatus::Succeeded);
	}

	#[test]
	fn capacity_drops_oldest() {
		let history = RunHistory::new(2);
		for _ in 0..5 {
			history.record(&finished("job", JobStatus::Succeeded));
		}
		assert_eq!(history.recent("job", 10).len(), 2);
	}

	#[test]
	fn consecutive_failures_stop_at_success() {
		let history = RunHistory::default();
		history.record(&finished("job", JobStatus::Failed));
		history.record(&finished("job", JobStatus::Succeeded));
		history.record(&finished("job", JobStatus::Failed));
		history.record(&finished("job", JobStatus::Skipped));
		history.record(&finished("job", JobStatus::Failed));

		assert_eq!(history.consecutive_failures("job"), 2);
		assert_eq!(history.consecutive_failures("other"), 0);
		assert_eq!(
			history.last_run("job").map(|r| r.status),
			Some(JobStatus::Failed)
		);
	}
}
