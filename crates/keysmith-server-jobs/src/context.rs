// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use crate::types::TriggerSource;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Per-run information handed to [`crate::Job::run`].
pub struct JobContext {
	pub run_id: String,
	pub triggered_by: TriggerSource,
	/// Zero on the first attempt, incremented on each retry.
	pub attempt: u32,
	pub cancellation_token: CancellationToken,
}

impl JobContext {
	pub fn is_cancelled(&self) -> bool {
		self.cancellation_token.is_cancelled()
	}
}

/// Cooperative cancellation flag shared between the scheduler and a job.
///
/// Jobs check it between units of work; nothing is interrupted mid-step.
#[derive(Clone, Default)]
pub struct CancellationToken {
	cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn cancel(&self) {
		self.cancelled.store(true, Ordering::SeqCst);
	}

	/// Clear a previous cancellation so scheduled runs resume.
	pub fn reset(&self) {
		self.cancelled.store(false, Ordering::SeqCst);
	}

	pub fn is_cancelled(&self) -> bool {
		self.cancelled.load(Ordering::SeqCst)
	}
}
