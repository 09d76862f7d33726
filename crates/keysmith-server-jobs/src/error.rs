// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

#[derive(Debug, Error)]
pub enum JobError {
	#[error("job not found: {0}")]
	NotFound(String),

	#[error("job cancelled")]
	Cancelled,

	#[error("job failed: {message}")]
	Failed { message: String, retryable: bool },

	/// A previous run of the same job has not finished yet.
	#[error("job already running: {0}")]
	AlreadyRunning(String),
}

impl JobError {
	pub fn failed(message: impl Into<String>) -> Self {
		JobError::Failed {
			message: message.into(),
			retryable: false,
		}
	}
}

pub type Result<T> = std::result::Result<T, JobError>;
