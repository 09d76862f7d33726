// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Background job scheduler for Keysmith server.
//!
//! Periodic jobs run on a fixed interval until shutdown and can also be
//! triggered manually. Retryable failures back off exponentially. Run
//! history is kept in memory, bounded per job, and feeds the health report.

pub mod context;
pub mod error;
pub mod health;
pub mod history;
pub mod job;
pub mod scheduler;
pub mod types;

pub use context::{CancellationToken, JobContext};
pub use error::{JobError, Result};
pub use health::{HealthState, JobHealthStatus, JobsHealthStatus, LastRunInfo};
pub use history::RunHistory;
pub use job::Job;
pub use scheduler::{JobScheduler, RetryPolicy};
pub use types::{JobOutput, JobRun, JobStatus, JobType, TriggerSource};
