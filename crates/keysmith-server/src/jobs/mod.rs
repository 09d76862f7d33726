// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

pub mod reconciliation;
pub mod registry_sweep;

pub use reconciliation::{
	KeyReconciliationJob, ReconciliationReport, ReconciliationState, RECONCILIATION_JOB_ID,
};
pub use registry_sweep::{RegistrySweepJob, REGISTRY_SWEEP_JOB_ID};
