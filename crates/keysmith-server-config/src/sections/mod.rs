// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sections. Each has a resolved type and a partial layer.

mod database;
mod http;
mod limits;
mod logging;
mod oracle;
mod reconciliation;
mod service;

pub use database::{DatabaseConfig, DatabaseConfigLayer, MEMORY_DATABASE_URL};
pub use http::{HttpConfig, HttpConfigLayer};
pub use limits::{LimitsConfig, LimitsConfigLayer};
pub use logging::{LogFormat, LoggingConfig, LoggingConfigLayer};
pub use oracle::{OracleConfig, OracleConfigLayer, OracleKind};
pub use reconciliation::{
	ReconciliationConfig, ReconciliationConfigLayer, MAX_RECONCILIATION_INTERVAL_SECS,
	MIN_RECONCILIATION_INTERVAL_SECS,
};
pub use service::{ServiceConfig, ServiceConfigLayer};
