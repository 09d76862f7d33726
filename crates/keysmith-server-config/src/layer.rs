// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use serde::Deserialize;

use crate::sections::{
	DatabaseConfigLayer, HttpConfigLayer, LimitsConfigLayer, LoggingConfigLayer, OracleConfigLayer,
	ReconciliationConfigLayer, ServiceConfigLayer,
};

/// One partial configuration as produced by a single source.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerConfigLayer {
	#[serde(default)]
	pub http: Option<HttpConfigLayer>,
	#[serde(default)]
	pub database: Option<DatabaseConfigLayer>,
	#[serde(default)]
	pub limits: Option<LimitsConfigLayer>,
	#[serde(default)]
	pub reconciliation: Option<ReconciliationConfigLayer>,
	#[serde(default)]
	pub oracle: Option<OracleConfigLayer>,
	#[serde(default)]
	pub service: Option<ServiceConfigLayer>,
	#[serde(default)]
	pub logging: Option<LoggingConfigLayer>,
}

fn merge_section<T>(base: &mut Option<T>, other: Option<T>, merge: impl FnOnce(&mut T, T)) {
	let Some(other) = other else {
		return;
	};
	if let Some(existing) = base.as_mut() {
		merge(existing, other);
	} else {
		*base = Some(other);
	}
}

impl ServerConfigLayer {
	/// Overlay `other` on top of `self`; values set in `other` win.
	pub fn merge(&mut self, other: ServerConfigLayer) {
		merge_section(&mut self.http, other.http, HttpConfigLayer::merge);
		merge_section(&mut self.database, other.database, DatabaseConfigLayer::merge);
		merge_section(&mut self.limits, other.limits, LimitsConfigLayer::merge);
		merge_section(
			&mut self.reconciliation,
			other.reconciliation,
			ReconciliationConfigLayer::merge,
		);
		merge_section(&mut self.oracle, other.oracle, OracleConfigLayer::merge);
		merge_section(&mut self.service, other.service, ServiceConfigLayer::merge);
		merge_section(&mut self.logging, other.logging, LoggingConfigLayer::merge);
	}
}
