// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use serde::Deserialize;

pub const MIN_RECONCILIATION_INTERVAL_SECS: u64 = 60 * 60;
pub const MAX_RECONCILIATION_INTERVAL_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationConfig {
	pub enabled: bool,
	pub interval_secs: u64,
	/// How often idle rate-limit windows and principal locks are pruned.
	pub sweep_interval_secs: u64,
}

impl Default for ReconciliationConfig {
	fn default() -> Self {
		ReconciliationConfigLayer::default().finalize()
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReconciliationConfigLayer {
	#[serde(default)]
	pub enabled: Option<bool>,
	#[serde(default)]
	pub interval_secs: Option<u64>,
	#[serde(default)]
	pub sweep_interval_secs: Option<u64>,
}

impl ReconciliationConfigLayer {
	pub fn merge(&mut self, other: ReconciliationConfigLayer) {
		if other.enabled.is_some() {
			self.enabled = other.enabled;
		}
		if other.interval_secs.is_some() {
			self.interval_secs = other.interval_secs;
		}
		if other.sweep_interval_secs.is_some() {
			self.sweep_interval_secs = other.sweep_interval_secs;
		}
	}

	pub fn finalize(self) -> ReconciliationConfig {
		ReconciliationConfig {
			enabled: self.enabled.unwrap_or(true),
			interval_secs: self.interval_secs.unwrap_or(4 * 60 * 60),
			sweep_interval_secs: self.sweep_interval_secs.unwrap_or(600),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_defaults() {
		let config = ReconciliationConfig::default();
		assert!(config.enabled);
		assert_eq!(config.interval_secs, 14_400);
		assert_eq!(config.sweep_interval_secs, 600);
	}

	#[test]
	fn test_merge_overwrites() {
		let mut base = ReconciliationConfigLayer {
			enabled: Some(true),
			interval_secs: Some(7_200),
			..Default::default()
		};
		base.merge(ReconciliationConfigLayer {
			enabled: Some(false),
			..Default::default()
		});
		assert_eq!(base.enabled, Some(false));
		assert_eq!(base.interval_secs, Some(7_200));
	}
}
