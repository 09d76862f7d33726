// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Rate limits, lock timeout and key allocation retries.

use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitsConfig {
	pub issuance_limit: u32,
	pub issuance_window_secs: u64,
	pub inspection_limit: u32,
	pub inspection_window_secs: u64,
	pub lock_timeout_ms: u64,
	pub key_allocation_attempts: u32,
}

impl Default for LimitsConfig {
	fn default() -> Self {
		LimitsConfigLayer::default().finalize()
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LimitsConfigLayer {
	#[serde(default)]
	pub issuance_limit: Option<u32>,
	#[serde(default)]
	pub issuance_window_secs: Option<u64>,
	#[serde(default)]
	pub inspection_limit: Option<u32>,
	#[serde(default)]
	pub inspection_window_secs: Option<u64>,
	#[serde(default)]
	pub lock_timeout_ms: Option<u64>,
	#[serde(default)]
	pub key_allocation_attempts: Option<u32>,
}

impl LimitsConfigLayer {
	pub fn merge(&mut self, other: LimitsConfigLayer) {
		if other.issuance_limit.is_some() {
			self.issuance_limit = other.issuance_limit;
		}
		if other.issuance_window_secs.is_some() {
			self.issuance_window_secs = other.issuance_window_secs;
		}
		if other.inspection_limit.is_some() {
			self.inspection_limit = other.inspection_limit;
		}
		if other.inspection_window_secs.is_some() {
			self.inspection_window_secs = other.inspection_window_secs;
		}
		if other.lock_timeout_ms.is_some() {
			self.lock_timeout_ms = other.lock_timeout_ms;
		}
		if other.key_allocation_attempts.is_some() {
			self.key_allocation_attempts = other.key_allocation_attempts;
		}
	}

	pub fn finalize(self) -> LimitsConfig {
		LimitsConfig {
			issuance_limit: self.issuance_limit.unwrap_or(1),
			issuance_window_secs: self.issuance_window_secs.unwrap_or(6 * 60 * 60),
			inspection_limit: self.inspection_limit.unwrap_or(2),
			inspection_window_secs: self.inspection_window_secs.unwrap_or(60 * 60),
			lock_timeout_ms: self.lock_timeout_ms.unwrap_or(5_000),
			key_allocation_attempts: self.key_allocation_attempts.unwrap_or(5),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_defaults() {
		let config = LimitsConfig::default();
		assert_eq!(config.issuance_limit, 1);
		assert_eq!(config.issuance_window_secs, 21_600);
		assert_eq!(config.inspection_limit, 2);
		assert_eq!(config.inspection_window_secs, 3_600);
		assert_eq!(config.lock_timeout_ms, 5_000);
		assert_eq!(config.key_allocation_attempts, 5);
	}

	#[test]
	fn test_partial_toml() {
		let layer: LimitsConfigLayer = toml::from_str("inspection_limit = 5").unwrap();
		let config = layer.finalize();
		assert_eq!(config.inspection_limit, 5);
		assert_eq!(config.issuance_limit, 1);
	}
}
