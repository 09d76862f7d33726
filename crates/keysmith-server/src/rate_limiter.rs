// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Per-principal sliding-window admission control.
//!
//! Each `(principal, operation class)` pair keeps the timestamps of its
//! admitted calls that are still inside the trailing window. A call is
//! admitted while fewer than `limit` timestamps remain. Rejected calls do
//! not consume a slot, so a principal hammering the endpoint does not push
//! its own window further out.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use keysmith_core::{Clock, OperationClass, PrincipalId};
use keysmith_server_config::LimitsConfig;
use parking_lot::Mutex;

/// Budget for one operation class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowConfig {
	pub limit: u32,
	pub window: Duration,
}

impl WindowConfig {
	pub fn new(limit: u32, window: Duration) -> Self {
		Self { limit, window }
	}
}

/// Budgets for every operation class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimits {
	pub issuance: WindowConfig,
	pub inspection: WindowConfig,
}

impl RateLimits {
	pub fn for_class(&self, class: OperationClass) -> WindowConfig {
		match class {
			OperationClass::Issuance => self.issuance,
			OperationClass::Inspection => self.inspection,
		}
	}
}

impl From<&LimitsConfig> for RateLimits {
	fn from(config: &LimitsConfig) -> Self {
		Self {
			issuance: WindowConfig::new(
				config.issuance_limit,
				Duration::from_secs(config.issuance_window_secs),
			),
			inspection: WindowConfig::new(
				config.inspection_limit,
				Duration::from_secs(config.inspection_window_secs),
			),
		}
	}
}

impl Default for RateLimits {
	fn default() -> Self {
		Self::from(&LimitsConfig::default())
	}
}

type WindowKey = (PrincipalId, OperationClass);

pub struct SlidingWindowLimiter {
	limits: RateLimits,
	clock: Arc<dyn Clock>,
	windows: Mutex<HashMap<WindowKey, VecDeque<DateTime<Utc>>>>,
}

fn window_span(window: Duration) -> chrono::Duration {
	chrono::Duration::from_std(window).unwrap_or(chrono::Duration::MAX)
}

fn prune(entries: &mut VecDeque<DateTime<Utc>>, now: DateTime<Utc>, span: chrono::Duration) {
	while let Some(oldest) = entries.front() {
		if now - *oldest >= span {
			entries.pop_front();
		} else {
			break;
		}
	}
}

impl SlidingWindowLimiter {
	pub fn new(limits: RateLimits, clock: Arc<dyn Clock>) -> Self {
		Self {
			limits,
			clock,
			windows: Mutex::new(HashMap::new()),
		}
	}

	/// Admit and record a call, or return how long until a slot frees up.
	pub fn check(&self, principal: &PrincipalId, class: OperationClass) -> Result<(), Duration> {
		let config = self.limits.for_class(class);
		let span = window_span(config.window);
		let now = self.clock.now();

		let mut windows = self.windows.lock();
		let entries = windows.entry((principal.clone(), class)).or_default();
		prune(entries, now, span);

		if entries.len() < config.limit as usize {
			entries.push_back(now);
			return Ok(());
		}

		let retry_after = entries
			.front()
			.map(|oldest| span - (now - *oldest))
			.and_then(|remaining| remaining.to_std().ok())
			.unwrap_or(config.window);

		tracing::debug!(
			principal_id = %principal,
			class = %class,
			retry_after_secs = retry_after.as_secs(),
			"rate limit rejected call"
		);
		Err(retry_after)
	}

	pub fn admit(&self, principal: &PrincipalId, class: OperationClass) -> bool {
		self.check(principal, class).is_ok()
	}

	/// Admitted calls still inside the window.
	pub fn in_window(&self, principal: &PrincipalId, class: OperationClass) -> usize {
		let span = window_span(self.limits.for_class(class).window);
		let now = self.clock.now();
		let mut windows = self.windows.lock();
		match windows.get_mut(&(principal.clone(), class)) {
			Some(entries) => {
				prune(entries, now, span);
				entries.len()
			}
			None => 0,
		}
	}

	/// Drop windows whose entries have all expired. Returns how many were removed.
	pub fn sweep(&self) -> usize {
		let now = self.clock.now();
		let mut windows = self.windows.lock();
		let before = windows.len();
		windows.retain(|(_, class), entries| {
			prune(entries, now, window_span(self.limits.for_class(*class).window));
			!entries.is_empty()
		});
		before - windows.len()
	}

	pub fn tracked_windows(&self) -> usize {
		self.windows.lock().len()
	}
}
